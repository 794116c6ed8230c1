//! Query Delivery - asynchronous result delivery for categorization queries.
//!
//! Results for submitted queries arrive either as signed HTTP callbacks or by
//! polling the query API. This library verifies and decodes callbacks, runs
//! poll loops, and correlates a batch of outstanding requests across both
//! paths.

pub mod callback;
pub mod codec;
pub mod config;
pub mod correlate;
pub mod keys;
pub mod poll;
pub mod signature;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;
