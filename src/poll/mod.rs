//! Result polling.
//!
//! [`ResultClient`] performs one fetch and classifies the answer; [`poll`]
//! repeats fetches on a fixed cadence until the result is complete, the
//! deadline passes, or the caller cancels.
//!
//! A result that is not flagged complete, or that lacks a required dataset,
//! is "not yet complete" and polled again. It is never an error.

pub mod client;
pub mod config;
pub mod poll_loop;


pub use client::{FetchOutcome, PollError, ResultClient, ResultSource};
pub use config::PollConfig;
pub use poll_loop::{PollFailure, PollOutcome, PollSinks, poll, poll_with_config};
