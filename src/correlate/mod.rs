//! Correlating a batch of submitted requests with their results.
//!
//! A [`Correlator`] tracks one batch. Results for it can arrive through
//! HTTP callbacks (routed by a shared [`CorrelatorRegistry`]), through poll
//! loops it spawns, or through any sender obtained from
//! [`Correlator::notifier`]. Whichever path delivers a complete result first
//! wins; later deliveries for the same request are ignored.

pub mod correlator;
pub mod registry;


pub use correlator::{Arrival, BatchOutcome, Correlator, PartialBatch, PendingRequest};
pub use registry::CorrelatorRegistry;
