//! The per-request poll state machine.
//!
//! ```text
//! Idle -> Polling -> Resolved | TimedOut | Cancelled
//! ```
//!
//! The first fetch is issued immediately. Pending results and fetch errors
//! both lead to another fetch one interval later; errors are reported on the
//! error sink but never stop the loop. When the loop ends for any reason it
//! drops its result sender, which is how a listener learns the loop is done.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use super::client::{FetchOutcome, PollError, ResultSource};
use super::config::{PollConfig, deadline_after};
use crate::types::{QueryResult, RequestId};

/// `interval_at` rejects a zero period.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// A fetch failure reported while polling continues.
#[derive(Debug)]
pub struct PollFailure {
    pub request_id: RequestId,
    pub error: PollError,
}

/// Where a poll loop delivers what it learns.
#[derive(Debug, Clone)]
pub struct PollSinks {
    /// Receives the completed result, at most once.
    pub results: UnboundedSender<QueryResult>,
    /// Receives every fetch failure, if set.
    pub errors: Option<UnboundedSender<PollFailure>>,
}

impl PollSinks {
    pub fn new(results: UnboundedSender<QueryResult>) -> Self {
        PollSinks {
            results,
            errors: None,
        }
    }

    pub fn with_errors(mut self, errors: UnboundedSender<PollFailure>) -> Self {
        self.errors = Some(errors);
        self
    }
}

/// How a poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A complete result was sent to the result sink.
    Resolved { attempts: u32 },
    /// The deadline passed first.
    TimedOut { attempts: u32 },
    /// The cancellation token fired first.
    Cancelled { attempts: u32 },
}

impl PollOutcome {
    pub fn attempts(&self) -> u32 {
        match *self {
            PollOutcome::Resolved { attempts }
            | PollOutcome::TimedOut { attempts }
            | PollOutcome::Cancelled { attempts } => attempts,
        }
    }
}

/// Polls `source` for `request_id` until it completes, `deadline` passes, or
/// `cancel` fires.
///
/// Fetches are strictly sequential. A fetch still in flight when the deadline
/// passes or cancellation fires is abandoned and not counted as an attempt.
#[instrument(skip_all, fields(request_id = %request_id, interval = ?interval))]
pub async fn poll(
    source: Arc<dyn ResultSource>,
    request_id: RequestId,
    interval: Duration,
    deadline: Instant,
    sinks: PollSinks,
    cancel: CancellationToken,
) -> PollOutcome {
    let now = Instant::now();
    // A period past the deadline would never tick anyway; keep it representable.
    let period = interval
        .min(deadline.saturating_duration_since(now))
        .max(MIN_INTERVAL);
    let mut ticker = interval_at(deadline_after(now, period), period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attempts = 0u32;

    loop {
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancelled(attempts),
            _ = sleep_until(deadline) => return timed_out(attempts),
            fetched = source.fetch(&request_id) => fetched,
        };
        attempts += 1;

        match fetched {
            Ok(FetchOutcome::Complete(result)) => {
                info!(attempts, "Result complete");
                // A closed receiver means nobody is waiting any more.
                let _ = sinks.results.send(result);
                return PollOutcome::Resolved { attempts };
            }
            Ok(FetchOutcome::Pending(_)) => {
                trace!(attempts, "Result not yet complete");
            }
            Err(error) => {
                warn!(attempts, error = %error, "Poll attempt failed, will retry");
                if let Some(errors) = &sinks.errors {
                    let _ = errors.send(PollFailure {
                        request_id: request_id.clone(),
                        error,
                    });
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancelled(attempts),
            _ = sleep_until(deadline) => return timed_out(attempts),
            _ = ticker.tick() => {}
        }
    }
}

/// Runs [`poll`] with a deadline of `config.timeout` from now.
pub async fn poll_with_config(
    source: Arc<dyn ResultSource>,
    request_id: RequestId,
    config: PollConfig,
    sinks: PollSinks,
    cancel: CancellationToken,
) -> PollOutcome {
    let deadline = config.deadline_from(Instant::now());
    poll(source, request_id, config.interval, deadline, sinks, cancel).await
}

fn timed_out(attempts: u32) -> PollOutcome {
    info!(attempts, "Poll deadline reached");
    PollOutcome::TimedOut { attempts }
}

fn cancelled(attempts: u32) -> PollOutcome {
    debug!(attempts, "Poll cancelled");
    PollOutcome::Cancelled { attempts }
}
