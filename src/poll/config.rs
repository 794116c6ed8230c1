//! Poll cadence and deadline.

use std::time::Duration;

use tokio::time::Instant;

/// Default interval between fetches (1 second).
const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Default overall deadline (15 minutes).
const DEFAULT_TIMEOUT_SECS: u64 = 15 * 60;

/// Stand-in for "never" when a timeout does not fit in an `Instant`.
pub(crate) const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 100);

/// `start + timeout`, saturating at [`FAR_FUTURE`] past `start`.
pub(crate) fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout.min(FAR_FUTURE))
        .or_else(|| start.checked_add(Duration::from_secs(86_400)))
        .unwrap_or(start)
}

/// Configuration for a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Time between the start of consecutive fetches.
    ///
    /// Fetches never overlap: a slow fetch delays the next one.
    /// Default: 1 second.
    pub interval: Duration,

    /// How long to keep polling before giving up.
    ///
    /// Default: 15 minutes.
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PollConfig {
    pub fn new() -> Self {
        PollConfig {
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The deadline for a loop starting at `start`.
    ///
    /// Timeouts too large to represent are treated as roughly a century.
    pub fn deadline_from(&self, start: Instant) -> Instant {
        deadline_after(start, self.timeout)
    }
}
