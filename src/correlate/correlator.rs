//! Batch completion tracking across both delivery paths.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use super::registry::CorrelatorRegistry;
use crate::poll::config::deadline_after;
use crate::poll::{PollError, PollFailure, PollOutcome, PollSinks, ResultSource, poll};
use crate::types::{QueryResult, RequestId};

/// What has arrived for one tracked request.
#[derive(Debug, Clone, PartialEq)]
pub enum Arrival {
    None,
    Result(QueryResult),
}

/// One request tracked by a [`Correlator`].
#[derive(Debug, Clone)]
pub struct PendingRequest {
    request_id: RequestId,
    arrival: Arrival,
    deadline: Instant,
}

impl PendingRequest {
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.arrival, Arrival::Result(_))
    }

    pub fn result(&self) -> Option<&QueryResult> {
        match &self.arrival {
            Arrival::Result(result) => Some(result),
            Arrival::None => None,
        }
    }
}

/// The part of a batch that finished before the deadline or cancellation.
#[derive(Debug)]
pub struct PartialBatch {
    pub results: HashMap<RequestId, QueryResult>,
    /// Sorted.
    pub unresolved: Vec<RequestId>,
    /// Most recent poll failure for each unresolved request that had one.
    pub last_errors: HashMap<RequestId, PollError>,
}

/// Terminal outcome of a batch.
#[derive(Debug)]
pub enum BatchOutcome {
    /// Every request resolved.
    Complete(HashMap<RequestId, QueryResult>),
    /// The deadline passed first.
    TimedOut(PartialBatch),
    /// The batch was cancelled first.
    Cancelled(PartialBatch),
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, BatchOutcome::Complete(_))
    }

    pub fn results(&self) -> &HashMap<RequestId, QueryResult> {
        match self {
            BatchOutcome::Complete(results) => results,
            BatchOutcome::TimedOut(partial) | BatchOutcome::Cancelled(partial) => {
                &partial.results
            }
        }
    }

    pub fn unresolved(&self) -> &[RequestId] {
        match self {
            BatchOutcome::Complete(_) => &[],
            BatchOutcome::TimedOut(partial) | BatchOutcome::Cancelled(partial) => {
                &partial.unresolved
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Complete,
    TimedOut,
    Cancelled,
}

/// Waits for a batch of requests to resolve.
///
/// Results reach the correlator through one channel, fed by any mix of
/// [`notifier`](Self::notifier) senders, [`CorrelatorRegistry`] callback
/// routing and poll loops started by [`spawn_pollers`](Self::spawn_pollers).
/// The first complete result for a request resolves it; later ones are
/// acknowledged but not counted again.
///
/// Finishing (or dropping) the correlator cancels and releases every poll
/// loop it started and removes its registry routes.
pub struct Correlator {
    pending: HashMap<RequestId, PendingRequest>,
    outstanding: usize,
    duplicates: usize,
    deadline: Instant,
    phase: Phase,
    results_tx: UnboundedSender<QueryResult>,
    results_rx: UnboundedReceiver<QueryResult>,
    errors_tx: UnboundedSender<PollFailure>,
    errors_rx: UnboundedReceiver<PollFailure>,
    last_errors: HashMap<RequestId, PollError>,
    cancel: CancellationToken,
    poll_tokens: HashMap<RequestId, CancellationToken>,
    tasks: JoinSet<PollOutcome>,
    registries: Vec<CorrelatorRegistry>,
}

impl Correlator {
    /// Tracks `request_ids` until all resolve or `timeout` elapses.
    ///
    /// Duplicate IDs are tracked once. An empty batch completes immediately.
    pub fn new(request_ids: impl IntoIterator<Item = RequestId>, timeout: Duration) -> Self {
        let deadline = deadline_after(Instant::now(), timeout);
        let pending: HashMap<RequestId, PendingRequest> = request_ids
            .into_iter()
            .map(|request_id| {
                let pending = PendingRequest {
                    request_id: request_id.clone(),
                    arrival: Arrival::None,
                    deadline,
                };
                (request_id, pending)
            })
            .collect();
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();

        Correlator {
            outstanding: pending.len(),
            pending,
            duplicates: 0,
            deadline,
            phase: Phase::Running,
            results_tx,
            results_rx,
            errors_tx,
            errors_rx,
            last_errors: HashMap::new(),
            cancel: CancellationToken::new(),
            poll_tokens: HashMap::new(),
            tasks: JoinSet::new(),
            registries: Vec::new(),
        }
    }

    /// Ties this batch to a parent cancellation signal.
    ///
    /// Call before [`spawn_pollers`](Self::spawn_pollers).
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    /// A sender for results arriving by other means (e.g. a custom sink).
    pub fn notifier(&self) -> UnboundedSender<QueryResult> {
        self.results_tx.clone()
    }

    /// Cancelling this token ends the batch with [`BatchOutcome::Cancelled`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Routes callback deliveries for unresolved requests to this batch.
    pub fn register(&mut self, registry: &CorrelatorRegistry) {
        for pending in self.pending.values().filter(|p| !p.is_resolved()) {
            registry.register(pending.request_id.clone(), self.results_tx.clone());
        }
        self.registries.push(registry.clone());
    }

    /// Starts one poll loop per unresolved request, sharing the batch deadline.
    pub fn spawn_pollers(&mut self, source: Arc<dyn ResultSource>, interval: Duration) {
        let unresolved: Vec<RequestId> = self
            .pending
            .values()
            .filter(|p| !p.is_resolved() && !self.poll_tokens.contains_key(&p.request_id))
            .map(|p| p.request_id.clone())
            .collect();

        for request_id in unresolved {
            let token = self.cancel.child_token();
            let sinks = PollSinks::new(self.results_tx.clone()).with_errors(self.errors_tx.clone());
            self.tasks.spawn(poll(
                Arc::clone(&source),
                request_id.clone(),
                interval,
                self.deadline,
                sinks,
                token.clone(),
            ));
            self.poll_tokens.insert(request_id, token);
        }
        debug!(pollers = self.tasks.len(), "Started poll loops");
    }

    /// Requests not yet resolved.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Deliveries ignored because their request was already resolved.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn pending(&self, request_id: &RequestId) -> Option<&PendingRequest> {
        self.pending.get(request_id)
    }

    /// Waits for the next request to resolve.
    ///
    /// Returns `None` once the batch is complete, timed out or cancelled.
    pub async fn next_resolved(&mut self) -> Option<QueryResult> {
        loop {
            if self.phase != Phase::Running {
                return None;
            }
            if self.outstanding == 0 {
                self.phase = Phase::Complete;
                return None;
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(outstanding = self.outstanding, "Batch cancelled");
                    self.phase = Phase::Cancelled;
                }
                Some(result) = self.results_rx.recv() => {
                    if let Some(result) = self.accept(result) {
                        return Some(result);
                    }
                }
                Some(failure) = self.errors_rx.recv() => self.record_failure(failure),
                _ = sleep_until(self.deadline) => {
                    info!(outstanding = self.outstanding, "Batch deadline reached");
                    self.phase = Phase::TimedOut;
                }
            }
        }
    }

    /// Waits for the whole batch, then releases every poll loop.
    #[instrument(skip_all, fields(requests = self.pending.len()))]
    pub async fn await_all(mut self) -> BatchOutcome {
        while self.next_resolved().await.is_some() {}
        self.shutdown().await;

        let pending = std::mem::take(&mut self.pending);
        let mut results = HashMap::new();
        let mut unresolved = Vec::new();
        for (request_id, pending) in pending {
            match pending.arrival {
                Arrival::Result(result) => {
                    results.insert(request_id, result);
                }
                Arrival::None => unresolved.push(request_id),
            }
        }
        unresolved.sort();

        let mut last_errors = std::mem::take(&mut self.last_errors);
        last_errors.retain(|request_id, _| unresolved.contains(request_id));

        match self.phase {
            Phase::Complete | Phase::Running => {
                info!(resolved = results.len(), "Batch complete");
                BatchOutcome::Complete(results)
            }
            Phase::TimedOut => BatchOutcome::TimedOut(PartialBatch {
                results,
                unresolved,
                last_errors,
            }),
            Phase::Cancelled => BatchOutcome::Cancelled(PartialBatch {
                results,
                unresolved,
                last_errors,
            }),
        }
    }

    /// Resolves a request on its first complete result.
    fn accept(&mut self, result: QueryResult) -> Option<QueryResult> {
        let request_id = result.id();
        let Some(pending) = self.pending.get_mut(&request_id) else {
            debug!(request_id = %request_id, "Ignoring result for request outside batch");
            return None;
        };
        if !result.is_complete() {
            trace!(request_id = %request_id, "Result not yet complete");
            return None;
        }
        if pending.is_resolved() {
            self.duplicates += 1;
            debug!(request_id = %request_id, "Duplicate result acknowledged");
            return None;
        }

        pending.arrival = Arrival::Result(result.clone());
        self.outstanding -= 1;
        self.last_errors.remove(&request_id);
        if let Some(token) = self.poll_tokens.get(&request_id) {
            token.cancel();
        }
        debug!(request_id = %request_id, outstanding = self.outstanding, "Request resolved");
        Some(result)
    }

    fn record_failure(&mut self, failure: PollFailure) {
        if self
            .pending
            .get(&failure.request_id)
            .is_some_and(|p| !p.is_resolved())
        {
            self.last_errors.insert(failure.request_id, failure.error);
        }
    }

    async fn shutdown(&mut self) {
        self.cancel.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(outcome) => trace!(?outcome, "Poll loop finished"),
                Err(e) if e.is_panic() => warn!(error = %e, "Poll loop panicked"),
                Err(_) => {}
            }
        }
        self.deregister_all();
    }

    fn deregister_all(&mut self) {
        for registry in self.registries.drain(..) {
            for request_id in self.pending.keys() {
                registry.deregister(request_id, &self.results_tx);
            }
        }
    }
}

impl Drop for Correlator {
    fn drop(&mut self) {
        // JoinSet aborts the poll tasks on drop; cancelling first lets them
        // observe it at their next suspension point.
        self.cancel.cancel();
        self.deregister_all();
    }
}
