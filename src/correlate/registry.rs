//! Routing of callback deliveries to the correlator tracking each request.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use crate::types::{QueryResult, RequestId};

/// Maps request IDs to the correlator waiting on them.
///
/// Shared between the callback sink (which delivers) and correlators (which
/// register and deregister). Cloning shares the same table.
#[derive(Clone, Default)]
pub struct CorrelatorRegistry {
    routes: Arc<RwLock<HashMap<RequestId, UnboundedSender<QueryResult>>>>,
}

impl CorrelatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes future deliveries for `request_id` to `sender`.
    ///
    /// A later registration for the same ID replaces an earlier one.
    pub fn register(&self, request_id: RequestId, sender: UnboundedSender<QueryResult>) {
        self.routes.write().insert(request_id, sender);
    }

    /// Removes the route for `request_id` if it still points at `sender`.
    pub fn deregister(&self, request_id: &RequestId, sender: &UnboundedSender<QueryResult>) {
        let mut routes = self.routes.write();
        if routes
            .get(request_id)
            .is_some_and(|current| current.same_channel(sender))
        {
            routes.remove(request_id);
        }
    }

    /// Forwards a result to its correlator. Returns false if none is waiting.
    pub fn deliver(&self, result: &QueryResult) -> bool {
        let request_id = result.id();
        let sender = self.routes.read().get(&request_id).cloned();
        let Some(sender) = sender else {
            trace!(request_id = %request_id, "No correlator for callback");
            return false;
        };

        if sender.send(result.clone()).is_ok() {
            return true;
        }

        // The correlator went away without deregistering.
        self.deregister(&request_id, &sender);
        false
    }

    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::complete_result;
    use tokio::sync::mpsc;

    #[test]
    fn delivers_to_registered_sender() {
        let registry = CorrelatorRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(RequestId::new("a"), tx);

        assert!(registry.deliver(&complete_result("a")));
        assert_eq!(rx.try_recv().unwrap(), complete_result("a"));
    }

    #[test]
    fn unknown_id_is_not_delivered() {
        let registry = CorrelatorRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(RequestId::new("a"), tx);

        assert!(!registry.deliver(&complete_result("b")));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_receiver_is_pruned() {
        let registry = CorrelatorRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(RequestId::new("a"), tx);
        drop(rx);

        assert!(!registry.deliver(&complete_result("a")));
        assert!(registry.is_empty());
    }

    #[test]
    fn deregister_only_removes_own_route() {
        let registry = CorrelatorRegistry::new();
        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let (new_tx, _new_rx) = mpsc::unbounded_channel();
        registry.register(RequestId::new("a"), old_tx.clone());
        registry.register(RequestId::new("a"), new_tx.clone());

        registry.deregister(&RequestId::new("a"), &old_tx);
        assert_eq!(registry.len(), 1);

        registry.deregister(&RequestId::new("a"), &new_tx);
        assert!(registry.is_empty());
    }

    #[test]
    fn clones_share_routes() {
        let registry = CorrelatorRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.clone().register(RequestId::new("a"), tx);
        assert_eq!(registry.len(), 1);
    }
}
