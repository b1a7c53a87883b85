//! Live call registry
//!
//! Tracks the calls currently attached to a media stream websocket. Each
//! call owns its own state; the registry only maps ids to sessions.

use std::collections::HashMap;
use std::sync::Arc;

use call_bridge_agent::{CallSession, CallSnapshot};
use parking_lot::RwLock;

use crate::ServerError;

pub struct CallRegistry {
    calls: RwLock<HashMap<String, Arc<CallSession>>>,
    max_calls: usize,
}

impl CallRegistry {
    pub fn new(max_calls: usize) -> Self {
        Self {
            calls: RwLock::new(HashMap::new()),
            max_calls,
        }
    }

    /// Register a call; fails once `max_calls` are live
    pub fn register(&self, session: Arc<CallSession>) -> Result<(), ServerError> {
        let mut calls = self.calls.write();
        if calls.len() >= self.max_calls {
            return Err(ServerError::CallLimit(calls.len()));
        }

        calls.insert(session.id().to_string(), session);
        metrics::gauge!("call_bridge_registered_calls").set(calls.len() as f64);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<CallSession>> {
        self.calls.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<CallSession>> {
        let mut calls = self.calls.write();
        let removed = calls.remove(id);
        if removed.is_some() {
            metrics::gauge!("call_bridge_registered_calls").set(calls.len() as f64);
            tracing::debug!(call_id = %id, remaining = calls.len(), "Call unregistered");
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.calls.read().len()
    }

    pub fn capacity(&self) -> usize {
        self.max_calls
    }

    /// Snapshots of every live call, oldest first
    pub fn snapshots(&self) -> Vec<CallSnapshot> {
        let sessions: Vec<Arc<CallSession>> = self.calls.read().values().cloned().collect();
        let mut snapshots: Vec<CallSnapshot> = sessions.iter().map(|s| s.snapshot()).collect();
        snapshots.sort_by_key(|s| s.started_at);
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::idle_collaborators;
    use call_bridge_agent::CallSessionConfig;

    fn session() -> Arc<CallSession> {
        CallSession::new(
            CallSessionConfig::default(),
            idle_collaborators(),
            "wss://bridge.test/realtime",
        )
    }

    #[test]
    fn test_register_and_remove() {
        let registry = CallRegistry::new(10);
        let call = session();
        let id = call.id().to_string();

        registry.register(call).unwrap();
        assert_eq!(registry.count(), 1);
        assert!(registry.get(&id).is_some());

        assert!(registry.remove(&id).is_some());
        assert!(registry.get(&id).is_none());
        assert!(registry.remove(&id).is_none());
    }

    #[test]
    fn test_call_limit() {
        let registry = CallRegistry::new(1);
        registry.register(session()).unwrap();

        let err = registry.register(session()).unwrap_err();
        assert!(matches!(err, ServerError::CallLimit(1)));
    }

    #[test]
    fn test_snapshots_report_state() {
        let registry = CallRegistry::new(10);
        registry.register(session()).unwrap();
        registry.register(session()).unwrap();

        let snapshots = registry.snapshots();
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots
            .iter()
            .all(|s| s.state == call_bridge_core::CallState::Idle && s.call_sid.is_none()));
    }
}
