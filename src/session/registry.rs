//! # Session Registry
//!
//! Process-wide mapping from session id to a read-only snapshot. It exists
//! purely for lookups by external collaborators (session history, meeting
//! summaries) through the HTTP surface. It is never used to coordinate
//! sessions, which own all of their state on their connection actor.

use crate::session::machine::SessionMachine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Read-only view of one bridged session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub source_language: String,
    pub target_language: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub dropped_audio_blocks: u64,
}

impl SessionSnapshot {
    fn from_machine(machine: &SessionMachine) -> Self {
        Self {
            session_id: machine.session_id.clone(),
            source_language: machine.source_language.clone(),
            target_language: machine.target_language.clone(),
            state: machine.state().as_str().to_string(),
            created_at: machine.created_at,
            dropped_audio_blocks: machine.dropped_audio_blocks(),
        }
    }
}

/// Capped map of live session snapshots.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionSnapshot>>>,
    max_concurrent_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_concurrent_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_concurrent_sessions,
        }
    }

    /// Register a newly connecting session. Fails when the concurrent
    /// session cap is reached, which the caller surfaces to the client.
    pub fn register(&self, machine: &SessionMachine) -> Result<(), String> {
        let mut sessions = self.sessions.write().unwrap();

        if sessions.len() >= self.max_concurrent_sessions
            && !sessions.contains_key(&machine.session_id)
        {
            return Err(format!(
                "maximum concurrent sessions ({}) reached",
                self.max_concurrent_sessions
            ));
        }

        sessions.insert(
            machine.session_id.clone(),
            SessionSnapshot::from_machine(machine),
        );
        Ok(())
    }

    /// Refresh the stored snapshot after a state transition. A session
    /// that was never registered is ignored.
    pub fn update(&self, machine: &SessionMachine) {
        let mut sessions = self.sessions.write().unwrap();
        if sessions.contains_key(&machine.session_id) {
            sessions.insert(
                machine.session_id.clone(),
                SessionSnapshot::from_machine(machine),
            );
        }
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().unwrap().remove(session_id).is_some()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.sessions.read().unwrap().get(session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().unwrap().is_empty()
    }

    /// All current snapshots, newest first.
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        let mut all: Vec<SessionSnapshot> =
            self.sessions.read().unwrap().values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connecting_machine() -> SessionMachine {
        let mut m = SessionMachine::new();
        m.begin_connect("zh", "en").unwrap();
        m
    }

    #[test]
    fn test_register_lookup_remove() {
        let registry = SessionRegistry::new(4);
        let m = connecting_machine();

        registry.register(&m).unwrap();
        assert_eq!(registry.len(), 1);

        let snap = registry.get(&m.session_id).unwrap();
        assert_eq!(snap.state, "connecting");
        assert_eq!(snap.source_language, "zh");

        assert!(registry.remove(&m.session_id));
        assert!(!registry.remove(&m.session_id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_update_refreshes_state() {
        let registry = SessionRegistry::new(4);
        let mut m = connecting_machine();
        registry.register(&m).unwrap();

        m.activate().unwrap();
        registry.update(&m);
        assert_eq!(registry.get(&m.session_id).unwrap().state, "active");
    }

    #[test]
    fn test_session_cap_enforced() {
        let registry = SessionRegistry::new(1);
        let first = connecting_machine();
        registry.register(&first).unwrap();

        let second = connecting_machine();
        assert!(registry.register(&second).is_err());

        // Re-registering the same session is not a new slot.
        assert!(registry.register(&first).is_ok());
    }
}
