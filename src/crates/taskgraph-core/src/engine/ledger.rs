//! Bounded record of session statuses
//!
//! Running and suspended sessions are always kept. Finished sessions are kept
//! up to `retain` entries and forgotten oldest first.

use std::collections::{HashMap, VecDeque};

use taskgraph_checkpoint::{SessionId, SessionStatus};

#[derive(Debug)]
pub(super) struct SessionLedger {
    statuses: HashMap<SessionId, SessionStatus>,
    /// Finished sessions in the order they finished
    finished: VecDeque<SessionId>,
    retain: usize,
}

impl SessionLedger {
    pub fn new(retain: usize) -> Self {
        Self {
            statuses: HashMap::new(),
            finished: VecDeque::new(),
            retain: retain.max(1),
        }
    }

    pub fn get(&self, session_id: &str) -> Option<SessionStatus> {
        self.statuses.get(session_id).copied()
    }

    pub fn record(&mut self, session_id: &str, status: SessionStatus) {
        let previous = self.statuses.insert(session_id.to_string(), status);
        let was_finished = previous.map_or(false, SessionStatus::is_terminal);

        if status.is_terminal() && !was_finished {
            self.finished.push_back(session_id.to_string());
            self.evict();
        }
    }

    pub fn set_retain(&mut self, retain: usize) {
        self.retain = retain.max(1);
        self.evict();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    fn evict(&mut self) {
        while self.finished.len() > self.retain {
            let Some(oldest) = self.finished.pop_front() else {
                break;
            };
            if self.statuses.get(&oldest).map_or(false, |s| s.is_terminal()) {
                self.statuses.remove(&oldest);
                tracing::trace!(session_id = %oldest, "forgot finished session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_only_newest_finished() {
        let mut ledger = SessionLedger::new(2);
        for id in ["a", "b", "c"] {
            ledger.record(id, SessionStatus::Running);
            ledger.record(id, SessionStatus::Completed);
        }
        assert_eq!(ledger.get("a"), None);
        assert_eq!(ledger.get("b"), Some(SessionStatus::Completed));
        assert_eq!(ledger.get("c"), Some(SessionStatus::Completed));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_live_sessions_are_never_evicted() {
        let mut ledger = SessionLedger::new(1);
        ledger.record("paused", SessionStatus::Suspended);
        ledger.record("running", SessionStatus::Running);
        for id in ["x", "y", "z"] {
            ledger.record(id, SessionStatus::Failed);
        }
        assert_eq!(ledger.get("paused"), Some(SessionStatus::Suspended));
        assert_eq!(ledger.get("running"), Some(SessionStatus::Running));
        assert_eq!(ledger.get("z"), Some(SessionStatus::Failed));
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn test_repeated_terminal_record_counts_once() {
        let mut ledger = SessionLedger::new(2);
        ledger.record("a", SessionStatus::Cancelled);
        ledger.record("a", SessionStatus::Cancelled);
        ledger.record("b", SessionStatus::Completed);
        assert_eq!(ledger.get("a"), Some(SessionStatus::Cancelled));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_shrinking_retain_evicts() {
        let mut ledger = SessionLedger::new(3);
        for id in ["a", "b", "c"] {
            ledger.record(id, SessionStatus::Completed);
        }
        ledger.set_retain(1);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("c"), Some(SessionStatus::Completed));
    }
}
