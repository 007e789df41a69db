//! In-memory checkpoint storage
//!
//! [`InMemoryCheckpointStore`] keeps suspended sessions in a
//! `Arc<RwLock<HashMap>>`, serialized to bytes so that nothing stored can alias the
//! engine's live context. Clones share the same map.
//!
//! Data is lost when the process exits; use
//! [`FileCheckpointStore`](crate::FileCheckpointStore) to resume across processes.

use crate::{
    error::Result,
    serializer::{JsonSerializer, SerializerProtocol},
    session::{SessionId, SessionState},
    traits::{ensure_storable, CheckpointStore, SessionStream},
};
use async_trait::async_trait;
use futures::stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type SessionStorage = Arc<RwLock<HashMap<SessionId, Vec<u8>>>>;

/// Thread-safe in-memory store for suspended sessions
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    storage: SessionStorage,
    serializer: JsonSerializer,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions
    pub async fn session_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Drop every stored session (useful for testing)
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn put(&self, state: SessionState) -> Result<()> {
        ensure_storable(&state)?;
        let bytes = self.serializer.dumps(&state)?;
        self.storage
            .write()
            .await
            .insert(state.session_id.clone(), bytes);
        tracing::debug!(session_id = %state.session_id, "stored suspended session");
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionState>> {
        let storage = self.storage.read().await;
        match storage.get(session_id) {
            Some(bytes) => Ok(Some(self.serializer.loads(bytes)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.storage.write().await.remove(session_id);
        Ok(())
    }

    async fn take(&self, session_id: &str) -> Result<Option<SessionState>> {
        // Removal happens under one write guard, so only one caller gets the record.
        let removed = self.storage.write().await.remove(session_id);
        match removed {
            Some(bytes) => Ok(Some(self.serializer.loads(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<SessionStream> {
        let storage = self.storage.read().await;
        let mut ids: Vec<&SessionId> = storage.keys().collect();
        ids.sort();
        let results: Vec<Result<SessionState>> = ids
            .into_iter()
            .filter_map(|id| storage.get(id))
            .map(|bytes| self.serializer.loads(bytes))
            .collect();
        Ok(Box::pin(stream::iter(results)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CheckpointError;
    use crate::session::SessionStatus;
    use futures::StreamExt;
    use serde_json::json;

    fn suspended(id: &str) -> SessionState {
        let mut state = SessionState::new(id, "analyze", true, json!({}));
        state.suspend("review_draft", "__end__", json!({"values": {"draft": id}}));
        state
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryCheckpointStore::new();
        store.put(suspended("s-1")).await.unwrap();

        let loaded = store.get("s-1").await.unwrap().unwrap();
        assert_eq!(loaded.session_id, "s-1");
        assert_eq!(loaded.status, SessionStatus::Suspended);
        assert_eq!(loaded.context["values"]["draft"], "s-1");
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_running_session() {
        let store = InMemoryCheckpointStore::new();
        let state = SessionState::new("s-1", "analyze", false, json!({}));

        let err = store.put(state).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Invalid(_)));
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = InMemoryCheckpointStore::new();
        store.put(suspended("s-1")).await.unwrap();

        let mut second = suspended("s-1");
        second.suspend("review_retrieval", "write", json!({"values": {"v": 2}}));
        store.put(second).await.unwrap();

        let loaded = store.get("s-1").await.unwrap().unwrap();
        assert_eq!(loaded.suspended_at.as_deref(), Some("review_retrieval"));
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_take_is_claimed_once() {
        let store = InMemoryCheckpointStore::new();
        store.put(suspended("s-1")).await.unwrap();

        let (a, b) = tokio::join!(store.take("s-1"), store.take("s-1"));
        let claimed = [a.unwrap(), b.unwrap()]
            .into_iter()
            .filter(Option::is_some)
            .count();

        assert_eq!(claimed, 1);
        assert!(!store.contains("s-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_and_clear() {
        let store = InMemoryCheckpointStore::new();
        for id in ["s-2", "s-1", "s-3"] {
            store.put(suspended(id)).await.unwrap();
        }

        let ids: Vec<String> = store
            .list()
            .await
            .unwrap()
            .map(|r| r.unwrap().session_id)
            .collect()
            .await;
        assert_eq!(ids, vec!["s-1", "s-2", "s-3"]);

        store.delete("s-2").await.unwrap();
        assert_eq!(store.session_count().await, 2);

        store.clear().await;
        assert_eq!(store.session_count().await, 0);
    }
}
