//! Behaviour every `CheckpointStore` backend must share
//!
//! The same checks run against the in-memory and the file store.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use taskgraph_checkpoint::{
    CheckpointError, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore, SessionState,
    SessionStatus,
};

fn suspended(id: &str, checkpoint: &str, next: &str) -> SessionState {
    let mut state = SessionState::new(id, "analyze", true, json!({"nodes": []}));
    state.suspend(checkpoint, next, json!({"values": {"draft": "v1"}}));
    state
}

async fn check_contract(store: Arc<dyn CheckpointStore>) {
    assert!(store.get("a").await.unwrap().is_none());
    assert!(!store.contains("a").await.unwrap());

    store.put(suspended("a", "review_retrieval", "write")).await.unwrap();
    store.put(suspended("b", "review_draft", "__end__")).await.unwrap();
    assert!(store.contains("a").await.unwrap());

    // last write wins
    store.put(suspended("a", "review_draft", "__end__")).await.unwrap();
    let a = store.get("a").await.unwrap().unwrap();
    assert_eq!(a.suspended_at.as_deref(), Some("review_draft"));
    assert_eq!(a.status, SessionStatus::Suspended);

    let mut ids: Vec<String> = store
        .list()
        .await
        .unwrap()
        .map(|s| s.unwrap().session_id)
        .collect()
        .await;
    ids.sort();
    assert_eq!(ids, vec!["a", "b"]);

    // running sessions are never persisted
    let running = SessionState::new("c", "analyze", false, json!(null));
    assert!(matches!(
        store.put(running).await,
        Err(CheckpointError::Invalid(_))
    ));

    // take claims exactly once
    let (first, second) = tokio::join!(store.take("b"), store.take("b"));
    let claimed = [first.unwrap(), second.unwrap()]
        .into_iter()
        .flatten()
        .count();
    assert_eq!(claimed, 1);
    assert!(!store.contains("b").await.unwrap());

    store.delete("a").await.unwrap();
    store.delete("a").await.unwrap();
    assert!(store.get("a").await.unwrap().is_none());
}

#[tokio::test]
async fn test_memory_store_contract() {
    check_contract(Arc::new(InMemoryCheckpointStore::new())).await;
}

#[tokio::test]
async fn test_file_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::open(dir.path()).await.unwrap();
    check_contract(Arc::new(store)).await;
}

#[tokio::test]
async fn test_file_store_claim_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let a = FileCheckpointStore::open(dir.path()).await.unwrap();
    let b = FileCheckpointStore::open(dir.path()).await.unwrap();
    a.put(suspended("s", "review_draft", "__end__")).await.unwrap();

    let (from_a, from_b) = tokio::join!(a.take("s"), b.take("s"));
    let winners = [from_a.unwrap(), from_b.unwrap()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].current_node, "__end__");
}
