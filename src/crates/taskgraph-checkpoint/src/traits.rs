//! Storage abstraction for suspended sessions
//!
//! A [`CheckpointStore`] is a keyed store of [`SessionState`] records. Records exist
//! only while a session is suspended: the engine writes one when a run pauses at a
//! checkpoint and removes it when the session is resumed or cancelled.
//!
//! # Semantics
//!
//! - **Keyed by session id**: sessions never share records, so no cross-session
//!   locking is needed.
//! - **Last write wins**: a second [`put`](CheckpointStore::put) for the same id
//!   replaces the first.
//! - **Suspended only**: [`put`](CheckpointStore::put) rejects records whose status is
//!   not [`SessionStatus::Suspended`].
//! - **Claim once**: [`take`](CheckpointStore::take) removes and returns a record in
//!   one step. Backends that can do this atomically guarantee that concurrent
//!   resumes of one session see the record at most once.
//!
//! # Implementing a backend
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use taskgraph_checkpoint::{CheckpointStore, Result, SessionState, SessionStream};
//!
//! struct RedisStore { /* connection */ }
//!
//! #[async_trait]
//! impl CheckpointStore for RedisStore {
//!     async fn put(&self, state: SessionState) -> Result<()> { /* SET */ todo!() }
//!     async fn get(&self, session_id: &str) -> Result<Option<SessionState>> { /* GET */ todo!() }
//!     async fn delete(&self, session_id: &str) -> Result<()> { /* DEL */ todo!() }
//!     async fn take(&self, session_id: &str) -> Result<Option<SessionState>> { /* GETDEL */ todo!() }
//!     async fn list(&self) -> Result<SessionStream> { /* SCAN */ todo!() }
//! }
//! ```

use crate::{
    error::{CheckpointError, Result},
    session::{SessionState, SessionStatus},
};
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;

/// Stream of stored session records
pub type SessionStream = Pin<Box<dyn Stream<Item = Result<SessionState>> + Send + 'static>>;

/// Persistence backend for suspended sessions
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Store a suspended session, replacing any previous record for its id
    async fn put(&self, state: SessionState) -> Result<()>;

    /// Load a session record without removing it
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>>;

    /// Remove a session record; removing a missing record is not an error
    async fn delete(&self, session_id: &str) -> Result<()>;

    /// Remove and return a session record
    ///
    /// The default implementation is a `get` followed by a `delete` and is not
    /// atomic; backends should override it when they can do better.
    async fn take(&self, session_id: &str) -> Result<Option<SessionState>> {
        let state = self.get(session_id).await?;
        if state.is_some() {
            self.delete(session_id).await?;
        }
        Ok(state)
    }

    /// Stream every stored record
    async fn list(&self) -> Result<SessionStream>;

    /// Whether a record exists for `session_id`
    async fn contains(&self, session_id: &str) -> Result<bool> {
        Ok(self.get(session_id).await?.is_some())
    }
}

/// Reject records that must not be persisted
pub(crate) fn ensure_storable(state: &SessionState) -> Result<()> {
    if state.status != SessionStatus::Suspended {
        return Err(CheckpointError::Invalid(format!(
            "session '{}' is {}; only suspended sessions are stored",
            state.session_id, state.status
        )));
    }
    if state.session_id.is_empty() {
        return Err(CheckpointError::Invalid("session_id is required".to_string()));
    }
    Ok(())
}
