//! # taskgraph-checkpoint - Suspended Session Persistence
//!
//! Keyed storage for the state of pipeline runs that are paused at a human-review
//! checkpoint. The execution engine in `taskgraph-core` writes a [`SessionState`]
//! when a run suspends and removes it when the run is resumed or cancelled, so a
//! store only ever holds suspended sessions.
//!
//! ## Backends
//!
//! | Backend | Survives restart | Shared between processes |
//! |---------|------------------|--------------------------|
//! | [`InMemoryCheckpointStore`] | no | no |
//! | [`FileCheckpointStore`] | yes | yes (same directory) |
//!
//! Other backends implement [`CheckpointStore`].
//!
//! ## Example
//!
//! ```rust
//! use taskgraph_checkpoint::{CheckpointStore, InMemoryCheckpointStore, SessionState};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryCheckpointStore::new();
//!
//! let mut state = SessionState::new("session-1", "analyze", true, json!({}));
//! state.suspend("review_draft", "__end__", json!({"values": {"draft": "..."}}));
//! store.put(state).await?;
//!
//! let claimed = store.take("session-1").await?;
//! assert!(claimed.is_some());
//! assert!(store.get("session-1").await?.is_none());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod file;
pub mod memory;
pub mod serializer;
pub mod session;
pub mod traits;

pub use error::{CheckpointError, Result};
pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;
pub use serializer::{JsonSerializer, SerializerProtocol};
pub use session::{SessionId, SessionState, SessionStatus};
pub use traits::{CheckpointStore, SessionStream};
