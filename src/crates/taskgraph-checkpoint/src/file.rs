//! File-backed checkpoint storage
//!
//! [`FileCheckpointStore`] writes one JSON document per suspended session into a
//! directory:
//!
//! ```text
//! <dir>/
//!   3f2c...e1.json      suspended session
//!   9a41...07.json
//! ```
//!
//! Writes go to a temporary file that is renamed over the target, so readers never
//! observe a partial record and the last writer wins. [`take`](CheckpointStore::take)
//! renames the record to a claim file before reading it; a rename of a given source
//! succeeds at most once, which makes claiming safe across threads and processes
//! sharing the directory.

use crate::{
    error::{CheckpointError, Result},
    serializer::{JsonSerializer, SerializerProtocol},
    session::SessionState,
    traits::{ensure_storable, CheckpointStore, SessionStream},
};
use async_trait::async_trait;
use futures::stream;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const RECORD_EXTENSION: &str = "json";

/// Directory-backed store for suspended sessions
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    serializer: JsonSerializer,
    counter: Arc<AtomicU64>,
}

impl FileCheckpointStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            serializer: JsonSerializer::pretty(),
            counter: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Root directory of the store
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self
            .dir
            .join(format!("{}.{}", session_id, RECORD_EXTENSION)))
    }

    /// Sibling path unique to this process and call
    fn scratch_path(&self, session_id: &str, kind: &str) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            ".{}.{}-{}-{}",
            session_id,
            kind,
            std::process::id(),
            n
        ))
    }

    async fn read_record(&self, path: &Path) -> Result<Option<SessionState>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(self.serializer.loads(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Session ids become file names, so only a conservative character set is allowed
fn validate_session_id(session_id: &str) -> Result<()> {
    let valid = !session_id.is_empty()
        && !session_id.starts_with('.')
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CheckpointError::Invalid(format!(
            "session id '{}' is not usable as a file name",
            session_id
        )))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn put(&self, state: SessionState) -> Result<()> {
        ensure_storable(&state)?;
        let target = self.record_path(&state.session_id)?;
        let tmp = self.scratch_path(&state.session_id, "tmp");

        let bytes = self.serializer.dumps(&state)?;
        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::debug!(
            session_id = %state.session_id,
            path = %target.display(),
            "stored suspended session"
        );
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionState>> {
        let path = self.record_path(session_id)?;
        self.read_record(&path).await
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let path = self.record_path(session_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn take(&self, session_id: &str) -> Result<Option<SessionState>> {
        let path = self.record_path(session_id)?;
        let claim = self.scratch_path(session_id, "claim");

        match tokio::fs::rename(&path, &claim).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let state = self.read_record(&claim).await;
        tokio::fs::remove_file(&claim).await?;
        state
    }

    async fn list(&self) -> Result<SessionStream> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_record = path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION)
                && !entry.file_name().to_string_lossy().starts_with('.');
            if is_record {
                paths.push(path);
            }
        }
        paths.sort();

        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            // A record claimed by a concurrent `take` between read_dir and now is skipped.
            match self.read_record(&path).await {
                Ok(Some(state)) => results.push(Ok(state)),
                Ok(None) => {}
                Err(e) => results.push(Err(e)),
            }
        }
        Ok(Box::pin(stream::iter(results)))
    }
}
