//! Filesystem-backed, write-once content store
//!
//! Every write goes to a hidden temporary file first and is published with a
//! hard link, which fails if the destination exists. A key therefore either
//! holds one complete payload or nothing, and is never replaced.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::types::PutOutcome;
use crate::error::{Result, UploadError};

// ============================================================================
// Existence Checks
// ============================================================================

/// Check whether a path exists.
///
/// Never fails: a probe error (permissions on a parent, a vanished mount)
/// is reported as "absent" so the caller falls through to the write path,
/// where the real error surfaces.
pub async fn exists(path: &Path) -> bool {
    match tokio::fs::try_exists(path).await {
        Ok(found) => found,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Existence probe failed");
            false
        }
    }
}

/// Reject caller-chosen names that would escape the root or collide with
/// temporaries.
pub fn validate_artifact_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(UploadError::NamingFormat("artifact name is empty".into()));
    }
    if name.starts_with('.') {
        return Err(UploadError::NamingFormat(format!(
            "artifact name may not start with '.': {name}"
        )));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(UploadError::NamingFormat(format!(
            "artifact name may not contain path separators: {name}"
        )));
    }
    Ok(())
}

/// What currently sits at a key in the root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occupant {
    Vacant,
    Artifact,
    /// A directory, normally an upload session's staging area
    Other,
}

async fn occupant(path: &Path) -> Occupant {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Occupant::Artifact,
        Ok(_) => Occupant::Other,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::debug!(path = %path.display(), error = %e, "Existence probe failed");
            }
            Occupant::Vacant
        }
    }
}

fn held_by_session(key: &str) -> UploadError {
    UploadError::NamingFormat(format!("name is held by an upload session: {key}"))
}

// ============================================================================
// Content Store
// ============================================================================

/// Local content store rooted at one directory
#[derive(Clone, Debug)]
pub struct ContentStore {
    inner: Arc<ContentStoreInner>,
}

#[derive(Debug)]
struct ContentStoreInner {
    root: PathBuf,
}

impl ContentStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(ContentStoreInner { root: root.into() }),
        }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Create the root directory if it does not exist yet
    pub async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.root())
            .await
            .map_err(|e| UploadError::storage(self.root(), e))
    }

    /// Path an artifact with `key` lives at
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root().join(key)
    }

    /// Staging directory for an upload session
    pub fn staging_dir(&self, session_key: &str) -> PathBuf {
        self.root().join(session_key)
    }

    /// Fresh hidden temporary path in the root, unique per call
    pub fn temp_path(&self, hint: &str) -> PathBuf {
        self.root()
            .join(format!(".{}.{}.partial", hint, Uuid::new_v4().simple()))
    }

    /// Path of `path` relative to the root, with forward slashes
    pub fn relative_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(self.root()).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Whether an artifact exists under `key`. A session's staging
    /// directory under the same name is not an artifact.
    pub async fn exists(&self, key: &str) -> bool {
        occupant(&self.path_for(key)).await == Occupant::Artifact
    }

    /// Store `data` under `key` unless the key is already taken.
    ///
    /// A cheap existence probe runs first; a writer that loses a race after
    /// the probe still observes `AlreadyPresent` at publish time.
    pub async fn put(&self, key: &str, data: &[u8]) -> Result<PutOutcome> {
        validate_artifact_name(key)?;
        let path = self.path_for(key);

        match occupant(&path).await {
            Occupant::Artifact => {
                tracing::debug!(key = %key, "Artifact already present, skipping write");
                return Ok(PutOutcome::already_present(key, path));
            }
            Occupant::Other => return Err(held_by_session(key)),
            Occupant::Vacant => {}
        }

        self.ensure_root().await?;
        let temp = self.temp_path(key);
        if let Err(e) = write_synced(&temp, data).await {
            discard(&temp).await;
            return Err(e);
        }

        self.publish(&temp, key).await
    }

    /// Publish a fully written temporary file under `key`.
    ///
    /// The temporary file is removed whether or not publishing succeeds.
    pub async fn publish(&self, temp: &Path, key: &str) -> Result<PutOutcome> {
        let path = self.path_for(key);
        let linked = tokio::fs::hard_link(temp, &path).await;
        discard(temp).await;

        match linked {
            Ok(()) => {
                tracing::debug!(key = %key, path = %path.display(), "Artifact stored");
                Ok(PutOutcome::stored(key, path))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if occupant(&path).await == Occupant::Other {
                    return Err(held_by_session(key));
                }
                tracing::debug!(key = %key, "Artifact appeared concurrently, keeping existing");
                Ok(PutOutcome::already_present(key, path))
            }
            Err(e) => Err(UploadError::storage(&path, e)),
        }
    }
}

/// Write `data` to a new file at `path` and flush it to disk
pub(crate) async fn write_synced(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| UploadError::storage(path, e))?;
    file.write_all(data)
        .await
        .map_err(|e| UploadError::storage(path, e))?;
    file.sync_all()
        .await
        .map_err(|e| UploadError::storage(path, e))?;
    Ok(())
}

/// Best-effort removal of a temporary file
pub(crate) async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove temporary file");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
