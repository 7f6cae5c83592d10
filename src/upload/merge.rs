//! Merge Engine
//!
//! Turns a complete staging directory into one artifact at the store root.
//!
//! Steps, all under the session's exclusive lock:
//! 1. Session directory must exist and hold slices
//! 2. At least `expected` slices must be staged, otherwise nothing is touched
//! 3. Slices are ordered by numeric ordinal
//! 4. Bytes are concatenated into a hidden temporary file and published
//!    atomically as `<session_key>.<ext>`
//! 5. Slices and the staging directory are deleted

use std::path::Path;

use tokio::io::AsyncWriteExt;

use super::locks::SessionLocks;
use super::slice_dir::SliceDirectory;
use super::types::{MergedArtifact, SessionState, StagedSlice};
use crate::error::{Result, UploadError};
use crate::storage::content_store::discard;
use crate::storage::{ContentStore, PutOutcome};

/// Assembles staged slices into final artifacts
#[derive(Clone)]
pub struct MergeEngine {
    store: ContentStore,
    locks: SessionLocks,
}

impl MergeEngine {
    pub fn new(store: ContentStore, locks: SessionLocks) -> Self {
        Self { store, locks }
    }

    /// Merge the slices of `session_key` once `expected` of them are staged
    pub async fn merge(&self, session_key: &str, expected: usize) -> Result<MergedArtifact> {
        let dir = SliceDirectory::open(&self.store, session_key)?;
        let _guard = self.locks.exclusive(session_key).await;

        let slices = dir.list_sorted().await?;
        let first = match (SessionState::of(slices.len(), expected), slices.first()) {
            (SessionState::Complete, Some(first)) => first,
            (SessionState::Collecting, _) => {
                tracing::debug!(
                    session_key = %session_key,
                    present = slices.len(),
                    expected = expected,
                    "Merge requested before all slices arrived"
                );
                return Err(UploadError::Incomplete {
                    session_key: session_key.to_string(),
                    present: slices.len(),
                    expected,
                });
            }
            _ => return Err(UploadError::SessionNotFound(session_key.to_string())),
        };

        let name = format!("{}.{}", session_key, first.descriptor.extension);

        let outcome = if self.store.exists(&name).await {
            tracing::info!(
                session_key = %session_key,
                name = %name,
                "Artifact already stored, discarding staged slices"
            );
            PutOutcome::already_present(&name, self.store.path_for(&name))
        } else {
            self.concatenate(&slices, &name).await?
        };

        let removed = dir.remove(&slices).await?;

        tracing::info!(
            session_key = %session_key,
            name = %name,
            slices = removed,
            status = ?outcome.status,
            "Merged upload session"
        );

        Ok(MergedArtifact {
            path: outcome.path,
            name,
            status: outcome.status,
            slice_count: slices.len(),
        })
    }

    /// Concatenate slices into a temporary file and publish it under `name`.
    /// On failure the temporary file is removed and no artifact appears.
    async fn concatenate(&self, slices: &[StagedSlice], name: &str) -> Result<PutOutcome> {
        self.store.ensure_root().await?;
        let temp = self.store.temp_path(name);

        match write_concatenation(&temp, slices).await {
            Ok(bytes) => {
                tracing::debug!(name = %name, bytes = bytes, "Concatenated slices");
                self.store.publish(&temp, name).await
            }
            Err(e) => {
                discard(&temp).await;
                Err(e)
            }
        }
    }
}

/// Append every slice, in order, to a new file at `target`
async fn write_concatenation(target: &Path, slices: &[StagedSlice]) -> Result<u64> {
    let mut out = tokio::fs::File::create(target)
        .await
        .map_err(|e| UploadError::storage(target, e))?;

    let mut total = 0;
    for slice in slices {
        let mut input = tokio::fs::File::open(&slice.path)
            .await
            .map_err(|e| UploadError::storage(&slice.path, e))?;
        total += tokio::io::copy(&mut input, &mut out)
            .await
            .map_err(|e| UploadError::storage(&slice.path, e))?;
    }

    out.flush().await.map_err(|e| UploadError::storage(target, e))?;
    out.sync_all().await.map_err(|e| UploadError::storage(target, e))?;
    Ok(total)
}

// ============================================================================
// Tests
// ============================================================================
