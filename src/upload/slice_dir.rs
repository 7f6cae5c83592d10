//! Slice Directory
//!
//! Staging area for one upload session: `<root>/<session_key>/`, holding one
//! file per slice named `<session_key>_<ordinal>.<ext>`. Created on the first
//! slice and removed after a successful merge.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::types::{validate_session_key, SessionState, SliceDescriptor, StagedSlice};
use crate::error::{Result, UploadError};
use crate::storage::content_store::{discard, write_synced};
use crate::storage::{exists, ContentStore, PutOutcome};

/// Staging directory of one upload session
#[derive(Debug, Clone)]
pub struct SliceDirectory {
    session_key: String,
    path: PathBuf,
}

impl SliceDirectory {
    /// Open (without creating) the staging directory for `session_key`
    pub fn open(store: &ContentStore, session_key: &str) -> Result<Self> {
        validate_session_key(session_key)?;
        Ok(Self {
            session_key: session_key.to_string(),
            path: store.staging_dir(session_key),
        })
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a stored artifact already holds the session's name
    async fn held_by_artifact(&self) -> bool {
        matches!(tokio::fs::metadata(&self.path).await, Ok(m) if !m.is_dir())
    }

    /// Where a slice is staged
    pub fn slice_path(&self, descriptor: &SliceDescriptor) -> PathBuf {
        self.path.join(descriptor.file_name())
    }

    /// Stage one slice.
    ///
    /// A slice already on disk is reported as present and left alone. The
    /// payload is written to a hidden file and renamed into place, so a
    /// staged slice is always one complete payload.
    pub async fn add(&self, descriptor: &SliceDescriptor, data: &[u8]) -> Result<PutOutcome> {
        if descriptor.session_key != self.session_key {
            return Err(UploadError::NamingFormat(format!(
                "slice {} does not belong to session {}",
                descriptor, self.session_key
            )));
        }

        if self.held_by_artifact().await {
            return Err(UploadError::NamingFormat(format!(
                "session key is held by a stored artifact: {}",
                self.session_key
            )));
        }

        let file_name = descriptor.file_name();
        let path = self.slice_path(descriptor);
        if exists(&path).await {
            return Ok(PutOutcome::already_present(file_name, path));
        }

        tokio::fs::create_dir_all(&self.path)
            .await
            .map_err(|e| UploadError::storage(&self.path, e))?;

        let temp = self
            .path
            .join(format!(".{}.{}.partial", file_name, Uuid::new_v4().simple()));
        if let Err(e) = write_synced(&temp, data).await {
            discard(&temp).await;
            return Err(e);
        }
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            discard(&temp).await;
            return Err(UploadError::storage(&path, e));
        }

        Ok(PutOutcome::stored(file_name, path))
    }

    /// Staged slices in directory order. A missing directory, or an artifact
    /// under the session's name, lists empty.
    pub async fn list(&self) -> Result<Vec<StagedSlice>> {
        let mut entries = match tokio::fs::read_dir(&self.path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(_) if self.held_by_artifact().await => return Ok(Vec::new()),
            Err(e) => return Err(UploadError::storage(&self.path, e)),
        };

        let mut slices = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| UploadError::storage(&self.path, e))?
        {
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name.starts_with('.') {
                continue;
            }

            match SliceDescriptor::parse_file_name(&file_name) {
                Ok(descriptor) if descriptor.session_key == self.session_key => {
                    slices.push(StagedSlice {
                        descriptor,
                        file_name,
                        path: entry.path(),
                    });
                }
                _ => {
                    tracing::warn!(
                        session_key = %self.session_key,
                        file_name = %file_name,
                        "Ignoring foreign file in staging directory"
                    );
                }
            }
        }

        Ok(slices)
    }

    /// Staged slices ordered by numeric ordinal (`2` before `10`)
    pub async fn list_sorted(&self) -> Result<Vec<StagedSlice>> {
        let mut slices = self.list().await?;
        sort_slices(&mut slices);
        Ok(slices)
    }

    /// Where the session stands relative to `expected` slices
    pub async fn state(&self, expected: usize) -> Result<SessionState> {
        let present = self.list().await?.len();
        Ok(SessionState::of(present, expected))
    }

    /// Modification time of the directory, for external sweeping
    pub async fn last_modified(&self) -> Option<DateTime<Utc>> {
        let metadata = tokio::fs::metadata(&self.path).await.ok()?;
        metadata.modified().ok().map(DateTime::<Utc>::from)
    }

    /// Delete the consumed slices, then the directory itself.
    ///
    /// Returns the number of slice files removed.
    pub async fn remove(&self, consumed: &[StagedSlice]) -> Result<usize> {
        let mut removed = 0;
        for slice in consumed {
            match tokio::fs::remove_file(&slice.path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(UploadError::storage(&slice.path, e)),
            }
        }

        // Leftover temporaries or foreign files go with the directory
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(UploadError::storage(&self.path, e)),
        }

        Ok(removed)
    }
}

/// Sort by ordinal; equal ordinals fall back to file name so the order never
/// depends on directory enumeration.
pub fn sort_slices(slices: &mut [StagedSlice]) {
    slices.sort_by(|a, b| {
        a.descriptor
            .ordinal
            .cmp(&b.descriptor.ordinal)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreStatus;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ContentStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = ContentStore::new(temp_dir.path());
        (temp_dir, store)
    }

    fn slice(key: &str, ordinal: u64) -> SliceDescriptor {
        SliceDescriptor::new(key, ordinal, "png").unwrap()
    }

    #[tokio::test]
    async fn test_created_lazily() {
        let (_tmp, store) = setup();
        let dir = SliceDirectory::open(&store, "abc").unwrap();
        assert!(!dir.path().exists());
        assert_eq!(dir.state(1).await.unwrap(), SessionState::Absent);
        assert!(dir.list().await.unwrap().is_empty());

        dir.add(&slice("abc", 0), b"zero").await.unwrap();
        assert!(dir.path().is_dir());
        assert_eq!(dir.path(), store.staging_dir("abc"));
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let (_tmp, store) = setup();
        let dir = SliceDirectory::open(&store, "abc").unwrap();

        let first = dir.add(&slice("abc", 1), b"one").await.unwrap();
        let second = dir.add(&slice("abc", 1), b"one").await.unwrap();

        assert_eq!(first.status, StoreStatus::Stored);
        assert_eq!(second.status, StoreStatus::AlreadyPresent);
        assert_eq!(first.path, second.path);
        assert_eq!(tokio::fs::read(&first.path).await.unwrap(), b"one");
        assert_eq!(dir.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_sorted_is_numeric() {
        let (_tmp, store) = setup();
        let dir = SliceDirectory::open(&store, "abc").unwrap();
        for ordinal in [2, 10, 1] {
            dir.add(&slice("abc", ordinal), b"x").await.unwrap();
        }

        let ordinals: Vec<u64> = dir
            .list_sorted()
            .await
            .unwrap()
            .iter()
            .map(|s| s.descriptor.ordinal)
            .collect();
        assert_eq!(ordinals, vec![1, 2, 10]);
    }

    #[tokio::test]
    async fn test_list_skips_temporaries_and_foreign_files() {
        let (_tmp, store) = setup();
        let dir = SliceDirectory::open(&store, "abc").unwrap();
        dir.add(&slice("abc", 0), b"x").await.unwrap();
        tokio::fs::write(dir.path().join(".abc_1.png.123.partial"), b"half")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), b"?").await.unwrap();
        tokio::fs::write(dir.path().join("other_1.png"), b"?").await.unwrap();

        let slices = dir.list().await.unwrap();
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].file_name, "abc_0.png");
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let (_tmp, store) = setup();
        let dir = SliceDirectory::open(&store, "abc").unwrap();
        dir.add(&slice("abc", 0), b"x").await.unwrap();
        assert_eq!(dir.state(2).await.unwrap(), SessionState::Collecting);
        dir.add(&slice("abc", 1), b"y").await.unwrap();
        assert_eq!(dir.state(2).await.unwrap(), SessionState::Complete);
        assert!(dir.last_modified().await.is_some());

        let slices = dir.list().await.unwrap();
        assert_eq!(dir.remove(&slices).await.unwrap(), 2);
        assert_eq!(dir.state(2).await.unwrap(), SessionState::Absent);
        assert!(dir.last_modified().await.is_none());
    }

    #[tokio::test]
    async fn test_key_held_by_artifact() {
        let (_tmp, store) = setup();
        store.put("abc", b"doc").await.unwrap();
        let dir = SliceDirectory::open(&store, "abc").unwrap();

        assert_eq!(dir.state(1).await.unwrap(), SessionState::Absent);
        assert!(dir.list().await.unwrap().is_empty());

        let result = dir.add(&slice("abc", 0), b"zero").await;
        assert!(matches!(result, Err(UploadError::NamingFormat(_))));
        assert_eq!(tokio::fs::read(store.path_for("abc")).await.unwrap(), b"doc");
    }

    #[tokio::test]
    async fn test_empty_directory_is_absent() {
        let (_tmp, store) = setup();
        let dir = SliceDirectory::open(&store, "abc").unwrap();
        tokio::fs::create_dir_all(dir.path()).await.unwrap();
        assert_eq!(dir.state(0).await.unwrap(), SessionState::Absent);
    }

    #[tokio::test]
    async fn test_rejects_foreign_descriptor() {
        let (_tmp, store) = setup();
        let dir = SliceDirectory::open(&store, "abc").unwrap();
        let result = dir.add(&slice("def", 0), b"x").await;
        assert!(matches!(result, Err(UploadError::NamingFormat(_))));
    }

    #[test]
    fn test_open_validates_key() {
        let store = ContentStore::new("/srv/upload");
        assert!(SliceDirectory::open(&store, "..").is_err());
        assert!(SliceDirectory::open(&store, "a/b").is_err());
    }
}
