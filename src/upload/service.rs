//! Upload Service
//!
//! The operations the HTTP layer exposes, composed from the store, the slice
//! receiver and the merge engine.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use uuid::Uuid;

use super::digest::content_key;
use super::locks::SessionLocks;
use super::merge::MergeEngine;
use super::receiver::SliceReceiver;
use super::slice_dir::SliceDirectory;
use super::types::{
    extension_of, MergeReport, MergeStatus, SliceDescriptor, SliceListing, SliceReceipt,
    StoreReceipt,
};
use crate::error::{Result, UploadError};
use crate::storage::{ContentStore, PutOutcome};

/// Chunked and whole-file upload operations over one content store
#[derive(Clone)]
pub struct UploadService {
    store: ContentStore,
    receiver: SliceReceiver,
    merger: MergeEngine,
    delay: Duration,
}

impl UploadService {
    pub fn new(store: ContentStore) -> Self {
        let locks = SessionLocks::new();
        Self {
            receiver: SliceReceiver::new(store.clone(), locks.clone()),
            merger: MergeEngine::new(store.clone(), locks),
            store,
            delay: Duration::ZERO,
        }
    }

    /// Pause this long before handling each upload (for exercising clients)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    // ========================================================================
    // Chunked Uploads
    // ========================================================================

    /// Stage one slice
    pub async fn receive_slice(
        &self,
        descriptor: &SliceDescriptor,
        data: &[u8],
    ) -> Result<SliceReceipt> {
        self.pause().await;
        self.receiver.receive(descriptor, data).await
    }

    /// Stage one slice named `<key>_<ordinal>.<ext>`
    pub async fn receive_named_slice(&self, file_name: &str, data: &[u8]) -> Result<SliceReceipt> {
        self.pause().await;
        self.receiver.receive_named(file_name, data).await
    }

    /// Merge a session. Missing and incomplete sessions are reported in the
    /// status; only naming and storage failures are errors.
    pub async fn merge_session(&self, session_key: &str, expected: usize) -> Result<MergeReport> {
        let report = |status, artifact, present| MergeReport {
            status,
            session_key: session_key.to_string(),
            artifact,
            present,
            expected,
        };

        match self.merger.merge(session_key, expected).await {
            Ok(artifact) => {
                let present = artifact.slice_count;
                Ok(report(MergeStatus::Ok, Some(artifact), Some(present)))
            }
            Err(UploadError::Incomplete { present, .. }) => {
                Ok(report(MergeStatus::Incomplete, None, Some(present)))
            }
            Err(UploadError::SessionNotFound(_)) => Ok(report(MergeStatus::NotFound, None, None)),
            Err(e) => Err(e),
        }
    }

    /// Ordinals already staged for a session, so a client can resume
    pub async fn list_slices(&self, session_key: &str) -> Result<SliceListing> {
        let dir = SliceDirectory::open(&self.store, session_key)?;
        let slices = dir.list_sorted().await?;

        Ok(SliceListing {
            session_key: session_key.to_string(),
            ordinals: slices.iter().map(|s| s.descriptor.ordinal).collect(),
            file_names: slices.into_iter().map(|s| s.file_name).collect(),
            last_modified: dir.last_modified().await,
        })
    }

    // ========================================================================
    // Whole-File Uploads
    // ========================================================================

    /// Store a file under the hash of its content, keeping the declared
    /// extension. Identical content always lands on the same key.
    pub async fn store_whole_file(&self, data: &[u8], declared_name: &str) -> Result<StoreReceipt> {
        self.pause().await;
        let key = content_key(data, extension_of(declared_name));
        let outcome = self.store.put(&key, data).await?;
        log_store(&outcome, declared_name, "content-addressed");
        Ok(receipt(outcome, declared_name))
    }

    /// Decode a base64 (optionally URI-encoded, optionally `data:` URL)
    /// payload and store it by content hash
    pub async fn store_base64(&self, encoded: &str, declared_name: &str) -> Result<StoreReceipt> {
        let data = decode_base64_payload(encoded)?;
        self.store_whole_file(&data, declared_name).await
    }

    /// Store a file under a caller-chosen name, keeping any existing file
    pub async fn store_named_file(&self, data: &[u8], name: &str) -> Result<StoreReceipt> {
        self.pause().await;
        let outcome = self.store.put(name, data).await?;
        log_store(&outcome, name, "named");
        Ok(receipt(outcome, name))
    }

    /// Store a file under a fresh server-generated name
    pub async fn store_anonymous(&self, data: &[u8], declared_name: &str) -> Result<StoreReceipt> {
        self.pause().await;
        let id = Uuid::new_v4().simple().to_string();
        let key = match extension_of(declared_name) {
            Some(ext) => format!("{id}.{ext}"),
            None => id,
        };
        let outcome = self.store.put(&key, data).await?;
        log_store(&outcome, declared_name, "anonymous");
        Ok(receipt(outcome, declared_name))
    }
}

fn receipt(outcome: PutOutcome, original_name: &str) -> StoreReceipt {
    StoreReceipt {
        status: outcome.status,
        name: outcome.key,
        original_name: original_name.to_string(),
        path: outcome.path,
    }
}

fn log_store(outcome: &PutOutcome, original_name: &str, kind: &'static str) {
    tracing::info!(
        key = %outcome.key,
        original_name = %original_name,
        kind = kind,
        status = ?outcome.status,
        "Whole-file upload handled"
    );
}

/// Undo the client-side encoding of a base64 upload: URI decoding, then an
/// optional `data:<mime>;base64,` prefix, then base64 itself
pub fn decode_base64_payload(encoded: &str) -> Result<Vec<u8>> {
    let decoded = urlencoding::decode(encoded)
        .map_err(|e| UploadError::InvalidPayload(format!("invalid URI encoding: {e}")))?;

    let body = match decoded.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => &*decoded,
    };

    STANDARD
        .decode(body.trim())
        .map_err(|e| UploadError::InvalidPayload(format!("invalid base64: {e}")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreStatus;
    use tempfile::TempDir;

    fn service() -> (TempDir, UploadService) {
        let temp_dir = TempDir::new().unwrap();
        let service = UploadService::new(ContentStore::new(temp_dir.path().join("upload")));
        (temp_dir, service)
    }

    #[tokio::test]
    async fn test_whole_file_dedup() {
        let (_tmp, service) = service();

        let first = service.store_whole_file(b"same bytes", "a.png").await.unwrap();
        let second = service.store_whole_file(b"same bytes", "b.png").await.unwrap();

        assert_eq!(first.status, StoreStatus::Stored);
        assert_eq!(second.status, StoreStatus::AlreadyPresent);
        assert_eq!(first.path, second.path);
        assert_eq!(first.name, second.name);
        assert_eq!(second.original_name, "b.png");
        assert!(first.name.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_whole_file_without_extension() {
        let (_tmp, service) = service();
        let receipt = service.store_whole_file(b"data", "README").await.unwrap();
        assert_eq!(receipt.name.len(), 64);
    }

    #[tokio::test]
    async fn test_end_to_end_chunked_upload() {
        let (_tmp, service) = service();
        let slices: [&[u8]; 3] = [b"slice-0|", b"slice-1|", b"slice-2"];

        for ordinal in [0usize, 2, 1] {
            let name = format!("abc123_{ordinal}.png");
            service.receive_named_slice(&name, slices[ordinal]).await.unwrap();
        }

        let listing = service.list_slices("abc123").await.unwrap();
        assert_eq!(listing.ordinals, vec![0, 1, 2]);
        assert_eq!(listing.file_names[0], "abc123_0.png");
        assert!(listing.last_modified.is_some());

        let report = service.merge_session("abc123", 3).await.unwrap();
        assert_eq!(report.status, MergeStatus::Ok);
        let artifact = report.artifact.unwrap();
        assert_eq!(artifact.name, "abc123.png");
        assert_eq!(
            tokio::fs::read(&artifact.path).await.unwrap(),
            b"slice-0|slice-1|slice-2"
        );
        assert!(!service.store().staging_dir("abc123").exists());

        let listing = service.list_slices("abc123").await.unwrap();
        assert!(listing.ordinals.is_empty());
    }

    #[tokio::test]
    async fn test_merge_statuses() {
        let (_tmp, service) = service();
        let descriptor = SliceDescriptor::new("sess", 0, "txt").unwrap();
        service.receive_slice(&descriptor, b"x").await.unwrap();

        let incomplete = service.merge_session("sess", 2).await.unwrap();
        assert_eq!(incomplete.status, MergeStatus::Incomplete);
        assert_eq!(incomplete.present, Some(1));
        assert!(service.store().staging_dir("sess").join("sess_0.txt").exists());

        let ok = service.merge_session("sess", 1).await.unwrap();
        assert_eq!(ok.status, MergeStatus::Ok);

        let gone = service.merge_session("sess", 1).await.unwrap();
        assert_eq!(gone.status, MergeStatus::NotFound);
        assert_eq!(
            tokio::fs::read(service.store().path_for("sess.txt")).await.unwrap(),
            b"x"
        );
    }

    #[tokio::test]
    async fn test_merge_rejects_bad_key() {
        let (_tmp, service) = service();
        let result = service.merge_session("../etc", 1).await;
        assert!(matches!(result, Err(UploadError::NamingFormat(_))));
    }

    #[tokio::test]
    async fn test_store_named_file_keeps_existing() {
        let (_tmp, service) = service();
        service.store_named_file(b"v1", "report.pdf").await.unwrap();
        let again = service.store_named_file(b"v2", "report.pdf").await.unwrap();

        assert_eq!(again.status, StoreStatus::AlreadyPresent);
        assert_eq!(tokio::fs::read(&again.path).await.unwrap(), b"v1");
    }

    #[tokio::test]
    async fn test_named_file_cannot_take_session_name() {
        let (_tmp, service) = service();
        let descriptor = SliceDescriptor::new("sess", 0, "txt").unwrap();
        service.receive_slice(&descriptor, b"slice").await.unwrap();

        let result = service.store_named_file(b"real content", "sess").await;
        assert!(matches!(result, Err(UploadError::NamingFormat(_))));

        // The session is untouched and still merges
        let report = service.merge_session("sess", 1).await.unwrap();
        assert_eq!(report.status, MergeStatus::Ok);
        assert_eq!(
            tokio::fs::read(service.store().path_for("sess.txt")).await.unwrap(),
            b"slice"
        );
    }

    #[tokio::test]
    async fn test_session_cannot_take_named_file() {
        let (_tmp, service) = service();
        service.store_named_file(b"doc", "abc").await.unwrap();

        let result = service.receive_named_slice("abc_0.png", b"slice").await;
        assert!(matches!(result, Err(UploadError::NamingFormat(_))));

        let report = service.merge_session("abc", 1).await.unwrap();
        assert_eq!(report.status, MergeStatus::NotFound);
        assert!(service.list_slices("abc").await.unwrap().ordinals.is_empty());
        assert_eq!(
            tokio::fs::read(service.store().path_for("abc")).await.unwrap(),
            b"doc"
        );
    }

    #[tokio::test]
    async fn test_store_anonymous_never_dedups() {
        let (_tmp, service) = service();
        let a = service.store_anonymous(b"same", "x.jpg").await.unwrap();
        let b = service.store_anonymous(b"same", "x.jpg").await.unwrap();
        assert_ne!(a.name, b.name);
        assert_eq!(b.status, StoreStatus::Stored);
        assert!(a.name.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn test_store_base64() {
        let (_tmp, service) = service();
        let encoded = urlencoding::encode("data:image/png;base64,aGVsbG8=").into_owned();

        let receipt = service.store_base64(&encoded, "hello.png").await.unwrap();
        assert_eq!(tokio::fs::read(&receipt.path).await.unwrap(), b"hello");

        let plain = service.store_base64("aGVsbG8=", "other.png").await.unwrap();
        assert_eq!(plain.status, StoreStatus::AlreadyPresent);
        assert_eq!(plain.path, receipt.path);
    }

    #[test]
    fn test_decode_base64_rejects_garbage() {
        assert!(matches!(
            decode_base64_payload("not base64!"),
            Err(UploadError::InvalidPayload(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_applies() {
        let (_tmp, service) = service();
        let service = service.with_delay(Duration::from_secs(1));
        let start = tokio::time::Instant::now();
        service.store_whole_file(b"x", "x.txt").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}
