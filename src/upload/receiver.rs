//! Slice Receiver
//!
//! Accepts one slice at a time and stages it in its session's directory.

use super::locks::SessionLocks;
use super::slice_dir::SliceDirectory;
use super::types::{SliceDescriptor, SliceReceipt};
use crate::error::Result;
use crate::storage::ContentStore;

/// Stages incoming slices
#[derive(Clone)]
pub struct SliceReceiver {
    store: ContentStore,
    locks: SessionLocks,
}

impl SliceReceiver {
    pub fn new(store: ContentStore, locks: SessionLocks) -> Self {
        Self { store, locks }
    }

    /// Stage a slice described by structured data.
    ///
    /// Holds the session's shared lock, so the write never overlaps a merge
    /// of the same session.
    pub async fn receive(&self, descriptor: &SliceDescriptor, data: &[u8]) -> Result<SliceReceipt> {
        let dir = SliceDirectory::open(&self.store, &descriptor.session_key)?;
        let _guard = self.locks.shared(&descriptor.session_key).await;

        let outcome = dir.add(descriptor, data).await?;

        tracing::debug!(
            session_key = %descriptor.session_key,
            ordinal = descriptor.ordinal,
            size = data.len(),
            status = ?outcome.status,
            "Slice received"
        );

        Ok(SliceReceipt {
            status: outcome.status,
            descriptor: descriptor.clone(),
            path: outcome.path,
        })
    }

    /// Stage a slice identified by a `<key>_<ordinal>.<ext>` file name
    pub async fn receive_named(&self, file_name: &str, data: &[u8]) -> Result<SliceReceipt> {
        let descriptor = SliceDescriptor::parse_file_name(file_name)?;
        self.receive(&descriptor, data).await
    }
}
