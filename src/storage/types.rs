//! Storage types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Outcome of a write-once store operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreStatus {
    /// Bytes were written under the key by this call
    Stored,
    /// The key was already taken; nothing was written
    AlreadyPresent,
}

/// Where a put landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    pub status: StoreStatus,
    pub key: String,
    pub path: PathBuf,
}

impl PutOutcome {
    pub fn stored(key: impl Into<String>, path: PathBuf) -> Self {
        Self {
            status: StoreStatus::Stored,
            key: key.into(),
            path,
        }
    }

    pub fn already_present(key: impl Into<String>, path: PathBuf) -> Self {
        Self {
            status: StoreStatus::AlreadyPresent,
            key: key.into(),
            path,
        }
    }
}
