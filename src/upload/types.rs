//! Upload types

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, UploadError};
use crate::storage::StoreStatus;

// ============================================================================
// Constants
// ============================================================================

/// Longest accepted session key
pub const MAX_SESSION_KEY_LEN: usize = 128;

/// Separator between session key and ordinal in staged file names
pub const ORDINAL_SEPARATOR: char = '_';

// ============================================================================
// Name Validation
// ============================================================================

/// Check a session key: non-empty, `[0-9A-Za-z-]` only
pub fn validate_session_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(UploadError::NamingFormat("session key is empty".into()));
    }
    if key.len() > MAX_SESSION_KEY_LEN {
        return Err(UploadError::NamingFormat(format!(
            "session key longer than {MAX_SESSION_KEY_LEN} characters"
        )));
    }
    if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(UploadError::NamingFormat(format!(
            "session key must be alphanumeric: {key}"
        )));
    }
    Ok(())
}

/// Check a file extension: non-empty, `[0-9A-Za-z]` only
pub fn validate_extension(ext: &str) -> Result<()> {
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(UploadError::NamingFormat(format!(
            "invalid file extension: {ext:?}"
        )));
    }
    Ok(())
}

/// Trailing `.ext` of a file name, if it is alphanumeric
pub fn extension_of(name: &str) -> Option<&str> {
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric())).then_some(ext)
}

// ============================================================================
// Slice Descriptor
// ============================================================================

/// Identifies one slice of one upload session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceDescriptor {
    pub session_key: String,
    pub ordinal: u64,
    pub extension: String,
}

impl SliceDescriptor {
    /// Build a validated descriptor
    pub fn new(
        session_key: impl Into<String>,
        ordinal: u64,
        extension: impl Into<String>,
    ) -> Result<Self> {
        let descriptor = Self {
            session_key: session_key.into(),
            ordinal,
            extension: extension.into(),
        };
        validate_session_key(&descriptor.session_key)?;
        validate_extension(&descriptor.extension)?;
        Ok(descriptor)
    }

    /// Parse a client-declared slice file name.
    ///
    /// The session key is everything before the first `_`, the ordinal is
    /// the digit run right after it, and the extension is the trailing
    /// `.ext`. Anything between the digits and the extension is ignored, so
    /// `abc_3-part.png` is ordinal 3 of `abc`.
    pub fn parse_file_name(name: &str) -> Result<Self> {
        let malformed = || {
            UploadError::NamingFormat(format!(
                "slice name must look like <key>_<ordinal>.<ext>: {name:?}"
            ))
        };

        let (key, rest) = name.split_once(ORDINAL_SEPARATOR).ok_or_else(malformed)?;
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return Err(malformed());
        }
        let ordinal = rest[..digits_end].parse::<u64>().map_err(|_| malformed())?;
        let extension = extension_of(&rest[digits_end..]).ok_or_else(malformed)?;

        Self::new(key, ordinal, extension)
    }

    /// Canonical staged file name: `<key>_<ordinal>.<ext>`
    pub fn file_name(&self) -> String {
        format!(
            "{}{}{}.{}",
            self.session_key, ORDINAL_SEPARATOR, self.ordinal, self.extension
        )
    }
}

impl fmt::Display for SliceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// A slice file found in a staging directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedSlice {
    pub descriptor: SliceDescriptor,
    pub file_name: String,
    pub path: PathBuf,
}

// ============================================================================
// Session State
// ============================================================================

/// Lifecycle of an upload session's staging directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No slices staged: never started, or already merged
    Absent,
    /// Fewer slices present than expected
    Collecting,
    /// At least the expected number of slices present
    Complete,
}

impl SessionState {
    /// State of a session with `present` slices staged out of `expected`
    pub fn of(present: usize, expected: usize) -> Self {
        if present == 0 {
            Self::Absent
        } else if present < expected {
            Self::Collecting
        } else {
            Self::Complete
        }
    }
}

// ============================================================================
// Operation Results
// ============================================================================

/// Result of receiving one slice
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceReceipt {
    pub status: StoreStatus,
    pub descriptor: SliceDescriptor,
    pub path: PathBuf,
}

/// A merged artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedArtifact {
    pub path: PathBuf,
    pub name: String,
    /// Whether this merge wrote the artifact, or found it already stored
    pub status: StoreStatus,
    pub slice_count: usize,
}

/// Merge outcome as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeStatus {
    Ok,
    Incomplete,
    NotFound,
}

/// Result of a merge request. `Incomplete` and `NotFound` are ordinary
/// outcomes here, not errors.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub status: MergeStatus,
    pub session_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<MergedArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub present: Option<usize>,
    pub expected: usize,
}

/// Slices currently staged for a session, in ordinal order
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceListing {
    pub session_key: String,
    pub ordinals: Vec<u64>,
    pub file_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// Result of storing a whole file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreReceipt {
    pub status: StoreStatus,
    pub name: String,
    pub original_name: String,
    pub path: PathBuf,
}

// ============================================================================
// Tests
// ============================================================================
