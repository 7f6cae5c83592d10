//! Chunked Upload Module
//!
//! Implements large file uploads as independently sent slices with:
//! - Per-session staging directories
//! - Deterministic, numerically ordered reassembly
//! - SHA-256 content addressing for whole-file deduplication
//!
//! Protocol Flow:
//! 1. Client asks which slices of a session are already staged (resume)
//! 2. Client sends the missing slices, in any order, possibly concurrently
//! 3. Client requests a merge with the expected slice count
//! 4. Server concatenates the slices into `<session_key>.<ext>` and drops
//!    the staging directory

pub mod digest;
pub mod locks;
pub mod merge;
pub mod receiver;
pub mod service;
pub mod slice_dir;
pub mod types;

pub use digest::{compute_hash, content_key};
pub use locks::SessionLocks;
pub use merge::MergeEngine;
pub use receiver::SliceReceiver;
pub use service::{decode_base64_payload, UploadService};
pub use slice_dir::SliceDirectory;
pub use types::*;
