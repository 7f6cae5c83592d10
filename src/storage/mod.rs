//! Content store
//!
//! A single local directory holding finished artifacts at its root and one
//! staging subdirectory per in-flight upload session.

pub(crate) mod content_store;
mod types;

pub use content_store::{exists, validate_artifact_name, ContentStore};
pub use types::*;
