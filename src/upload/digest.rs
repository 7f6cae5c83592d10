//! Content hashing for content-addressed artifact names

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of data as lowercase hex
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Content-addressed artifact name: `<hash>.<ext>`, or just `<hash>`
pub fn content_key(data: &[u8], extension: Option<&str>) -> String {
    let hash = compute_hash(data);
    match extension {
        Some(ext) => format!("{hash}.{ext}"),
        None => hash,
    }
}
