//! SHA-256 checksum utilities
//!
//! Provides the canonical fingerprint format (`sha256:<hex>`) used to record
//! which script contents have already been run.

use sha2::{Digest, Sha256};

/// Prefix for all checksums produced by this module
const PREFIX: &str = "sha256:";

/// Compute the SHA-256 checksum of byte content.
///
/// Returns a string in the canonical format `"sha256:<hex>"`.
pub fn compute_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{}{:x}", PREFIX, hasher.finalize())
}
