//! SHA-256 checksums for snapshot fingerprints and compiled artifacts.

use crate::error::CoreResult;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Compute SHA256 checksum of a string
pub fn compute_checksum(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compute SHA256 checksum over the canonical JSON encoding of a value.
///
/// Struct fields serialize in declaration order, so equal values always hash
/// equally.
pub fn compute_json_checksum<T: Serialize>(value: &T) -> CoreResult<String> {
    let json = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&json);
    Ok(format!("{:x}", hasher.finalize()))
}
