//! Request fingerprinting for the URL cache.
//!
//! The canonical byte form of a request is its serde_json serialization (see
//! `model.rs` for the guarantees that make it stable). The fingerprint is the
//! 64-bit xxHash of those bytes, lower-hex encoded.

use xxhash_rust::xxh64::xxh64;

use crate::error::{Error, Result};
use crate::model::RenderRequest;

/// Canonical byte form of a request, stable across runs for equal requests.
pub fn canonical_bytes(request: &RenderRequest) -> Result<Vec<u8>> {
    serde_json::to_vec(request)
        .map_err(|err| Error::Internal(format!("error serializing request for cache key: {err}")))
}

/// Hex-encoded 64-bit fingerprint of the canonical bytes.
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", xxh64(bytes, 0))
}

/// Convenience wrapper: canonical bytes then fingerprint.
pub fn request_key(request: &RenderRequest) -> Result<String> {
    Ok(fingerprint(&canonical_bytes(request)?))
}
