//! URL-safe base64 and the Blake2b-256 command hash.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::Serialize;

use crate::error::{ReporterError, Result};

type Blake2b256 = Blake2b<U32>;

pub const HASH_LEN: usize = 32;

/// Trait for objects that have a canonical text representation for hashing/signing.
/// careful: the receiving chain re-hashes these exact bytes, so the output must be
/// stable across runs and platforms.
pub trait CanonicalJson: Serialize {
    fn canonical_json(&self) -> Result<String> {
        // compact separators, struct fields in declaration order, map keys sorted
        Ok(serde_json::to_string(self)?)
    }
}

pub fn b64url_encode_bytes(input: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(input)
}

pub fn b64url_encode_string(input: &str) -> String {
    b64url_encode_bytes(input.as_bytes())
}

/// Decodes URL-safe base64, with or without trailing `=` padding.
pub fn b64url_decode_bytes(input: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(input.trim_end_matches('='))
        .map_err(|e| ReporterError::Validation(format!("invalid base64url input: {e}")))
}

pub fn b64url_decode_string(input: &str) -> Result<String> {
    let bytes = b64url_decode_bytes(input)?;
    String::from_utf8(bytes)
        .map_err(|_| ReporterError::Validation("decoded base64url is not UTF-8".to_string()))
}

/// Blake2b with a 32-byte digest.
pub fn hash_bin(s: &str) -> [u8; HASH_LEN] {
    let mut hasher = Blake2b256::new();
    hasher.update(s.as_bytes());
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Blake2b-256 of `s`, URL-safe base64 without padding.
pub fn hash(s: &str) -> String {
    b64url_encode_bytes(&hash_bin(s))
}
