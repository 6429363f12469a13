//! Token cryptography shared across crowd crates
//!
//! Lifecycle tokens (confirmation, password reset, unlock) are opaque random
//! strings handed to the account holder. Only their SHA-256 digest is ever
//! persisted.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Number of random bytes in a raw token (43 URL-safe base64 characters)
pub const TOKEN_BYTES: usize = 32;

/// Generate a new unguessable token: 32 random bytes, URL-safe base64 encoded.
pub fn generate_token() -> Result<String> {
    let mut token_bytes = [0u8; TOKEN_BYTES];
    getrandom::getrandom(&mut token_bytes)
        .map_err(|e| Error::Internal(format!("Failed to generate random bytes: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(token_bytes))
}

/// Digest of a raw token as stored by repositories: `hex(sha256(token))`.
pub fn token_digest(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time equality for secrets of equal length.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
