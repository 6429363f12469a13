//! Password hashing
//!
//! Argon2id with a per-password random salt, stored as a PHC string so the
//! parameters travel with the hash. Request paths use the `_async` variants,
//! which run the hashing on tokio's blocking pool.

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use crowd_common::{Error, Result};

const SALT_BYTES: usize = 16;

/// Argon2 cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Config {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for Argon2Config {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl Argon2Config {
    /// Minimal cost, for tests only
    pub fn fast() -> Self {
        Self {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PasswordHasher {
    config: Argon2Config,
}

impl PasswordHasher {
    pub fn new(config: Argon2Config) -> Self {
        Self { config }
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.config.memory_kib,
            self.config.iterations,
            self.config.parallelism,
            None,
        )
        .map_err(|e| Error::Internal(format!("Invalid Argon2 parameters: {}", e)))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash a plain password into a PHC string
    pub fn hash(&self, password: &str) -> Result<String> {
        let mut salt = [0u8; SALT_BYTES];
        getrandom::getrandom(&mut salt)
            .map_err(|e| Error::Internal(format!("Failed to generate salt: {}", e)))?;
        let salt = SaltString::encode_b64(&salt)
            .map_err(|e| Error::Internal(format!("Failed to encode salt: {}", e)))?;

        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::Internal(format!("Failed to hash password: {}", e)))?;

        Ok(hash.to_string())
    }

    /// Check a plain password against a stored PHC string. Malformed hashes
    /// never verify.
    pub fn verify(&self, password: &str, stored_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            return false;
        };

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    /// [`hash`](Self::hash) on the blocking pool
    pub async fn hash_async(&self, password: &str) -> Result<String> {
        let hasher = self.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| Error::Internal(format!("Password hashing task failed: {}", e)))?
    }

    /// [`verify`](Self::verify) on the blocking pool
    pub async fn verify_async(&self, password: &str, stored_hash: &str) -> Result<bool> {
        let hasher = self.clone();
        let password = password.to_string();
        let stored_hash = stored_hash.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &stored_hash))
            .await
            .map_err(|e| Error::Internal(format!("Password verification task failed: {}", e)))
    }
}
