//! Administrator secret hashing.
//!
//! Secrets are stored as Argon2id PHC strings with a random 16-byte salt.
//! Hashing and verification are CPU-bound and synchronous; callers on the
//! runtime go through `spawn_blocking` (see [`crate::CredentialStore`]).

use crate::error::{StorageError, StorageResult};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

const SALT_LEN: usize = 16;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingConfig {
    /// Memory cost in KiB.
    pub memory_kib: u32,

    /// Number of passes.
    pub iterations: u32,

    /// Degree of parallelism (lanes).
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HashingConfig {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Self {
        Self {
            memory_kib,
            iterations,
            parallelism,
        }
    }
}

/// Hashes and verifies administrator secrets.
#[derive(Debug, Clone)]
pub struct SecretHasher {
    params: Params,
}

impl SecretHasher {
    /// # Errors
    ///
    /// Returns `StorageError::Configuration` if the cost parameters are
    /// outside what Argon2 accepts.
    pub fn new(config: HashingConfig) -> StorageResult<Self> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| StorageError::Configuration(format!("Argon2 params error: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash `secret` with a fresh random salt.
    pub fn hash(&self, secret: &str) -> StorageResult<String> {
        let mut salt = [0u8; SALT_LEN];
        getrandom::getrandom(&mut salt)
            .map_err(|e| StorageError::Hashing(format!("Salt generation failed: {e}")))?;
        let salt = SaltString::encode_b64(&salt)
            .map_err(|e| StorageError::Hashing(format!("Salt encoding failed: {e}")))?;

        let hash = self
            .argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| StorageError::Hashing(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// Check `secret` against a stored PHC string.
    ///
    /// A malformed stored hash verifies as `false`.
    pub fn verify(&self, secret: &str, phc: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(phc) else {
            return false;
        };
        self.argon2()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }
}
