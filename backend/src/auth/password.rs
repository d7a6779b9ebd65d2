//! Password hashing using bcrypt
//!
//! Provides salted, adaptive password hashing and verification.
//!
//! # Performance Considerations
//!
//! bcrypt is intentionally CPU-intensive (~50-100ms at cost 10). Request
//! handlers must use the `_async` variants, which run on the blocking
//! thread pool so one login cannot stall the async runtime.

use anyhow::{bail, Result};
use secrecy::{ExposeSecret, SecretString};

/// Work factor used for new hashes
pub const DEFAULT_COST: u32 = 10;

/// Password hashing service
///
/// The cost is embedded in every hash it produces, so verification keeps
/// working for hashes created under an older cost.
#[derive(Debug, Clone, Copy)]
pub struct CredentialHasher {
    cost: u32,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::new(DEFAULT_COST)
    }
}

impl CredentialHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a password (blocking operation)
    ///
    /// Fails only on empty input or an out-of-range cost.
    pub fn hash(&self, password: &str) -> Result<String> {
        if password.is_empty() {
            bail!("Cannot hash an empty password");
        }
        bcrypt::hash(password, self.cost)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
    }

    /// Hash a password asynchronously (non-blocking)
    pub async fn hash_async(&self, password: SecretString) -> Result<String> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.hash(password.expose_secret()))
            .await
            .map_err(|e| anyhow::anyhow!("Task join error: {}", e))?
    }

    /// Verify a password against a stored hash (blocking operation)
    ///
    /// A mismatch is `Ok(false)`; only a malformed stored hash is an error.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        bcrypt::verify(password, hash).map_err(|e| anyhow::anyhow!("Invalid hash format: {}", e))
    }

    /// Verify a password asynchronously (non-blocking)
    pub async fn verify_async(&self, password: SecretString, hash: String) -> Result<bool> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.verify(password.expose_secret(), &hash))
            .await
            .map_err(|e| anyhow::anyhow!("Task join error: {}", e))?
    }
}
