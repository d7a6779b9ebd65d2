//! Session token issuance and verification
//!
//! Tokens are HS256 JWTs carrying `{sub, email, iat, exp}`. Keys are
//! derived once from the configured secret and shared through `Arc`.
//!
//! Verification returns `Option`: malformed input, a bad signature, a
//! foreign algorithm and an elapsed expiry all look the same to callers.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::config::{ConfigError, MAX_TOKEN_TTL_SECS};

/// The only algorithm tokens are signed or accepted with
pub const TOKEN_ALGORITHM: Algorithm = Algorithm::HS256;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Subject email at issuance
    pub email: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Verified identity carried by a session token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
}

/// Pre-computed JWT keys for efficient token operations
#[derive(Clone)]
pub struct JwtKeys {
    encoding: Arc<EncodingKey>,
    decoding: Arc<DecodingKey>,
}

impl JwtKeys {
    /// Create new JWT keys from secret
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
        }
    }

    pub fn encoding(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding(&self) -> &DecodingKey {
        &self.decoding
    }
}

/// Token service
///
/// Built once at startup and stored in `AppState`; cloning is O(1).
#[derive(Clone)]
pub struct TokenService {
    keys: JwtKeys,
    validation: Arc<Validation>,
    ttl: Duration,
}

impl TokenService {
    /// Create a token service
    ///
    /// An empty secret or an out-of-range TTL is a configuration error,
    /// never a request-time one.
    pub fn new(secret: &str, ttl_secs: i64) -> Result<Self, ConfigError> {
        if secret.trim().is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        if !(1..=MAX_TOKEN_TTL_SECS).contains(&ttl_secs) {
            return Err(ConfigError::InvalidTokenTtl);
        }
        let ttl = Duration::try_seconds(ttl_secs).ok_or(ConfigError::InvalidTokenTtl)?;

        let mut validation = Validation::new(TOKEN_ALGORITHM);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        Ok(Self {
            keys: JwtKeys::new(secret),
            validation: Arc::new(validation),
            ttl,
        })
    }

    /// Issue a token for a user, valid from now for the configured TTL
    #[inline]
    pub fn issue(&self, user_id: Uuid, email: &str) -> Result<String> {
        self.issue_at(user_id, email, Utc::now())
    }

    /// Issue a token with an explicit issuance time
    ///
    /// Claims have whole-second resolution, so `issued_at` is truncated to
    /// the second first. The token is valid for exactly `ttl` from its
    /// `iat`, which can end up to a second before `issued_at + ttl`.
    pub fn issue_at(&self, user_id: Uuid, email: &str, issued_at: DateTime<Utc>) -> Result<String> {
        let iat = issued_at.timestamp();
        let exp = iat
            .checked_add(self.ttl.num_seconds())
            .filter(|exp| DateTime::<Utc>::from_timestamp(*exp, 0).is_some())
            .ok_or_else(|| anyhow!("Session expiry out of range"))?;

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            iat,
            exp,
        };

        encode(&Header::new(TOKEN_ALGORITHM), &claims, self.keys.encoding())
            .map_err(|e| anyhow!("Failed to sign session token: {}", e))
    }

    /// Verify a token against the current time
    #[inline]
    pub fn verify(&self, token: &str) -> Option<Identity> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as of `now`
    ///
    /// A token is valid while `now < exp`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Option<Identity> {
        let claims = match decode::<Claims>(token, self.keys.decoding(), &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!(reason = ?e.kind(), "Session token rejected");
                return None;
            }
        };

        if now.timestamp() >= claims.exp {
            debug!("Session token expired");
            return None;
        }

        let user_id = Uuid::parse_str(&claims.sub).ok()?;
        Some(Identity {
            user_id,
            email: claims.email,
        })
    }

    /// Token lifetime in seconds
    #[inline]
    pub fn ttl_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }
}
