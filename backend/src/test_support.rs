//! Fixtures shared by unit tests

use std::sync::Arc;

use crate::auth::{CredentialHasher, InMemoryRateLimiter};
use crate::config::AppConfig;
use crate::repositories::InMemoryUserStore;
use crate::state::AppState;

pub const TEST_SECRET: &str = "unit-test-secret-that-is-long-enough";

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.jwt.secret = TEST_SECRET.to_string();
    config
}

/// In-memory state with a cheap hasher and no sweeping
pub fn test_state() -> AppState {
    state_for(false)
}

pub fn state_for(production: bool) -> AppState {
    AppState::new(
        test_config(),
        Arc::new(InMemoryUserStore::new()),
        Arc::new(InMemoryRateLimiter::new(0.0)),
        production,
    )
    .expect("test config is valid")
    .with_hasher(CredentialHasher::new(4))
}
