//! Application state management
//!
//! This module provides the shared application state that is passed
//! to all request handlers via Axum's state extraction.
//!
//! # Design Principles
//!
//! 1. **Pre-compute expensive resources**: token keys and store handles are created once
//! 2. **Cheap cloning**: All fields use Arc or are already Clone-cheap
//! 3. **Immutable after creation**: State is read-only during request handling

use crate::auth::{CredentialHasher, RateLimitPolicy, RateLimiter, SessionCookies, TokenService};
use crate::config::{AppConfig, ConfigError};
use crate::repositories::UserStore;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state
///
/// # Performance
///
/// - `users` and `limiter`: trait objects behind Arc, cloning is O(1)
/// - `tokens`: pre-computed keys wrapped in Arc, cloning is O(1)
/// - `http`: reqwest pools connections internally, cloning is O(1)
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
    pub tokens: TokenService,
    pub cookies: SessionCookies,
    pub hasher: CredentialHasher,
    pub limiter: Arc<dyn RateLimiter>,
    login_policy: RateLimitPolicy,
    register_policy: RateLimitPolicy,
    /// Client for Google's token endpoints
    pub http: reqwest::Client,
    /// Present when the binary installed a Prometheus recorder
    pub metrics: Option<PrometheusHandle>,
    production: bool,
}

impl AppState {
    /// Create a new application state
    ///
    /// Derives the token keys from the configured secret, so this should
    /// only be called once at startup. Fails on a missing secret.
    pub fn new(
        config: AppConfig,
        users: Arc<dyn UserStore>,
        limiter: Arc<dyn RateLimiter>,
        production: bool,
    ) -> Result<Self, ConfigError> {
        let tokens = TokenService::new(&config.jwt.secret, config.jwt.token_ttl_secs)?;
        let cookies = SessionCookies::new(
            config.cookie.name.clone(),
            config.secure_cookies(production),
            config.jwt.token_ttl_secs,
        );
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Ok(Self {
            users,
            tokens,
            cookies,
            hasher: CredentialHasher::default(),
            limiter,
            login_policy: config.rate_limit.login.to_policy("login"),
            register_policy: config.rate_limit.register.to_policy("register"),
            http,
            metrics: None,
            production,
            config: Arc::new(config),
        })
    }

    /// Replace the credential hasher (tests use a low cost)
    pub fn with_hasher(mut self, hasher: CredentialHasher) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Whether responses carry production-only headers such as HSTS
    #[inline]
    pub fn is_production(&self) -> bool {
        self.production
    }

    #[inline]
    pub fn users(&self) -> &dyn UserStore {
        self.users.as_ref()
    }

    #[inline]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[inline]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    #[inline]
    pub fn cookies(&self) -> &SessionCookies {
        &self.cookies
    }

    #[inline]
    pub fn hasher(&self) -> &CredentialHasher {
        &self.hasher
    }

    #[inline]
    pub fn limiter(&self) -> &dyn RateLimiter {
        self.limiter.as_ref()
    }

    #[inline]
    pub fn login_policy(&self) -> &RateLimitPolicy {
        &self.login_policy
    }

    #[inline]
    pub fn register_policy(&self) -> &RateLimitPolicy {
        &self.register_policy
    }
}
