//! Rate limiting for authentication endpoints
//!
//! Fixed-window attempt counters keyed by client identity. A burst that
//! straddles a window boundary can reach twice the budget; that is the
//! accepted cost of the simpler algorithm.
//!
//! Two stores sit behind the `RateLimiter` trait:
//! - `InMemoryRateLimiter`: per-process `DashMap`, swept opportunistically
//! - `RedisRateLimiter`: shared counters for multi-instance deployments

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tracing::{debug, warn};

use crate::error::ApiError;

/// Default chance that a check also sweeps expired entries
pub const DEFAULT_SWEEP_PROBABILITY: f64 = 0.01;

/// A named attempt budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Short name, used to namespace keys and label metrics
    pub name: &'static str,
    pub max_attempts: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub const fn new(name: &'static str, max_attempts: u32, window: Duration) -> Self {
        Self {
            name,
            max_attempts,
            window,
        }
    }

    /// 5 attempts per 15 minutes
    pub const fn login() -> Self {
        Self::new("login", 5, Duration::from_secs(15 * 60))
    }

    /// 3 attempts per hour
    pub const fn register() -> Self {
        Self::new("register", 3, Duration::from_secs(60 * 60))
    }

    fn key(&self, identifier: &str) -> String {
        format!("{}:{}", self.name, identifier)
    }

    fn window_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.window)
            .ok()
            .and_then(|window| now.checked_add_signed(window))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Outcome of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, at least one
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }
}

/// Attempt counter store
///
/// `check` is one logical operation: concurrent calls for the same key
/// never admit more than `max_attempts` within a window.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
    ) -> anyhow::Result<RateLimitDecision>;
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// In-process fixed-window rate limiter
///
/// The `DashMap` entry guard holds the shard lock for the whole
/// check-and-increment, so no update is lost under contention.
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    entries: DashMap<String, WindowEntry>,
    sweep_probability: f64,
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_PROBABILITY)
    }
}

impl InMemoryRateLimiter {
    pub fn new(sweep_probability: f64) -> Self {
        Self {
            entries: DashMap::new(),
            sweep_probability: sweep_probability.clamp(0.0, 1.0),
        }
    }

    /// Check and count one attempt as of `now`
    pub fn check_at(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        if self.sweep_probability > 0.0 && rand::random::<f64>() < self.sweep_probability {
            self.sweep(now);
        }

        let mut entry = self
            .entries
            .entry(policy.key(identifier))
            .or_insert(WindowEntry {
                count: 0,
                reset_at: now,
            });

        if now >= entry.reset_at {
            entry.count = 1;
            entry.reset_at = policy.window_end(now);
            return RateLimitDecision {
                allowed: true,
                remaining: policy.max_attempts.saturating_sub(1),
                reset_at: entry.reset_at,
            };
        }

        if entry.count >= policy.max_attempts {
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: entry.reset_at,
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: policy.max_attempts - entry.count,
            reset_at: entry.reset_at,
        }
    }

    /// Drop every entry whose window has elapsed
    pub fn sweep(&self, now: DateTime<Utc>) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.reset_at > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "Swept expired rate limit entries");
        }
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
    ) -> anyhow::Result<RateLimitDecision> {
        Ok(self.check_at(identifier, policy, Utc::now()))
    }
}

/// Atomic fixed-window counter: refuse at the limit, otherwise increment
/// and start the window on the first hit. Returns {allowed, count, pttl}.
const FIXED_WINDOW_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current >= tonumber(ARGV[1]) then
  return {0, current, redis.call('PTTL', KEYS[1])}
end
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return {1, count, redis.call('PTTL', KEYS[1])}
"#;

/// Redis-backed fixed-window rate limiter
///
/// Counters are shared by every instance pointing at the same Redis.
/// Expired windows are reclaimed by key TTL.
#[derive(Clone)]
pub struct RedisRateLimiter {
    conn: ConnectionManager,
    script: Arc<redis::Script>,
    key_prefix: String,
}

impl RedisRateLimiter {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            script: Arc::new(redis::Script::new(FIXED_WINDOW_SCRIPT)),
            key_prefix: "learnloop:ratelimit".to_string(),
        }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
    ) -> anyhow::Result<RateLimitDecision> {
        let now = Utc::now();
        let window_ms = policy.window.as_millis().max(1) as u64;
        let key = format!("{}:{}", self.key_prefix, policy.key(identifier));

        let mut conn = self.conn.clone();
        let (allowed, count, ttl_ms): (i64, i64, i64) = self
            .script
            .key(key)
            .arg(policy.max_attempts)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await?;

        // A key without a TTL should not exist; treat it as a full window.
        let ttl_ms = if ttl_ms > 0 { ttl_ms } else { window_ms as i64 };
        let count = u32::try_from(count.max(0)).unwrap_or(u32::MAX);

        Ok(RateLimitDecision {
            allowed: allowed == 1,
            remaining: policy.max_attempts.saturating_sub(count),
            reset_at: now + chrono::Duration::milliseconds(ttl_ms),
        })
    }
}

/// Count one attempt and reject once the budget is spent
///
/// A failing store lets the request through: losing the shared counter
/// must not lock every user out.
pub async fn enforce(
    limiter: &dyn RateLimiter,
    identifier: &str,
    policy: &RateLimitPolicy,
    action: &str,
) -> Result<RateLimitDecision, ApiError> {
    let now = Utc::now();
    let decision = match limiter.check(identifier, policy).await {
        Ok(decision) => decision,
        Err(e) => {
            warn!(policy = policy.name, error = %e, "Rate limit store unavailable, allowing request");
            return Ok(RateLimitDecision {
                allowed: true,
                remaining: policy.max_attempts,
                reset_at: policy.window_end(now),
            });
        }
    };

    if decision.allowed {
        return Ok(decision);
    }

    warn!(policy = policy.name, identifier, "Rate limit exceeded");
    metrics::counter!("auth_rate_limited_total", "policy" => policy.name).increment(1);

    Err(ApiError::RateLimited {
        message: format!(
            "Too many {} attempts. Please try again in {}.",
            action,
            format_reset_time(decision.reset_at, now)
        ),
        limit: policy.max_attempts,
        reset_at: decision.reset_at,
        retry_after_secs: decision.retry_after_secs(now),
    })
}

/// Human-readable wait until `reset_at`, rounded up
pub fn format_reset_time(reset_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = ((reset_at - now).num_milliseconds().max(0) as u64)
        .div_ceil(1000)
        .max(1);

    if secs < 60 {
        return plural(secs, "second");
    }
    plural(secs.div_ceil(60), "minute")
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

/// Best-effort network identity of the caller
///
/// Order: first `X-Forwarded-For` hop, `X-Real-IP`, the socket peer.
/// Forwarded headers are only meaningful behind a proxy that overwrites
/// them; otherwise a client can rotate them freely.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limit key for a credentialed endpoint: per (origin, account)
pub fn credential_identifier(ip: &str, email: &str) -> String {
    format!(
        "{}:{}",
        ip,
        learnloop_shared::validation::normalize_email(email)
    )
}

/// Extractor for the caller's network identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientIp(client_ip(&parts.headers, peer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use rstest::rstest;

    fn policy(max_attempts: u32, window_secs: u64) -> RateLimitPolicy {
        RateLimitPolicy::new("test", max_attempts, Duration::from_secs(window_secs))
    }

    fn limiter() -> InMemoryRateLimiter {
        InMemoryRateLimiter::new(0.0)
    }

    #[test]
    fn test_first_five_allowed_with_decreasing_remaining() {
        let limiter = limiter();
        let policy = policy(5, 900);
        let now = Utc::now();

        let remaining: Vec<u32> = (0..5)
            .map(|_| {
                let decision = limiter.check_at("1.2.3.4", &policy, now);
                assert!(decision.allowed);
                decision.remaining
            })
            .collect();

        assert_eq!(remaining, vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_sixth_attempt_rejected_without_moving_window() {
        let limiter = limiter();
        let policy = policy(5, 900);
        let now = Utc::now();

        let first = limiter.check_at("1.2.3.4", &policy, now);
        for _ in 0..4 {
            limiter.check_at("1.2.3.4", &policy, now);
        }
        let later = now + chrono::Duration::seconds(10);
        let sixth = limiter.check_at("1.2.3.4", &policy, later);

        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);
        assert_eq!(sixth.reset_at, first.reset_at);
        assert_eq!(first.reset_at, now + chrono::Duration::seconds(900));
    }

    #[test]
    fn test_window_reset_behaves_like_fresh_identifier() {
        let limiter = limiter();
        let policy = policy(2, 60);
        let now = Utc::now();

        limiter.check_at("k", &policy, now);
        limiter.check_at("k", &policy, now);
        assert!(!limiter.check_at("k", &policy, now).allowed);

        let reset_at = now + chrono::Duration::seconds(60);
        let decision = limiter.check_at("k", &policy, reset_at);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
        assert_eq!(decision.reset_at, reset_at + chrono::Duration::seconds(60));
    }

    #[test]
    fn test_identifiers_are_independent() {
        let limiter = limiter();
        let policy = policy(1, 60);
        let now = Utc::now();

        assert!(limiter.check_at("a", &policy, now).allowed);
        assert!(!limiter.check_at("a", &policy, now).allowed);
        assert!(limiter.check_at("b", &policy, now).allowed);
    }

    #[test]
    fn test_policies_do_not_share_counters() {
        let limiter = limiter();
        let now = Utc::now();
        let login = RateLimitPolicy::new("login", 1, Duration::from_secs(60));
        let register = RateLimitPolicy::new("register", 1, Duration::from_secs(60));

        assert!(limiter.check_at("ip", &login, now).allowed);
        assert!(limiter.check_at("ip", &register, now).allowed);
        assert!(!limiter.check_at("ip", &login, now).allowed);
    }

    #[test]
    fn test_sweep_removes_only_expired_entries() {
        let limiter = limiter();
        let now = Utc::now();
        limiter.check_at("short", &policy(5, 10), now);
        limiter.check_at("long", &policy(5, 1000), now);
        assert_eq!(limiter.len(), 2);

        limiter.sweep(now + chrono::Duration::seconds(10));
        assert_eq!(limiter.len(), 1);
        assert!(limiter.entries.contains_key("test:long"));
    }

    #[test]
    fn test_certain_sweep_runs_on_check() {
        let limiter = InMemoryRateLimiter::new(1.0);
        let now = Utc::now();
        limiter.check_at("old", &policy(5, 10), now);

        limiter.check_at("new", &policy(5, 10), now + chrono::Duration::seconds(20));
        assert_eq!(limiter.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_never_over_admit() {
        let limiter = Arc::new(limiter());
        let policy = policy(5, 900);

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.check("shared", &policy).await.unwrap() })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap().allowed {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
    }

    #[test]
    fn test_concurrent_threads_never_over_admit() {
        let limiter = Arc::new(limiter());
        let policy = policy(10, 900);
        let now = Utc::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| limiter.check_at("shared", &policy, now).allowed)
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 10);
    }

    #[tokio::test]
    async fn test_enforce_returns_rate_limited_error() {
        let limiter = limiter();
        let policy = policy(1, 900);

        assert!(enforce(&limiter, "ip", &policy, "login").await.is_ok());
        match enforce(&limiter, "ip", &policy, "login").await {
            Err(ApiError::RateLimited { message, limit, .. }) => {
                assert_eq!(limit, 1);
                assert!(message.starts_with("Too many login attempts. Please try again in"));
                assert!(message.ends_with("15 minutes."));
            }
            other => panic!("expected rate limit error, got {:?}", other),
        }
    }

    struct FailingLimiter;

    #[async_trait]
    impl RateLimiter for FailingLimiter {
        async fn check(&self, _: &str, _: &RateLimitPolicy) -> anyhow::Result<RateLimitDecision> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn test_enforce_fails_open_when_store_errors() {
        let decision = enforce(&FailingLimiter, "ip", &policy(1, 60), "login")
            .await
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[rstest]
    #[case(900, "15 minutes")]
    #[case(61, "2 minutes")]
    #[case(60, "1 minute")]
    #[case(30, "30 seconds")]
    #[case(1, "1 second")]
    #[case(-5, "1 second")]
    fn test_format_reset_time(#[case] secs: i64, #[case] expected: &str) {
        let now = Utc::now();
        let reset_at = now + chrono::Duration::seconds(secs);
        assert_eq!(format_reset_time(reset_at, now), expected);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let now = Utc::now();
        let decision = RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset_at: now + chrono::Duration::milliseconds(1500),
        };
        assert_eq!(decision.retry_after_secs(now), 2);
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        let peer: SocketAddr = "127.0.0.1:9000".parse().unwrap();

        assert_eq!(client_ip(&headers, Some(peer)), "203.0.113.7");
    }

    #[test]
    fn test_client_ip_fallbacks() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "192.0.2.10:4000".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)), "192.0.2.10");
        assert_eq!(client_ip(&headers, None), "unknown");

        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_ip(&headers, Some(peer)), "198.51.100.2");
    }

    #[test]
    fn test_credential_identifier_normalizes_email() {
        assert_eq!(
            credential_identifier("1.2.3.4", " Ann@X.com"),
            "1.2.3.4:ann@x.com"
        );
    }

    #[test]
    fn test_named_policies() {
        assert_eq!(RateLimitPolicy::login().max_attempts, 5);
        assert_eq!(RateLimitPolicy::login().window, Duration::from_secs(900));
        assert_eq!(RateLimitPolicy::register().max_attempts, 3);
        assert_eq!(RateLimitPolicy::register().window, Duration::from_secs(3600));
    }
}
