//! Rate limiting against a live Redis
//!
//! Run with `REDIS_URL=redis://... cargo test -- --ignored`. Every test
//! uses a fresh identifier, so runs do not interfere.

use learnloop_backend::auth::{RateLimitPolicy, RateLimiter, RedisRateLimiter};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

async fn limiter() -> RedisRateLimiter {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let client = redis::Client::open(url).expect("valid Redis URL");
    let conn = ConnectionManager::new(client)
        .await
        .expect("Failed to connect to Redis");
    RedisRateLimiter::new(conn)
}

fn identifier() -> String {
    format!("203.0.113.1:{}@x.com", Uuid::new_v4().simple())
}

#[tokio::test]
#[ignore = "requires redis"]
async fn test_budget_counts_down_then_rejects() {
    let limiter = limiter().await;
    let policy = RateLimitPolicy::login();
    let id = identifier();

    for expected in [4, 3, 2, 1, 0] {
        let decision = limiter.check(&id, &policy).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, expected);
    }

    let first_reset = limiter.check(&id, &policy).await.unwrap().reset_at;
    let rejected = limiter.check(&id, &policy).await.unwrap();
    assert!(!rejected.allowed);
    assert_eq!(rejected.remaining, 0);

    // Rejections do not push the window out
    assert!((rejected.reset_at - first_reset).num_milliseconds().abs() < 1000);
    let left = rejected.reset_at - chrono::Utc::now();
    assert!(left > chrono::Duration::minutes(14) && left <= chrono::Duration::minutes(15));
}

#[tokio::test]
#[ignore = "requires redis"]
async fn test_window_expiry_restores_full_budget() {
    let limiter = limiter().await;
    let policy = RateLimitPolicy::new("login", 2, Duration::from_millis(500));
    let id = identifier();

    limiter.check(&id, &policy).await.unwrap();
    limiter.check(&id, &policy).await.unwrap();
    assert!(!limiter.check(&id, &policy).await.unwrap().allowed);

    tokio::time::sleep(Duration::from_millis(700)).await;

    let decision = limiter.check(&id, &policy).await.unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.remaining, 1);
}

#[tokio::test]
#[ignore = "requires redis"]
async fn test_policies_are_namespaced() {
    let limiter = limiter().await;
    let id = identifier();

    let login = limiter.check(&id, &RateLimitPolicy::login()).await.unwrap();
    let register = limiter.check(&id, &RateLimitPolicy::register()).await.unwrap();

    assert_eq!(login.remaining, 4);
    assert_eq!(register.remaining, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires redis"]
async fn test_concurrent_checks_never_over_admit() {
    let limiter = Arc::new(limiter().await);
    let policy = RateLimitPolicy::login();
    let id = identifier();

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            let id = id.clone();
            tokio::spawn(async move { limiter.check(&id, &policy).await.unwrap().allowed })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }

    assert_eq!(admitted, policy.max_attempts);
}
