//! LearnLoop Backend
//!
//! Account and session service for the LearnLoop learning-resource
//! platform.
//!
//! ## Architecture
//!
//! The backend follows a layered architecture:
//! - Routes: HTTP request handling, rate limiting and session cookies
//! - Services: Registration, login and Google sign-in flows
//! - Repositories: Account persistence behind the `UserStore` trait
//! - Database: PostgreSQL with SQLx (or an in-memory store in mock mode)

use anyhow::Result;
use learnloop_backend::{
    auth::{InMemoryRateLimiter, RateLimiter, RedisRateLimiter},
    config::{self, StorageBackend},
    db,
    repositories::{InMemoryUserStore, PgUserStore, UserStore},
    routes,
    state::AppState,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing();

    let production = config::AppConfig::is_production();

    // Load configuration
    let config = config::AppConfig::load()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        env = if production { "production" } else { "development" },
        "Starting LearnLoop Backend"
    );

    // Refuse to start without a usable signing secret
    if let Err(e) = config.validate(production) {
        error!("Configuration error: {}", e);
        anyhow::bail!("Invalid configuration: {}", e);
    }

    let users = create_user_store(&config, production).await?;
    let limiter = create_rate_limiter(&config).await;

    let mut state = AppState::new(config.clone(), users, limiter, production)?;
    if let Some(handle) = install_metrics_recorder() {
        state = state.with_metrics(handle);
    }

    // Build application
    let app = routes::create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(address = %addr, "Server listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Peer addresses feed the rate limiter when no proxy header is present
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Select the account store
async fn create_user_store(
    config: &config::AppConfig,
    production: bool,
) -> Result<Arc<dyn UserStore>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            if production {
                warn!("In-memory user store in production: accounts are lost on restart");
            }
            info!("Using in-memory user store (mock mode)");
            Ok(Arc::new(InMemoryUserStore::new()))
        }
        StorageBackend::Postgres => {
            info!("Connecting to database...");
            let pool = db::create_pool(&config.database).await?;

            // Run migrations (skip in production if using separate migration job)
            if !production {
                db::run_migrations(&pool).await?;
            }

            Ok(Arc::new(PgUserStore::new(pool)))
        }
    }
}

/// Pick the rate limit store
///
/// Redis when configured and reachable, so limits hold across instances;
/// otherwise counters stay in this process.
async fn create_rate_limiter(config: &config::AppConfig) -> Arc<dyn RateLimiter> {
    if let Some(url) = config.redis.url.as_deref() {
        if let Some(conn) = connect_redis(url).await {
            info!("Rate limiting backed by Redis");
            return Arc::new(RedisRateLimiter::new(conn));
        }
    }

    info!("Rate limiting in process");
    Arc::new(InMemoryRateLimiter::new(
        config.rate_limit.sweep_probability,
    ))
}

/// Connect to Redis with graceful fallback
///
/// Returns None if Redis is unavailable, allowing the app to run with
/// per-process rate limits.
async fn connect_redis(url: &str) -> Option<ConnectionManager> {
    info!("Connecting to Redis...");

    match redis::Client::open(url) {
        Ok(client) => match ConnectionManager::new(client).await {
            Ok(conn) => {
                info!("Redis connection established");
                Some(conn)
            }
            Err(e) => {
                warn!(
                    "Failed to connect to Redis: {}. Falling back to in-process rate limits.",
                    e
                );
                None
            }
        },
        Err(e) => {
            warn!(
                "Invalid Redis URL: {}. Falling back to in-process rate limits.",
                e
            );
            None
        }
    }
}

/// Install the global Prometheus recorder
fn install_metrics_recorder() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Failed to install metrics recorder: {}. /metrics disabled.", e);
            None
        }
    }
}

/// Initialize tracing/logging
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if config::AppConfig::is_production() {
            "learnloop_backend=info,tower_http=info".into()
        } else {
            "learnloop_backend=debug,tower_http=debug,sqlx=warn".into()
        }
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config::AppConfig::is_production() {
        // JSON logging for production (better for log aggregation)
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        // Pretty logging for development
        subscriber
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
