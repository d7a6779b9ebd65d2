//! Route definitions for the LearnLoop API
//!
//! This module organizes all API routes and applies middleware.

use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::warn;

mod auth;
mod extract;
mod health;


pub use auth::auth_routes;

/// Create the main application router with all middleware
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config().server.frontend_url);

    let router = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/health/live", get(health::liveness_check))
        .route("/metrics", get(metrics))
        .nest("/api/v1", api_routes(state.clone()))
        // Apply middleware layers
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http());

    security_headers(router, state.is_production()).with_state(state)
}

/// Browser hardening headers on every response
///
/// HSTS only in production, where the service sits behind TLS.
fn security_headers<S>(router: Router<S>, production: bool) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let router = router
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ));

    if !production {
        return router;
    }

    router.layer(SetResponseHeaderLayer::overriding(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    ))
}

/// API v1 routes
fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(|| async { "LearnLoop Backend API v1" }))
        .nest("/auth", auth::auth_routes(state))
}

/// Credentialed CORS for the configured frontend origin
///
/// Browsers refuse credentialed responses with a wildcard origin, so the
/// origin is pinned exactly.
fn cors_layer(frontend_url: &str) -> CorsLayer {
    let origin = match HeaderValue::from_str(frontend_url.trim_end_matches('/')) {
        Ok(origin) => AllowOrigin::exact(origin),
        Err(e) => {
            warn!(frontend_url, error = %e, "Invalid frontend URL, cross-origin requests disabled");
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Prometheus exposition
///
/// GET /metrics
async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let handle = state.metrics.as_ref().ok_or(StatusCode::NOT_FOUND)?;
    Ok((
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    ))
}
