//! Authentication routes
//!
//! Provides endpoints for registration, login, Google sign-in, logout and
//! the current-user profile.
//!
//! Every credential-accepting endpoint passes the rate limiter before any
//! password work happens; a successful one sets the session cookie.

use crate::auth::{
    credential_identifier, enforce, require_auth, AuthUser, ClientIp, RateLimitDecision,
    RateLimitPolicy,
};
use crate::error::ApiResult;
use crate::services::{AuthService, Session};
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use super::extract::JsonBody;
use axum_extra::extract::cookie::CookieJar;
use learnloop_shared::{
    AuthResponse, CurrentUserResponse, GoogleLoginRequest, LoginRequest, MessageResponse,
    RegisterRequest,
};

/// Create auth routes
///
/// `/me` sits behind the guard layer, so the handler never runs for an
/// unauthenticated request.
pub fn auth_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/me", get(current_user))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/google", post(google_login))
        .route("/logout", post(logout))
        .merge(protected)
}

/// Budget left after an admitted attempt
fn limit_headers(policy: &RateLimitPolicy, decision: &RateLimitDecision) -> [(&'static str, String); 2] {
    [
        ("x-ratelimit-limit", policy.max_attempts.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
    ]
}

fn session_body(message: &str, session: &Session) -> Json<AuthResponse> {
    Json(AuthResponse {
        message: message.to_string(),
        user: (&session.user).into(),
    })
}

/// Register a new user
///
/// POST /api/v1/auth/register
///
/// Rate limited per client address.
async fn register(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    jar: CookieJar,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let policy = state.register_policy();
    let decision = enforce(state.limiter(), &ip, policy, "registration").await?;

    let session = AuthService::register(&state, req).await?;
    let jar = state.cookies().attach(jar, &session.token);

    Ok((
        StatusCode::CREATED,
        limit_headers(policy, &decision),
        jar,
        session_body("User created successfully", &session),
    ))
}

/// Login with email and password
///
/// POST /api/v1/auth/login
///
/// Rate limited per (client address, email).
async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    jar: CookieJar,
    JsonBody(req): JsonBody<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let identifier = credential_identifier(&ip, &req.email);
    let policy = state.login_policy();
    let decision = enforce(state.limiter(), &identifier, policy, "login").await?;

    let session = AuthService::login(&state, req).await?;
    let jar = state.cookies().attach(jar, &session.token);

    Ok((
        limit_headers(policy, &decision),
        jar,
        session_body("Login successful", &session),
    ))
}

/// Sign in with Google
///
/// POST /api/v1/auth/google
///
/// Shares the login budget, keyed by client address only since the
/// account is not known until Google answers.
async fn google_login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    jar: CookieJar,
    JsonBody(req): JsonBody<GoogleLoginRequest>,
) -> ApiResult<impl IntoResponse> {
    enforce(state.limiter(), &ip, state.login_policy(), "login").await?;

    let session = AuthService::google_login(&state, req).await?;
    let jar = state.cookies().attach(jar, &session.token);

    Ok((jar, session_body("Google Login successful", &session)))
}

/// Clear the session cookie
///
/// POST /api/v1/auth/logout
///
/// Always succeeds. The token itself stays valid until it expires.
async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    (
        state.cookies().clear(jar),
        Json(MessageResponse::new("Logged out successfully")),
    )
}

/// Get current user profile (requires authentication)
///
/// GET /api/v1/auth/me
async fn current_user(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> ApiResult<Json<CurrentUserResponse>> {
    let user = AuthService::current_user(&state, &identity).await?;
    Ok(Json(CurrentUserResponse {
        user: (&user).into(),
    }))
}
