//! Authentication guard
//!
//! Reads the session cookie, verifies it and exposes the resulting
//! `Identity` to handlers.
//!
//! # Performance
//!
//! Uses the pre-computed token keys from AppState to avoid key
//! derivation on every request.

use crate::auth::jwt::Identity;
use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use learnloop_shared::AuthError;
use tracing::debug;

/// Resolve the caller's identity from the session cookie
///
/// Per request: no cookie or an unverifiable token both end in
/// `Rejected`; only a verified token reaches `Authenticated`.
pub fn authenticate(jar: &CookieJar, state: &AppState) -> Result<Identity, AuthError> {
    let token = state.cookies().extract(jar).ok_or(AuthError::MissingToken)?;
    state.tokens().verify(&token).ok_or(AuthError::InvalidToken)
}

fn reject(cause: AuthError) -> ApiError {
    debug!(?cause, "Request rejected by auth guard");
    metrics::counter!("auth_guard_rejections_total").increment(1);
    ApiError::Unauthorized(cause.public_message().to_string())
}

/// Authenticated caller
///
/// Use as a handler argument. Behind `require_auth` it reuses the identity
/// the middleware already verified; elsewhere it verifies the cookie
/// itself.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(AuthUser(identity.clone()));
        }

        let app_state = AppState::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);

        authenticate(&jar, &app_state).map(AuthUser).map_err(reject)
    }
}

/// Route-layer guard: rejects before the protected handler runs
///
/// On success the `Identity` is stored in request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = authenticate(&jar, &state).map_err(reject)?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
