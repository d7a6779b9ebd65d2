//! Authentication flows
//!
//! # Performance Optimizations
//!
//! - Password hashing/verification runs on the blocking thread pool
//! - Token keys are pre-computed in `AppState`
//!
//! Rate limiting and cookies are HTTP concerns and live in the route layer;
//! everything here works on plain request bodies and returns a `Session`.

use crate::auth::Identity;
use crate::error::{ApiError, ApiResult};
use crate::repositories::{NewUser, RepositoryError, UserRecord};
use crate::services::google::{GoogleCredential, GoogleVerifier};
use crate::state::AppState;
use learnloop_shared::validation::{
    initial_avatar, normalize_email, validate_login, validate_registration,
};
use learnloop_shared::{
    AuthError, GoogleLoginRequest, LoginRequest, RegisterRequest, UserResponse,
};
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

/// A Google id already bound to another account is a client error
fn google_conflict(err: RepositoryError) -> ApiError {
    match err {
        RepositoryError::DuplicateGoogleAccount => {
            count("auth_login_total", "google_conflict");
            ApiError::BadRequest("Google account is linked to another user".to_string())
        }
        other => other.into(),
    }
}

/// A freshly authenticated account and its signed token
#[derive(Debug, Clone)]
pub struct Session {
    pub user: UserRecord,
    pub token: String,
}

impl From<&UserRecord> for UserResponse {
    fn from(user: &UserRecord) -> Self {
        UserResponse {
            id: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

fn count(name: &'static str, outcome: &'static str) {
    metrics::counter!(name, "outcome" => outcome).increment(1);
}

fn invalid_credentials(reason: &'static str) -> ApiError {
    debug!(reason, "Login failed");
    count("auth_login_total", "invalid_credentials");
    ApiError::Unauthorized(AuthError::InvalidCredentials.public_message().to_string())
}

/// Authentication service
pub struct AuthService;

impl AuthService {
    /// Create a password account
    ///
    /// # Performance
    /// Password hashing is offloaded to the blocking thread pool.
    pub async fn register(state: &AppState, req: RegisterRequest) -> ApiResult<Session> {
        let name = req.name.trim().to_string();
        let email = normalize_email(&req.email);

        if let Err(errors) = validate_registration(&name, &email, req.password.expose_secret()) {
            count("auth_register_total", "invalid");
            return Err(ApiError::Validation(errors.join(", ")));
        }

        if state.users().find_by_email(&email).await?.is_some() {
            count("auth_register_total", "duplicate");
            return Err(ApiError::BadRequest("User already exists".to_string()));
        }

        let password_hash = state.hasher().hash_async(req.password).await?;

        let user = state
            .users()
            .create(NewUser {
                avatar: initial_avatar(&name),
                name,
                email,
                password_hash: Some(password_hash),
                google_id: None,
            })
            .await
            .map_err(|e| match e {
                // Lost a race with a concurrent sign-up for the same email
                RepositoryError::DuplicateEmail => {
                    count("auth_register_total", "duplicate");
                    ApiError::BadRequest("User already exists".to_string())
                }
                other => other.into(),
            })?;

        let token = state.tokens().issue(user.id, &user.email)?;

        info!(user_id = %user.id, "User registered");
        count("auth_register_total", "success");
        Ok(Session { user, token })
    }

    /// Log in with email and password
    ///
    /// Unknown email, Google-only account and wrong password are
    /// indistinguishable to the caller.
    pub async fn login(state: &AppState, req: LoginRequest) -> ApiResult<Session> {
        validate_login(&req.email, req.password.expose_secret()).map_err(|e| {
            count("auth_login_total", "invalid");
            ApiError::Validation(e)
        })?;

        let email = normalize_email(&req.email);
        let user = state
            .users()
            .find_by_email(&email)
            .await?
            .ok_or_else(|| invalid_credentials("unknown_email"))?;

        let password_hash = user
            .password_hash
            .clone()
            .ok_or_else(|| invalid_credentials("no_password"))?;

        let matches = match state
            .hasher()
            .verify_async(req.password, password_hash)
            .await
        {
            Ok(matches) => matches,
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Stored password hash is unusable");
                false
            }
        };

        if !matches {
            return Err(invalid_credentials("wrong_password"));
        }

        let token = state.tokens().issue(user.id, &user.email)?;

        info!(user_id = %user.id, "User logged in");
        count("auth_login_total", "success");
        Ok(Session { user, token })
    }

    /// Log in, or sign up, with a Google credential
    pub async fn google_login(state: &AppState, req: GoogleLoginRequest) -> ApiResult<Session> {
        let credential = GoogleCredential::from_request(&req)
            .ok_or_else(|| ApiError::BadRequest("Missing Google Token".to_string()))?;

        let profile = GoogleVerifier::new(&state.http, &state.config().google)
            .profile(&credential)
            .await
            .map_err(|e| {
                warn!(error = %e, "Google authentication failed");
                count("auth_login_total", "google_failed");
                ApiError::Unauthorized("Google authentication failed".to_string())
            })?;

        let email = profile
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ApiError::BadRequest("Invalid Google Account".to_string()))?;

        let user = match state.users().find_by_email(&email).await? {
            Some(user) if user.google_id.is_none() => {
                info!(user_id = %user.id, "Linking Google account");
                state
                    .users()
                    .link_google_account(user.id, &profile.sub, profile.picture.clone())
                    .await
                    .map_err(google_conflict)?
            }
            Some(user) => user,
            None => {
                let name = profile
                    .name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

                let created = state
                    .users()
                    .create(NewUser {
                        name,
                        email: email.clone(),
                        password_hash: None,
                        avatar: profile.picture.clone(),
                        google_id: Some(profile.sub.clone()),
                    })
                    .await;

                match created {
                    Ok(user) => {
                        info!(user_id = %user.id, "User registered via Google");
                        user
                    }
                    // A concurrent sign-in created the account first
                    Err(RepositoryError::DuplicateEmail) => state
                        .users()
                        .find_by_email(&email)
                        .await?
                        .ok_or_else(|| {
                            ApiError::Internal(anyhow::anyhow!(
                                "account missing after duplicate email"
                            ))
                        })?,
                    Err(e) => return Err(google_conflict(e)),
                }
            }
        };

        let token = state.tokens().issue(user.id, &user.email)?;

        count("auth_login_total", "google_success");
        Ok(Session { user, token })
    }

    /// Profile of the authenticated caller
    pub async fn current_user(state: &AppState, identity: &Identity) -> ApiResult<UserRecord> {
        state
            .users()
            .find_by_id(identity.user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }
}
