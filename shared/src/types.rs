//! API request and response types

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Login request
///
/// Fields default to empty so a missing field surfaces as a validation
/// error rather than a body rejection.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default = "empty_secret")]
    pub password: SecretString,
}

/// Registration request
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "empty_secret")]
    pub password: SecretString,
}

/// Google sign-in request
///
/// Either an ID token from the Google button (`credential`) or an OAuth
/// access token from the implicit flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleLoginRequest {
    #[serde(default)]
    pub credential: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}

/// Public view of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
}

/// Body returned by register, login and Google sign-in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub message: String,
    pub user: UserResponse,
}

/// Body returned by `GET /me`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUserResponse {
    pub user: UserResponse,
}

/// Plain acknowledgement body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
