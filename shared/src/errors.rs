//! Error types for the LearnLoop application

use thiserror::Error;

/// Authentication error types
///
/// These are internal distinctions only. At the HTTP boundary every
/// session failure collapses into the same unauthorized outcome.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Missing token")]
    MissingToken,
}

impl AuthError {
    /// Message shown to clients
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "Invalid credentials",
            AuthError::InvalidToken | AuthError::MissingToken => "Not authenticated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_failures_share_public_message() {
        assert_eq!(
            AuthError::MissingToken.public_message(),
            AuthError::InvalidToken.public_message()
        );
    }

    #[test]
    fn test_credential_failure_message() {
        assert_eq!(AuthError::InvalidCredentials.public_message(), "Invalid credentials");
        assert_eq!(AuthError::InvalidCredentials.to_string(), "Invalid credentials");
    }
}
