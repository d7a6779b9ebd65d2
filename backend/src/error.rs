//! Application error handling
//!
//! This module provides unified error handling for the API,
//! converting internal errors to appropriate HTTP responses.

use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use learnloop_shared::{ErrorDetail, ErrorResponse};
use thiserror::Error;
use tracing::{debug, error};

use crate::repositories::RepositoryError;

/// API error type that can be converted to HTTP responses
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The one failure that exposes detail: clients need it to back off
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        limit: u32,
        reset_at: DateTime<Utc>,
        retry_after_secs: u64,
    },

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Database(e) => ApiError::Database(e),
            other => ApiError::Internal(other.into()),
        }
    }
}

/// Body rejections keep serde's text in the logs, never in the response
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(status = %rejection.status(), error = %rejection.body_text(), "Rejected request body");
        match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                ApiError::BadRequest("Expected a JSON request body".to_string())
            }
            _ => ApiError::Validation("Invalid request body".to_string()),
        }
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
        }
    }

    /// HTTP status this error renders as
    pub fn status(&self) -> StatusCode {
        self.status_and_code().0
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            ApiError::Validation(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::NotFound(msg) => msg.clone(),
            ApiError::RateLimited { message, .. } => message.clone(),
            ApiError::Internal(err) => {
                error!("Internal error: {:?}", err);
                "An internal error occurred".to_string()
            }
            ApiError::Database(err) => {
                error!("Database error: {:?}", err);
                "A database error occurred".to_string()
            }
        };

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                field: None,
            },
        });

        let mut response = (status, body).into_response();

        if let ApiError::RateLimited {
            limit,
            reset_at,
            retry_after_secs,
            ..
        } = &self
        {
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
            headers.insert("x-ratelimit-limit", HeaderValue::from(*limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
            if let Ok(value) =
                HeaderValue::from_str(&reset_at.to_rfc3339_opts(SecondsFormat::Secs, true))
            {
                headers.insert("x-ratelimit-reset", value);
            }
        }

        response
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
