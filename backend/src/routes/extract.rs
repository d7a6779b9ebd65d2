//! Request extractors

use axum::extract::FromRequest;

use crate::error::ApiError;

/// `axum::Json` that rejects with an `ApiError`
///
/// Malformed bodies, wrong field types and a missing `Content-Type` all
/// come back as the usual `{"error": {...}}` envelope with status 400.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);
