//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relay_runtime::RuntimeError;
use relay_settings::DirectoryError;
use relay_store::StoreError;
use thiserror::Error;
use tracing::error;

/// Errors a handler can return.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or unresolvable request field.
    #[error(transparent)]
    Validation(#[from] DirectoryError),

    /// The instance URL cannot be streamed from.
    #[error("invalid instance_url: {0}")]
    InvalidInstance(String),

    /// Registration store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::InvalidInstanceUrl { url, .. } => Self::InvalidInstance(url),
            RuntimeError::Store(e) => Self::Store(e),
        }
    }
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidInstance(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
            return (status, "internal error").into_response();
        }
        (status, self.to_string()).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
