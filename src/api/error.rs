use crate::services::presence::CacheError;
use crate::services::staging::StagingError;
use crate::utils::auth::AuthError;
use crate::utils::validation::ValidationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Everything that can end an upload request early. Publish failures are
/// deliberately absent: they never reach the caller.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    #[error(transparent)]
    BadRequest(#[from] ValidationError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Staging(_) | AppError::Cache(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Replaces the body of server-side failures with a generic message.
    /// The cause is logged before it is dropped.
    pub fn redact(self, expose_internal: bool) -> Self {
        if expose_internal || !self.status().is_server_error() {
            return self;
        }
        tracing::error!("Internal error (redacted from response): {}", self);
        AppError::Internal("Internal Server Error".to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Upload failed: {}", self);
        } else {
            tracing::warn!("Upload rejected ({}): {}", status.as_u16(), self);
        }

        (status, self.to_string()).into_response()
    }
}
