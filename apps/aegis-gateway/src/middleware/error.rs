//! Error handling - every caller-visible failure renders the OpenAI-style envelope.

use std::time::Duration;

use actix_web::{
    HttpResponse, ResponseError,
    http::{StatusCode, header},
};
use aegis_core::ports::{AuthError, BackendError};
use aegis_shared::ErrorResponse;

/// Application-level error type that converts to envelope responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limit exceeded")]
    RateLimited { limit: u32, retry_after: Duration },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Upstream answered with an error; status and body are passed through.
    #[error("Upstream returned {status}")]
    Upstream {
        status: u16,
        body: serde_json::Value,
    },

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Whole seconds, rounded up, never zero.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    (retry_after.as_millis().div_ceil(1000) as u64).max(1)
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());

        let error = match self {
            AppError::Unauthorized(message) => ErrorResponse::unauthorized(message.clone()),
            AppError::RateLimited { limit, retry_after } => {
                let secs = retry_after_secs(*retry_after);
                builder
                    .insert_header((header::RETRY_AFTER, secs.to_string()))
                    .insert_header(("X-RateLimit-Limit", limit.to_string()))
                    .insert_header(("X-RateLimit-Remaining", "0"));
                ErrorResponse::rate_limited(secs)
            }
            AppError::NotFound(message) => ErrorResponse::not_found(message.clone()),
            AppError::MethodNotAllowed => ErrorResponse::method_not_allowed(),
            AppError::BadRequest(message) => ErrorResponse::bad_request(message.clone()),
            AppError::Upstream { body, .. } => return builder.json(body),
            AppError::BadGateway(detail) => {
                tracing::error!("Upstream failure: {}", detail);
                ErrorResponse::bad_gateway()
            }
            AppError::Internal(detail) => {
                // Log internal errors
                tracing::error!("Internal error: {}", detail);
                ErrorResponse::internal_error()
            }
        };

        builder.json(error)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredential => AppError::Unauthorized(
                "Missing API key. Provide it as a Bearer token in the Authorization header."
                    .to_string(),
            ),
            AuthError::InvalidCredential(_) => {
                AppError::Unauthorized("Incorrect API key provided.".to_string())
            }
            AuthError::Expired => {
                AppError::Unauthorized("The provided token has expired.".to_string())
            }
            AuthError::Backend(msg) => AppError::Internal(format!("authenticator: {msg}")),
        }
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(id) => {
                AppError::NotFound(format!("The model '{id}' does not exist"))
            }
            BackendError::Upstream { status, body } => AppError::Upstream { status, body },
            BackendError::Transport(msg) => AppError::BadGateway(msg),
            BackendError::InvalidResponse(msg) => AppError::BadGateway(msg),
        }
    }
}

/// Result type alias for handlers.
pub type AppResult<T> = Result<T, AppError>;
