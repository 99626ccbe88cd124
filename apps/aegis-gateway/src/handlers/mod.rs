//! HTTP handlers for the AI backend routes.

pub mod chat;
pub mod models;

use actix_web::HttpResponse;

use crate::middleware::AppError;

/// Fallback for paths no route matches.
pub async fn not_found() -> HttpResponse {
    actix_web::ResponseError::error_response(&AppError::NotFound(
        "Unknown request URL".to_string(),
    ))
}

/// Fallback for a known path requested with the wrong method.
pub async fn method_not_allowed() -> HttpResponse {
    actix_web::ResponseError::error_response(&AppError::MethodNotAllowed)
}
