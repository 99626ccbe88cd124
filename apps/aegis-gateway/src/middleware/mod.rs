//! Middleware modules.

pub mod auth;
pub mod error;
pub mod rate_limit;
pub mod request_id;

use std::sync::Arc;

use aegis_core::ports::{Authenticator, RateLimiter};

pub use auth::{AuthGuard, Caller};
pub use error::{AppError, AppResult};
pub use rate_limit::{ClientKeySource, RateLimitGuard};
pub use request_id::RequestIdMiddleware;

/// Collaborators shared by the per-route guards.
#[derive(Clone)]
pub struct Guards {
    pub authenticator: Arc<dyn Authenticator>,
    pub limiter: Arc<dyn RateLimiter>,
    pub key_source: ClientKeySource,
}
