//! Rate limiting port.

use async_trait::async_trait;

use crate::domain::{Admission, ClientKey, RateLimitPolicy};

/// Rate limiter trait - abstraction over rate limiting backends.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one request from `client` against `route_id` and decide whether it is admitted.
    ///
    /// Backend failures are resolved inside the limiter according to its
    /// failure mode, so this never errors.
    async fn admit(&self, client: &ClientKey, route_id: &str, policy: &RateLimitPolicy)
    -> Admission;
}
