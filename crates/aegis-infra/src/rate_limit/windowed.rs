//! Distributed rate limiter using a windowed counter in a shared store.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use aegis_core::domain::{Admission, ClientKey, RateLimitPolicy};
use aegis_core::ports::{CounterStore, RateLimiter};

use super::clock::{Clock, SystemClock};

/// What to do with a request when the counter store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Admit the request and log a warning.
    #[default]
    Open,
    /// Deny the request for one sub-window and log an error.
    Closed,
}

impl FromStr for FailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(FailureMode::Open),
            "closed" => Ok(FailureMode::Closed),
            other => Err(format!("unknown failure mode '{other}', expected open or closed")),
        }
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureMode::Open => f.write_str("open"),
            FailureMode::Closed => f.write_str("closed"),
        }
    }
}

/// Fixed sub-windows summed over the trailing `window_count` slots.
///
/// Every check is one store round-trip: the store increments the current
/// sub-window and returns the trailing sum atomically, so concurrent
/// gateway instances never race on a read-then-write.
pub struct WindowedRateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    failure_mode: FailureMode,
    key_prefix: String,
}

impl WindowedRateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            failure_mode: FailureMode::default(),
            key_prefix: "ratelimit".to_string(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_failure_mode(mut self, failure_mode: FailureMode) -> Self {
        self.failure_mode = failure_mode;
        self
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    fn make_key(&self, route_id: &str, client: &ClientKey) -> String {
        format!("{}:{}:{}", self.key_prefix, route_id, client)
    }
}

#[async_trait]
impl RateLimiter for WindowedRateLimiter {
    async fn admit(
        &self,
        client: &ClientKey,
        route_id: &str,
        policy: &RateLimitPolicy,
    ) -> Admission {
        let limit = policy.max_requests();
        let window_ms = (policy.window().as_millis() as u64).max(1);
        let now = self.clock.now_millis();
        let sub_window = now / window_ms;
        // Keep the current slot alive for as long as it can still be counted.
        let ttl = policy.effective_window() + policy.window();
        let key = self.make_key(route_id, client);

        match self
            .store
            .increment_and_get(&key, sub_window, policy.window_count(), ttl)
            .await
        {
            Ok(total) if total <= u64::from(limit) => {
                Admission::allow(limit, (u64::from(limit) - total) as u32)
            }
            Ok(total) => {
                let retry_after = Duration::from_millis((sub_window + 1) * window_ms - now);
                tracing::debug!(
                    client = %client,
                    route = %route_id,
                    count = total,
                    limit,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Request over limit"
                );
                Admission::deny(limit, retry_after)
            }
            Err(e) => match self.failure_mode {
                FailureMode::Open => {
                    tracing::warn!(
                        client = %client,
                        route = %route_id,
                        error = %e,
                        "Counter store unavailable, failing open"
                    );
                    Admission::allow(limit, limit)
                }
                FailureMode::Closed => {
                    tracing::error!(
                        client = %client,
                        route = %route_id,
                        error = %e,
                        "Counter store unavailable, failing closed"
                    );
                    Admission::deny(limit, policy.window())
                }
            },
        }
    }
}
