//! Shared counter store port - the one piece of state shared by every gateway instance.

use async_trait::async_trait;
use std::time::Duration;

/// Atomic windowed counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter of `sub_window` under `key` and return the sum of
    /// the trailing `window_count` sub-windows ending at `sub_window`.
    ///
    /// The increment and the read happen as one atomic operation. The
    /// incremented entry expires after `ttl`.
    async fn increment_and_get(
        &self,
        key: &str,
        sub_window: u64,
        window_count: u32,
        ttl: Duration,
    ) -> Result<u64, StoreError>;
}

/// Counter store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unreachable: {0}")]
    Unavailable(String),

    #[error("Store operation failed: {0}")]
    Operation(String),
}
