//! Redis counter store - shared by every gateway instance.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};

use aegis_core::ports::{CounterStore, StoreError};

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whether to fall back to the in-memory store if Redis is unavailable at startup
    pub fallback_to_memory: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            fallback_to_memory: true,
        }
    }
}

// KEYS[1] is the current sub-window, KEYS[2..] the previous ones.
// ARGV[1] is the TTL in milliseconds for the current sub-window.
const INCREMENT_AND_SUM: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end

local total = count
for i = 2, #KEYS do
    local previous = redis.call('GET', KEYS[i])
    if previous then
        total = total + tonumber(previous)
    end
end

return total
"#;

/// Redis-backed windowed counters.
///
/// One connection manager is created at startup and cloned per call; the
/// increment and the trailing-window read run in a single Lua script.
pub struct RedisCounterStore {
    conn: ConnectionManager,
    script: Script,
}

impl RedisCounterStore {
    pub async fn new(config: &RedisConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| StoreError::Unavailable("Connection timed out".to_string()))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        tracing::info!(url = %config.url, "Connected to Redis counter store");

        Ok(Self {
            conn,
            script: Script::new(INCREMENT_AND_SUM),
        })
    }

    /// Keys for the trailing `window_count` sub-windows, newest first.
    ///
    /// The base key is a hash tag so every key of one call lands in the same
    /// Redis Cluster slot.
    fn window_keys(key: &str, sub_window: u64, window_count: u32) -> Vec<String> {
        (0..u64::from(window_count.max(1)))
            .map_while(|offset| sub_window.checked_sub(offset))
            .map(|window| format!("{{{key}}}:{window}"))
            .collect()
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_and_get(
        &self,
        key: &str,
        sub_window: u64,
        window_count: u32,
        ttl: Duration,
    ) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();

        let mut invocation = self.script.prepare_invoke();
        for window_key in Self::window_keys(key, sub_window, window_count) {
            invocation.key(window_key);
        }
        invocation.arg(ttl.as_millis().max(1) as u64);

        let total: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() {
                    StoreError::Unavailable(e.to_string())
                } else {
                    StoreError::Operation(e.to_string())
                }
            })?;

        Ok(total.max(0) as u64)
    }
}
