//! In-memory counter store - used when Redis is not configured or unreachable.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use aegis_core::ports::{CounterStore, StoreError};

/// Expired entries are swept once every this many increments.
const SWEEP_INTERVAL: u64 = 256;

const CENTURY: Duration = Duration::from_secs(100 * 365 * 86_400);

struct Slot {
    count: u64,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<(String, u64), Slot>,
    ops: u64,
}

/// Windowed counters held in a single mutex-guarded map.
///
/// The increment and the trailing-window sum happen under one lock, which
/// gives the same atomicity the Redis script does.
/// Note: Counts are per-process, not shared across gateway instances.
pub struct InMemoryCounterStore {
    inner: Mutex<Inner>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Number of live counter entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let inner = self.inner.lock().await;
        inner.slots.values().filter(|s| s.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment_and_get(
        &self,
        key: &str,
        sub_window: u64,
        window_count: u32,
        ttl: Duration,
    ) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;

        inner.ops = inner.ops.wrapping_add(1);
        if inner.ops % SWEEP_INTERVAL == 0 {
            inner.slots.retain(|_, slot| slot.expires_at > now);
        }

        let slot = inner
            .slots
            .entry((key.to_string(), sub_window))
            .or_insert(Slot {
                count: 0,
                expires_at: expiry(now, ttl),
            });
        if slot.expires_at <= now {
            slot.count = 0;
            slot.expires_at = expiry(now, ttl);
        }
        slot.count += 1;
        let mut total = slot.count;

        let oldest = sub_window.saturating_sub(u64::from(window_count.max(1)) - 1);
        for previous in oldest..sub_window {
            if let Some(slot) = inner.slots.get(&(key.to_string(), previous)) {
                if slot.expires_at > now {
                    total += slot.count;
                }
            }
        }

        Ok(total)
    }
}

/// `now + ttl`, clamped where the platform clock cannot represent it.
fn expiry(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(CENTURY))
        .unwrap_or(now)
}
