use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use super::Principal;

/// Per-route admission policy.
///
/// `window_count` consecutive sub-windows of length `window` form one
/// effective window. Construct through [`RateLimitPolicy::new`] so the
/// values are always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    max_requests: u32,
    window: Duration,
    window_count: u32,
}

/// Rejected policy values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("max requests must be positive")]
    ZeroMaxRequests,

    #[error("window length must be at least one millisecond")]
    ZeroWindow,

    #[error("window count must be positive")]
    ZeroWindowCount,

    #[error("window length times window count is too large")]
    WindowTooLong,
}

impl RateLimitPolicy {
    pub fn new(max_requests: u32, window: Duration, window_count: u32) -> Result<Self, PolicyError> {
        if max_requests == 0 {
            return Err(PolicyError::ZeroMaxRequests);
        }
        if window.as_millis() == 0 {
            return Err(PolicyError::ZeroWindow);
        }
        if window_count == 0 {
            return Err(PolicyError::ZeroWindowCount);
        }
        // Counters live one window past the effective window, in signed
        // milliseconds on the store side.
        let ttl_ms = u64::try_from(window.as_millis())
            .ok()
            .and_then(|ms| ms.checked_mul(u64::from(window_count) + 1))
            .filter(|ms| *ms <= i64::MAX as u64);
        if ttl_ms.is_none() {
            return Err(PolicyError::WindowTooLong);
        }

        Ok(Self {
            max_requests,
            window,
            window_count,
        })
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Length of one sub-window.
    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn window_count(&self) -> u32 {
        self.window_count
    }

    /// Total span covered by one admission decision.
    pub fn effective_window(&self) -> Duration {
        self.window * self.window_count
    }
}

/// Identity used to bucket rate-limit counters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn from_principal(principal: &Principal) -> Self {
        Self(format!("principal:{}", principal.id))
    }

    pub fn from_ip(ip: IpAddr) -> Self {
        Self(format!("ip:{ip}"))
    }

    /// Fallback bucket for callers whose address could not be determined.
    pub fn unknown() -> Self {
        Self("ip:unknown".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Set when `allowed` is false.
    pub retry_after: Option<Duration>,
}

impl Admission {
    pub fn allow(limit: u32, remaining: u32) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            retry_after: None,
        }
    }

    pub fn deny(limit: u32, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            retry_after: Some(retry_after),
        }
    }
}
