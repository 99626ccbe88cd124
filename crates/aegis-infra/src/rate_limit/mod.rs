//! Rate limiting implementations.

mod clock;
mod windowed;

pub use clock::{Clock, ManualClock, SystemClock};
pub use windowed::{FailureMode, WindowedRateLimiter};
