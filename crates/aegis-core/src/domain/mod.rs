//! Domain entities - the core business objects.

mod model;
mod principal;
mod rate_limit;
mod usage;

pub use model::{ModelDetail, ModelRecord, ModelSummary};
pub use principal::Principal;
pub use rate_limit::{Admission, ClientKey, PolicyError, RateLimitPolicy};
pub use usage::{FinishReason, TokenCounts, UsageRecord};
