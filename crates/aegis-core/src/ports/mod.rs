//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod auth;
mod backend;
mod counter_store;
mod rate_limit;
mod repository;

pub use auth::{AuthError, Authenticator};
pub use backend::{BackendError, Generation, GenerationRequest, ModelBackend};
pub use counter_store::{CounterStore, StoreError};
pub use rate_limit::RateLimiter;
pub use repository::{ModelCatalog, UsageRepository};
