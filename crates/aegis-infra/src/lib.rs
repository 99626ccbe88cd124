//! # Aegis Infrastructure
//!
//! Concrete implementations of the ports defined in `aegis-core`:
//! counter stores, the windowed rate limiter, authenticators, usage
//! persistence and the upstream model backend.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external services, in-memory only
//! - `postgres` - PostgreSQL usage repository and model catalog via SeaORM
//! - `jwt` - Bearer JWT authentication
//! - `redis` - Redis counter store shared across gateway instances

pub mod auth;
pub mod backend;
pub mod database;
pub mod rate_limit;
pub mod store;

// Re-exports - In-Memory
pub use auth::ApiKeyAuthenticator;
pub use backend::{OpenAiBackend, OpenAiConfig};
pub use database::{DatabaseConfig, InMemoryModelCatalog, InMemoryUsageRepository};
pub use rate_limit::{Clock, FailureMode, ManualClock, SystemClock, WindowedRateLimiter};
pub use store::InMemoryCounterStore;

#[cfg(feature = "postgres")]
pub use database::{DatabaseConnections, PostgresModelCatalog, PostgresUsageRepository};

#[cfg(feature = "jwt")]
pub use auth::{JwtAuthenticator, JwtConfig};

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use store::{RedisConfig, RedisCounterStore};
