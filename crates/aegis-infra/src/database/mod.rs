//! Usage persistence and the model catalog.

mod connections;
mod memory;

#[cfg(feature = "postgres")]
pub mod entity;
#[cfg(feature = "postgres")]
mod postgres_repo;

pub use connections::DatabaseConfig;
pub use memory::{InMemoryModelCatalog, InMemoryUsageRepository};

#[cfg(feature = "postgres")]
pub use connections::DatabaseConnections;
#[cfg(feature = "postgres")]
pub use postgres_repo::{PostgresModelCatalog, PostgresUsageRepository};

#[cfg(feature = "postgres")]
#[cfg(test)]
mod tests;
