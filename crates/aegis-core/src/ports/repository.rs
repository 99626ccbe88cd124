use async_trait::async_trait;

use crate::domain::{ModelRecord, UsageRecord};
use crate::error::RepoError;

/// Usage persistence.
#[async_trait]
pub trait UsageRepository: Send + Sync {
    async fn insert(&self, record: UsageRecord) -> Result<(), RepoError>;
}

/// Model catalog - maps the model names callers use to internal records.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<Option<ModelRecord>, RepoError>;
}
