//! In-memory catalog and usage log - used when no database is configured.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;

use aegis_core::domain::{ModelRecord, UsageRecord};
use aegis_core::error::RepoError;
use aegis_core::ports::{ModelCatalog, UsageRepository};

/// Model catalog held in a map keyed by model name.
pub struct InMemoryModelCatalog {
    models: HashMap<String, ModelRecord>,
}

impl InMemoryModelCatalog {
    pub fn new(models: impl IntoIterator<Item = ModelRecord>) -> Self {
        Self {
            models: models.into_iter().map(|m| (m.name.clone(), m)).collect(),
        }
    }
}

#[async_trait]
impl ModelCatalog for InMemoryModelCatalog {
    async fn resolve(&self, name: &str) -> Result<Option<ModelRecord>, RepoError> {
        Ok(self.models.get(name).cloned())
    }
}

/// Records retained by [`InMemoryUsageRepository::new`].
const DEFAULT_CAPACITY: usize = 10_000;

/// The most recent usage records, kept in process memory.
///
/// Once `capacity` records are held the oldest is evicted for each insert.
/// Note: Data is lost on process restart.
pub struct InMemoryUsageRepository {
    records: RwLock<VecDeque<UsageRecord>>,
    capacity: usize,
}

impl InMemoryUsageRepository {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Snapshot of the retained records, oldest first.
    pub async fn records(&self) -> Vec<UsageRecord> {
        self.records.read().await.iter().cloned().collect()
    }
}

impl Default for InMemoryUsageRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsageRepository for InMemoryUsageRepository {
    async fn insert(&self, record: UsageRecord) -> Result<(), RepoError> {
        let mut records = self.records.write().await;
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
        Ok(())
    }
}
