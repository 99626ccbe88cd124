//! PostgreSQL repository implementations.

use async_trait::async_trait;
use sea_orm::{ColumnTrait, DbConn, EntityTrait, QueryFilter};

use aegis_core::domain::{ModelRecord, UsageRecord};
use aegis_core::error::RepoError;
use aegis_core::ports::{ModelCatalog, UsageRepository};

use super::entity::ai_model::{self, Entity as AiModelEntity};
use super::entity::usage::{self, Entity as UsageEntity};

/// PostgreSQL usage repository.
pub struct PostgresUsageRepository {
    db: DbConn,
}

impl PostgresUsageRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UsageRepository for PostgresUsageRepository {
    async fn insert(&self, record: UsageRecord) -> Result<(), RepoError> {
        let active_model: usage::ActiveModel = record.into();

        UsageEntity::insert(active_model)
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| {
                let err_str = e.to_string();
                if err_str.contains("foreign key") || err_str.contains("duplicate") {
                    RepoError::Constraint(err_str)
                } else {
                    RepoError::Query(err_str)
                }
            })?;

        Ok(())
    }
}

/// PostgreSQL model catalog.
pub struct PostgresModelCatalog {
    db: DbConn,
}

impl PostgresModelCatalog {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ModelCatalog for PostgresModelCatalog {
    async fn resolve(&self, name: &str) -> Result<Option<ModelRecord>, RepoError> {
        tracing::debug!(model = %name, "Resolving model");

        let result = AiModelEntity::find()
            .filter(ai_model::Column::Name.eq(name))
            .one(&self.db)
            .await
            .map_err(|e| RepoError::Query(e.to_string()))?;

        Ok(result.map(Into::into))
    }
}
