#[cfg(test)]
mod tests {
    use crate::database::entity::ai_model;
    use crate::database::postgres_repo::{PostgresModelCatalog, PostgresUsageRepository};
    use aegis_core::domain::{FinishReason, TokenCounts, UsageRecord};
    use aegis_core::ports::{ModelCatalog, UsageRepository};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[tokio::test]
    async fn test_resolve_model_by_name() {
        let model_id = uuid::Uuid::new_v4();
        let now = chrono::Utc::now();

        // Mock the query expectation
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![ai_model::Model {
                id: model_id,
                name: "gpt-4o".to_owned(),
                provider: "openai".to_owned(),
                created_at: now.into(),
            }]])
            .into_connection();

        let catalog = PostgresModelCatalog::new(db);

        let record = catalog.resolve("gpt-4o").await.unwrap().unwrap();
        assert_eq!(record.id, model_id);
        assert_eq!(record.provider, "openai");
    }

    #[tokio::test]
    async fn test_resolve_unknown_model() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![Vec::<ai_model::Model>::new()])
            .into_connection();

        let catalog = PostgresModelCatalog::new(db);

        assert!(catalog.resolve("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_usage() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results(vec![MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let repo = PostgresUsageRepository::new(db);
        let record = UsageRecord::new(
            uuid::Uuid::new_v4(),
            TokenCounts {
                predicted: 8,
                prompt: 9,
                completion: 20,
                total: 29,
            },
            FinishReason::Stop,
            "chat_completion",
        );

        repo.insert(record).await.unwrap();
    }
}
