//! Token-usage recording.
//!
//! Recording is best effort: nothing that happens here changes the
//! response the caller receives.

use std::sync::Arc;
use std::time::Duration;

use aegis_core::domain::{FinishReason, TokenCounts, UsageRecord};
use aegis_core::ports::{ModelCatalog, UsageRepository};

/// `request_type` stored for chat completions.
pub const CHAT_COMPLETION: &str = "chat_completion";

/// What the handler knows about one finished generation.
#[derive(Debug, Clone)]
pub struct UsageReport {
    /// Model name as sent by the caller.
    pub model: String,
    pub counts: TokenCounts,
    pub finish_reason: FinishReason,
    pub request_type: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Usage logging is switched off.
    Disabled,
    Recorded,
    /// Logged and discarded.
    Dropped,
}

pub struct UsageRecorder {
    enabled: bool,
    catalog: Arc<dyn ModelCatalog>,
    repo: Arc<dyn UsageRepository>,
    timeout: Duration,
}

impl UsageRecorder {
    pub fn new(
        enabled: bool,
        catalog: Arc<dyn ModelCatalog>,
        repo: Arc<dyn UsageRepository>,
    ) -> Self {
        Self {
            enabled,
            catalog,
            repo,
            timeout: Duration::from_secs(2),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Persist one usage record. Never fails.
    pub async fn record(&self, report: UsageReport) -> RecordOutcome {
        if !self.enabled {
            return RecordOutcome::Disabled;
        }

        let model = report.model.clone();
        match tokio::time::timeout(self.timeout, self.persist(report)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    model = %model,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Usage recording timed out"
                );
                RecordOutcome::Dropped
            }
        }
    }

    async fn persist(&self, report: UsageReport) -> RecordOutcome {
        let model = match self.catalog.resolve(&report.model).await {
            Ok(Some(model)) => model,
            Ok(None) => {
                tracing::warn!(model = %report.model, "Model not in catalog, usage not recorded");
                return RecordOutcome::Dropped;
            }
            Err(e) => {
                tracing::error!(model = %report.model, error = %e, "Model catalog lookup failed");
                return RecordOutcome::Dropped;
            }
        };

        let record = UsageRecord::new(
            model.id,
            report.counts,
            report.finish_reason,
            report.request_type,
        );
        let record_id = record.id;

        match self.repo.insert(record).await {
            Ok(()) => {
                tracing::debug!(
                    usage_id = %record_id,
                    model = %model.name,
                    total_tokens = report.counts.total,
                    "Usage recorded"
                );
                RecordOutcome::Recorded
            }
            Err(e) => {
                tracing::error!(model = %model.name, error = %e, "Failed to record usage");
                RecordOutcome::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use aegis_core::domain::ModelRecord;
    use aegis_core::error::RepoError;
    use aegis_infra::{InMemoryModelCatalog, InMemoryUsageRepository};
    use async_trait::async_trait;

    /// Counts calls and optionally misbehaves.
    #[derive(Default)]
    struct Spy {
        resolves: AtomicUsize,
        inserts: AtomicUsize,
        fail_insert: bool,
        stall: bool,
    }

    #[async_trait]
    impl ModelCatalog for Spy {
        async fn resolve(&self, name: &str) -> Result<Option<ModelRecord>, RepoError> {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            if self.stall {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(Some(ModelRecord::new(name, "openai")))
        }
    }

    #[async_trait]
    impl UsageRepository for Spy {
        async fn insert(&self, _record: UsageRecord) -> Result<(), RepoError> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            if self.fail_insert {
                return Err(RepoError::Connection("connection refused".to_string()));
            }
            Ok(())
        }
    }

    fn report(model: &str) -> UsageReport {
        UsageReport {
            model: model.to_string(),
            counts: TokenCounts {
                predicted: 4,
                prompt: 5,
                completion: 7,
                total: 12,
            },
            finish_reason: FinishReason::Stop,
            request_type: CHAT_COMPLETION,
        }
    }

    #[tokio::test]
    async fn test_disabled_never_touches_persistence() {
        let spy = Arc::new(Spy::default());
        let recorder = UsageRecorder::new(false, spy.clone(), spy.clone());

        for _ in 0..3 {
            assert_eq!(recorder.record(report("gpt-4o")).await, RecordOutcome::Disabled);
        }

        assert_eq!(spy.resolves.load(Ordering::SeqCst), 0);
        assert_eq!(spy.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_records_known_model() {
        let gpt = ModelRecord::new("gpt-4o", "openai");
        let catalog = Arc::new(InMemoryModelCatalog::new([gpt.clone()]));
        let repo = Arc::new(InMemoryUsageRepository::new());
        let recorder = UsageRecorder::new(true, catalog, repo.clone());

        assert_eq!(recorder.record(report("gpt-4o")).await, RecordOutcome::Recorded);

        let records = repo.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].model_id, gpt.id);
        assert_eq!(records[0].predicted_tokens, 4);
        assert_eq!(records[0].total_tokens, 12);
        assert_eq!(records[0].finish_reason, FinishReason::Stop);
        assert_eq!(records[0].request_type, "chat_completion");
    }

    #[tokio::test]
    async fn test_unknown_model_is_dropped() {
        let catalog = Arc::new(InMemoryModelCatalog::new([ModelRecord::new("gpt-4o", "openai")]));
        let repo = Arc::new(InMemoryUsageRepository::new());
        let recorder = UsageRecorder::new(true, catalog, repo.clone());

        assert_eq!(recorder.record(report("llama-3")).await, RecordOutcome::Dropped);
        assert!(repo.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_repository_failure_is_dropped() {
        let spy = Arc::new(Spy {
            fail_insert: true,
            ..Spy::default()
        });
        let recorder = UsageRecorder::new(true, spy.clone(), spy.clone());

        assert_eq!(recorder.record(report("gpt-4o")).await, RecordOutcome::Dropped);
        assert_eq!(spy.inserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_catalog_times_out() {
        let spy = Arc::new(Spy {
            stall: true,
            ..Spy::default()
        });
        let recorder = UsageRecorder::new(true, spy.clone(), spy.clone())
            .with_timeout(Duration::from_millis(50));

        assert_eq!(recorder.record(report("gpt-4o")).await, RecordOutcome::Dropped);
        assert_eq!(spy.inserts.load(Ordering::SeqCst), 0);
    }
}
