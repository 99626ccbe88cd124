//! Model backend port - the upstream that actually serves models.

use async_trait::async_trait;

use crate::domain::{FinishReason, ModelDetail, ModelSummary, TokenCounts};

/// A generation request, forwarded to the backend as-is.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub body: serde_json::Value,
}

/// A completed generation.
#[derive(Debug, Clone)]
pub struct Generation {
    /// Response body returned to the caller verbatim.
    pub body: serde_json::Value,
    /// Model the backend reports having used.
    pub model: String,
    pub finish_reason: FinishReason,
    /// Prompt/completion/total as reported by the backend; `predicted` is left at zero.
    pub usage: TokenCounts,
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn list(&self) -> Result<Vec<ModelSummary>, BackendError>;

    async fn describe(&self, id: &str) -> Result<ModelDetail, BackendError>;

    async fn generate(&self, request: GenerationRequest) -> Result<Generation, BackendError>;
}

/// Backend errors.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Model not found: {0}")]
    NotFound(String),

    /// The upstream answered with a non-success status; passed through to the caller.
    #[error("Upstream returned {status}")]
    Upstream {
        status: u16,
        body: serde_json::Value,
    },

    #[error("Upstream request failed: {0}")]
    Transport(String),

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
}
