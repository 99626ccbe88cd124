//! OpenAI-compatible upstream backend.
//!
//! Requests are forwarded as-is; the only things read back out of a
//! completion are the model name, the finish reason and the usage block.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};

use aegis_core::domain::{FinishReason, ModelDetail, ModelSummary, TokenCounts};
use aegis_core::ports::{BackendError, Generation, GenerationRequest, ModelBackend};

/// Upstream connection settings.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Base URL without the `/v1` suffix (e.g. `https://api.openai.com`).
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct OpenAiBackend {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self, BackendError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| BackendError::Transport(format!("invalid upstream URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::Transport(format!(
                "upstream URL '{}' cannot carry a path",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
        })
    }

    /// `{base}/v1/{segments..}`, each segment percent-encoded on its own.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("v1").extend(segments);
        }
        url
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Send a request and return the JSON body of a successful answer.
    async fn send(&self, builder: RequestBuilder) -> Result<serde_json::Value, BackendError> {
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
        });

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "Upstream returned an error");
            return Err(BackendError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

/// Pull the bits the gateway accounts for out of a chat completion body.
pub(crate) fn parse_generation(
    body: serde_json::Value,
    requested_model: &str,
) -> Result<Generation, BackendError> {
    if !body.is_object() {
        return Err(BackendError::InvalidResponse(
            "completion body is not a JSON object".to_string(),
        ));
    }

    let model = body
        .get("model")
        .and_then(|m| m.as_str())
        .unwrap_or(requested_model)
        .to_string();

    let finish_reason = body
        .pointer("/choices/0/finish_reason")
        .and_then(|r| r.as_str())
        .map(|r| r.parse().unwrap_or(FinishReason::Unknown))
        .unwrap_or(FinishReason::Unknown);

    let count = |field: &str| {
        body.get("usage")
            .and_then(|u| u.get(field))
            .and_then(|v| v.as_u64())
            .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
            .unwrap_or(0)
    };
    let usage = TokenCounts {
        predicted: 0,
        prompt: count("prompt_tokens"),
        completion: count("completion_tokens"),
        total: count("total_tokens"),
    };

    Ok(Generation {
        body,
        model,
        finish_reason,
        usage,
    })
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    async fn list(&self) -> Result<Vec<ModelSummary>, BackendError> {
        let body = self.send(self.client.get(self.url(&["models"]))).await?;

        let data = body.get("data").cloned().unwrap_or_default();
        serde_json::from_value(data).map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }

    async fn describe(&self, id: &str) -> Result<ModelDetail, BackendError> {
        let result = self
            .send(self.client.get(self.url(&["models", id])))
            .await;

        match result {
            Ok(body) => serde_json::from_value(body)
                .map_err(|e| BackendError::InvalidResponse(e.to_string())),
            Err(BackendError::Upstream { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                Err(BackendError::NotFound(id.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn generate(&self, request: GenerationRequest) -> Result<Generation, BackendError> {
        let body = self
            .send(self.client.post(self.url(&["chat", "completions"])).json(&request.body))
            .await?;

        parse_generation(body, &request.model)
    }
}
