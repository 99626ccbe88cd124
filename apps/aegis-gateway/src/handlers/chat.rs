//! Chat completions.

use actix_web::{HttpResponse, web};

use aegis_core::domain::TokenCounts;
use aegis_core::ports::GenerationRequest;
use aegis_shared::dto::ChatCompletionRequest;

use crate::middleware::{AppError, AppResult, Caller};
use crate::state::AppState;
use crate::usage::{CHAT_COMPLETION, UsageReport};

/// POST /openai/v1/chat/completions
///
/// Forwards the request body untouched and records usage before the
/// response leaves the handler.
pub async fn completions(
    state: web::Data<AppState>,
    caller: Caller,
    body: web::Json<ChatCompletionRequest>,
) -> AppResult<HttpResponse> {
    let request = body.into_inner();

    if request.stream == Some(true) {
        return Err(AppError::BadRequest(
            "Streaming responses are not supported by this gateway".to_string(),
        ));
    }

    let predicted = request.estimated_prompt_tokens();
    let model = request.model.clone();
    let payload =
        serde_json::to_value(&request).map_err(|e| AppError::Internal(e.to_string()))?;

    tracing::debug!(
        principal = %caller.0.id,
        model = %model,
        predicted_tokens = predicted,
        "Dispatching chat completion"
    );

    let generation = state
        .backend
        .generate(GenerationRequest {
            model: model.clone(),
            body: payload,
        })
        .await?;
    tracing::debug!(
        model = %model,
        upstream_model = %generation.model,
        finish_reason = %generation.finish_reason,
        "Upstream answered"
    );

    let outcome = state
        .recorder
        .record(UsageReport {
            model,
            counts: TokenCounts {
                predicted,
                ..generation.usage
            },
            finish_reason: generation.finish_reason,
            request_type: CHAT_COMPLETION,
        })
        .await;
    tracing::debug!(?outcome, "Usage recording finished");

    Ok(HttpResponse::Ok().json(generation.body))
}
