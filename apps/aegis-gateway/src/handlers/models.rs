//! Model listing endpoints.

use actix_web::{HttpResponse, web};

use aegis_shared::dto::ListResponse;

use crate::middleware::{AppResult, Caller};
use crate::state::AppState;

/// GET /openai/v1/models
pub async fn list(state: web::Data<AppState>, _caller: Caller) -> AppResult<HttpResponse> {
    let models = state.backend.list().await?;

    Ok(HttpResponse::Ok().json(ListResponse::new(models)))
}

/// GET /openai/v1/models/{model}
pub async fn describe(
    state: web::Data<AppState>,
    _caller: Caller,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let model = path.into_inner();
    let detail = state.backend.describe(&model).await?;

    Ok(HttpResponse::Ok().json(detail))
}
