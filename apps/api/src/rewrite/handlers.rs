//! Axum route handlers for the Rewrite API.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::llm_client::catalog::{ModelInfo, AVAILABLE_MODELS};
use crate::rewrite::formatter::{render_report, RewriteResponse};
use crate::rewrite::models::{RewriteOutcome, RewriteRequest, RewriteRequestBody};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: &'static [ModelInfo],
    pub default_model: String,
}

/// POST /api/rewrite
///
/// Runs the rewrite loop and returns the outcome with its full attempt history.
/// Every orchestration result is 200; `success` tells accepted from the rest.
pub async fn handle_rewrite(
    State(state): State<AppState>,
    payload: Result<Json<RewriteRequestBody>, JsonRejection>,
) -> Result<Json<RewriteResponse>, AppError> {
    let outcome = run_rewrite(&state, payload).await?;
    Ok(Json(RewriteResponse::from_outcome(&outcome)))
}

/// POST /api/download
///
/// Same input as `/api/rewrite`; answers with the plain-text report as an attachment.
pub async fn handle_download(
    State(state): State<AppState>,
    payload: Result<Json<RewriteRequestBody>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = run_rewrite(&state, payload).await?;
    let filename = format!(
        "rewrite_{}.txt",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        render_report(&outcome),
    ))
}

/// GET /api/models
pub async fn handle_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: AVAILABLE_MODELS,
        default_model: state.config.default_model.clone(),
    })
}

/// Validates the body and drives one orchestration run. Input errors surface as
/// 400 before any attempt is consumed.
async fn run_rewrite(
    state: &AppState,
    payload: Result<Json<RewriteRequestBody>, JsonRejection>,
) -> Result<RewriteOutcome, AppError> {
    let Json(body) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    let session_id = Uuid::new_v4().to_string()[..8].to_string();
    let request = RewriteRequest::validate(body, state.orchestrator.settings(), session_id)
        .map_err(|e| AppError::Validation(e.to_string()))?;

    info!(
        session = %request.session_id,
        chars = request.text.chars().count(),
        min = request.min_words,
        max = request.max_words,
        mode = %request.mode,
        max_attempts = request.max_attempts,
        "rewrite requested"
    );

    // A client disconnect drops this future, which stops the run as well.
    let cancel = state.shutdown.child_token();
    Ok(state.orchestrator.run(&request, &cancel).await)
}
