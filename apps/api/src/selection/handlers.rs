use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::project::ProjectPromptState;
use crate::selection::completion::ChapterCompletion;
use crate::selection::personalized::{PersonalizedPrompt, PersonalizedRequest};
use crate::selection::{SelectRequest, SelectedPrompt};
use crate::state::AppState;

/// POST /api/v1/projects/:project_id/prompts/next
///
/// Every filter is optional, so the body may be omitted entirely.
pub async fn handle_next_prompt(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<SelectedPrompt>, AppError> {
    let req = parse_select_request(&body)?;
    let selected = state.engine.select_next(project_id, &req).await?;
    Ok(Json(selected))
}

/// POST /api/v1/projects/:project_id/prompt-state
pub async fn handle_initialize_state(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectPromptState>, AppError> {
    Ok(Json(state.engine.initialize_project(project_id).await?))
}

/// POST /api/v1/projects/:project_id/prompt-state/reset
pub async fn handle_reset_state(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectPromptState>, AppError> {
    Ok(Json(state.engine.reset_project(project_id).await?))
}

/// POST /api/v1/projects/:project_id/chapters/completion
pub async fn handle_chapter_completion(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ChapterCompletion>, AppError> {
    Ok(Json(state.engine.check_chapter_completion(project_id).await?))
}

/// POST /api/v1/prompts/personalized
pub async fn handle_personalized(
    State(state): State<AppState>,
    Json(req): Json<PersonalizedRequest>,
) -> Result<Json<PersonalizedPrompt>, AppError> {
    Ok(Json(state.engine.personalized(&req).await?))
}

fn parse_select_request(body: &[u8]) -> Result<SelectRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SelectRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::Validation(format!("Invalid request body: {e}")))
}
