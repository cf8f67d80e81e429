use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::errors::AppError;
use crate::experiments::{Experiment, Variant};
use crate::selection::VariantAssignment;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateExperimentRequest {
    pub id: String,
    pub name: String,
    pub variants: Vec<Variant>,
}

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: String,
}

/// POST /api/v1/experiments
pub async fn handle_create_experiment(
    State(state): State<AppState>,
    Json(req): Json<CreateExperimentRequest>,
) -> Result<(StatusCode, Json<Experiment>), AppError> {
    if req.id.trim().is_empty() {
        return Err(AppError::Validation("experiment id must not be empty".to_string()));
    }
    let experiment = Experiment::new(req.id, req.name, req.variants)?;
    let registered = state.engine.experiments().register(experiment);
    info!(
        "Registered experiment '{}' ({}) with {} variants",
        registered.id(),
        registered.name(),
        registered.variants().len()
    );
    Ok((StatusCode::CREATED, Json(registered.as_ref().clone())))
}

/// GET /api/v1/experiments
pub async fn handle_list_experiments(State(state): State<AppState>) -> Json<Vec<Experiment>> {
    Json(
        state
            .engine
            .experiments()
            .list()
            .iter()
            .map(|e| e.as_ref().clone())
            .collect(),
    )
}

/// GET /api/v1/experiments/:experiment_id/assignment?user_id=
pub async fn handle_get_assignment(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<VariantAssignment>, AppError> {
    if state.engine.experiments().get(&experiment_id).is_none() {
        return Err(AppError::NotFound(format!("Experiment {experiment_id}")));
    }
    state
        .engine
        .assign_variant(&params.user_id, &experiment_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Experiment {experiment_id}")))
}
