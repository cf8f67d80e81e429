pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::experiments::handlers as experiments;
use crate::selection::handlers as selection;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Project prompt flow
        .route(
            "/api/v1/projects/:project_id/prompts/next",
            post(selection::handle_next_prompt),
        )
        .route(
            "/api/v1/projects/:project_id/prompt-state",
            post(selection::handle_initialize_state),
        )
        .route(
            "/api/v1/projects/:project_id/prompt-state/reset",
            post(selection::handle_reset_state),
        )
        .route(
            "/api/v1/projects/:project_id/chapters/completion",
            post(selection::handle_chapter_completion),
        )
        .route(
            "/api/v1/prompts/personalized",
            post(selection::handle_personalized),
        )
        // Experiments
        .route(
            "/api/v1/experiments",
            post(experiments::handle_create_experiment).get(experiments::handle_list_experiments),
        )
        .route(
            "/api/v1/experiments/:experiment_id/assignment",
            get(experiments::handle_get_assignment),
        )
        .with_state(state)
}
