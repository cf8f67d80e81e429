use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::experiments::ExperimentError;
use crate::store::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// Transient failures never reach callers of prompt selection; the variants a
/// selection can surface are the configuration ones (`NoChaptersConfigured`,
/// `EmptyLibrary`).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No active chapters are configured")]
    NoChaptersConfigured,

    #[error("The prompt library is empty")]
    EmptyLibrary,

    #[error("Invalid experiment: {0}")]
    Experiment(#[from] ExperimentError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::NoChaptersConfigured => {
                tracing::error!("Prompt selection misconfigured: no active chapters");
                (
                    StatusCode::CONFLICT,
                    "NO_CHAPTERS_CONFIGURED",
                    self.to_string(),
                )
            }
            AppError::EmptyLibrary => {
                tracing::error!("Prompt selection misconfigured: empty library");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "EMPTY_LIBRARY",
                    self.to_string(),
                )
            }
            AppError::Experiment(e) => (
                StatusCode::BAD_REQUEST,
                "INVALID_EXPERIMENT",
                e.to_string(),
            ),
            AppError::Store(e) => {
                tracing::error!("Store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_have_distinct_statuses() {
        assert_eq!(
            AppError::NoChaptersConfigured.into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::EmptyLibrary.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_store_error_is_not_leaked() {
        let response =
            AppError::Store(StoreError::Unavailable("pg down".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
