//! Chapter Progression — per-project `{chapter, index}` state machine.
//!
//! Transitions:
//! - `Advance`     same chapter, index → slot order_index (after a sequenced delivery)
//! - `NextChapter` next active chapter by order, index → 0 (current chapter ran dry)
//! - `Exhausted`   no later chapter; selection serves fallback from here on
//!
//! `reset` is the administrative escape hatch back to the first active chapter.
//! Every transition is a conditional write against the state version that was read.

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::project::{Chapter, ProjectPromptState};
use crate::selection::PromptEngine;
use crate::store::{PromptStore, StoreError};

#[derive(Debug, Error)]
pub enum ProgressionError {
    #[error("No active chapters are configured")]
    NoChaptersConfigured,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ProgressionError> for AppError {
    fn from(e: ProgressionError) -> Self {
        match e {
            ProgressionError::NoChaptersConfigured => AppError::NoChaptersConfigured,
            ProgressionError::Store(e) => AppError::Store(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Advance { order_index: i32 },
    NextChapter(Chapter),
    Exhausted,
}

async fn first_active_chapter(store: &dyn PromptStore) -> Result<Chapter, ProgressionError> {
    store
        .find_next_active_chapter(i32::MIN)
        .await?
        .ok_or(ProgressionError::NoChaptersConfigured)
}

/// Creates `{first active chapter, 0}` for a project, or returns the existing state.
pub async fn initialize(
    store: &dyn PromptStore,
    project_id: Uuid,
) -> Result<ProjectPromptState, ProgressionError> {
    if let Some(state) = store.get_project_state(project_id).await? {
        return Ok(state);
    }
    let first = first_active_chapter(store).await?;
    let state = store.initialize_project_state(project_id, first.id).await?;
    info!(
        "Initialized prompt state for project {project_id} at chapter '{}'",
        first.name
    );
    Ok(state)
}

/// Points the project back at the first active chapter, index 0. Idempotent.
pub async fn reset(
    store: &dyn PromptStore,
    project_id: Uuid,
) -> Result<ProjectPromptState, ProgressionError> {
    let first = first_active_chapter(store).await?;
    let state = store.reset_project_state(project_id, first.id).await?;
    info!(
        "Reset prompt state for project {project_id} to chapter '{}'",
        first.name
    );
    Ok(state)
}

/// Decides where a project goes once its current chapter has no further slots.
pub async fn plan_after_exhaustion(
    store: &dyn PromptStore,
    state: &ProjectPromptState,
) -> Result<Transition, StoreError> {
    let Some(current) = store.find_chapter(state.current_chapter_id).await? else {
        warn!(
            "Project {} points at missing chapter {}; treating as exhausted",
            state.project_id, state.current_chapter_id
        );
        return Ok(Transition::Exhausted);
    };

    Ok(match store.find_next_active_chapter(current.order_index).await? {
        Some(next) => Transition::NextChapter(next),
        None => Transition::Exhausted,
    })
}

/// Applies a transition against the state that was read. `Ok(false)` means
/// another writer got there first (or the transition is `Exhausted`).
pub async fn apply(
    store: &dyn PromptStore,
    state: &ProjectPromptState,
    transition: &Transition,
) -> Result<bool, StoreError> {
    match transition {
        Transition::Advance { order_index } => {
            if *order_index <= state.current_prompt_index {
                warn!(
                    "Refusing to move project {} backwards ({} -> {})",
                    state.project_id, state.current_prompt_index, order_index
                );
                return Ok(false);
            }
            store
                .advance_project_state(state, state.current_chapter_id, *order_index, true)
                .await
        }
        Transition::NextChapter(chapter) => {
            let moved = store
                .advance_project_state(state, chapter.id, 0, false)
                .await?;
            if moved {
                info!(
                    "Project {} advanced to chapter '{}' (order {})",
                    state.project_id, chapter.name, chapter.order_index
                );
            }
            Ok(moved)
        }
        Transition::Exhausted => Ok(false),
    }
}

impl PromptEngine {
    pub async fn initialize_project(
        &self,
        project_id: Uuid,
    ) -> Result<ProjectPromptState, AppError> {
        Ok(initialize(self.store.as_ref(), project_id).await?)
    }

    pub async fn reset_project(&self, project_id: Uuid) -> Result<ProjectPromptState, AppError> {
        Ok(reset(self.store.as_ref(), project_id).await?)
    }
}
