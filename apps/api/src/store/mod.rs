//! Prompt Store — persistence for templates, user prompt queues, chapter
//! sequencing and per-project progression state.
//!
//! The engine only ever talks to `dyn PromptStore`. Production wiring uses
//! `PgPromptStore`; tests use the in-memory store.
//!
//! Every mutating call that participates in a race (claiming a user prompt,
//! moving project state) is a conditional write: it returns `Ok(false)` when
//! the stored row no longer matches what the caller read.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::experiments::ExperimentAssignment;
use crate::models::project::{Chapter, ChapterSlot, ProjectPromptState};
use crate::models::prompt::{LibraryFilters, PromptTemplate, UserPrompt};

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(e.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait PromptStore: Send + Sync {
    /// Highest priority undelivered prompt for the project, earliest created on ties.
    async fn find_pending_user_prompt(&self, project_id: Uuid) -> StoreResult<Option<UserPrompt>>;

    /// Flips `delivered` to true only if the row is still at `expected_version`
    /// and undelivered. Returns whether this caller claimed it.
    async fn mark_user_prompt_delivered(&self, id: Uuid, expected_version: i64)
        -> StoreResult<bool>;

    async fn get_project_state(&self, project_id: Uuid) -> StoreResult<Option<ProjectPromptState>>;

    /// Inserts the state row unless one already exists. Returns the stored row.
    async fn initialize_project_state(
        &self,
        project_id: Uuid,
        chapter_id: Uuid,
    ) -> StoreResult<ProjectPromptState>;

    /// Unconditionally points the project at `chapter_id`, index 0.
    async fn reset_project_state(
        &self,
        project_id: Uuid,
        chapter_id: Uuid,
    ) -> StoreResult<ProjectPromptState>;

    /// Moves the project to `(new_chapter_id, new_index)` only if the stored row
    /// still carries `expected.version`. Stamps the delivery time when `delivered` is set.
    async fn advance_project_state(
        &self,
        expected: &ProjectPromptState,
        new_chapter_id: Uuid,
        new_index: i32,
        delivered: bool,
    ) -> StoreResult<bool>;

    /// First slot in the chapter whose order index is strictly greater than `after_index`.
    async fn find_next_template_in_chapter(
        &self,
        chapter_id: Uuid,
        after_index: i32,
    ) -> StoreResult<Option<ChapterSlot>>;

    async fn find_chapter(&self, chapter_id: Uuid) -> StoreResult<Option<Chapter>>;

    /// First active chapter with `order_index > after_order`.
    async fn find_next_active_chapter(&self, after_order: i32) -> StoreResult<Option<Chapter>>;

    async fn find_library_templates(&self, filters: &LibraryFilters)
        -> StoreResult<Vec<PromptTemplate>>;

    async fn find_seen_template_ids(&self, user_id: &str) -> StoreResult<Vec<Uuid>>;

    async fn count_chapter_slots(&self, chapter_id: Uuid) -> StoreResult<i64>;

    async fn count_delivered_stories(&self, project_id: Uuid, chapter_id: Uuid)
        -> StoreResult<i64>;

    /// Idempotent per (project, chapter).
    async fn enqueue_chapter_summary(&self, project_id: Uuid, chapter_id: Uuid)
        -> StoreResult<()>;

    /// Insert-only audit trail of variant assignments.
    async fn record_assignment(&self, assignment: &ExperimentAssignment) -> StoreResult<()>;
}
