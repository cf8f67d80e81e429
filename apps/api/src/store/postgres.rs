//! PostgreSQL-backed Prompt Store.
//!
//! Optimistic concurrency is a `version` column compared in the UPDATE
//! predicate; `rows_affected() == 1` means the caller won.

use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::experiments::ExperimentAssignment;
use crate::models::project::{Chapter, ChapterSlot, ProjectPromptState};
use crate::models::prompt::{LibraryFilters, PromptTemplate, UserPrompt};
use crate::store::{PromptStore, StoreError, StoreResult};

const TEMPLATE_COLUMNS: &str =
    "t.id, t.text, t.category, t.difficulty, t.tags, t.follow_up_questions, t.audio_ref";

#[derive(Debug, FromRow)]
struct PromptTemplateRow {
    id: Uuid,
    text: String,
    category: String,
    difficulty: String,
    tags: Vec<String>,
    follow_up_questions: Vec<String>,
    audio_ref: Option<String>,
}

impl TryFrom<PromptTemplateRow> for PromptTemplate {
    type Error = StoreError;

    fn try_from(row: PromptTemplateRow) -> Result<Self, Self::Error> {
        Ok(PromptTemplate {
            id: row.id,
            text: row.text,
            category: row
                .category
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("template {}: {e}", row.id)))?,
            difficulty: row
                .difficulty
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("template {}: {e}", row.id)))?,
            tags: row.tags.into_iter().collect::<BTreeSet<_>>(),
            follow_up_questions: row.follow_up_questions,
            audio_ref: row.audio_ref,
        })
    }
}

#[derive(Debug, FromRow)]
struct ChapterSlotRow {
    chapter_id: Uuid,
    order_index: i32,
    #[sqlx(flatten)]
    template: PromptTemplateRow,
}

#[derive(Clone)]
pub struct PgPromptStore {
    pool: PgPool,
}

impl PgPromptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PromptStore for PgPromptStore {
    async fn find_pending_user_prompt(&self, project_id: Uuid) -> StoreResult<Option<UserPrompt>> {
        Ok(sqlx::query_as::<_, UserPrompt>(
            r#"
            SELECT id, project_id, author_id, story_id, text, priority, delivered, version, created_at
            FROM user_prompts
            WHERE project_id = $1 AND delivered = FALSE
            ORDER BY priority DESC, created_at ASC
            LIMIT 1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn mark_user_prompt_delivered(
        &self,
        id: Uuid,
        expected_version: i64,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE user_prompts
            SET delivered = TRUE, delivered_at = NOW(), version = version + 1
            WHERE id = $1 AND version = $2 AND delivered = FALSE
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_project_state(&self, project_id: Uuid) -> StoreResult<Option<ProjectPromptState>> {
        Ok(sqlx::query_as::<_, ProjectPromptState>(
            r#"
            SELECT project_id, current_chapter_id, current_prompt_index,
                   last_prompt_delivered_at, version
            FROM project_prompt_state
            WHERE project_id = $1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn initialize_project_state(
        &self,
        project_id: Uuid,
        chapter_id: Uuid,
    ) -> StoreResult<ProjectPromptState> {
        sqlx::query(
            r#"
            INSERT INTO project_prompt_state
                (project_id, current_chapter_id, current_prompt_index, version)
            VALUES ($1, $2, 0, 0)
            ON CONFLICT (project_id) DO NOTHING
            "#,
        )
        .bind(project_id)
        .bind(chapter_id)
        .execute(&self.pool)
        .await?;

        self.get_project_state(project_id)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("state for project {project_id} vanished")))
    }

    async fn reset_project_state(
        &self,
        project_id: Uuid,
        chapter_id: Uuid,
    ) -> StoreResult<ProjectPromptState> {
        Ok(sqlx::query_as::<_, ProjectPromptState>(
            r#"
            INSERT INTO project_prompt_state
                (project_id, current_chapter_id, current_prompt_index, version)
            VALUES ($1, $2, 0, 0)
            ON CONFLICT (project_id) DO UPDATE
            SET current_chapter_id = EXCLUDED.current_chapter_id,
                current_prompt_index = 0,
                last_prompt_delivered_at = NULL,
                version = project_prompt_state.version + 1
            RETURNING project_id, current_chapter_id, current_prompt_index,
                      last_prompt_delivered_at, version
            "#,
        )
        .bind(project_id)
        .bind(chapter_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn advance_project_state(
        &self,
        expected: &ProjectPromptState,
        new_chapter_id: Uuid,
        new_index: i32,
        delivered: bool,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE project_prompt_state
            SET current_chapter_id = $2,
                current_prompt_index = $3,
                last_prompt_delivered_at = CASE WHEN $4 THEN NOW() ELSE last_prompt_delivered_at END,
                version = version + 1
            WHERE project_id = $1 AND version = $5
            "#,
        )
        .bind(expected.project_id)
        .bind(new_chapter_id)
        .bind(new_index)
        .bind(delivered)
        .bind(expected.version)
        .execute(&self.pool)
        .await?;

        debug!(
            "Conditional state update for project {} (v{}): {} row(s)",
            expected.project_id,
            expected.version,
            result.rows_affected()
        );
        Ok(result.rows_affected() == 1)
    }

    async fn find_next_template_in_chapter(
        &self,
        chapter_id: Uuid,
        after_index: i32,
    ) -> StoreResult<Option<ChapterSlot>> {
        let sql = format!(
            r#"
            SELECT s.chapter_id, s.order_index, {TEMPLATE_COLUMNS}
            FROM chapter_prompts s
            JOIN prompt_templates t ON t.id = s.template_id
            WHERE s.chapter_id = $1 AND s.order_index > $2
            ORDER BY s.order_index ASC
            LIMIT 1
            "#
        );
        let row = sqlx::query_as::<_, ChapterSlotRow>(&sql)
            .bind(chapter_id)
            .bind(after_index)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            Ok(ChapterSlot {
                chapter_id: r.chapter_id,
                order_index: r.order_index,
                template: r.template.try_into()?,
            })
        })
        .transpose()
    }

    async fn find_chapter(&self, chapter_id: Uuid) -> StoreResult<Option<Chapter>> {
        Ok(sqlx::query_as::<_, Chapter>(
            "SELECT id, name, order_index, is_active FROM chapters WHERE id = $1",
        )
        .bind(chapter_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_next_active_chapter(&self, after_order: i32) -> StoreResult<Option<Chapter>> {
        Ok(sqlx::query_as::<_, Chapter>(
            r#"
            SELECT id, name, order_index, is_active
            FROM chapters
            WHERE is_active = TRUE AND order_index > $1
            ORDER BY order_index ASC
            LIMIT 1
            "#,
        )
        .bind(after_order)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_library_templates(
        &self,
        filters: &LibraryFilters,
    ) -> StoreResult<Vec<PromptTemplate>> {
        let sql = format!(
            r#"
            SELECT {TEMPLATE_COLUMNS}
            FROM prompt_templates t
            WHERE t.in_library = TRUE
              AND ($1::TEXT IS NULL OR t.category = $1)
              AND ($2::TEXT IS NULL OR t.difficulty = $2)
            ORDER BY t.id
            "#
        );
        let rows = sqlx::query_as::<_, PromptTemplateRow>(&sql)
            .bind(filters.category.map(|c| c.as_str()))
            .bind(filters.difficulty.map(|d| d.as_str()))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(PromptTemplate::try_from).collect()
    }

    async fn find_seen_template_ids(&self, user_id: &str) -> StoreResult<Vec<Uuid>> {
        Ok(sqlx::query_scalar(
            "SELECT DISTINCT template_id FROM user_prompt_history WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn count_chapter_slots(&self, chapter_id: Uuid) -> StoreResult<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM chapter_prompts WHERE chapter_id = $1")
                .bind(chapter_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn count_delivered_stories(
        &self,
        project_id: Uuid,
        chapter_id: Uuid,
    ) -> StoreResult<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM stories WHERE project_id = $1 AND chapter_id = $2",
        )
        .bind(project_id)
        .bind(chapter_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn enqueue_chapter_summary(
        &self,
        project_id: Uuid,
        chapter_id: Uuid,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO chapter_summary_requests (project_id, chapter_id)
            VALUES ($1, $2)
            ON CONFLICT (project_id, chapter_id) DO NOTHING
            "#,
        )
        .bind(project_id)
        .bind(chapter_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_assignment(&self, assignment: &ExperimentAssignment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO experiment_assignments (user_id, experiment_id, variant, assigned_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&assignment.user_id)
        .bind(&assignment.experiment_id)
        .bind(&assignment.variant)
        .bind(assignment.assigned_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
