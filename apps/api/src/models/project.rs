use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::prompt::PromptTemplate;

/// Per-project position in the chapter sequence. The only row the progression
/// state machine mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ProjectPromptState {
    pub project_id: Uuid,
    pub current_chapter_id: Uuid,
    pub current_prompt_index: i32,
    pub last_prompt_delivered_at: Option<DateTime<Utc>>,
    /// Bumped on every write; compared in the update predicate.
    pub version: i64,
}

/// A thematic section of the storytelling journey. `order_index` defines succession.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Chapter {
    pub id: Uuid,
    pub name: String,
    pub order_index: i32,
    pub is_active: bool,
}

/// A template occupying a sequence slot inside a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterSlot {
    pub chapter_id: Uuid,
    pub order_index: i32,
    pub template: PromptTemplate,
}
