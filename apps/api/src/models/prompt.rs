use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Thematic bucket a prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Childhood,
    Family,
    Education,
    Career,
    Relationships,
    Travel,
    Traditions,
    Milestones,
    Reflections,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Childhood,
        Category::Family,
        Category::Education,
        Category::Career,
        Category::Relationships,
        Category::Travel,
        Category::Traditions,
        Category::Milestones,
        Category::Reflections,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Childhood => "childhood",
            Category::Family => "family",
            Category::Education => "education",
            Category::Career => "career",
            Category::Relationships => "relationships",
            Category::Travel => "travel",
            Category::Traditions => "traditions",
            Category::Milestones => "milestones",
            Category::Reflections => "reflections",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown prompt category '{s}'"))
    }
}

/// How much emotional depth a prompt asks of the storyteller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Deep,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Deep];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Deep => "deep",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Difficulty::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("unknown prompt difficulty '{s}'"))
    }
}

/// Curated catalog entry. Immutable from the engine's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: Uuid,
    pub text: String,
    pub category: Category,
    pub difficulty: Difficulty,
    pub tags: BTreeSet<String>,
    pub follow_up_questions: Vec<String>,
    pub audio_ref: Option<String>,
}

/// Facilitator-authored follow-up question waiting in a project's queue.
///
/// `version` is bumped on every write and used as the optimistic-concurrency
/// guard when the row is claimed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UserPrompt {
    pub id: Uuid,
    pub project_id: Uuid,
    pub author_id: Uuid,
    pub story_id: Option<Uuid>,
    pub text: String,
    pub priority: i32,
    pub delivered: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

/// AI-produced prompt. Never persisted as a template; lives in the cache and the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPrompt {
    pub id: Uuid,
    pub text: String,
    pub category: Option<Category>,
    pub difficulty: Option<Difficulty>,
    pub personalized_for: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Why a prompt was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    User,
    Sequenced,
    Fallback,
}

/// The prompt value handed back to callers, whatever tier produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptValue {
    pub id: Uuid,
    pub text: String,
    pub category: Option<Category>,
    pub difficulty: Option<Difficulty>,
    pub follow_up_questions: Vec<String>,
    pub tags: Vec<String>,
    pub audio_ref: Option<String>,
}

impl From<&PromptTemplate> for PromptValue {
    fn from(template: &PromptTemplate) -> Self {
        Self {
            id: template.id,
            text: template.text.clone(),
            category: Some(template.category),
            difficulty: Some(template.difficulty),
            follow_up_questions: template.follow_up_questions.clone(),
            tags: template.tags.iter().cloned().collect(),
            audio_ref: template.audio_ref.clone(),
        }
    }
}

impl From<&UserPrompt> for PromptValue {
    fn from(prompt: &UserPrompt) -> Self {
        Self {
            id: prompt.id,
            text: prompt.text.clone(),
            category: None,
            difficulty: None,
            follow_up_questions: Vec::new(),
            tags: Vec::new(),
            audio_ref: None,
        }
    }
}

impl From<&GeneratedPrompt> for PromptValue {
    fn from(prompt: &GeneratedPrompt) -> Self {
        Self {
            id: prompt.id,
            text: prompt.text.clone(),
            category: prompt.category,
            difficulty: prompt.difficulty,
            follow_up_questions: Vec::new(),
            tags: Vec::new(),
            audio_ref: None,
        }
    }
}

/// Optional narrowing applied to library lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryFilters {
    pub category: Option<Category>,
    pub difficulty: Option<Difficulty>,
}

impl LibraryFilters {
    pub fn is_unfiltered(&self) -> bool {
        self.category.is_none() && self.difficulty.is_none()
    }

    pub fn matches(&self, template: &PromptTemplate) -> bool {
        self.category.map_or(true, |c| c == template.category)
            && self.difficulty.map_or(true, |d| d == template.difficulty)
    }
}
