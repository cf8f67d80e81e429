//! Chapter completion detection.
//!
//! A chapter is complete for a project once its delivered-story count reaches
//! ceil(threshold × slot count). Completion requests a chapter summary and
//! moves the project to the next active chapter, if there is one.

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::selection::progression::{self, Transition};
use crate::selection::PromptEngine;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterCompletion {
    pub chapter_id: Uuid,
    pub complete: bool,
    pub delivered: i64,
    pub required: i64,
    pub advanced_to: Option<Uuid>,
}

/// Stories needed before a chapter of `slots` prompts counts as complete.
pub fn required_stories(slots: i64, threshold: f64) -> i64 {
    if slots <= 0 {
        return 0;
    }
    // Absorb float noise so 5 × 0.8 is 4, not 5.
    let required = (slots as f64 * threshold - 1e-9).ceil() as i64;
    required.clamp(1, slots)
}

impl PromptEngine {
    pub async fn check_chapter_completion(
        &self,
        project_id: Uuid,
    ) -> Result<ChapterCompletion, AppError> {
        let state = self
            .store
            .get_project_state(project_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Prompt state for project {project_id}")))?;
        let chapter_id = state.current_chapter_id;

        let slots = self.store.count_chapter_slots(chapter_id).await?;
        let delivered = self
            .store
            .count_delivered_stories(project_id, chapter_id)
            .await?;
        let required = required_stories(slots, self.config.chapter_completion_threshold);

        let mut result = ChapterCompletion {
            chapter_id,
            complete: slots > 0 && delivered >= required,
            delivered,
            required,
            advanced_to: None,
        };
        if !result.complete {
            return Ok(result);
        }

        if let Err(e) = self.store.enqueue_chapter_summary(project_id, chapter_id).await {
            warn!("Failed to request summary of chapter {chapter_id} for project {project_id}: {e}");
        }

        match progression::plan_after_exhaustion(self.store.as_ref(), &state).await? {
            Transition::NextChapter(next) => {
                let next_id = next.id;
                if progression::apply(self.store.as_ref(), &state, &Transition::NextChapter(next))
                    .await?
                {
                    result.advanced_to = Some(next_id);
                } else {
                    warn!("Project {project_id} moved concurrently; completion did not advance it");
                }
            }
            _ => info!("Project {project_id} completed its last chapter {chapter_id}"),
        }

        Ok(result)
    }
}
