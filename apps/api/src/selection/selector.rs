//! Tiered Prompt Selector.
//!
//! Each pass of the loop reads the store once and resolves to a `Step`; only
//! then is the matching conditional write attempted. A lost write sends the
//! loop back to the pending-prompt tier.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::project::{Chapter, ChapterSlot, ProjectPromptState};
use crate::models::prompt::{LibraryFilters, PromptValue, Provenance, UserPrompt};
use crate::selection::fallback::FallbackQuery;
use crate::selection::progression::{self, ProgressionError, Transition};
use crate::selection::{PromptEngine, SelectRequest, SelectedPrompt};
use crate::store::StoreError;

#[derive(Debug)]
enum Step {
    /// Highest-priority, earliest-created undelivered user prompt.
    Pending(UserPrompt),
    /// Next slot after the stored index in the current chapter.
    Sequenced {
        state: ProjectPromptState,
        slot: ChapterSlot,
    },
    /// Current chapter ran dry; move to `chapter` and look again.
    Advance {
        state: ProjectPromptState,
        chapter: Chapter,
    },
    Fallback { degraded: bool },
}

enum Outcome {
    Delivered(PromptValue, Provenance),
    LostRace,
    Fallback { degraded: bool },
}

impl PromptEngine {
    /// Chooses the next prompt for a project. Transient failures never escape:
    /// they degrade to the library. Only an empty library is an error.
    pub async fn select_next(
        &self,
        project_id: Uuid,
        request: &SelectRequest,
    ) -> Result<SelectedPrompt, AppError> {
        let mut races = 0u32;
        let mut chapter_advanced = false;

        let (prompt, provenance, degraded) = loop {
            let step = match self.next_step(project_id, !chapter_advanced).await {
                Ok(step) => step,
                Err(e) => {
                    warn!("Store read failed while selecting for project {project_id}: {e}");
                    Step::Fallback { degraded: true }
                }
            };

            let outcome = match step {
                Step::Pending(prompt) => self.claim(project_id, prompt).await,
                Step::Sequenced { state, slot } => self.deliver_slot(&state, slot).await,
                Step::Advance { state, chapter } => {
                    match progression::apply(
                        self.store.as_ref(),
                        &state,
                        &Transition::NextChapter(chapter),
                    )
                    .await
                    {
                        Ok(true) => {
                            chapter_advanced = true;
                            continue;
                        }
                        Ok(false) => Outcome::LostRace,
                        Err(e) => {
                            warn!("Chapter advance failed for project {project_id}: {e}");
                            Outcome::Fallback { degraded: true }
                        }
                    }
                }
                Step::Fallback { degraded } => Outcome::Fallback { degraded },
            };

            match outcome {
                Outcome::Delivered(prompt, provenance) => break (prompt, provenance, false),
                Outcome::LostRace => {
                    races += 1;
                    if races > self.config.max_race_retries {
                        warn!(
                            "Project {project_id} lost {races} selection races; serving fallback"
                        );
                        let (prompt, _) = self.library_fallback(request).await?;
                        break (prompt, Provenance::Fallback, true);
                    }
                    debug!("Project {project_id} lost a selection race ({races}); re-evaluating");
                }
                Outcome::Fallback { degraded } => {
                    let (prompt, builtin) = self.library_fallback(request).await?;
                    break (prompt, Provenance::Fallback, degraded || builtin);
                }
            }
        };

        let experiment = self
            .experiment_for(request.user_id.as_deref(), request.experiment_id.as_deref())
            .await;

        Ok(SelectedPrompt {
            prompt,
            provenance,
            degraded,
            experiment,
        })
    }

    async fn next_step(&self, project_id: Uuid, may_advance: bool) -> Result<Step, StoreError> {
        if let Some(prompt) = self.store.find_pending_user_prompt(project_id).await? {
            return Ok(Step::Pending(prompt));
        }

        let state = match self.store.get_project_state(project_id).await? {
            Some(state) => state,
            None => match progression::initialize(self.store.as_ref(), project_id).await {
                Ok(state) => state,
                Err(ProgressionError::NoChaptersConfigured) => {
                    warn!("No active chapters for project {project_id}; serving library prompts");
                    return Ok(Step::Fallback { degraded: false });
                }
                Err(ProgressionError::Store(e)) => return Err(e),
            },
        };

        if let Some(slot) = self
            .store
            .find_next_template_in_chapter(state.current_chapter_id, state.current_prompt_index)
            .await?
        {
            return Ok(Step::Sequenced { state, slot });
        }

        if !may_advance {
            // Freshly entered chapter is empty; the next call advances again.
            return Ok(Step::Fallback { degraded: false });
        }

        Ok(
            match progression::plan_after_exhaustion(self.store.as_ref(), &state).await? {
                Transition::NextChapter(chapter) => Step::Advance { state, chapter },
                _ => Step::Fallback { degraded: false },
            },
        )
    }

    async fn claim(&self, project_id: Uuid, prompt: UserPrompt) -> Outcome {
        match self
            .store
            .mark_user_prompt_delivered(prompt.id, prompt.version)
            .await
        {
            Ok(true) => {
                info!(
                    "Delivered user prompt {} (priority {}) to project {project_id}",
                    prompt.id, prompt.priority
                );
                Outcome::Delivered(PromptValue::from(&prompt), Provenance::User)
            }
            Ok(false) => Outcome::LostRace,
            Err(e) => {
                warn!("Failed to claim user prompt {} for project {project_id}: {e}", prompt.id);
                Outcome::Fallback { degraded: true }
            }
        }
    }

    async fn deliver_slot(&self, state: &ProjectPromptState, slot: ChapterSlot) -> Outcome {
        let advance = Transition::Advance {
            order_index: slot.order_index,
        };
        match progression::apply(self.store.as_ref(), state, &advance).await {
            Ok(true) => {
                debug!(
                    "Project {} advanced to slot {} of chapter {}",
                    state.project_id, slot.order_index, slot.chapter_id
                );
                Outcome::Delivered(PromptValue::from(&slot.template), Provenance::Sequenced)
            }
            Ok(false) => Outcome::LostRace,
            Err(e) => {
                warn!(
                    "Failed to advance prompt state for project {}: {e}",
                    state.project_id
                );
                Outcome::Fallback { degraded: true }
            }
        }
    }

    /// Library draw for a selection request; the flag reports a built-in substitute.
    async fn library_fallback(&self, request: &SelectRequest) -> Result<(PromptValue, bool), AppError> {
        let pick = self
            .fallback_prompt(&FallbackQuery {
                filters: LibraryFilters {
                    category: request.category,
                    difficulty: request.difficulty,
                },
                user_id: request.user_id.as_deref(),
                exclude_ids: &request.exclude_ids,
                seed: None,
            })
            .await?;
        Ok((PromptValue::from(&pick.template), pick.degraded))
    }
}
