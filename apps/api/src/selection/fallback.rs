//! Library fallback tier. Never mutates persistent state.
//!
//! candidates = library(filters) − excluded
//! if candidates is empty → the whole library, exclusions ignored
//! if the whole library is empty → `AppError::EmptyLibrary`

use std::collections::HashSet;

use chrono::Utc;
use rand::seq::SliceRandom;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::fingerprint::{fingerprint, FingerprintInput};
use crate::errors::AppError;
use crate::models::prompt::{LibraryFilters, PromptTemplate};
use crate::selection::library::builtin_library;
use crate::selection::PromptEngine;

/// What the fallback tier should draw from and how.
#[derive(Debug, Clone, Default)]
pub struct FallbackQuery<'a> {
    pub filters: LibraryFilters,
    pub user_id: Option<&'a str>,
    pub exclude_ids: &'a [Uuid],
    /// When set, the draw is a pure function of the seed instead of random.
    pub seed: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LibraryPick {
    pub template: PromptTemplate,
    /// The store could not be read and the compiled-in library was used.
    pub degraded: bool,
}

struct Library {
    templates: Vec<PromptTemplate>,
    builtin: bool,
}

impl PromptEngine {
    pub async fn fallback_prompt(&self, query: &FallbackQuery<'_>) -> Result<LibraryPick, AppError> {
        let mut excluded: HashSet<Uuid> = query.exclude_ids.iter().copied().collect();
        if let Some(user_id) = query.user_id {
            match self.store.find_seen_template_ids(user_id).await {
                Ok(seen) => excluded.extend(seen),
                Err(e) => warn!("Could not read prompt history for {user_id}: {e}"),
            }
        }

        let filtered = self.library(&query.filters).await;
        let mut degraded = filtered.builtin;
        let mut candidates: Vec<PromptTemplate> = filtered
            .templates
            .iter()
            .filter(|t| !excluded.contains(&t.id))
            .cloned()
            .collect();

        if candidates.is_empty() {
            debug!(
                "Filters {:?} with {} exclusions left nothing; using the full library",
                query.filters,
                excluded.len()
            );
            let full = if query.filters.is_unfiltered() {
                filtered
            } else {
                self.library(&LibraryFilters::default()).await
            };
            degraded |= full.builtin;
            candidates = full.templates;
        }

        let template = match query.seed {
            Some(seed) => draw_seeded(&candidates, seed),
            None => draw_random(&candidates),
        }
        .cloned()
        .ok_or(AppError::EmptyLibrary)?;

        Ok(LibraryPick { template, degraded })
    }

    /// Library templates matching `filters`, cached for the library TTL.
    /// A store failure substitutes the compiled-in library.
    async fn library(&self, filters: &LibraryFilters) -> Library {
        let preferences = json!({ "difficulty": filters.difficulty });
        let key = fingerprint(
            &FingerprintInput {
                namespace: "library",
                identity: "*",
                category: filters.category,
                preferences: &preferences,
                exclusions: &[],
            },
            Utc::now(),
            self.config.fingerprint_window,
        );

        if let Some(templates) = self.cache.get::<Vec<PromptTemplate>>(&key).await {
            return Library {
                templates,
                builtin: false,
            };
        }

        match self.store.find_library_templates(filters).await {
            Ok(templates) => {
                if !templates.is_empty() {
                    self.cache
                        .put(&key, &templates, self.config.library_cache_ttl)
                        .await;
                }
                Library {
                    templates,
                    builtin: false,
                }
            }
            Err(e) => {
                warn!("Library query failed, serving built-in prompts: {e}");
                Library {
                    templates: builtin_library()
                        .into_iter()
                        .filter(|t| filters.matches(t))
                        .collect(),
                    builtin: true,
                }
            }
        }
    }
}

/// Uniform random draw.
pub fn draw_random(candidates: &[PromptTemplate]) -> Option<&PromptTemplate> {
    candidates.choose(&mut rand::thread_rng())
}

/// Deterministic draw: the same seed over the same candidate set always picks
/// the same template, regardless of candidate order.
pub fn draw_seeded<'a>(candidates: &'a [PromptTemplate], seed: &str) -> Option<&'a PromptTemplate> {
    if candidates.is_empty() {
        return None;
    }
    let mut ordered: Vec<&PromptTemplate> = candidates.iter().collect();
    ordered.sort_by_key(|t| t.id);

    let digest = md5::compute(seed.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.0[..8]);
    let index = (u64::from_be_bytes(head) % ordered.len() as u64) as usize;
    Some(ordered[index])
}
