//! Prompt Selection & Chapter Progression Engine.
//!
//! `PromptEngine` is constructed with its collaborators injected (store,
//! generator, key-value backend) so tests can substitute fakes.
//!
//! Tiers, strict order: pending user prompt → sequenced chapter prompt
//! (advancing chapters when one runs dry) → curated library fallback.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::cache::rate_limit::RateLimiter;
use crate::cache::{KvStore, ResultCache};
use crate::config::EngineConfig;
use crate::experiments::{assign, ExperimentAssignment, ExperimentRegistry};
use crate::llm_client::Generator;
use crate::models::prompt::{Category, Difficulty, PromptValue, Provenance};
use crate::store::PromptStore;

pub mod completion;
pub mod fallback;
pub mod handlers;
pub mod library;
pub mod personalized;
pub mod progression;
pub mod selector;

#[cfg(test)]
pub(crate) mod testing;

/// Input to `select_next`. Everything except the project is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectRequest {
    /// Identity the prompt is for. Enables seen-prompt exclusion and experiments.
    pub user_id: Option<String>,
    pub category: Option<Category>,
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub exclude_ids: Vec<Uuid>,
    pub experiment_id: Option<String>,
}

/// Experiment arm reported alongside a prompt for analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantAssignment {
    pub experiment_id: String,
    pub variant: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedPrompt {
    pub prompt: PromptValue,
    pub provenance: Provenance,
    /// True when the prompt is a safety-net substitute served because a
    /// collaborator failed, not because the tiers above were legitimately empty.
    pub degraded: bool,
    pub experiment: Option<VariantAssignment>,
}

pub struct PromptEngine {
    store: Arc<dyn PromptStore>,
    generator: Arc<dyn Generator>,
    cache: ResultCache,
    limiter: RateLimiter,
    experiments: ExperimentRegistry,
    config: EngineConfig,
}

impl PromptEngine {
    pub fn new(
        store: Arc<dyn PromptStore>,
        generator: Arc<dyn Generator>,
        kv: Arc<dyn KvStore>,
        experiments: ExperimentRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            generator,
            cache: ResultCache::new(kv.clone()),
            limiter: RateLimiter::new(
                kv,
                config.rate_limit_max_requests,
                config.rate_limit_window,
            ),
            experiments,
            config,
        }
    }

    pub fn experiments(&self) -> &ExperimentRegistry {
        &self.experiments
    }

    /// Assigns `user_id` to a variant of `experiment_id` and records the audit row.
    /// Unknown experiments yield `None`; audit failures are logged only.
    pub async fn assign_variant(
        &self,
        user_id: &str,
        experiment_id: &str,
    ) -> Option<VariantAssignment> {
        let Some(experiment) = self.experiments.get(experiment_id) else {
            warn!("Ignoring unknown experiment '{experiment_id}' for {user_id}");
            return None;
        };
        let variant = assign(user_id, &experiment).name.clone();

        let audit = ExperimentAssignment {
            user_id: user_id.to_string(),
            experiment_id: experiment_id.to_string(),
            variant: variant.clone(),
            assigned_at: Utc::now(),
        };
        if let Err(e) = self.store.record_assignment(&audit).await {
            warn!("Failed to record assignment {experiment_id}/{variant} for {user_id}: {e}");
        }

        Some(VariantAssignment {
            experiment_id: experiment_id.to_string(),
            variant,
        })
    }

    async fn experiment_for(
        &self,
        user_id: Option<&str>,
        experiment_id: Option<&str>,
    ) -> Option<VariantAssignment> {
        match (user_id, experiment_id) {
            (Some(user_id), Some(experiment_id)) => {
                self.assign_variant(user_id, experiment_id).await
            }
            _ => None,
        }
    }
}
