//! Personalized generation behind the result cache and rate limiter.
//!
//! fingerprint hit      → cached prompt, no generation
//! rate limit denied    → library prompt, seeded by the fingerprint, degraded
//! generation failed    → library prompt, degraded
//! generation succeeded → cached for `cache_ttl`

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::fingerprint::{fingerprint, FingerprintInput};
use crate::errors::AppError;
use crate::llm_client::prompts::{PERSONALIZED_PROMPT_TEMPLATE, STORYTELLING_SYSTEM};
use crate::llm_client::LlmError;
use crate::models::prompt::{Category, Difficulty, GeneratedPrompt, LibraryFilters, PromptValue};
use crate::selection::fallback::FallbackQuery;
use crate::selection::{PromptEngine, VariantAssignment};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersonalizedRequest {
    pub user_id: String,
    pub category: Option<Category>,
    pub difficulty: Option<Difficulty>,
    /// Free-form profile hints (interests, birthplace, ...) passed to the model.
    #[serde(default)]
    pub preferences: Value,
    #[serde(default)]
    pub exclude_ids: Vec<Uuid>,
    /// Earlier prompt texts the model should not repeat.
    #[serde(default)]
    pub previous_prompts: Vec<String>,
    pub experiment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonalizedPrompt {
    pub prompt: PromptValue,
    /// Library substitute served instead of a generated prompt.
    pub degraded: bool,
    pub cached: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub experiment: Option<VariantAssignment>,
}

impl PromptEngine {
    pub async fn personalized(
        &self,
        request: &PersonalizedRequest,
    ) -> Result<PersonalizedPrompt, AppError> {
        let user_id = request.user_id.trim();
        if user_id.is_empty() {
            return Err(AppError::Validation("user_id must not be empty".to_string()));
        }

        let payload = json!({
            "difficulty": request.difficulty,
            "preferences": request.preferences,
            "previous_prompts": request.previous_prompts,
        });
        let key = fingerprint(
            &FingerprintInput {
                namespace: "personalized",
                identity: user_id,
                category: request.category,
                preferences: &payload,
                exclusions: &request.exclude_ids,
            },
            Utc::now(),
            self.config.fingerprint_window,
        );

        let experiment = self
            .experiment_for(Some(user_id), request.experiment_id.as_deref())
            .await;

        if let Some(cached) = self.cache.get::<GeneratedPrompt>(&key).await {
            return Ok(PersonalizedPrompt {
                prompt: PromptValue::from(&cached),
                degraded: false,
                cached: true,
                expires_at: Some(cached.expires_at),
                experiment,
            });
        }

        if !self.limiter.try_acquire(user_id).await {
            warn!("Generation rate limit hit for {user_id}; serving library prompt");
            let prompt = self.degraded_pick(request, Some(&key)).await?;
            return Ok(PersonalizedPrompt {
                prompt,
                degraded: true,
                cached: false,
                expires_at: None,
                experiment,
            });
        }

        match self.generate_with_retry(request).await {
            Ok(text) => {
                let now = Utc::now();
                let generated = GeneratedPrompt {
                    id: Uuid::new_v4(),
                    text,
                    category: request.category,
                    difficulty: request.difficulty,
                    personalized_for: user_id.to_string(),
                    created_at: now,
                    expires_at: now
                        + chrono::Duration::from_std(self.config.cache_ttl)
                            .unwrap_or_else(|_| chrono::Duration::hours(1)),
                };
                self.cache.put(&key, &generated, self.config.cache_ttl).await;
                info!("Generated personalized prompt {} for {user_id}", generated.id);

                Ok(PersonalizedPrompt {
                    prompt: PromptValue::from(&generated),
                    degraded: false,
                    cached: false,
                    expires_at: Some(generated.expires_at),
                    experiment,
                })
            }
            Err(e) => {
                warn!("Generation failed for {user_id}, serving library prompt: {e}");
                let prompt = self.degraded_pick(request, None).await?;
                Ok(PersonalizedPrompt {
                    prompt,
                    degraded: true,
                    cached: false,
                    expires_at: None,
                    experiment,
                })
            }
        }
    }

    /// Calls the generator until it returns acceptable text or attempts run out.
    /// Backoff doubles after each failed attempt.
    async fn generate_with_retry(&self, request: &PersonalizedRequest) -> Result<String, LlmError> {
        let prompt = render_prompt(request);
        let max_attempts = self.config.generation_max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let outcome = match self.generator.generate(STORYTELLING_SYSTEM, &prompt).await {
                Ok(text) => self.validate_generated(text),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(text) => return Ok(text),
                Err(e) if attempt >= max_attempts => return Err(e),
                Err(e) => {
                    let delay = backoff_delay(self.config.generation_backoff, attempt);
                    warn!(
                        "Generation attempt {attempt}/{max_attempts} failed, retrying in {}ms: {e}",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn validate_generated(&self, text: String) -> Result<String, LlmError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(LlmError::EmptyContent);
        }
        let chars = text.chars().count();
        if chars < self.config.min_generated_chars {
            return Err(LlmError::Malformed(format!(
                "{chars} characters, need at least {}",
                self.config.min_generated_chars
            )));
        }
        Ok(text.to_string())
    }

    async fn degraded_pick(
        &self,
        request: &PersonalizedRequest,
        seed: Option<&str>,
    ) -> Result<PromptValue, AppError> {
        let pick = self
            .fallback_prompt(&FallbackQuery {
                filters: LibraryFilters {
                    category: request.category,
                    difficulty: request.difficulty,
                },
                user_id: Some(request.user_id.trim()),
                exclude_ids: &request.exclude_ids,
                seed,
            })
            .await?;
        Ok(PromptValue::from(&pick.template))
    }
}

/// Delay after the `attempt`-th failure: base, 2×base, 4×base, ...
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

fn render_prompt(request: &PersonalizedRequest) -> String {
    let avoid = if request.previous_prompts.is_empty() {
        "(none)".to_string()
    } else {
        request
            .previous_prompts
            .iter()
            .map(|p| format!("- {p}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let preferences = if request.preferences.is_null() {
        "{}".to_string()
    } else {
        request.preferences.to_string()
    };

    PERSONALIZED_PROMPT_TEMPLATE
        .replace(
            "{category}",
            request.category.map(|c| c.as_str()).unwrap_or("any"),
        )
        .replace(
            "{difficulty}",
            request.difficulty.map(|d| d.as_str()).unwrap_or("any"),
        )
        .replace("{preferences}", &preferences)
        .replace("{avoid}", &avoid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::selection::testing::World;

    fn request(user_id: &str) -> PersonalizedRequest {
        PersonalizedRequest {
            user_id: user_id.to_string(),
            category: Some(Category::Childhood),
            preferences: json!({ "hometown": "Duluth" }),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_requests_generate_once() {
        let world = World::new();
        world.seed_library(1);
        let engine = world.engine();

        let first = engine.personalized(&request("user-1")).await.unwrap();
        let second = engine.personalized(&request("user-1")).await.unwrap();

        assert_eq!(world.generator.calls(), 1);
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.prompt.id, second.prompt.id);
        assert!(!second.degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_caps_generation_and_still_answers() {
        let world = World::new();
        world.seed_library(4);
        let engine = world.engine();
        let limit = EngineConfig::default().rate_limit_max_requests as usize;

        let mut degraded = 0;
        for i in 0..=limit + 2 {
            let mut req = request("user-busy");
            req.preferences = json!({ "call": i });
            let result = engine.personalized(&req).await.unwrap();
            assert!(!result.prompt.text.is_empty());
            if result.degraded {
                degraded += 1;
            }
        }

        assert_eq!(world.generator.calls(), limit);
        assert_eq!(degraded, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_holds_when_other_users_fill_the_cache() {
        let world = World::new();
        world.seed_library(3);
        let engine = world.engine_with(EngineConfig {
            cache_max_entries: 2,
            rate_limit_max_requests: 1,
            ..EngineConfig::default()
        });

        let mut generated = 0;
        for i in 0..3 {
            let mut req = request("user-a");
            req.preferences = json!({ "call": i });
            if !engine.personalized(&req).await.unwrap().degraded {
                generated += 1;
            }
            engine
                .personalized(&request(&format!("other-{i}")))
                .await
                .unwrap();
        }

        assert_eq!(generated, 1);
        assert_eq!(world.generator.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_pick_is_deterministic() {
        let world = World::new();
        world.seed_library(6);
        let engine = world.engine_with(EngineConfig {
            rate_limit_max_requests: 0,
            ..EngineConfig::default()
        });

        let first = engine.personalized(&request("user-2")).await.unwrap();
        let second = engine.personalized(&request("user-2")).await.unwrap();
        assert!(first.degraded);
        assert_eq!(first.prompt.id, second.prompt.id);
        assert_eq!(world.generator.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let world = World::new();
        world.seed_library(1);
        world.generator.then(Err(LlmError::EmptyContent));
        world.generator.then(Err(LlmError::Api {
            status: 500,
            message: "overloaded".to_string(),
        }));
        let engine = world.engine();

        let result = engine.personalized(&request("user-3")).await.unwrap();
        assert_eq!(world.generator.calls(), 3);
        assert!(!result.degraded);
        assert!(result.prompt.text.contains("summer"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_serve_degraded_library_prompt() {
        let world = World::new();
        let library = world.seed_library(2);
        world.generator.always_fail();
        let engine = world.engine();

        let result = engine.personalized(&request("user-4")).await.unwrap();
        assert_eq!(
            world.generator.calls(),
            EngineConfig::default().generation_max_attempts as usize
        );
        assert!(result.degraded);
        assert!(library.iter().any(|t| t.id == result.prompt.id));

        // Failures are not cached.
        engine.personalized(&request("user-4")).await.unwrap();
        assert_eq!(
            world.generator.calls(),
            2 * EngineConfig::default().generation_max_attempts as usize
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_too_short_output_counts_as_failure() {
        let world = World::new();
        world.seed_library(1);
        for _ in 0..3 {
            world.generator.then(Ok("Why?".to_string()));
        }
        let engine = world.engine();

        let result = engine.personalized(&request("user-5")).await.unwrap();
        assert!(result.degraded);
        assert_eq!(world.generator.calls(), 3);
    }

    #[tokio::test]
    async fn test_blank_user_is_rejected() {
        let world = World::new();
        let err = world
            .engine()
            .personalized(&request("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_backoff_doubles_and_saturates() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), base);
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(2000));
        assert_eq!(backoff_delay(base, 40), backoff_delay(base, 33));
        assert_eq!(backoff_delay(Duration::MAX, 5), Duration::MAX);
    }

    #[test]
    fn test_render_prompt_fills_every_placeholder() {
        let mut req = request("user-6");
        req.previous_prompts = vec!["Where did you grow up?".to_string()];
        let rendered = render_prompt(&req);
        assert!(rendered.contains("Theme: childhood"));
        assert!(rendered.contains("Depth: any"));
        assert!(rendered.contains("Duluth"));
        assert!(rendered.contains("- Where did you grow up?"));
        for placeholder in ["{category}", "{difficulty}", "{preferences}", "{avoid}"] {
            assert!(!rendered.contains(placeholder), "{placeholder} left in prompt");
        }
    }
}
