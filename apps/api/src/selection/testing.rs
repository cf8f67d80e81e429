//! Shared fixtures for engine tests.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::cache::memory::MemoryKv;
use crate::config::EngineConfig;
use crate::experiments::ExperimentRegistry;
use crate::llm_client::{Generator, LlmError};
use crate::models::project::Chapter;
use crate::models::prompt::{Category, Difficulty, PromptTemplate, UserPrompt};
use crate::selection::PromptEngine;
use crate::store::memory::InMemoryPromptStore;

/// Generation capability that replays scripted outcomes, then a default reply.
pub struct FakeGenerator {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    default_reply: Mutex<Result<String, String>>,
    calls: AtomicUsize,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_reply: Mutex::new(Ok(
                "What song always takes you back to the summer you turned sixteen?".to_string(),
            )),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn then(&self, outcome: Result<String, LlmError>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn always_fail(&self) {
        *self.default_reply.lock().unwrap() = Err("generation backend down".to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(&self, _system: &str, _prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(outcome) = self.script.lock().unwrap().pop_front() {
            return outcome;
        }
        self.default_reply
            .lock()
            .unwrap()
            .clone()
            .map_err(|message| LlmError::Api {
                status: 503,
                message,
            })
    }
}

pub struct World {
    pub store: Arc<InMemoryPromptStore>,
    pub generator: Arc<FakeGenerator>,
    pub experiments: ExperimentRegistry,
}

impl World {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryPromptStore::new()),
            generator: Arc::new(FakeGenerator::new()),
            experiments: ExperimentRegistry::new(),
        }
    }

    pub fn engine(&self) -> PromptEngine {
        self.engine_with(EngineConfig::default())
    }

    pub fn engine_with(&self, config: EngineConfig) -> PromptEngine {
        PromptEngine::new(
            self.store.clone(),
            self.generator.clone(),
            Arc::new(MemoryKv::new(
                config.cache_max_entries,
                Duration::from_secs(60),
            )),
            self.experiments.clone(),
            config,
        )
    }

    /// Adds `count` library templates and returns them.
    pub fn seed_library(&self, count: usize) -> Vec<PromptTemplate> {
        (0..count)
            .map(|i| {
                let t = template(&format!("Library prompt number {i}"));
                self.store.add_library_template(t.clone());
                t
            })
            .collect()
    }
}

pub fn chapter(name: &str, order_index: i32, is_active: bool) -> Chapter {
    Chapter {
        id: Uuid::new_v4(),
        name: name.to_string(),
        order_index,
        is_active,
    }
}

pub fn template(text: &str) -> PromptTemplate {
    template_in(Category::Reflections, Difficulty::Easy, text)
}

pub fn template_in(category: Category, difficulty: Difficulty, text: &str) -> PromptTemplate {
    PromptTemplate {
        id: Uuid::new_v4(),
        text: text.to_string(),
        category,
        difficulty,
        tags: BTreeSet::from([category.as_str().to_string()]),
        follow_up_questions: vec!["Who else was there?".to_string()],
        audio_ref: None,
    }
}

pub fn user_prompt(
    project_id: Uuid,
    text: &str,
    priority: i32,
    created_at: DateTime<Utc>,
) -> UserPrompt {
    UserPrompt {
        id: Uuid::new_v4(),
        project_id,
        author_id: Uuid::new_v4(),
        story_id: None,
        text: text.to_string(),
        priority,
        delivered: false,
        version: 0,
        created_at,
    }
}
