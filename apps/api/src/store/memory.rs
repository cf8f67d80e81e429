//! In-memory Prompt Store used by the engine tests.
//!
//! Supports failure injection per operation and "steal" hooks that let a test
//! play the part of a concurrent request winning a conditional write.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::experiments::ExperimentAssignment;
use crate::models::project::{Chapter, ChapterSlot, ProjectPromptState};
use crate::models::prompt::{LibraryFilters, PromptTemplate, UserPrompt};
use crate::store::{PromptStore, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    library: Vec<PromptTemplate>,
    chapters: Vec<Chapter>,
    slots: BTreeMap<(Uuid, i32), PromptTemplate>,
    user_prompts: Vec<UserPrompt>,
    states: HashMap<Uuid, ProjectPromptState>,
    seen: HashMap<String, Vec<Uuid>>,
    stories: HashMap<(Uuid, Uuid), i64>,
    summaries: HashSet<(Uuid, Uuid)>,
    assignments: Vec<ExperimentAssignment>,
}

#[derive(Default)]
pub struct InMemoryPromptStore {
    inner: Mutex<Inner>,
    failing: Mutex<HashSet<&'static str>>,
    steal_next_claim: AtomicBool,
    steal_next_advance: AtomicBool,
    pub library_calls: AtomicUsize,
}

impl InMemoryPromptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_library_template(&self, template: PromptTemplate) {
        self.inner.lock().unwrap().library.push(template);
    }

    pub fn add_chapter(&self, chapter: Chapter) {
        self.inner.lock().unwrap().chapters.push(chapter);
    }

    pub fn add_slot(&self, chapter_id: Uuid, order_index: i32, template: PromptTemplate) {
        self.inner
            .lock()
            .unwrap()
            .slots
            .insert((chapter_id, order_index), template);
    }

    pub fn add_user_prompt(&self, prompt: UserPrompt) {
        self.inner.lock().unwrap().user_prompts.push(prompt);
    }

    pub fn put_state(&self, state: ProjectPromptState) {
        self.inner
            .lock()
            .unwrap()
            .states
            .insert(state.project_id, state);
    }

    pub fn state(&self, project_id: Uuid) -> Option<ProjectPromptState> {
        self.inner.lock().unwrap().states.get(&project_id).cloned()
    }

    pub fn user_prompt(&self, id: Uuid) -> Option<UserPrompt> {
        self.inner
            .lock()
            .unwrap()
            .user_prompts
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    pub fn mark_seen(&self, user_id: &str, template_id: Uuid) {
        self.inner
            .lock()
            .unwrap()
            .seen
            .entry(user_id.to_string())
            .or_default()
            .push(template_id);
    }

    pub fn set_delivered_stories(&self, project_id: Uuid, chapter_id: Uuid, count: i64) {
        self.inner
            .lock()
            .unwrap()
            .stories
            .insert((project_id, chapter_id), count);
    }

    pub fn summary_requests(&self) -> HashSet<(Uuid, Uuid)> {
        self.inner.lock().unwrap().summaries.clone()
    }

    pub fn assignments(&self) -> Vec<ExperimentAssignment> {
        self.inner.lock().unwrap().assignments.clone()
    }

    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn recover(&self, op: &'static str) {
        self.failing.lock().unwrap().remove(op);
    }

    /// The next claim is won by a phantom concurrent request.
    pub fn steal_next_claim(&self) {
        self.steal_next_claim.store(true, Ordering::SeqCst);
    }

    /// The next state advance is applied by a phantom concurrent request.
    pub fn steal_next_advance(&self) {
        self.steal_next_advance.store(true, Ordering::SeqCst);
    }

    fn check(&self, op: &'static str) -> StoreResult<()> {
        if self.failing.lock().unwrap().contains(op) {
            return Err(StoreError::Unavailable(format!("{op} injected failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl PromptStore for InMemoryPromptStore {
    async fn find_pending_user_prompt(&self, project_id: Uuid) -> StoreResult<Option<UserPrompt>> {
        self.check("find_pending_user_prompt")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .user_prompts
            .iter()
            .filter(|p| p.project_id == project_id && !p.delivered)
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at.cmp(&b.created_at))
            })
            .cloned())
    }

    async fn mark_user_prompt_delivered(
        &self,
        id: Uuid,
        expected_version: i64,
    ) -> StoreResult<bool> {
        self.check("mark_user_prompt_delivered")?;
        let stolen = self.steal_next_claim.swap(false, Ordering::SeqCst);
        let mut inner = self.inner.lock().unwrap();
        let Some(row) = inner.user_prompts.iter_mut().find(|p| p.id == id) else {
            return Ok(false);
        };
        if row.delivered || row.version != expected_version {
            return Ok(false);
        }
        row.delivered = true;
        row.version += 1;
        Ok(!stolen)
    }

    async fn get_project_state(&self, project_id: Uuid) -> StoreResult<Option<ProjectPromptState>> {
        self.check("get_project_state")?;
        Ok(self.state(project_id))
    }

    async fn initialize_project_state(
        &self,
        project_id: Uuid,
        chapter_id: Uuid,
    ) -> StoreResult<ProjectPromptState> {
        self.check("initialize_project_state")?;
        let mut inner = self.inner.lock().unwrap();
        Ok(inner
            .states
            .entry(project_id)
            .or_insert_with(|| ProjectPromptState {
                project_id,
                current_chapter_id: chapter_id,
                current_prompt_index: 0,
                last_prompt_delivered_at: None,
                version: 0,
            })
            .clone())
    }

    async fn reset_project_state(
        &self,
        project_id: Uuid,
        chapter_id: Uuid,
    ) -> StoreResult<ProjectPromptState> {
        self.check("reset_project_state")?;
        let mut inner = self.inner.lock().unwrap();
        let version = inner
            .states
            .get(&project_id)
            .map(|s| s.version + 1)
            .unwrap_or(0);
        let state = ProjectPromptState {
            project_id,
            current_chapter_id: chapter_id,
            current_prompt_index: 0,
            last_prompt_delivered_at: None,
            version,
        };
        inner.states.insert(project_id, state.clone());
        Ok(state)
    }

    async fn advance_project_state(
        &self,
        expected: &ProjectPromptState,
        new_chapter_id: Uuid,
        new_index: i32,
        delivered: bool,
    ) -> StoreResult<bool> {
        self.check("advance_project_state")?;
        let stolen = self.steal_next_advance.swap(false, Ordering::SeqCst);
        let mut inner = self.inner.lock().unwrap();
        let Some(row) = inner.states.get_mut(&expected.project_id) else {
            return Ok(false);
        };
        if row.version != expected.version {
            return Ok(false);
        }
        row.current_chapter_id = new_chapter_id;
        row.current_prompt_index = new_index;
        if delivered {
            row.last_prompt_delivered_at = Some(Utc::now());
        }
        row.version += 1;
        Ok(!stolen)
    }

    async fn find_next_template_in_chapter(
        &self,
        chapter_id: Uuid,
        after_index: i32,
    ) -> StoreResult<Option<ChapterSlot>> {
        self.check("find_next_template_in_chapter")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .slots
            .range((
                Bound::Excluded((chapter_id, after_index)),
                Bound::Included((chapter_id, i32::MAX)),
            ))
            .next()
            .map(|((chapter_id, order_index), template)| ChapterSlot {
                chapter_id: *chapter_id,
                order_index: *order_index,
                template: template.clone(),
            }))
    }

    async fn find_chapter(&self, chapter_id: Uuid) -> StoreResult<Option<Chapter>> {
        self.check("find_chapter")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner.chapters.iter().find(|c| c.id == chapter_id).cloned())
    }

    async fn find_next_active_chapter(&self, after_order: i32) -> StoreResult<Option<Chapter>> {
        self.check("find_next_active_chapter")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .chapters
            .iter()
            .filter(|c| c.is_active && c.order_index > after_order)
            .min_by_key(|c| c.order_index)
            .cloned())
    }

    async fn find_library_templates(
        &self,
        filters: &LibraryFilters,
    ) -> StoreResult<Vec<PromptTemplate>> {
        self.library_calls.fetch_add(1, Ordering::SeqCst);
        self.check("find_library_templates")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .library
            .iter()
            .filter(|t| filters.matches(t))
            .cloned()
            .collect())
    }

    async fn find_seen_template_ids(&self, user_id: &str) -> StoreResult<Vec<Uuid>> {
        self.check("find_seen_template_ids")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner.seen.get(user_id).cloned().unwrap_or_default())
    }

    async fn count_chapter_slots(&self, chapter_id: Uuid) -> StoreResult<i64> {
        self.check("count_chapter_slots")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner.slots.keys().filter(|(c, _)| *c == chapter_id).count() as i64)
    }

    async fn count_delivered_stories(
        &self,
        project_id: Uuid,
        chapter_id: Uuid,
    ) -> StoreResult<i64> {
        self.check("count_delivered_stories")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .stories
            .get(&(project_id, chapter_id))
            .copied()
            .unwrap_or(0))
    }

    async fn enqueue_chapter_summary(
        &self,
        project_id: Uuid,
        chapter_id: Uuid,
    ) -> StoreResult<()> {
        self.check("enqueue_chapter_summary")?;
        self.inner
            .lock()
            .unwrap()
            .summaries
            .insert((project_id, chapter_id));
        Ok(())
    }

    async fn record_assignment(&self, assignment: &ExperimentAssignment) -> StoreResult<()> {
        self.check("record_assignment")?;
        self.inner
            .lock()
            .unwrap()
            .assignments
            .push(assignment.clone());
        Ok(())
    }
}
