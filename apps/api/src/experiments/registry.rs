use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::experiments::Experiment;

/// Experiments known to this process, keyed by id.
#[derive(Clone, Default)]
pub struct ExperimentRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<Experiment>>>>,
}

impl ExperimentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces an experiment. Replacing reshuffles assignments,
    /// which is only acceptable when the experiment's state is being cleared.
    pub fn register(&self, experiment: Experiment) -> Arc<Experiment> {
        let experiment = Arc::new(experiment);
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(experiment.id().to_string(), experiment.clone());
        experiment
    }

    pub fn get(&self, id: &str) -> Option<Arc<Experiment>> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned()
    }

    pub fn list(&self) -> Vec<Arc<Experiment>> {
        let mut all: Vec<_> = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all
    }
}
