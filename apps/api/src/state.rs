use std::sync::Arc;

use crate::selection::PromptEngine;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Store, generator, cache and experiments are all reached through the engine.
    pub engine: Arc<PromptEngine>,
}
