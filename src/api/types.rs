//! Shared types for the review API layer.

use std::sync::Arc;

use crate::engine_state::EngineState;
use crate::pipeline::Orchestrator;

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub engine: Arc<EngineState>,
}

impl ApiContext {
    pub fn new(engine: Arc<EngineState>) -> Self {
        Self { engine }
    }

    /// Orchestrator facade over the shared engine state.
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.engine.clone())
    }
}
