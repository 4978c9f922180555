//! Stage worker contracts.
//!
//! Workers are trait objects injected into the executor, so the orchestration
//! core stays testable with mocks. A worker persists its own domain output
//! (folders, readability results, entity graph, findings) before returning;
//! the executor persists only control-plane state.

pub mod analysis;
pub mod classification;
pub mod entity_mapping;
pub mod readability;
pub mod report;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use super::error::WorkerError;

pub use analysis::{FindingsReviewWorker, RiskAnalysisWorker};
pub use classification::ClassificationWorker;
pub use entity_mapping::EntityMappingWorker;
pub use readability::ReadabilityWorker;
pub use report::ReportWorker;

/// Everything a worker needs to do its job. Workers open their own database
/// connection from `db_path` — stage execution happens on a blocking thread,
/// away from the orchestrator's connection.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub db_path: PathBuf,
    pub run_id: Uuid,
    pub project_id: Uuid,
    pub stage_id: &'static str,
}

impl StageContext {
    pub fn open_db(&self) -> Result<rusqlite::Connection, WorkerError> {
        crate::db::open_database(&self.db_path).map_err(WorkerError::from)
    }
}

/// Structured result of a stage invocation. The summary lands in the stage
/// artifact store and in the logs.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub summary: serde_json::Value,
}

/// One unit of pipeline work. Implementations must be idempotent: re-running
/// a stage on identical input must produce identical persisted output.
pub trait StageWorker: Send + Sync {
    fn stage_id(&self) -> &'static str;

    fn execute(&self, ctx: &StageContext) -> Result<StageOutput, WorkerError>;
}

/// Registry of workers keyed by stage id.
#[derive(Clone, Default)]
pub struct WorkerSet {
    workers: HashMap<&'static str, Arc<dyn StageWorker>>,
}

impl WorkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The production worker lineup, one per pipeline stage.
    pub fn builtin() -> Self {
        let mut set = Self::new();
        set.register(Arc::new(ClassificationWorker::new()));
        set.register(Arc::new(ReadabilityWorker::new()));
        set.register(Arc::new(EntityMappingWorker::new()));
        set.register(Arc::new(RiskAnalysisWorker::new()));
        set.register(Arc::new(FindingsReviewWorker::new()));
        set.register(Arc::new(ReportWorker::new()));
        set
    }

    pub fn register(&mut self, worker: Arc<dyn StageWorker>) {
        self.workers.insert(worker.stage_id(), worker);
    }

    pub fn get(&self, stage_id: &str) -> Option<Arc<dyn StageWorker>> {
        self.workers.get(stage_id).cloned()
    }
}
