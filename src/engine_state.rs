//! Transport-agnostic engine state.
//!
//! `EngineState` is the single shared state between the HTTP API and the
//! orchestrator's per-run tasks: database location, the process's lease
//! holder identity, the worker registry, and the in-memory run handles
//! carrying each run's serialization lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::pipeline::executor::PipelineConfig;
use crate::pipeline::workers::{StageWorker, WorkerSet};

/// Per-run in-process state.
///
/// `gate` serializes stage execution with control-plane reads and entity
/// confirmations; `loop_active` tells control commands whether an
/// orchestrator loop is currently driving the run.
pub struct RunHandle {
    pub gate: tokio::sync::Mutex<()>,
    pub loop_active: AtomicBool,
}

impl RunHandle {
    fn new() -> Self {
        Self {
            gate: tokio::sync::Mutex::new(()),
            loop_active: AtomicBool::new(false),
        }
    }
}

pub struct EngineState {
    db_path: PathBuf,
    /// Process-unique lease holder id.
    holder_id: String,
    config: PipelineConfig,
    workers: WorkerSet,
    runs: RwLock<HashMap<Uuid, Arc<RunHandle>>>,
}

impl EngineState {
    /// Production state: built-in workers, default tunables.
    pub fn new(db_path: PathBuf) -> Self {
        Self::with_workers(db_path, WorkerSet::builtin(), PipelineConfig::default())
    }

    /// Custom worker lineup and tunables (tests swap in mocks here).
    pub fn with_workers(db_path: PathBuf, workers: WorkerSet, config: PipelineConfig) -> Self {
        Self {
            db_path,
            holder_id: format!("veridex-{}", Uuid::new_v4()),
            config,
            workers,
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// Open a database connection. Each task opens its own; SQLite's WAL mode
    /// keeps readers and the single writer out of each other's way.
    pub fn open_db(&self) -> Result<rusqlite::Connection, DatabaseError> {
        db::open_database(&self.db_path)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn worker(&self, stage_id: &str) -> Option<Arc<dyn StageWorker>> {
        self.workers.get(stage_id)
    }

    /// Get or create the in-memory handle for a run.
    pub fn run_handle(&self, run_id: Uuid) -> Arc<RunHandle> {
        {
            let runs = self.runs.read().expect("run registry lock");
            if let Some(handle) = runs.get(&run_id) {
                return handle.clone();
            }
        }
        let mut runs = self.runs.write().expect("run registry lock");
        runs.entry(run_id)
            .or_insert_with(|| Arc::new(RunHandle::new()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holder_ids_are_process_unique() {
        let a = EngineState::new(PathBuf::from("/tmp/a.db"));
        let b = EngineState::new(PathBuf::from("/tmp/b.db"));
        assert_ne!(a.holder_id(), b.holder_id());
        assert!(a.holder_id().starts_with("veridex-"));
    }

    #[test]
    fn run_handles_are_stable_per_run() {
        let state = EngineState::new(PathBuf::from("/tmp/a.db"));
        let run_id = Uuid::new_v4();
        let first = state.run_handle(run_id);
        let second = state.run_handle(run_id);
        assert!(Arc::ptr_eq(&first, &second));

        let other = state.run_handle(Uuid::new_v4());
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn builtin_workers_resolve_by_stage() {
        let state = EngineState::new(PathBuf::from("/tmp/a.db"));
        assert!(state.worker(crate::pipeline::stages::ENTITY_MAPPING).is_some());
        assert!(state.worker("nonexistent").is_none());
    }
}
