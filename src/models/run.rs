//! Pipeline run model — one execution of the review pipeline per engagement.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::RunStatus;

/// A due-diligence pipeline run. Exclusively owned and mutated by the
/// orchestrator; control commands only set the request flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub project_id: Uuid,
    pub status: RunStatus,
    pub current_stage: String,
    /// Completed stage ids in completion order. A stage reappears here if it
    /// is re-run after a resume truncated it.
    pub completed_stages: Vec<String>,
    /// Completed stage count over total stage count, integer 0-100.
    pub overall_progress: u8,
    pub last_error: Option<String>,
    pub pause_requested: bool,
    pub cancel_requested: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl PipelineRun {
    /// Whether `stage_id` is in the (non-truncated) completed set.
    pub fn has_completed(&self, stage_id: &str) -> bool {
        self.completed_stages.iter().any(|s| s == stage_id)
    }
}

/// Client-facing progress view (`GET /api/runs/:id/progress`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunProgress {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub current_stage: String,
    pub current_stage_name: String,
    pub completed_stages: Vec<String>,
    pub overall_progress: u8,
    pub last_error: Option<String>,
}
