//! Stage registry — the static catalog of pipeline stages.
//!
//! The ordinal sequence is a total order across the three phases
//! (pre_processing < processing < post_processing) and defines both the
//! execution order and the only valid resume targets.

use serde::Serialize;

use crate::models::StagePhase;

/// Static definition of one pipeline stage. Loaded at process start,
/// immutable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Stage {
    pub id: &'static str,
    pub name: &'static str,
    pub phase: StagePhase,
    pub ordinal: u8,
    /// Execution halts after this stage until its release condition holds.
    pub is_checkpoint: bool,
    /// Whether a user may restart the run at this stage.
    pub can_resume_from: bool,
    /// Worker model label, where a stage is model-backed.
    pub model: Option<&'static str>,
    pub description: &'static str,
}

pub const DOCUMENT_CLASSIFICATION: &str = "document_classification";
pub const READABILITY_CHECK: &str = "readability_check";
pub const ENTITY_MAPPING: &str = "entity_mapping";
pub const RISK_ANALYSIS: &str = "risk_analysis";
pub const FINDINGS_REVIEW: &str = "findings_review";
pub const REPORT_GENERATION: &str = "report_generation";

static STAGES: [Stage; 6] = [
    Stage {
        id: DOCUMENT_CLASSIFICATION,
        name: "Document classification",
        phase: StagePhase::PreProcessing,
        ordinal: 0,
        is_checkpoint: false,
        can_resume_from: true,
        model: Some("veridex-classify"),
        description: "Sort the uploaded corpus into review folders.",
    },
    Stage {
        id: READABILITY_CHECK,
        name: "Readability check",
        phase: StagePhase::PreProcessing,
        ordinal: 1,
        is_checkpoint: false,
        can_resume_from: false,
        model: None,
        description: "Verify each document yielded extractable text.",
    },
    Stage {
        id: ENTITY_MAPPING,
        name: "Entity mapping",
        phase: StagePhase::Processing,
        ordinal: 2,
        is_checkpoint: true,
        can_resume_from: true,
        model: Some("veridex-extract"),
        description: "Resolve per-document entity claims into the corporate structure graph. \
                      Conflicting relationship claims hold the run for adjudication.",
    },
    Stage {
        id: RISK_ANALYSIS,
        name: "Risk analysis",
        phase: StagePhase::Processing,
        ordinal: 3,
        is_checkpoint: false,
        can_resume_from: true,
        model: Some("veridex-analyze"),
        description: "Derive risk findings from the entity graph and corpus state.",
    },
    Stage {
        id: FINDINGS_REVIEW,
        name: "Findings review",
        phase: StagePhase::PostProcessing,
        ordinal: 4,
        is_checkpoint: true,
        can_resume_from: false,
        model: None,
        description: "Hold for reviewer sign-off on the assembled findings.",
    },
    Stage {
        id: REPORT_GENERATION,
        name: "Report generation",
        phase: StagePhase::PostProcessing,
        ordinal: 5,
        is_checkpoint: false,
        can_resume_from: true,
        model: None,
        description: "Enqueue report rendering; the run completes without waiting on it.",
    },
];

/// All stages in execution order.
pub fn all() -> &'static [Stage] {
    &STAGES
}

/// Total number of pipeline stages.
pub fn total() -> usize {
    STAGES.len()
}

/// The first stage of the pipeline.
pub fn first() -> &'static Stage {
    &STAGES[0]
}

/// Look up a stage by id.
pub fn stage(id: &str) -> Option<&'static Stage> {
    STAGES.iter().find(|s| s.id == id)
}

/// The stage after `id`, or `None` when `id` is terminal (or unknown).
pub fn next(id: &str) -> Option<&'static Stage> {
    let current = stage(id)?;
    STAGES.get(current.ordinal as usize + 1)
}

pub fn is_checkpoint(id: &str) -> bool {
    stage(id).map(|s| s.is_checkpoint).unwrap_or(false)
}

/// Completed-stage count mapped onto 0-100.
pub fn overall_progress(completed: usize) -> u8 {
    let completed = completed.min(total());
    ((completed * 100 + total() / 2) / total()) as u8
}
