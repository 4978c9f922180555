//! Document classification worker.
//!
//! Rule-based folder assignment over file names. Deliberately deterministic:
//! re-classifying an already-classified corpus with identical input produces
//! identical folder assignments.

use super::{StageContext, StageOutput, StageWorker};
use crate::db::repository::document;
use crate::pipeline::error::WorkerError;
use crate::pipeline::stages;

/// (category, folder, trigger keywords), checked in order — first hit wins.
const RULES: &[(&str, &str, &[&str])] = &[
    (
        "corporate",
        "Corporate Structure",
        &[
            "articles", "bylaws", "charter", "incorporation", "shareholder",
            "register", "minutes", "resolution",
        ],
    ),
    (
        "financial",
        "Financial",
        &[
            "financial", "audit", "balance", "statement", "accounts", "tax",
            "annual_report",
        ],
    ),
    (
        "contract",
        "Contracts",
        &["agreement", "contract", "amendment", "lease", "spa", "nda", "supply"],
    ),
    (
        "legal",
        "Legal & Compliance",
        &[
            "litigation", "claim", "dispute", "compliance", "license", "permit",
            "judgment",
        ],
    ),
    (
        "employment",
        "Employment",
        &["employment", "payroll", "pension", "staff", "works_council"],
    ),
];

const MATCHED_CONFIDENCE: f64 = 0.9;
const FALLBACK_CONFIDENCE: f64 = 0.4;

pub struct ClassificationWorker;

impl ClassificationWorker {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClassificationWorker {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify one file name. Pure, so assignments cannot drift between runs.
pub fn classify_file_name(file_name: &str) -> (&'static str, &'static str, f64) {
    let lowered = file_name.to_lowercase();
    for (category, folder, keywords) in RULES {
        if keywords.iter().any(|kw| lowered.contains(kw)) {
            return (category, folder, MATCHED_CONFIDENCE);
        }
    }
    ("other", "Unsorted", FALLBACK_CONFIDENCE)
}

impl StageWorker for ClassificationWorker {
    fn stage_id(&self) -> &'static str {
        stages::DOCUMENT_CLASSIFICATION
    }

    fn execute(&self, ctx: &StageContext) -> Result<StageOutput, WorkerError> {
        let conn = ctx.open_db()?;
        let documents = document::list_documents(&conn, ctx.project_id)?;

        if documents.is_empty() {
            return Err(WorkerError::Fatal(
                "no documents uploaded for this project".to_string(),
            ));
        }

        let mut folder_counts: std::collections::BTreeMap<&str, u32> =
            std::collections::BTreeMap::new();
        for doc in &documents {
            let (category, folder, confidence) = classify_file_name(&doc.file_name);
            document::set_classification(&conn, doc.id, folder, category, confidence)?;
            *folder_counts.entry(folder).or_insert(0) += 1;
        }

        tracing::info!(
            run_id = %ctx.run_id,
            documents = documents.len(),
            "Classification complete"
        );

        Ok(StageOutput {
            summary: serde_json::json!({
                "documents_classified": documents.len(),
                "folders": folder_counts,
            }),
        })
    }
}
