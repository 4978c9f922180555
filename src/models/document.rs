//! Corpus models: projects, documents, findings, report jobs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{FindingSeverity, ReadabilityStatus, ReportJobStatus};

/// One due-diligence engagement. `target_name` is the company under review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub target_name: String,
    pub created_at: String,
}

/// Uploaded corpus metadata. Text extraction happens upstream; the pipeline
/// records only classification and readability outcomes here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub project_id: Uuid,
    pub file_name: String,
    pub folder: Option<String>,
    pub category: Option<String>,
    pub classification_confidence: Option<f64>,
    pub readability_status: ReadabilityStatus,
    pub readability_error: Option<String>,
    pub text_length: u64,
    pub created_at: String,
}

/// A risk finding surfaced by the analysis stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFinding {
    pub id: Uuid,
    pub run_id: Uuid,
    pub severity: FindingSeverity,
    pub title: String,
    pub detail: Option<String>,
    pub entity_id: Option<Uuid>,
    pub created_at: String,
}

/// Async report rendering job. The run completes without waiting on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportJob {
    pub id: Uuid,
    pub run_id: Uuid,
    pub status: ReportJobStatus,
    pub requested_at: String,
    pub completed_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_serde_round_trip() {
        let doc = Document {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            file_name: "share_purchase_agreement.pdf".to_string(),
            folder: Some("Contracts".to_string()),
            category: Some("contract".to_string()),
            classification_confidence: Some(0.92),
            readability_status: ReadabilityStatus::Ready,
            readability_error: None,
            text_length: 48_213,
            created_at: "2026-08-01T09:00:00Z".to_string(),
        };
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("\"readability_status\":\"ready\""));
        let parsed: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.file_name, doc.file_name);
    }
}
