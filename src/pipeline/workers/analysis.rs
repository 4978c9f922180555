//! Risk analysis and findings review workers.
//!
//! Analysis derives findings from the resolved entity graph and corpus state.
//! Findings review is a human gate: its worker only assembles the review
//! packet — the halt itself is checkpoint semantics in the orchestrator.

use uuid::Uuid;

use super::{StageContext, StageOutput, StageWorker};
use crate::db::repository::{artifact, document, entity, now_utc};
use crate::models::{
    EntityRecord, EntityRelationship, FindingSeverity, ReadabilityStatus, RiskFinding,
};
use crate::pipeline::error::WorkerError;
use crate::pipeline::stages;

/// Ownership at or above this share is a control position.
const CONTROL_THRESHOLD: f64 = 50.0;

/// Entity confidence below this is flagged for a second look.
const LOW_CONFIDENCE: f64 = 0.5;

pub struct RiskAnalysisWorker;

impl RiskAnalysisWorker {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RiskAnalysisWorker {
    fn default() -> Self {
        Self::new()
    }
}

fn finding(
    run_id: Uuid,
    severity: FindingSeverity,
    title: String,
    detail: Option<String>,
    entity_id: Option<Uuid>,
) -> RiskFinding {
    RiskFinding {
        id: Uuid::new_v4(),
        run_id,
        severity,
        title,
        detail,
        entity_id,
        created_at: now_utc(),
    }
}

/// Rule-based findings over one entity record.
fn entity_findings(run_id: Uuid, record: &EntityRecord) -> Vec<RiskFinding> {
    let mut findings = Vec::new();

    if record.ownership_percent.unwrap_or(0.0) >= CONTROL_THRESHOLD
        && record.registration_number.is_none()
    {
        findings.push(finding(
            run_id,
            FindingSeverity::High,
            format!("Control position in '{}' lacks a registration number", record.entity_name),
            Some(format!(
                "Ownership of {:.1}% is claimed without a corporate registry reference.",
                record.ownership_percent.unwrap_or(0.0)
            )),
            Some(record.id),
        ));
    }

    if record.confidence < LOW_CONFIDENCE {
        findings.push(finding(
            run_id,
            FindingSeverity::Medium,
            format!("Low-confidence resolution for '{}'", record.entity_name),
            Some(format!("Best extraction confidence was {:.2}.", record.confidence)),
            Some(record.id),
        ));
    }

    if record.relationship == EntityRelationship::RelatedParty {
        findings.push(finding(
            run_id,
            FindingSeverity::Medium,
            format!("Related-party dealings with '{}'", record.entity_name),
            Some("Related-party relationships require disclosure review.".to_string()),
            Some(record.id),
        ));
    }

    findings
}

impl StageWorker for RiskAnalysisWorker {
    fn stage_id(&self) -> &'static str {
        stages::RISK_ANALYSIS
    }

    fn execute(&self, ctx: &StageContext) -> Result<StageOutput, WorkerError> {
        let conn = ctx.open_db()?;
        let records = entity::list_entities(&conn, ctx.run_id)?;
        let documents = document::list_documents(&conn, ctx.project_id)?;

        let mut findings: Vec<RiskFinding> = records
            .iter()
            .flat_map(|record| entity_findings(ctx.run_id, record))
            .collect();

        let unreadable = documents
            .iter()
            .filter(|d| d.readability_status == ReadabilityStatus::Failed)
            .count();
        if unreadable > 0 {
            findings.push(finding(
                ctx.run_id,
                FindingSeverity::High,
                format!("{unreadable} document(s) could not be read"),
                Some("Unreadable documents leave blind spots in the review.".to_string()),
                None,
            ));
        }

        artifact::replace_findings(&conn, ctx.run_id, &findings)?;

        let high_or_critical = findings
            .iter()
            .filter(|f| {
                matches!(f.severity, FindingSeverity::High | FindingSeverity::Critical)
            })
            .count();
        let summary = serde_json::json!({
            "findings": findings.len(),
            "high_or_critical": high_or_critical,
            "entities_analyzed": records.len(),
        });
        artifact::put_artifact(&conn, ctx.run_id, stages::RISK_ANALYSIS, &summary)?;

        tracing::info!(
            run_id = %ctx.run_id,
            findings = findings.len(),
            high_or_critical,
            "Risk analysis complete"
        );

        Ok(StageOutput { summary })
    }
}

// ═══════════════════════════════════════════
// Findings review
// ═══════════════════════════════════════════

pub struct FindingsReviewWorker;

impl FindingsReviewWorker {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FindingsReviewWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageWorker for FindingsReviewWorker {
    fn stage_id(&self) -> &'static str {
        stages::FINDINGS_REVIEW
    }

    fn execute(&self, ctx: &StageContext) -> Result<StageOutput, WorkerError> {
        let conn = ctx.open_db()?;
        let findings = artifact::list_findings(&conn, ctx.run_id)?;
        let entities = entity::list_entities(&conn, ctx.run_id)?;

        let summary = serde_json::json!({
            "findings_total": findings.len(),
            "entities_total": entities.len(),
            "awaiting_signoff": true,
        });
        artifact::put_artifact(&conn, ctx.run_id, stages::FINDINGS_REVIEW, &summary)?;

        Ok(StageOutput { summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::document::{insert_documents, insert_project};
    use crate::db::sqlite::open_database;
    use crate::models::{Document, Project};

    fn setup() -> (tempfile::TempDir, StageContext) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("veridex.db");
        let conn = open_database(&db_path).unwrap();

        let project = Project {
            id: Uuid::new_v4(),
            name: "P".to_string(),
            target_name: "T".to_string(),
            created_at: now_utc(),
        };
        insert_project(&conn, &project).unwrap();

        // Run rows are needed for the entity/finding foreign keys.
        let run = crate::db::repository::run::create_run(&conn, project.id).unwrap();

        insert_documents(
            &conn,
            &[Document {
                id: Uuid::new_v4(),
                project_id: project.id,
                file_name: "scan.pdf".to_string(),
                folder: None,
                category: None,
                classification_confidence: None,
                readability_status: ReadabilityStatus::Failed,
                readability_error: Some("no extractable text".to_string()),
                text_length: 0,
                created_at: now_utc(),
            }],
        )
        .unwrap();

        let ctx = StageContext {
            db_path,
            run_id: run.id,
            project_id: project.id,
            stage_id: stages::RISK_ANALYSIS,
        };
        (dir, ctx)
    }

    fn entity(run_id: Uuid, name: &str, ownership: Option<f64>, confidence: f64) -> EntityRecord {
        EntityRecord {
            id: Uuid::new_v4(),
            run_id,
            entity_name: name.to_string(),
            registration_number: None,
            relationship: EntityRelationship::Subsidiary,
            relationship_detail: None,
            ownership_percent: ownership,
            confidence,
            source_document_ids: vec![],
            evidence: None,
            conflict_flag: false,
            conflict_detail: None,
            human_confirmed: false,
            created_at: now_utc(),
            updated_at: now_utc(),
        }
    }

    #[test]
    fn control_without_registration_is_flagged_high() {
        let (_dir, ctx) = setup();
        let conn = ctx.open_db().unwrap();
        entity::replace_run_entities(
            &conn,
            ctx.run_id,
            &[entity(ctx.run_id, "Acme Ltd", Some(80.0), 0.9)],
        )
        .unwrap();

        RiskAnalysisWorker::new().execute(&ctx).unwrap();

        let findings = artifact::list_findings(&conn, ctx.run_id).unwrap();
        assert!(findings
            .iter()
            .any(|f| f.severity == FindingSeverity::High && f.title.contains("Acme Ltd")));
    }

    #[test]
    fn unreadable_documents_surface_as_finding() {
        let (_dir, ctx) = setup();
        RiskAnalysisWorker::new().execute(&ctx).unwrap();

        let conn = ctx.open_db().unwrap();
        let findings = artifact::list_findings(&conn, ctx.run_id).unwrap();
        assert!(findings.iter().any(|f| f.title.contains("could not be read")));
    }

    #[test]
    fn low_confidence_entity_is_flagged() {
        let (_dir, ctx) = setup();
        let conn = ctx.open_db().unwrap();
        entity::replace_run_entities(
            &conn,
            ctx.run_id,
            &[entity(ctx.run_id, "Shadow Corp", None, 0.3)],
        )
        .unwrap();

        let output = RiskAnalysisWorker::new().execute(&ctx).unwrap();
        assert!(output.summary["findings"].as_u64().unwrap() >= 1);

        let findings = artifact::list_findings(&conn, ctx.run_id).unwrap();
        assert!(findings.iter().any(|f| f.title.contains("Low-confidence")));
    }

    #[test]
    fn rerun_replaces_findings() {
        let (_dir, ctx) = setup();
        let worker = RiskAnalysisWorker::new();
        worker.execute(&ctx).unwrap();
        worker.execute(&ctx).unwrap();

        let conn = ctx.open_db().unwrap();
        let findings = artifact::list_findings(&conn, ctx.run_id).unwrap();
        assert_eq!(findings.len(), 1, "findings must not accumulate across re-runs");
    }

    #[test]
    fn findings_review_assembles_packet() {
        let (_dir, ctx) = setup();
        RiskAnalysisWorker::new().execute(&ctx).unwrap();

        let review_ctx = StageContext {
            stage_id: stages::FINDINGS_REVIEW,
            ..ctx.clone()
        };
        let output = FindingsReviewWorker::new().execute(&review_ctx).unwrap();
        assert_eq!(output.summary["findings_total"], 1);
        assert_eq!(output.summary["awaiting_signoff"], true);
    }
}
