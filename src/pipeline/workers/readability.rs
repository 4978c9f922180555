//! Readability check worker.
//!
//! Text extraction happens upstream; this stage verifies the outcome per
//! document and records a corpus summary. Unreadable documents are recorded,
//! not fatal — the analysis stage surfaces them as findings.

use super::{StageContext, StageOutput, StageWorker};
use crate::db::repository::document;
use crate::models::ReadabilityStatus;
use crate::pipeline::error::WorkerError;
use crate::pipeline::stages;

pub struct ReadabilityWorker;

impl ReadabilityWorker {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ReadabilityWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageWorker for ReadabilityWorker {
    fn stage_id(&self) -> &'static str {
        stages::READABILITY_CHECK
    }

    fn execute(&self, ctx: &StageContext) -> Result<StageOutput, WorkerError> {
        let conn = ctx.open_db()?;
        let documents = document::list_documents(&conn, ctx.project_id)?;

        let mut ready = 0u32;
        let mut failed = 0u32;
        for doc in &documents {
            if doc.text_length > 0 {
                document::set_readability(&conn, doc.id, ReadabilityStatus::Ready, None)?;
                ready += 1;
            } else {
                document::set_readability(
                    &conn,
                    doc.id,
                    ReadabilityStatus::Failed,
                    Some("no extractable text"),
                )?;
                failed += 1;
            }
        }

        tracing::info!(run_id = %ctx.run_id, ready, failed, "Readability check complete");

        Ok(StageOutput {
            summary: serde_json::json!({
                "total": documents.len(),
                "ready": ready,
                "failed": failed,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::document::{insert_documents, insert_project, list_documents};
    use crate::db::repository::now_utc;
    use crate::db::sqlite::open_database;
    use crate::models::{Document, Project};
    use uuid::Uuid;

    fn setup_corpus() -> (tempfile::TempDir, StageContext) {
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

        let make_doc = |name: &str, len: u64| Document {
            id: Uuid::new_v4(),
            project_id: project.id,
            file_name: name.to_string(),
            folder: None,
            category: None,
            classification_confidence: None,
            readability_status: ReadabilityStatus::Pending,
            readability_error: None,
            text_length: len,
            created_at: now_utc(),
        };
        insert_documents(
            &conn,
            &[make_doc("a.pdf", 1200), make_doc("b.pdf", 900), make_doc("scan.pdf", 0)],
        )
        .unwrap();

        let ctx = StageContext {
            db_path,
            run_id: Uuid::new_v4(),
            project_id: project.id,
            stage_id: stages::READABILITY_CHECK,
        };
        (dir, ctx)
    }

    #[test]
    fn marks_ready_and_failed_documents() {
        let (_dir, ctx) = setup_corpus();
        let output = ReadabilityWorker::new().execute(&ctx).unwrap();

        assert_eq!(output.summary["ready"], 2);
        assert_eq!(output.summary["failed"], 1);

        let conn = ctx.open_db().unwrap();
        let docs = list_documents(&conn, ctx.project_id).unwrap();
        let failed: Vec<_> = docs
            .iter()
            .filter(|d| d.readability_status == ReadabilityStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].readability_error.as_deref(), Some("no extractable text"));
    }

    #[test]
    fn rerun_produces_identical_results() {
        let (_dir, ctx) = setup_corpus();
        let worker = ReadabilityWorker::new();
        let first = worker.execute(&ctx).unwrap();
        let second = worker.execute(&ctx).unwrap();
        assert_eq!(first.summary, second.summary);
    }
}
