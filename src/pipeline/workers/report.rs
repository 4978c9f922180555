//! Report generation worker.
//!
//! Rendering is an external concern. This stage enqueues a report job with
//! the run's accumulated output and returns; the run completes without
//! waiting, and the job is tracked by its own status.

use super::{StageContext, StageOutput, StageWorker};
use crate::db::repository::artifact;
use crate::pipeline::error::WorkerError;
use crate::pipeline::stages;

pub struct ReportWorker;

impl ReportWorker {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ReportWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageWorker for ReportWorker {
    fn stage_id(&self) -> &'static str {
        stages::REPORT_GENERATION
    }

    fn execute(&self, ctx: &StageContext) -> Result<StageOutput, WorkerError> {
        let conn = ctx.open_db()?;
        let job = artifact::enqueue_report_job(&conn, ctx.run_id)?;

        let summary = serde_json::json!({
            "report_job_id": job.id,
            "status": job.status.as_str(),
        });
        artifact::put_artifact(&conn, ctx.run_id, stages::REPORT_GENERATION, &summary)?;

        tracing::info!(run_id = %ctx.run_id, job_id = %job.id, "Report job enqueued");

        Ok(StageOutput { summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::document::insert_project;
    use crate::db::repository::now_utc;
    use crate::db::sqlite::open_database;
    use crate::models::{Project, ReportJobStatus};
    use uuid::Uuid;

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
        let run = crate::db::repository::run::create_run(&conn, project.id).unwrap();

        let ctx = StageContext {
            db_path,
            run_id: run.id,
            project_id: project.id,
            stage_id: stages::REPORT_GENERATION,
        };
        (dir, ctx)
    }

    #[test]
    fn enqueues_a_job_without_blocking() {
        let (_dir, ctx) = setup();
        ReportWorker::new().execute(&ctx).unwrap();

        let conn = ctx.open_db().unwrap();
        let job = artifact::get_report_job(&conn, ctx.run_id).unwrap().unwrap();
        assert_eq!(job.status, ReportJobStatus::Queued);
    }

    #[test]
    fn rerun_supersedes_queued_job() {
        let (_dir, ctx) = setup();
        let worker = ReportWorker::new();
        worker.execute(&ctx).unwrap();
        worker.execute(&ctx).unwrap();

        let conn = ctx.open_db().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM report_jobs WHERE run_id = ?1",
                rusqlite::params![ctx.run_id.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
