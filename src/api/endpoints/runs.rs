//! Run control endpoints: start, progress, pause/resume/cancel,
//! resume-from-stage, checkpoint approval.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::repository::run as run_repo;
use crate::models::{PipelineRun, RunProgress};
use crate::pipeline::stages;

fn progress_view(run: PipelineRun) -> RunProgress {
    let current_stage_name = stages::stage(&run.current_stage)
        .map(|s| s.name)
        .unwrap_or("")
        .to_string();
    RunProgress {
        run_id: run.id,
        status: run.status,
        current_stage: run.current_stage,
        current_stage_name,
        completed_stages: run.completed_stages,
        overall_progress: run.overall_progress,
        last_error: run.last_error,
    }
}

#[derive(Deserialize)]
pub struct CreateRunRequest {
    pub project_id: Uuid,
}

/// `POST /api/runs` — create a run for a project and start it.
pub async fn create_and_start(
    State(ctx): State<ApiContext>,
    Json(payload): Json<CreateRunRequest>,
) -> Result<Json<RunProgress>, ApiError> {
    let conn = ctx.engine.open_db()?;
    // Reject unknown projects before creating anything.
    crate::db::repository::document::get_project(&conn, payload.project_id)?;

    let run = run_repo::create_run(&conn, payload.project_id)?;
    drop(conn);

    let started = ctx.orchestrator().start(run.id).await?;
    Ok(Json(progress_view(started)))
}

/// `GET /api/runs/:id/progress` — poll pipeline progress.
pub async fn progress(
    State(ctx): State<ApiContext>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<RunProgress>, ApiError> {
    let conn = ctx.engine.open_db()?;
    let run = run_repo::get_run(&conn, run_id)?;
    Ok(Json(progress_view(run)))
}

#[derive(Serialize)]
pub struct CommandAccepted {
    pub accepted: bool,
}

/// `POST /api/runs/:id/pause` — takes effect at the next stage boundary.
pub async fn pause(
    State(ctx): State<ApiContext>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<CommandAccepted>, ApiError> {
    ctx.orchestrator().pause(run_id).await?;
    Ok(Json(CommandAccepted { accepted: true }))
}

/// `POST /api/runs/:id/resume` — continue a paused run.
pub async fn resume(
    State(ctx): State<ApiContext>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<RunProgress>, ApiError> {
    let run = ctx.orchestrator().resume(run_id).await?;
    Ok(Json(progress_view(run)))
}

/// `POST /api/runs/:id/cancel` — in-flight stage finishes, nothing further
/// is scheduled.
pub async fn cancel(
    State(ctx): State<ApiContext>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<CommandAccepted>, ApiError> {
    ctx.orchestrator().cancel(run_id).await?;
    Ok(Json(CommandAccepted { accepted: true }))
}

/// `POST /api/runs/:id/resume-from/:stage_id` — truncate and re-queue.
pub async fn resume_from_stage(
    State(ctx): State<ApiContext>,
    Path((run_id, stage_id)): Path<(Uuid, String)>,
) -> Result<Json<RunProgress>, ApiError> {
    let run = ctx
        .orchestrator()
        .resume_from_stage(run_id, &stage_id)
        .await?;
    Ok(Json(progress_view(run)))
}

/// `POST /api/runs/:id/checkpoint/approve` — release the checkpoint the run
/// is waiting at, if its release condition holds.
pub async fn approve_checkpoint(
    State(ctx): State<ApiContext>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<RunProgress>, ApiError> {
    let run = ctx.orchestrator().release_checkpoint(run_id).await?;
    Ok(Json(progress_view(run)))
}
