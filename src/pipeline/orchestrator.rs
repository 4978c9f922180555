//! Orchestrator — the run state machine and its per-run control loop.
//!
//! Each run is driven by at most one loop task at a time. The loop holds the
//! run's lease and its in-process gate for the duration of a stage execution;
//! control commands (pause/cancel) only set flags that the loop reads at the
//! next stage boundary, so an in-flight stage always finishes. Checkpoint
//! semantics beat a pending pause at the same boundary.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use rusqlite::Connection;
use uuid::Uuid;

use crate::db::repository::{artifact, entity, lease, run as run_repo};
use crate::db::repository::lease::LeaseAcquire;
use crate::engine_state::{EngineState, RunHandle};
use crate::models::{EntityRecord, EntityRelationship, PipelineRun, RunStatus};

use super::error::PipelineError;
use super::executor::{StageExecutor, StageOutcome};
use super::stages::{self, Stage};
use super::workers::StageContext;

pub struct Orchestrator {
    state: Arc<EngineState>,
}

impl Orchestrator {
    pub fn new(state: Arc<EngineState>) -> Self {
        Self { state }
    }

    // ── Control commands ────────────────────────────────────

    /// `not_started → processing`: acquire the lease and begin executing
    /// from the first stage.
    pub async fn start(&self, run_id: Uuid) -> Result<PipelineRun, PipelineError> {
        let handle = self.state.run_handle(run_id);
        let _gate = handle.gate.lock().await;
        let conn = self.state.open_db()?;

        let run = run_repo::get_run(&conn, run_id)?;
        if run.status != RunStatus::NotStarted {
            return Err(PipelineError::InvalidTransition(format!(
                "cannot start a run in status '{}'",
                run.status
            )));
        }

        self.acquire_lease(&conn, run_id)?;
        run_repo::set_status(&conn, run_id, RunStatus::Processing)?;
        self.spawn_loop(run_id, &handle);

        run_repo::get_run(&conn, run_id).map_err(Into::into)
    }

    /// Request a pause. Valid only while `processing`; takes effect at the
    /// next stage boundary — the in-flight stage finishes first.
    pub async fn pause(&self, run_id: Uuid) -> Result<(), PipelineError> {
        let conn = self.state.open_db()?;
        let run = run_repo::get_run(&conn, run_id)?;
        if run.status != RunStatus::Processing {
            return Err(PipelineError::InvalidTransition(format!(
                "cannot pause a run in status '{}'",
                run.status
            )));
        }
        run_repo::set_pause_requested(&conn, run_id, true)?;
        tracing::info!(run_id = %run_id, "Pause requested");
        Ok(())
    }

    /// `paused → processing`, continuing from `current_stage`.
    pub async fn resume(&self, run_id: Uuid) -> Result<PipelineRun, PipelineError> {
        let handle = self.state.run_handle(run_id);
        let _gate = handle.gate.lock().await;
        let conn = self.state.open_db()?;

        let run = run_repo::get_run(&conn, run_id)?;
        if run.status != RunStatus::Paused {
            return Err(PipelineError::InvalidTransition(format!(
                "cannot resume a run in status '{}'",
                run.status
            )));
        }

        self.acquire_lease(&conn, run_id)?;
        run_repo::set_status(&conn, run_id, RunStatus::Processing)?;
        self.spawn_loop(run_id, &handle);

        run_repo::get_run(&conn, run_id).map_err(Into::into)
    }

    /// Restart the run at an earlier stage, truncating the completion log
    /// and invalidating every artifact the truncated stages produced.
    pub async fn resume_from_stage(
        &self,
        run_id: Uuid,
        stage_id: &str,
    ) -> Result<PipelineRun, PipelineError> {
        let stage = stages::stage(stage_id)
            .ok_or_else(|| PipelineError::Validation(format!("unknown stage '{stage_id}'")))?;
        if !stage.can_resume_from {
            return Err(PipelineError::InvalidStage(stage_id.to_string()));
        }

        let handle = self.state.run_handle(run_id);
        let _gate = handle.gate.lock().await;
        let conn = self.state.open_db()?;

        let run = run_repo::get_run(&conn, run_id)?;
        if run.status.is_terminal() {
            return Err(PipelineError::InvalidTransition(format!(
                "cannot resume a run in status '{}'",
                run.status
            )));
        }

        // Unresolved entity conflicts gate everything downstream of the
        // entity-mapping checkpoint. Resuming at or before the checkpoint is
        // allowed: the truncation below discards the conflicted graph.
        let entity_stage = stages::stage(stages::ENTITY_MAPPING).expect("catalog stage");
        if stage.ordinal > entity_stage.ordinal {
            let unresolved = entity::unresolved_conflict_count(&conn, run_id)?;
            if unresolved > 0 {
                return Err(PipelineError::ConflictsPending { unresolved });
            }
        }

        invalidate_truncated_outputs(&conn, run_id, stage)?;
        run_repo::truncate_to(&conn, run_id, stage_id)?;

        if handle.loop_active.load(Ordering::SeqCst) {
            // An active loop picks up the new current_stage at its next
            // boundary; nothing else to do.
            run_repo::set_status(&conn, run_id, RunStatus::Processing)?;
        } else {
            self.acquire_lease(&conn, run_id)?;
            run_repo::set_status(&conn, run_id, RunStatus::Processing)?;
            self.spawn_loop(run_id, &handle);
        }

        tracing::info!(run_id = %run_id, stage = stage_id, "Resumed from stage");
        run_repo::get_run(&conn, run_id).map_err(Into::into)
    }

    /// Cancel from any non-terminal status. An in-flight stage finishes; no
    /// further stage is scheduled after it returns.
    pub async fn cancel(&self, run_id: Uuid) -> Result<(), PipelineError> {
        let handle = self.state.run_handle(run_id);
        let conn = self.state.open_db()?;

        let run = run_repo::get_run(&conn, run_id)?;
        if run.status.is_terminal() {
            return Err(PipelineError::InvalidTransition(format!(
                "cannot cancel a run in status '{}'",
                run.status
            )));
        }

        if handle.loop_active.load(Ordering::SeqCst) {
            run_repo::set_cancel_requested(&conn, run_id, true)?;
            tracing::info!(run_id = %run_id, "Cancel requested, effective at next stage boundary");
        } else {
            let _gate = handle.gate.lock().await;
            run_repo::set_status(&conn, run_id, RunStatus::Cancelled)?;
            run_repo::set_pause_requested(&conn, run_id, false)?;
            run_repo::set_cancel_requested(&conn, run_id, false)?;
            lease::release(&conn, run_id, self.state.holder_id())?;
            tracing::info!(run_id = %run_id, "Run cancelled");
        }
        Ok(())
    }

    /// Release a checkpoint whose condition holds: zero unresolved conflicts
    /// for entity mapping, an explicit approval (this call) otherwise.
    pub async fn release_checkpoint(&self, run_id: Uuid) -> Result<PipelineRun, PipelineError> {
        let handle = self.state.run_handle(run_id);
        let _gate = handle.gate.lock().await;
        let conn = self.state.open_db()?;

        let run = run_repo::get_run(&conn, run_id)?;
        if run.status != RunStatus::AwaitingCheckpoint {
            return Err(PipelineError::InvalidTransition(format!(
                "cannot release a checkpoint in status '{}'",
                run.status
            )));
        }
        let stage = stages::stage(&run.current_stage).ok_or_else(|| {
            PipelineError::Validation(format!("unknown stage '{}'", run.current_stage))
        })?;
        if !stage.is_checkpoint {
            return Err(PipelineError::InvalidTransition(format!(
                "stage '{}' is not a checkpoint",
                stage.id
            )));
        }

        if stage.id == stages::ENTITY_MAPPING {
            let unresolved = entity::unresolved_conflict_count(&conn, run_id)?;
            if unresolved > 0 {
                return Err(PipelineError::ConflictsPending { unresolved });
            }
        }

        self.advance_past_checkpoint(&conn, run_id, stage, &handle)?;
        run_repo::get_run(&conn, run_id).map_err(Into::into)
    }

    /// Human adjudication of a conflicting entity relationship. Serialized
    /// with stage execution through the run gate, so the checkpoint-release
    /// check cannot race a confirmation. When the last conflict clears while
    /// the run waits at the entity-mapping checkpoint, the gate releases
    /// automatically.
    pub async fn confirm_relationship(
        &self,
        run_id: Uuid,
        entity_id: Uuid,
        relationship: EntityRelationship,
        detail: Option<&str>,
    ) -> Result<EntityRecord, PipelineError> {
        let handle = self.state.run_handle(run_id);
        let _gate = handle.gate.lock().await;
        let conn = self.state.open_db()?;

        let run = run_repo::get_run(&conn, run_id)?;
        let record = entity::confirm_relationship(&conn, run_id, entity_id, relationship, detail)?;

        tracing::info!(
            run_id = %run_id,
            entity_id = %entity_id,
            relationship = relationship.as_str(),
            "Entity relationship confirmed"
        );

        if run.status == RunStatus::AwaitingCheckpoint
            && run.current_stage == stages::ENTITY_MAPPING
            && entity::unresolved_conflict_count(&conn, run_id)? == 0
        {
            let stage = stages::stage(stages::ENTITY_MAPPING).expect("catalog stage");
            self.advance_past_checkpoint(&conn, run_id, stage, &handle)?;
            tracing::info!(run_id = %run_id, "All conflicts resolved, checkpoint released");
        }

        Ok(record)
    }

    /// Crash recovery: re-enter runs left `processing` whose lease is gone
    /// or expired. Runs held by a live holder are left alone.
    pub fn recover_interrupted(&self) -> Result<usize, PipelineError> {
        let conn = self.state.open_db()?;
        let stuck = run_repo::list_processing_runs(&conn)?;

        let mut recovered = 0;
        for run in stuck {
            match lease::get(&conn, run.id)? {
                Some(l) if !l.is_expired() && l.holder != self.state.holder_id() => {
                    tracing::debug!(run_id = %run.id, holder = %l.holder, "Run held elsewhere, skipping");
                }
                _ => {
                    let handle = self.state.run_handle(run.id);
                    if !handle.loop_active.load(Ordering::SeqCst) {
                        tracing::info!(
                            run_id = %run.id,
                            stage = %run.current_stage,
                            "Recovering interrupted run"
                        );
                        self.spawn_loop(run.id, &handle);
                        recovered += 1;
                    }
                }
            }
        }
        Ok(recovered)
    }

    // ── Internals ───────────────────────────────────────────

    fn acquire_lease(&self, conn: &Connection, run_id: Uuid) -> Result<(), PipelineError> {
        match lease::acquire(
            conn,
            run_id,
            self.state.holder_id(),
            self.state.config().lease_ttl_secs,
        )? {
            LeaseAcquire::Acquired => Ok(()),
            LeaseAcquire::Held { holder } => Err(PipelineError::LeaseConflict { holder }),
        }
    }

    /// Move `current_stage` past a released checkpoint and restart the loop.
    /// Caller holds the gate.
    fn advance_past_checkpoint(
        &self,
        conn: &Connection,
        run_id: Uuid,
        stage: &'static Stage,
        handle: &Arc<RunHandle>,
    ) -> Result<(), PipelineError> {
        let next = stages::next(stage.id).ok_or_else(|| {
            PipelineError::Validation(format!("checkpoint '{}' has no next stage", stage.id))
        })?;

        self.acquire_lease(conn, run_id)?;
        run_repo::set_current_stage(conn, run_id, next.id)?;
        run_repo::set_status(conn, run_id, RunStatus::Processing)?;
        if !handle.loop_active.load(Ordering::SeqCst) {
            self.spawn_loop(run_id, handle);
        }
        Ok(())
    }

    fn spawn_loop(&self, run_id: Uuid, handle: &Arc<RunHandle>) {
        if handle.loop_active.swap(true, Ordering::SeqCst) {
            return; // already driven
        }
        let state = self.state.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            let result = run_loop(state, run_id, handle.clone()).await;
            handle.loop_active.store(false, Ordering::SeqCst);
            if let Err(e) = result {
                tracing::error!(run_id = %run_id, error = %e, "Run loop aborted");
            }
        });
    }
}

/// The per-run control loop. One iteration = one stage boundary check plus
/// at most one stage execution, all under the run gate.
async fn run_loop(
    state: Arc<EngineState>,
    run_id: Uuid,
    handle: Arc<RunHandle>,
) -> Result<(), PipelineError> {
    let conn = state.open_db()?;
    let holder = state.holder_id().to_string();
    let ttl = state.config().lease_ttl_secs;

    match lease::acquire(&conn, run_id, &holder, ttl)? {
        LeaseAcquire::Acquired => {}
        LeaseAcquire::Held { holder } => {
            return Err(PipelineError::LeaseConflict { holder });
        }
    }

    let executor = StageExecutor::new(state.config().clone());

    loop {
        let _gate = handle.gate.lock().await;
        let run = run_repo::get_run(&conn, run_id)?;

        if run.status != RunStatus::Processing {
            // A control command finalized the run between iterations.
            lease::release(&conn, run_id, &holder)?;
            return Ok(());
        }

        if run.cancel_requested {
            run_repo::set_status(&conn, run_id, RunStatus::Cancelled)?;
            run_repo::set_cancel_requested(&conn, run_id, false)?;
            run_repo::set_pause_requested(&conn, run_id, false)?;
            lease::release(&conn, run_id, &holder)?;
            tracing::info!(run_id = %run_id, "Run cancelled at stage boundary");
            return Ok(());
        }

        if run.pause_requested {
            run_repo::set_status(&conn, run_id, RunStatus::Paused)?;
            run_repo::set_pause_requested(&conn, run_id, false)?;
            lease::release(&conn, run_id, &holder)?;
            tracing::info!(run_id = %run_id, stage = %run.current_stage, "Run paused");
            return Ok(());
        }

        let stage = stages::stage(&run.current_stage).ok_or_else(|| {
            PipelineError::Validation(format!("unknown stage '{}'", run.current_stage))
        })?;
        let worker = state.worker(stage.id).ok_or_else(|| {
            PipelineError::Validation(format!("no worker registered for stage '{}'", stage.id))
        })?;

        lease::renew(&conn, run_id, &holder, ttl)?;
        tracing::info!(run_id = %run_id, stage = stage.id, "Executing stage");

        let ctx = StageContext {
            db_path: state.db_path().to_path_buf(),
            run_id,
            project_id: run.project_id,
            stage_id: stage.id,
        };

        match executor.execute(worker, ctx).await {
            StageOutcome::Success { summary: _ } => {
                run_repo::mark_stage_complete(&conn, run_id, stage.id)?;
                run_repo::clear_error(&conn, run_id)?;

                if stage.is_checkpoint {
                    if checkpoint_release_ready(&conn, run_id, stage)? {
                        // Condition already satisfied: complete automatically
                        // and keep going.
                        let next = stages::next(stage.id).ok_or_else(|| {
                            PipelineError::Validation(format!(
                                "checkpoint '{}' has no next stage",
                                stage.id
                            ))
                        })?;
                        run_repo::set_current_stage(&conn, run_id, next.id)?;
                    } else {
                        // Re-read flags set while the stage was in flight. A
                        // cancel still wins; a pending pause loses to the
                        // checkpoint at this boundary.
                        let fresh = run_repo::get_run(&conn, run_id)?;
                        if fresh.cancel_requested {
                            run_repo::set_status(&conn, run_id, RunStatus::Cancelled)?;
                            run_repo::set_cancel_requested(&conn, run_id, false)?;
                            run_repo::set_pause_requested(&conn, run_id, false)?;
                            lease::release(&conn, run_id, &holder)?;
                            tracing::info!(run_id = %run_id, "Run cancelled at checkpoint");
                            return Ok(());
                        }
                        run_repo::set_status(&conn, run_id, RunStatus::AwaitingCheckpoint)?;
                        run_repo::set_pause_requested(&conn, run_id, false)?;
                        lease::release(&conn, run_id, &holder)?;
                        tracing::info!(
                            run_id = %run_id,
                            stage = stage.id,
                            "Awaiting checkpoint release"
                        );
                        return Ok(());
                    }
                } else if let Some(next) = stages::next(stage.id) {
                    run_repo::set_current_stage(&conn, run_id, next.id)?;
                } else {
                    run_repo::set_status(&conn, run_id, RunStatus::Completed)?;
                    lease::release(&conn, run_id, &holder)?;
                    tracing::info!(run_id = %run_id, "Run completed");
                    return Ok(());
                }
            }
            StageOutcome::Failed { message } => {
                run_repo::record_error(&conn, run_id, &format!("{}: {message}", stage.name))?;
                run_repo::set_status(&conn, run_id, RunStatus::Failed)?;
                lease::release(&conn, run_id, &holder)?;
                tracing::error!(
                    run_id = %run_id,
                    stage = stage.id,
                    error = %message,
                    "Run failed"
                );
                return Ok(());
            }
        }
    }
}

/// Whether a just-completed checkpoint can release immediately.
fn checkpoint_release_ready(
    conn: &Connection,
    run_id: Uuid,
    stage: &'static Stage,
) -> Result<bool, PipelineError> {
    if stage.id == stages::ENTITY_MAPPING {
        Ok(entity::unresolved_conflict_count(conn, run_id)? == 0)
    } else {
        // Manual checkpoints always wait for an explicit approval.
        Ok(false)
    }
}

/// Delete every output produced by stages at or after the resume target, so
/// re-runs regenerate them rather than leaving stale artifacts.
fn invalidate_truncated_outputs(
    conn: &Connection,
    run_id: Uuid,
    target: &'static Stage,
) -> Result<(), PipelineError> {
    let truncated: Vec<&'static str> = stages::all()
        .iter()
        .filter(|s| s.ordinal >= target.ordinal)
        .map(|s| s.id)
        .collect();

    artifact::delete_artifacts_for_stages(conn, run_id, &truncated)?;
    if truncated.contains(&stages::ENTITY_MAPPING) {
        entity::delete_run_entities(conn, run_id)?;
    }
    if truncated.contains(&stages::RISK_ANALYSIS) {
        artifact::delete_findings(conn, run_id)?;
    }
    if truncated.contains(&stages::REPORT_GENERATION) {
        artifact::delete_report_jobs(conn, run_id)?;
    }
    Ok(())
}
