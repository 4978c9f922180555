//! Run state store — durable record of a pipeline run's progress.
//!
//! All mutations of a single run happen under the orchestrator's run-scoped
//! lock; this module only guarantees that each operation commits atomically
//! and that reads see the latest committed write.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{PipelineRun, RunStatus};
use crate::pipeline::stages;

use super::now_utc;

/// Create a run for a project, positioned at the first pipeline stage.
pub fn create_run(conn: &Connection, project_id: Uuid) -> Result<PipelineRun, DatabaseError> {
    let id = Uuid::new_v4();
    let now = now_utc();
    let first_stage = stages::first().id;

    conn.execute(
        "INSERT INTO runs (id, project_id, status, current_stage, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![
            id.to_string(),
            project_id.to_string(),
            RunStatus::NotStarted.as_str(),
            first_stage,
            now,
        ],
    )?;

    get_run(conn, id)
}

/// Fetch a run with its ordered completion log and derived progress.
pub fn get_run(conn: &Connection, run_id: Uuid) -> Result<PipelineRun, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, project_id, status, current_stage, last_error,
                    pause_requested, cancel_requested, created_at, updated_at
             FROM runs WHERE id = ?1",
            params![run_id.to_string()],
            |row| {
                Ok(RunRow {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    status: row.get(2)?,
                    current_stage: row.get(3)?,
                    last_error: row.get(4)?,
                    pause_requested: row.get(5)?,
                    cancel_requested: row.get(6)?,
                    created_at: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| DatabaseError::NotFound {
            entity_type: "run".to_string(),
            id: run_id.to_string(),
        })?;

    let completed = completed_stages(conn, run_id)?;
    run_from_row(row, completed)
}

/// List runs for a project, newest first.
pub fn list_runs(conn: &Connection, project_id: Uuid) -> Result<Vec<PipelineRun>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM runs WHERE project_id = ?1 ORDER BY created_at DESC",
    )?;
    let ids: Vec<String> = stmt
        .query_map(params![project_id.to_string()], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    let mut runs = Vec::with_capacity(ids.len());
    for id in ids {
        let id = parse_uuid(&id, "run")?;
        runs.push(get_run(conn, id)?);
    }
    Ok(runs)
}

/// Runs left in `processing` (candidates for crash recovery).
pub fn list_processing_runs(conn: &Connection) -> Result<Vec<PipelineRun>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id FROM runs WHERE status = 'processing'")?;
    let ids: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    let mut runs = Vec::with_capacity(ids.len());
    for id in ids {
        let id = parse_uuid(&id, "run")?;
        runs.push(get_run(conn, id)?);
    }
    Ok(runs)
}

/// Append a stage to the completion log. Replaces a leftover row for the
/// same stage (possible after a truncation race) rather than failing.
pub fn mark_stage_complete(
    conn: &Connection,
    run_id: Uuid,
    stage_id: &str,
) -> Result<(), DatabaseError> {
    let now = now_utc();
    let next_position: i64 = conn.query_row(
        "SELECT COALESCE(MAX(position), -1) + 1 FROM run_stage_completions WHERE run_id = ?1",
        params![run_id.to_string()],
        |row| row.get(0),
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO run_stage_completions (run_id, stage_id, position, completed_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![run_id.to_string(), stage_id, next_position, now],
    )?;
    touch(conn, run_id)?;
    Ok(())
}

pub fn set_status(conn: &Connection, run_id: Uuid, status: RunStatus) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE runs SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now_utc(), run_id.to_string()],
    )?;
    ensure_found(changed, run_id)
}

pub fn set_current_stage(
    conn: &Connection,
    run_id: Uuid,
    stage_id: &str,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE runs SET current_stage = ?1, updated_at = ?2 WHERE id = ?3",
        params![stage_id, now_utc(), run_id.to_string()],
    )?;
    ensure_found(changed, run_id)
}

pub fn record_error(
    conn: &Connection,
    run_id: Uuid,
    message: &str,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE runs SET last_error = ?1, updated_at = ?2 WHERE id = ?3",
        params![message, now_utc(), run_id.to_string()],
    )?;
    ensure_found(changed, run_id)
}

pub fn clear_error(conn: &Connection, run_id: Uuid) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE runs SET last_error = NULL, updated_at = ?1 WHERE id = ?2",
        params![now_utc(), run_id.to_string()],
    )?;
    ensure_found(changed, run_id)
}

pub fn set_pause_requested(
    conn: &Connection,
    run_id: Uuid,
    requested: bool,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE runs SET pause_requested = ?1, updated_at = ?2 WHERE id = ?3",
        params![requested as i64, now_utc(), run_id.to_string()],
    )?;
    ensure_found(changed, run_id)
}

pub fn set_cancel_requested(
    conn: &Connection,
    run_id: Uuid,
    requested: bool,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE runs SET cancel_requested = ?1, updated_at = ?2 WHERE id = ?3",
        params![requested as i64, now_utc(), run_id.to_string()],
    )?;
    ensure_found(changed, run_id)
}

/// Remove every completion with ordinal >= the target stage's ordinal and
/// point `current_stage` at the target. Progress drops accordingly — the one
/// place it is allowed to move backwards.
pub fn truncate_to(conn: &Connection, run_id: Uuid, stage_id: &str) -> Result<(), DatabaseError> {
    let stage = stages::stage(stage_id).ok_or_else(|| DatabaseError::NotFound {
        entity_type: "stage".to_string(),
        id: stage_id.to_string(),
    })?;

    let truncated: Vec<&str> = stages::all()
        .iter()
        .filter(|s| s.ordinal >= stage.ordinal)
        .map(|s| s.id)
        .collect();

    let tx = conn.unchecked_transaction()?;
    for id in &truncated {
        tx.execute(
            "DELETE FROM run_stage_completions WHERE run_id = ?1 AND stage_id = ?2",
            params![run_id.to_string(), id],
        )?;
    }
    tx.execute(
        "UPDATE runs SET current_stage = ?1, last_error = NULL, updated_at = ?2 WHERE id = ?3",
        params![stage_id, now_utc(), run_id.to_string()],
    )?;
    tx.commit()?;
    Ok(())
}

fn completed_stages(conn: &Connection, run_id: Uuid) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT stage_id FROM run_stage_completions WHERE run_id = ?1 ORDER BY position ASC",
    )?;
    let rows: Vec<String> = stmt
        .query_map(params![run_id.to_string()], |row| row.get(0))?
        .collect::<Result<_, _>>()?;
    Ok(rows)
}

fn touch(conn: &Connection, run_id: Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE runs SET updated_at = ?1 WHERE id = ?2",
        params![now_utc(), run_id.to_string()],
    )?;
    Ok(())
}

fn ensure_found(changed: usize, run_id: Uuid) -> Result<(), DatabaseError> {
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "run".to_string(),
            id: run_id.to_string(),
        });
    }
    Ok(())
}

pub(crate) fn parse_uuid(value: &str, entity_type: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|_| DatabaseError::InvalidEnum {
        field: format!("{entity_type}.id"),
        value: value.to_string(),
    })
}

// ═══════════════════════════════════════════
// Internal row mapping
// ═══════════════════════════════════════════

struct RunRow {
    id: String,
    project_id: String,
    status: String,
    current_stage: String,
    last_error: Option<String>,
    pause_requested: i64,
    cancel_requested: i64,
    created_at: String,
    updated_at: String,
}

fn run_from_row(row: RunRow, completed: Vec<String>) -> Result<PipelineRun, DatabaseError> {
    let status: RunStatus = row.status.parse()?;

    Ok(PipelineRun {
        id: parse_uuid(&row.id, "run")?,
        project_id: parse_uuid(&row.project_id, "project")?,
        status,
        current_stage: row.current_stage,
        overall_progress: stages::overall_progress(completed.len()),
        completed_stages: completed,
        last_error: row.last_error,
        pause_requested: row.pause_requested != 0,
        cancel_requested: row.cancel_requested != 0,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
