//! Stage artifacts, risk findings and report jobs.
//!
//! Everything here is stage output. Resume truncation deletes the rows for
//! the truncated stages so re-runs regenerate them instead of leaving stale
//! output behind.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{FindingSeverity, ReportJob, ReportJobStatus, RiskFinding};

use super::now_utc;
use super::run::parse_uuid;

/// Record a worker's output summary for one stage, superseding any previous
/// artifact of the same stage (idempotent re-runs).
pub fn put_artifact(
    conn: &Connection,
    run_id: Uuid,
    stage_id: &str,
    payload: &serde_json::Value,
) -> Result<(), DatabaseError> {
    let payload_json = serde_json::to_string(payload)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM stage_artifacts WHERE run_id = ?1 AND stage_id = ?2",
        params![run_id.to_string(), stage_id],
    )?;
    tx.execute(
        "INSERT INTO stage_artifacts (id, run_id, stage_id, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            Uuid::new_v4().to_string(),
            run_id.to_string(),
            stage_id,
            payload_json,
            now_utc(),
        ],
    )?;
    tx.commit()?;
    Ok(())
}

pub fn get_artifact(
    conn: &Connection,
    run_id: Uuid,
    stage_id: &str,
) -> Result<Option<serde_json::Value>, DatabaseError> {
    let payload: Option<String> = conn
        .query_row(
            "SELECT payload FROM stage_artifacts WHERE run_id = ?1 AND stage_id = ?2",
            params![run_id.to_string(), stage_id],
            |row| row.get(0),
        )
        .optional()?;

    match payload {
        Some(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| DatabaseError::ConstraintViolation(format!("Bad artifact JSON: {e}"))),
        None => Ok(None),
    }
}

/// Delete artifacts for the given stages (resume truncation).
pub fn delete_artifacts_for_stages(
    conn: &Connection,
    run_id: Uuid,
    stage_ids: &[&str],
) -> Result<(), DatabaseError> {
    for stage_id in stage_ids {
        conn.execute(
            "DELETE FROM stage_artifacts WHERE run_id = ?1 AND stage_id = ?2",
            params![run_id.to_string(), stage_id],
        )?;
    }
    Ok(())
}

// ═══════════════════════════════════════════
// Risk findings
// ═══════════════════════════════════════════

/// Replace the run's findings in one transaction (analysis re-runs cleanly).
pub fn replace_findings(
    conn: &Connection,
    run_id: Uuid,
    findings: &[RiskFinding],
) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM risk_findings WHERE run_id = ?1",
        params![run_id.to_string()],
    )?;
    for finding in findings {
        tx.execute(
            "INSERT INTO risk_findings (id, run_id, severity, title, detail, entity_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                finding.id.to_string(),
                run_id.to_string(),
                finding.severity.as_str(),
                finding.title,
                finding.detail,
                finding.entity_id.map(|id| id.to_string()),
                finding.created_at,
            ],
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn list_findings(conn: &Connection, run_id: Uuid) -> Result<Vec<RiskFinding>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, run_id, severity, title, detail, entity_id, created_at
         FROM risk_findings WHERE run_id = ?1
         ORDER BY created_at ASC, id ASC",
    )?;

    let rows = stmt.query_map(params![run_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;

    let mut findings = Vec::new();
    for row in rows {
        let (id, run_id, severity, title, detail, entity_id, created_at) = row?;
        let severity: FindingSeverity = severity.parse()?;
        findings.push(RiskFinding {
            id: parse_uuid(&id, "risk_finding")?,
            run_id: parse_uuid(&run_id, "run")?,
            severity,
            title,
            detail,
            entity_id: entity_id.map(|id| parse_uuid(&id, "entity_record")).transpose()?,
            created_at,
        });
    }
    Ok(findings)
}

pub fn delete_findings(conn: &Connection, run_id: Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM risk_findings WHERE run_id = ?1",
        params![run_id.to_string()],
    )?;
    Ok(())
}

// ═══════════════════════════════════════════
// Report jobs
// ═══════════════════════════════════════════

/// Enqueue a report job, superseding any job the run already queued.
pub fn enqueue_report_job(conn: &Connection, run_id: Uuid) -> Result<ReportJob, DatabaseError> {
    let job = ReportJob {
        id: Uuid::new_v4(),
        run_id,
        status: ReportJobStatus::Queued,
        requested_at: now_utc(),
        completed_at: None,
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM report_jobs WHERE run_id = ?1 AND status = 'queued'",
        params![run_id.to_string()],
    )?;
    tx.execute(
        "INSERT INTO report_jobs (id, run_id, status, requested_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            job.id.to_string(),
            run_id.to_string(),
            job.status.as_str(),
            job.requested_at,
        ],
    )?;
    tx.commit()?;
    Ok(job)
}

pub fn get_report_job(conn: &Connection, run_id: Uuid) -> Result<Option<ReportJob>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, run_id, status, requested_at, completed_at
             FROM report_jobs WHERE run_id = ?1
             ORDER BY requested_at DESC LIMIT 1",
            params![run_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((id, run_id, status, requested_at, completed_at)) => {
            let status: ReportJobStatus = status.parse()?;
            Ok(Some(ReportJob {
                id: parse_uuid(&id, "report_job")?,
                run_id: parse_uuid(&run_id, "run")?,
                status,
                requested_at,
                completed_at,
            }))
        }
        None => Ok(None),
    }
}

pub fn delete_report_jobs(conn: &Connection, run_id: Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM report_jobs WHERE run_id = ?1",
        params![run_id.to_string()],
    )?;
    Ok(())
}
