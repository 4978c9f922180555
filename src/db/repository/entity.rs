//! Entity record store — the resolved corporate-structure graph per run.

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{EntityRecord, EntityRelationship};

use super::now_utc;
use super::run::parse_uuid;

/// Replace the full entity set for a run in one transaction. The resolver
/// re-runs idempotently, so its output always supersedes what is stored.
pub fn replace_run_entities(
    conn: &Connection,
    run_id: Uuid,
    records: &[EntityRecord],
) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM entity_records WHERE run_id = ?1",
        params![run_id.to_string()],
    )?;

    for record in records {
        let sources_json = serde_json::to_string(&record.source_document_ids)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
        tx.execute(
            "INSERT INTO entity_records
             (id, run_id, entity_name, registration_number, relationship,
              relationship_detail, ownership_percent, confidence,
              source_document_ids, evidence, conflict_flag, conflict_detail,
              human_confirmed, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                record.id.to_string(),
                run_id.to_string(),
                record.entity_name,
                record.registration_number,
                record.relationship.as_str(),
                record.relationship_detail,
                record.ownership_percent,
                record.confidence,
                sources_json,
                record.evidence,
                record.conflict_flag as i64,
                record.conflict_detail,
                record.human_confirmed as i64,
                record.created_at,
                record.updated_at,
            ],
        )?;
    }

    tx.commit()?;
    Ok(())
}

/// All entity records for a run, stable name order for display.
pub fn list_entities(conn: &Connection, run_id: Uuid) -> Result<Vec<EntityRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, run_id, entity_name, registration_number, relationship,
                relationship_detail, ownership_percent, confidence,
                source_document_ids, evidence, conflict_flag, conflict_detail,
                human_confirmed, created_at, updated_at
         FROM entity_records WHERE run_id = ?1
         ORDER BY entity_name ASC",
    )?;

    let rows = stmt.query_map(params![run_id.to_string()], map_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(record_from_row(row?)?);
    }
    Ok(records)
}

/// Fetch one entity record scoped to a run.
pub fn get_entity(
    conn: &Connection,
    run_id: Uuid,
    entity_id: Uuid,
) -> Result<EntityRecord, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, run_id, entity_name, registration_number, relationship,
                    relationship_detail, ownership_percent, confidence,
                    source_document_ids, evidence, conflict_flag, conflict_detail,
                    human_confirmed, created_at, updated_at
             FROM entity_records WHERE run_id = ?1 AND id = ?2",
            params![run_id.to_string(), entity_id.to_string()],
            map_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DatabaseError::NotFound {
                entity_type: "entity_record".to_string(),
                id: entity_id.to_string(),
            },
            _ => DatabaseError::Sqlite(e),
        })?;

    record_from_row(row)
}

/// Count of records still blocking the entity-mapping checkpoint.
pub fn unresolved_conflict_count(conn: &Connection, run_id: Uuid) -> Result<u32, DatabaseError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM entity_records
         WHERE run_id = ?1 AND conflict_flag = 1 AND human_confirmed = 0",
        params![run_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Apply a human adjudication: the confirmed relationship supersedes the
/// stored one and the conflict clears.
pub fn confirm_relationship(
    conn: &Connection,
    run_id: Uuid,
    entity_id: Uuid,
    relationship: EntityRelationship,
    detail: Option<&str>,
) -> Result<EntityRecord, DatabaseError> {
    let changed = conn.execute(
        "UPDATE entity_records
         SET relationship = ?1,
             relationship_detail = COALESCE(?2, relationship_detail),
             conflict_flag = 0,
             conflict_detail = NULL,
             human_confirmed = 1,
             updated_at = ?3
         WHERE run_id = ?4 AND id = ?5",
        params![
            relationship.as_str(),
            detail,
            now_utc(),
            run_id.to_string(),
            entity_id.to_string(),
        ],
    )?;

    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "entity_record".to_string(),
            id: entity_id.to_string(),
        });
    }

    get_entity(conn, run_id, entity_id)
}

/// Delete the run's entity set (resume truncation invalidates it).
pub fn delete_run_entities(conn: &Connection, run_id: Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM entity_records WHERE run_id = ?1",
        params![run_id.to_string()],
    )?;
    Ok(())
}

// ═══════════════════════════════════════════
// Internal row mapping
// ═══════════════════════════════════════════

struct EntityRow {
    id: String,
    run_id: String,
    entity_name: String,
    registration_number: Option<String>,
    relationship: String,
    relationship_detail: Option<String>,
    ownership_percent: Option<f64>,
    confidence: f64,
    source_document_ids: String,
    evidence: Option<String>,
    conflict_flag: i64,
    conflict_detail: Option<String>,
    human_confirmed: i64,
    created_at: String,
    updated_at: String,
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntityRow> {
    Ok(EntityRow {
        id: row.get(0)?,
        run_id: row.get(1)?,
        entity_name: row.get(2)?,
        registration_number: row.get(3)?,
        relationship: row.get(4)?,
        relationship_detail: row.get(5)?,
        ownership_percent: row.get(6)?,
        confidence: row.get(7)?,
        source_document_ids: row.get(8)?,
        evidence: row.get(9)?,
        conflict_flag: row.get(10)?,
        conflict_detail: row.get(11)?,
        human_confirmed: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn record_from_row(row: EntityRow) -> Result<EntityRecord, DatabaseError> {
    let relationship: EntityRelationship = row.relationship.parse()?;
    let source_document_ids: Vec<Uuid> = serde_json::from_str(&row.source_document_ids)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("Bad source ids JSON: {e}")))?;

    Ok(EntityRecord {
        id: parse_uuid(&row.id, "entity_record")?,
        run_id: parse_uuid(&row.run_id, "run")?,
        entity_name: row.entity_name,
        registration_number: row.registration_number,
        relationship,
        relationship_detail: row.relationship_detail,
        ownership_percent: row.ownership_percent,
        confidence: row.confidence,
        source_document_ids,
        evidence: row.evidence,
        conflict_flag: row.conflict_flag != 0,
        conflict_detail: row.conflict_detail,
        human_confirmed: row.human_confirmed != 0,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
