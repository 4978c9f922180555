//! Raw entity extraction store — per-document claims from the extraction
//! service, consumed by the resolver.

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{EntityExtraction, EntityRelationship};

use super::run::parse_uuid;

/// Insert a batch of extraction claims in one transaction.
pub fn insert_extractions(
    conn: &Connection,
    extractions: &[EntityExtraction],
) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    for ext in extractions {
        tx.execute(
            "INSERT INTO entity_extractions
             (id, project_id, document_id, entity_name, registration_number,
              relationship, relationship_detail, ownership_percent, confidence,
              evidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                ext.id.to_string(),
                ext.project_id.to_string(),
                ext.document_id.to_string(),
                ext.entity_name,
                ext.registration_number,
                ext.relationship.as_str(),
                ext.relationship_detail,
                ext.ownership_percent,
                ext.confidence,
                ext.evidence,
                ext.created_at,
            ],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// All claims for a project, in insertion order.
pub fn list_extractions(
    conn: &Connection,
    project_id: Uuid,
) -> Result<Vec<EntityExtraction>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, document_id, entity_name, registration_number,
                relationship, relationship_detail, ownership_percent, confidence,
                evidence, created_at
         FROM entity_extractions WHERE project_id = ?1
         ORDER BY created_at ASC, id ASC",
    )?;

    let rows = stmt.query_map(params![project_id.to_string()], |row| {
        Ok(ExtractionRow {
            id: row.get(0)?,
            project_id: row.get(1)?,
            document_id: row.get(2)?,
            entity_name: row.get(3)?,
            registration_number: row.get(4)?,
            relationship: row.get(5)?,
            relationship_detail: row.get(6)?,
            ownership_percent: row.get(7)?,
            confidence: row.get(8)?,
            evidence: row.get(9)?,
            created_at: row.get(10)?,
        })
    })?;

    let mut extractions = Vec::new();
    for row in rows {
        extractions.push(extraction_from_row(row?)?);
    }
    Ok(extractions)
}

// ═══════════════════════════════════════════
// Internal row mapping
// ═══════════════════════════════════════════

struct ExtractionRow {
    id: String,
    project_id: String,
    document_id: String,
    entity_name: String,
    registration_number: Option<String>,
    relationship: String,
    relationship_detail: Option<String>,
    ownership_percent: Option<f64>,
    confidence: f64,
    evidence: Option<String>,
    created_at: String,
}

fn extraction_from_row(row: ExtractionRow) -> Result<EntityExtraction, DatabaseError> {
    let relationship: EntityRelationship = row.relationship.parse()?;
    Ok(EntityExtraction {
        id: parse_uuid(&row.id, "entity_extraction")?,
        project_id: parse_uuid(&row.project_id, "project")?,
        document_id: parse_uuid(&row.document_id, "document")?,
        entity_name: row.entity_name,
        registration_number: row.registration_number,
        relationship,
        relationship_detail: row.relationship_detail,
        ownership_percent: row.ownership_percent,
        confidence: row.confidence,
        evidence: row.evidence,
        created_at: row.created_at,
    })
}
