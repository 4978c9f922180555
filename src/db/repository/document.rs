//! Project and document store.

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{Document, Project, ReadabilityStatus};

use super::run::parse_uuid;

pub fn insert_project(conn: &Connection, project: &Project) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO projects (id, name, target_name, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            project.id.to_string(),
            project.name,
            project.target_name,
            project.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_project(conn: &Connection, project_id: Uuid) -> Result<Project, DatabaseError> {
    conn.query_row(
        "SELECT id, name, target_name, created_at FROM projects WHERE id = ?1",
        params![project_id.to_string()],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DatabaseError::NotFound {
            entity_type: "project".to_string(),
            id: project_id.to_string(),
        },
        _ => DatabaseError::Sqlite(e),
    })
    .and_then(|(id, name, target_name, created_at)| {
        Ok(Project {
            id: parse_uuid(&id, "project")?,
            name,
            target_name,
            created_at,
        })
    })
}

/// Insert corpus documents in one transaction.
pub fn insert_documents(conn: &Connection, documents: &[Document]) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    for doc in documents {
        tx.execute(
            "INSERT INTO documents
             (id, project_id, file_name, folder, category, classification_confidence,
              readability_status, readability_error, text_length, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                doc.id.to_string(),
                doc.project_id.to_string(),
                doc.file_name,
                doc.folder,
                doc.category,
                doc.classification_confidence,
                doc.readability_status.as_str(),
                doc.readability_error,
                doc.text_length as i64,
                doc.created_at,
            ],
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn list_documents(conn: &Connection, project_id: Uuid) -> Result<Vec<Document>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, file_name, folder, category, classification_confidence,
                readability_status, readability_error, text_length, created_at
         FROM documents WHERE project_id = ?1
         ORDER BY file_name ASC",
    )?;

    let rows = stmt.query_map(params![project_id.to_string()], |row| {
        Ok(DocumentRow {
            id: row.get(0)?,
            project_id: row.get(1)?,
            file_name: row.get(2)?,
            folder: row.get(3)?,
            category: row.get(4)?,
            classification_confidence: row.get(5)?,
            readability_status: row.get(6)?,
            readability_error: row.get(7)?,
            text_length: row.get(8)?,
            created_at: row.get(9)?,
        })
    })?;

    let mut documents = Vec::new();
    for row in rows {
        documents.push(document_from_row(row?)?);
    }
    Ok(documents)
}

/// Record a classification outcome for one document.
pub fn set_classification(
    conn: &Connection,
    document_id: Uuid,
    folder: &str,
    category: &str,
    confidence: f64,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE documents SET folder = ?1, category = ?2, classification_confidence = ?3
         WHERE id = ?4",
        params![folder, category, confidence, document_id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "document".to_string(),
            id: document_id.to_string(),
        });
    }
    Ok(())
}

/// Record a readability outcome for one document.
pub fn set_readability(
    conn: &Connection,
    document_id: Uuid,
    status: ReadabilityStatus,
    error: Option<&str>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE documents SET readability_status = ?1, readability_error = ?2 WHERE id = ?3",
        params![status.as_str(), error, document_id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "document".to_string(),
            id: document_id.to_string(),
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════
// Internal row mapping
// ═══════════════════════════════════════════

struct DocumentRow {
    id: String,
    project_id: String,
    file_name: String,
    folder: Option<String>,
    category: Option<String>,
    classification_confidence: Option<f64>,
    readability_status: String,
    readability_error: Option<String>,
    text_length: i64,
    created_at: String,
}

fn document_from_row(row: DocumentRow) -> Result<Document, DatabaseError> {
    let readability_status: ReadabilityStatus = row.readability_status.parse()?;
    Ok(Document {
        id: parse_uuid(&row.id, "document")?,
        project_id: parse_uuid(&row.project_id, "project")?,
        file_name: row.file_name,
        folder: row.folder,
        category: row.category,
        classification_confidence: row.classification_confidence,
        readability_status,
        readability_error: row.readability_error,
        text_length: row.text_length.max(0) as u64,
        created_at: row.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::now_utc;
    use crate::db::sqlite::open_memory_database;

    fn setup() -> (Connection, Uuid) {
        let conn = open_memory_database().unwrap();
        let project = Project {
            id: Uuid::new_v4(),
            name: "Project Aurora".to_string(),
            target_name: "Aurora Holdings GmbH".to_string(),
            created_at: now_utc(),
        };
        insert_project(&conn, &project).unwrap();
        (conn, project.id)
    }

    fn make_document(project_id: Uuid, file_name: &str, text_length: u64) -> Document {
        Document {
            id: Uuid::new_v4(),
            project_id,
            file_name: file_name.to_string(),
            folder: None,
            category: None,
            classification_confidence: None,
            readability_status: ReadabilityStatus::Pending,
            readability_error: None,
            text_length,
            created_at: now_utc(),
        }
    }

    #[test]
    fn project_round_trip() {
        let (conn, project_id) = setup();
        let project = get_project(&conn, project_id).unwrap();
        assert_eq!(project.target_name, "Aurora Holdings GmbH");
    }

    #[test]
    fn unknown_project_is_not_found() {
        let (conn, _) = setup();
        assert!(matches!(
            get_project(&conn, Uuid::new_v4()).unwrap_err(),
            DatabaseError::NotFound { .. }
        ));
    }

    #[test]
    fn documents_round_trip_in_name_order() {
        let (conn, project_id) = setup();
        insert_documents(
            &conn,
            &[
                make_document(project_id, "b_loan_agreement.pdf", 1000),
                make_document(project_id, "a_articles_of_association.pdf", 2000),
            ],
        )
        .unwrap();

        let docs = list_documents(&conn, project_id).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].file_name, "a_articles_of_association.pdf");
        assert_eq!(docs[0].readability_status, ReadabilityStatus::Pending);
    }

    #[test]
    fn classification_and_readability_updates() {
        let (conn, project_id) = setup();
        let doc = make_document(project_id, "spa.pdf", 500);
        let doc_id = doc.id;
        insert_documents(&conn, &[doc]).unwrap();

        set_classification(&conn, doc_id, "Contracts", "contract", 0.91).unwrap();
        set_readability(&conn, doc_id, ReadabilityStatus::Ready, None).unwrap();

        let docs = list_documents(&conn, project_id).unwrap();
        assert_eq!(docs[0].folder.as_deref(), Some("Contracts"));
        assert_eq!(docs[0].category.as_deref(), Some("contract"));
        assert_eq!(docs[0].readability_status, ReadabilityStatus::Ready);
    }

    #[test]
    fn updates_on_unknown_document_fail() {
        let (conn, _) = setup();
        assert!(set_classification(&conn, Uuid::new_v4(), "Other", "other", 0.5).is_err());
        assert!(set_readability(&conn, Uuid::new_v4(), ReadabilityStatus::Failed, Some("x")).is_err());
    }
}
