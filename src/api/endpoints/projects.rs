//! Project and corpus ingestion endpoints.
//!
//! The extraction inference service is an external collaborator: it posts
//! corpus metadata and per-document entity claims here before a run starts.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::repository::{document, extraction, now_utc};
use crate::models::{Document, EntityExtraction, EntityRelationship, Project, ReadabilityStatus};

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub target_name: String,
}

/// `POST /api/projects` — create a due-diligence engagement.
pub async fn create(
    State(ctx): State<ApiContext>,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    if payload.name.trim().is_empty() || payload.target_name.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "name and target_name must not be empty".into(),
        ));
    }

    let project = Project {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        target_name: payload.target_name.trim().to_string(),
        created_at: now_utc(),
    };

    let conn = ctx.engine.open_db()?;
    document::insert_project(&conn, &project)?;

    tracing::info!(project_id = %project.id, target = %project.target_name, "Project created");
    Ok(Json(project))
}

#[derive(Deserialize)]
pub struct AddDocumentsRequest {
    pub documents: Vec<DocumentUpload>,
}

#[derive(Deserialize)]
pub struct DocumentUpload {
    pub file_name: String,
    /// Length of the text yielded by upstream extraction; 0 = unreadable.
    #[serde(default)]
    pub text_length: u64,
}

#[derive(Serialize)]
pub struct AddDocumentsResponse {
    pub added: usize,
    pub document_ids: Vec<Uuid>,
}

/// `POST /api/projects/:id/documents` — register corpus metadata.
pub async fn add_documents(
    State(ctx): State<ApiContext>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<AddDocumentsRequest>,
) -> Result<Json<AddDocumentsResponse>, ApiError> {
    if payload.documents.is_empty() {
        return Err(ApiError::BadRequest("no documents in request".into()));
    }

    let conn = ctx.engine.open_db()?;
    document::get_project(&conn, project_id)?;

    let documents: Vec<Document> = payload
        .documents
        .iter()
        .map(|upload| Document {
            id: Uuid::new_v4(),
            project_id,
            file_name: upload.file_name.clone(),
            folder: None,
            category: None,
            classification_confidence: None,
            readability_status: ReadabilityStatus::Pending,
            readability_error: None,
            text_length: upload.text_length,
            created_at: now_utc(),
        })
        .collect();

    document::insert_documents(&conn, &documents)?;

    Ok(Json(AddDocumentsResponse {
        added: documents.len(),
        document_ids: documents.iter().map(|d| d.id).collect(),
    }))
}

#[derive(Deserialize)]
pub struct AddExtractionsRequest {
    pub extractions: Vec<ExtractionUpload>,
}

#[derive(Deserialize)]
pub struct ExtractionUpload {
    pub document_id: Uuid,
    pub entity_name: String,
    pub registration_number: Option<String>,
    pub relationship: EntityRelationship,
    pub relationship_detail: Option<String>,
    pub ownership_percent: Option<f64>,
    pub confidence: f64,
    pub evidence: Option<String>,
}

#[derive(Serialize)]
pub struct AddExtractionsResponse {
    pub added: usize,
}

/// `POST /api/projects/:id/extractions` — ingest per-document entity claims.
pub async fn add_extractions(
    State(ctx): State<ApiContext>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<AddExtractionsRequest>,
) -> Result<Json<AddExtractionsResponse>, ApiError> {
    if payload.extractions.is_empty() {
        return Err(ApiError::BadRequest("no extractions in request".into()));
    }
    for upload in &payload.extractions {
        if !(0.0..=1.0).contains(&upload.confidence) {
            return Err(ApiError::BadRequest(format!(
                "confidence {} out of range 0.0-1.0",
                upload.confidence
            )));
        }
        if let Some(pct) = upload.ownership_percent {
            if !(0.0..=100.0).contains(&pct) {
                return Err(ApiError::BadRequest(format!(
                    "ownership_percent {pct} out of range 0-100"
                )));
            }
        }
    }

    let conn = ctx.engine.open_db()?;
    document::get_project(&conn, project_id)?;

    let extractions: Vec<EntityExtraction> = payload
        .extractions
        .into_iter()
        .map(|upload| EntityExtraction {
            id: Uuid::new_v4(),
            project_id,
            document_id: upload.document_id,
            entity_name: upload.entity_name,
            registration_number: upload.registration_number,
            relationship: upload.relationship,
            relationship_detail: upload.relationship_detail,
            ownership_percent: upload.ownership_percent,
            confidence: upload.confidence,
            evidence: upload.evidence,
            created_at: now_utc(),
        })
        .collect();

    extraction::insert_extractions(&conn, &extractions)?;

    Ok(Json(AddExtractionsResponse {
        added: extractions.len(),
    }))
}
