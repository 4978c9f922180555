//! Entity graph endpoints: list resolved records, confirm relationships.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::repository::entity;
use crate::models::{EntityRecord, EntityRelationship};

#[derive(Serialize)]
pub struct EntityListResponse {
    pub entities: Vec<EntityRecord>,
    pub unresolved_conflicts: u32,
}

/// `GET /api/runs/:id/entities` — the resolved corporate-structure graph.
pub async fn list(
    State(ctx): State<ApiContext>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<EntityListResponse>, ApiError> {
    let conn = ctx.engine.open_db()?;
    // Surface a 404 for unknown runs instead of an empty list.
    crate::db::repository::run::get_run(&conn, run_id)?;

    let entities = entity::list_entities(&conn, run_id)?;
    let unresolved_conflicts = entity::unresolved_conflict_count(&conn, run_id)?;
    Ok(Json(EntityListResponse {
        entities,
        unresolved_conflicts,
    }))
}

#[derive(Deserialize)]
pub struct ConfirmRequest {
    pub relationship: EntityRelationship,
    pub detail: Option<String>,
}

/// `POST /api/runs/:id/entities/:entity_id/confirm` — human adjudication of
/// a conflicting relationship. Releases the entity-mapping checkpoint when
/// the last conflict clears.
pub async fn confirm(
    State(ctx): State<ApiContext>,
    Path((run_id, entity_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<ConfirmRequest>,
) -> Result<Json<EntityRecord>, ApiError> {
    let record = ctx
        .orchestrator()
        .confirm_relationship(
            run_id,
            entity_id,
            payload.relationship,
            payload.detail.as_deref(),
        )
        .await?;
    Ok(Json(record))
}
