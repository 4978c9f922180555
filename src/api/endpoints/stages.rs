//! Stage metadata endpoint.

use axum::Json;
use serde::Serialize;

use crate::pipeline::stages::{self, Stage};

#[derive(Serialize)]
pub struct StageMetadataResponse {
    pub stages: &'static [Stage],
}

/// `GET /api/stages` — the static stage catalog, in execution order.
pub async fn metadata() -> Json<StageMetadataResponse> {
    Json(StageMetadataResponse {
        stages: stages::all(),
    })
}
