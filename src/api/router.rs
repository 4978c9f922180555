//! Review API router.
//!
//! Returns a composable `Router` mounted under `/api/`. Clients poll
//! progress; control commands return as soon as the orchestrator accepts
//! them. CORS is open for the review frontend; request traces go through
//! `tower_http`.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::engine_state::EngineState;

/// Build the review API router.
pub fn api_router(engine: Arc<EngineState>) -> Router {
    let ctx = ApiContext::new(engine);

    let api = Router::new()
        .route("/projects", post(endpoints::projects::create))
        .route(
            "/projects/:id/documents",
            post(endpoints::projects::add_documents),
        )
        .route(
            "/projects/:id/extractions",
            post(endpoints::projects::add_extractions),
        )
        .route("/runs", post(endpoints::runs::create_and_start))
        .route("/runs/:id/progress", get(endpoints::runs::progress))
        .route("/runs/:id/pause", post(endpoints::runs::pause))
        .route("/runs/:id/resume", post(endpoints::runs::resume))
        .route("/runs/:id/cancel", post(endpoints::runs::cancel))
        .route(
            "/runs/:id/resume-from/:stage_id",
            post(endpoints::runs::resume_from_stage),
        )
        .route(
            "/runs/:id/checkpoint/approve",
            post(endpoints::runs::approve_checkpoint),
        )
        .route("/runs/:id/entities", get(endpoints::entities::list))
        .route(
            "/runs/:id/entities/:entity_id/confirm",
            post(endpoints::entities::confirm),
        )
        .route("/stages", get(endpoints::stages::metadata))
        .with_state(ctx);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
