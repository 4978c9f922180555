//! Entity mapping worker — runs the resolver over the project's extraction
//! claims and persists the resulting entity graph.
//!
//! Whether the run halts at the checkpoint is the orchestrator's call; this
//! worker only resolves and stores.

use super::{StageContext, StageOutput, StageWorker};
use crate::db::repository::{artifact, entity, extraction};
use crate::pipeline::error::WorkerError;
use crate::pipeline::resolver::EntityResolver;
use crate::pipeline::stages;

pub struct EntityMappingWorker {
    resolver: EntityResolver,
}

impl EntityMappingWorker {
    pub fn new() -> Self {
        Self {
            resolver: EntityResolver::new(),
        }
    }
}

impl Default for EntityMappingWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageWorker for EntityMappingWorker {
    fn stage_id(&self) -> &'static str {
        stages::ENTITY_MAPPING
    }

    fn execute(&self, ctx: &StageContext) -> Result<StageOutput, WorkerError> {
        let conn = ctx.open_db()?;
        let claims = extraction::list_extractions(&conn, ctx.project_id)?;

        let resolved = self.resolver.resolve(ctx.run_id, &claims);

        entity::replace_run_entities(&conn, ctx.run_id, &resolved.records)?;

        let summary = serde_json::to_value(&resolved.summary)
            .map_err(|e| WorkerError::Fatal(format!("summary serialization: {e}")))?;
        artifact::put_artifact(&conn, ctx.run_id, stages::ENTITY_MAPPING, &summary)?;

        tracing::info!(
            run_id = %ctx.run_id,
            entities = resolved.summary.total_entities,
            conflicts = resolved.summary.needing_confirmation,
            dropped = resolved.summary.malformed_dropped,
            "Entity mapping complete"
        );

        Ok(StageOutput { summary })
    }
}
