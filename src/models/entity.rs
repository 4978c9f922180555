//! Entity graph models: raw per-document claims and resolved records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::EntityRelationship;

/// One per-document entity claim posted by the extraction service.
/// Input to the resolver; never shown to reviewers directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityExtraction {
    pub id: Uuid,
    pub project_id: Uuid,
    pub document_id: Uuid,
    pub entity_name: String,
    pub registration_number: Option<String>,
    pub relationship: EntityRelationship,
    pub relationship_detail: Option<String>,
    pub ownership_percent: Option<f64>,
    pub confidence: f64,
    pub evidence: Option<String>,
    pub created_at: String,
}

/// A resolved corporate/individual entity. One record per unique
/// name + registration number pair per run. Mutated only by human
/// confirmation after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: Uuid,
    pub run_id: Uuid,
    pub entity_name: String,
    pub registration_number: Option<String>,
    pub relationship: EntityRelationship,
    pub relationship_detail: Option<String>,
    pub ownership_percent: Option<f64>,
    pub confidence: f64,
    pub source_document_ids: Vec<Uuid>,
    pub evidence: Option<String>,
    pub conflict_flag: bool,
    pub conflict_detail: Option<String>,
    pub human_confirmed: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl EntityRecord {
    /// Unresolved conflicts block the entity-mapping checkpoint.
    pub fn needs_confirmation(&self) -> bool {
        self.conflict_flag && !self.human_confirmed
    }
}

/// Headline counts reported after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionSummary {
    pub total_entities: usize,
    pub needing_confirmation: usize,
    pub subsidiaries: usize,
    pub counterparties: usize,
    pub malformed_dropped: usize,
}
