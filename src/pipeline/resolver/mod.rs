//! Entity resolver — merges per-document entity claims into a deduplicated
//! corporate-structure graph and flags conflicting claims for adjudication.
//!
//! Grouping rules:
//! - A registration number match takes precedence over a name match: two
//!   different names with the same number are one entity.
//! - The same name under two different numbers stays two entities.
//! - A claim without a number joins a numbered group when its name matches
//!   exactly one such group; otherwise it forms a name-keyed group.

use std::collections::HashMap;

use regex::Regex;
use uuid::Uuid;

use crate::db::repository::now_utc;
use crate::models::{EntityExtraction, EntityRecord, EntityRelationship, ResolutionSummary};

/// Evidence concatenation cap, in characters.
const EVIDENCE_MAX_LEN: usize = 600;

/// Ownership claims within this many percentage points are treated as equal.
const OWNERSHIP_TOLERANCE: f64 = 1.0;

/// Output of one resolution pass.
#[derive(Debug)]
pub struct ResolvedEntities {
    pub records: Vec<EntityRecord>,
    pub summary: ResolutionSummary,
}

pub struct EntityResolver {
    non_alnum: Regex,
}

impl EntityResolver {
    pub fn new() -> Self {
        Self {
            // Compiled once; pattern is static and known-good.
            non_alnum: Regex::new(r"[^a-z0-9]+").expect("static regex"),
        }
    }

    /// Resolve raw extraction claims into the run's entity record set.
    pub fn resolve(&self, run_id: Uuid, extractions: &[EntityExtraction]) -> ResolvedEntities {
        let mut malformed_dropped = 0usize;
        let valid: Vec<&EntityExtraction> = extractions
            .iter()
            .filter(|ext| {
                let ok = !ext.entity_name.trim().is_empty();
                if !ok {
                    malformed_dropped += 1;
                }
                ok
            })
            .collect();

        let groups = self.group(&valid);

        let mut records: Vec<EntityRecord> = groups
            .into_iter()
            .map(|group| self.merge_group(run_id, &group))
            .collect();
        records.sort_by(|a, b| a.entity_name.cmp(&b.entity_name));

        let summary = ResolutionSummary {
            total_entities: records.len(),
            needing_confirmation: records.iter().filter(|r| r.needs_confirmation()).count(),
            subsidiaries: records
                .iter()
                .filter(|r| r.relationship == EntityRelationship::Subsidiary)
                .count(),
            counterparties: records
                .iter()
                .filter(|r| r.relationship == EntityRelationship::Counterparty)
                .count(),
            malformed_dropped,
        };

        if malformed_dropped > 0 {
            tracing::warn!(
                run_id = %run_id,
                dropped = malformed_dropped,
                "Dropped malformed extraction records (missing entity name)"
            );
        }

        ResolvedEntities { records, summary }
    }

    fn normalize_name(&self, name: &str) -> String {
        let lowered = name.to_lowercase();
        self.non_alnum.replace_all(&lowered, " ").trim().to_string()
    }

    fn normalize_registration(&self, number: &str) -> String {
        number
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_uppercase()
    }

    fn group<'a>(&self, extractions: &[&'a EntityExtraction]) -> Vec<Vec<&'a EntityExtraction>> {
        // Pass 1: claims carrying a registration number group by that number.
        let mut reg_groups: Vec<(String, Vec<&EntityExtraction>)> = Vec::new();
        let mut reg_index: HashMap<String, usize> = HashMap::new();
        let mut unnumbered: Vec<&EntityExtraction> = Vec::new();

        for ext in extractions {
            let reg = ext
                .registration_number
                .as_deref()
                .map(|n| self.normalize_registration(n))
                .filter(|n| !n.is_empty());

            match reg {
                Some(reg) => {
                    let idx = *reg_index.entry(reg.clone()).or_insert_with(|| {
                        reg_groups.push((reg, Vec::new()));
                        reg_groups.len() - 1
                    });
                    reg_groups[idx].1.push(ext);
                }
                None => unnumbered.push(ext),
            }
        }

        // Pass 2: numberless claims join a numbered group when the name
        // matches exactly one of them; ambiguous names stay separate.
        let mut name_groups: Vec<(String, Vec<&EntityExtraction>)> = Vec::new();
        let mut name_index: HashMap<String, usize> = HashMap::new();

        for ext in unnumbered {
            let name = self.normalize_name(&ext.entity_name);
            let matching_reg_groups: Vec<usize> = reg_groups
                .iter()
                .enumerate()
                .filter(|(_, (_, members))| {
                    members
                        .iter()
                        .any(|m| self.normalize_name(&m.entity_name) == name)
                })
                .map(|(i, _)| i)
                .collect();

            if matching_reg_groups.len() == 1 {
                reg_groups[matching_reg_groups[0]].1.push(ext);
            } else {
                let idx = *name_index.entry(name.clone()).or_insert_with(|| {
                    name_groups.push((name, Vec::new()));
                    name_groups.len() - 1
                });
                name_groups[idx].1.push(ext);
            }
        }

        reg_groups
            .into_iter()
            .map(|(_, members)| members)
            .chain(name_groups.into_iter().map(|(_, members)| members))
            .collect()
    }

    fn merge_group(&self, run_id: Uuid, members: &[&EntityExtraction]) -> EntityRecord {
        let best = members
            .iter()
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("groups are never empty");

        let mut source_document_ids: Vec<Uuid> = Vec::new();
        for member in members {
            if !source_document_ids.contains(&member.document_id) {
                source_document_ids.push(member.document_id);
            }
        }

        let evidence = merge_evidence(members);
        let confidence = members
            .iter()
            .map(|m| m.confidence)
            .fold(0.0f64, f64::max)
            .clamp(0.0, 1.0);

        let registration_number = members
            .iter()
            .find_map(|m| m.registration_number.clone())
            .filter(|n| !n.trim().is_empty());

        let mut conflict_parts: Vec<String> = Vec::new();

        // Relationship: unanimity among non-unknown claims, else conflict.
        let mut claims: Vec<(EntityRelationship, Vec<Uuid>)> = Vec::new();
        for member in members {
            if member.relationship == EntityRelationship::Unknown {
                continue;
            }
            match claims.iter_mut().find(|(rel, _)| *rel == member.relationship) {
                Some((_, docs)) => {
                    if !docs.contains(&member.document_id) {
                        docs.push(member.document_id);
                    }
                }
                None => claims.push((member.relationship, vec![member.document_id])),
            }
        }

        let relationship = if claims.is_empty() {
            EntityRelationship::Unknown
        } else if best.relationship != EntityRelationship::Unknown {
            best.relationship
        } else {
            claims[0].0
        };

        if claims.len() > 1 {
            let described: Vec<String> = claims
                .iter()
                .map(|(rel, docs)| {
                    let doc_list: Vec<String> = docs.iter().map(|d| d.to_string()).collect();
                    format!("{} (documents: {})", rel.as_str(), doc_list.join(", "))
                })
                .collect();
            conflict_parts.push(format!(
                "Conflicting relationship claims: {}",
                described.join(" vs ")
            ));
        }

        // Ownership: values apart by more than the tolerance conflict,
        // otherwise the most frequent value wins.
        let ownership_values: Vec<f64> =
            members.iter().filter_map(|m| m.ownership_percent).collect();
        let ownership_percent = if ownership_values.is_empty() {
            None
        } else {
            let min = ownership_values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = ownership_values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            if max - min > OWNERSHIP_TOLERANCE {
                conflict_parts.push(format!(
                    "Ownership claims differ: {min:.1}% vs {max:.1}%"
                ));
            }
            Some(most_frequent(&ownership_values))
        };

        let conflict_flag = !conflict_parts.is_empty();
        let now = now_utc();

        EntityRecord {
            id: Uuid::new_v4(),
            run_id,
            entity_name: best.entity_name.trim().to_string(),
            registration_number,
            relationship,
            relationship_detail: best.relationship_detail.clone(),
            ownership_percent,
            confidence,
            source_document_ids,
            evidence,
            conflict_flag,
            conflict_detail: conflict_flag.then(|| conflict_parts.join("; ")),
            human_confirmed: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

impl Default for EntityResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Concatenate member evidence, capped at `EVIDENCE_MAX_LEN` characters.
fn merge_evidence(members: &[&EntityExtraction]) -> Option<String> {
    let mut merged = String::new();
    for member in members {
        let Some(snippet) = member.evidence.as_deref() else {
            continue;
        };
        let snippet = snippet.trim();
        if snippet.is_empty() {
            continue;
        }
        if !merged.is_empty() {
            merged.push_str(" | ");
        }
        merged.push_str(snippet);
    }

    if merged.is_empty() {
        return None;
    }
    if merged.chars().count() > EVIDENCE_MAX_LEN {
        merged = merged.chars().take(EVIDENCE_MAX_LEN).collect();
    }
    Some(merged)
}

/// Most frequent value; ties resolve to the earliest claim.
fn most_frequent(values: &[f64]) -> f64 {
    let mut best = values[0];
    let mut best_count = 0usize;
    for candidate in values {
        let count = values
            .iter()
            .filter(|v| (**v - *candidate).abs() < f64::EPSILON)
            .count();
        if count > best_count {
            best = *candidate;
            best_count = count;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_extraction(
        name: &str,
        reg: Option<&str>,
        relationship: EntityRelationship,
        confidence: f64,
        document_id: Uuid,
    ) -> EntityExtraction {
        EntityExtraction {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            document_id,
            entity_name: name.to_string(),
            registration_number: reg.map(|r| r.to_string()),
            relationship,
            relationship_detail: None,
            ownership_percent: None,
            confidence,
            evidence: Some(format!("{name} appears in the document")),
            created_at: "2026-08-01T10:00:00Z".to_string(),
        }
    }

    #[test]
    fn same_registration_number_different_names_collapse() {
        let resolver = EntityResolver::new();
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        let extractions = vec![
            make_extraction("Acme Limited", Some("HRB 12345"), EntityRelationship::Subsidiary, 0.8, doc_a),
            make_extraction("ACME Ltd.", Some("hrb-12345"), EntityRelationship::Subsidiary, 0.9, doc_b),
        ];

        let resolved = resolver.resolve(Uuid::new_v4(), &extractions);

        assert_eq!(resolved.records.len(), 1, "registration match must collapse");
        let record = &resolved.records[0];
        assert_eq!(record.entity_name, "ACME Ltd.", "highest-confidence name wins");
        assert_eq!(record.confidence, 0.9);
        assert_eq!(record.source_document_ids, vec![doc_a, doc_b]);
        assert!(!record.conflict_flag);
    }

    #[test]
    fn same_name_different_registration_numbers_stay_distinct() {
        let resolver = EntityResolver::new();
        let extractions = vec![
            make_extraction("Northwind Trading", Some("REG-1"), EntityRelationship::Supplier, 0.7, Uuid::new_v4()),
            make_extraction("Northwind Trading", Some("REG-2"), EntityRelationship::Supplier, 0.7, Uuid::new_v4()),
        ];

        let resolved = resolver.resolve(Uuid::new_v4(), &extractions);
        assert_eq!(resolved.records.len(), 2);
    }

    #[test]
    fn numberless_claim_joins_single_matching_numbered_group() {
        let resolver = EntityResolver::new();
        let extractions = vec![
            make_extraction("Acme Ltd", Some("HRB 12345"), EntityRelationship::Subsidiary, 0.9, Uuid::new_v4()),
            make_extraction("acme ltd", None, EntityRelationship::Subsidiary, 0.6, Uuid::new_v4()),
        ];

        let resolved = resolver.resolve(Uuid::new_v4(), &extractions);
        assert_eq!(resolved.records.len(), 1);
        assert_eq!(resolved.records[0].source_document_ids.len(), 2);
        assert_eq!(
            resolved.records[0].registration_number.as_deref(),
            Some("HRB 12345")
        );
    }

    #[test]
    fn numberless_claim_with_ambiguous_name_stays_separate() {
        let resolver = EntityResolver::new();
        let extractions = vec![
            make_extraction("Northwind Trading", Some("REG-1"), EntityRelationship::Supplier, 0.7, Uuid::new_v4()),
            make_extraction("Northwind Trading", Some("REG-2"), EntityRelationship::Supplier, 0.7, Uuid::new_v4()),
            make_extraction("Northwind Trading", None, EntityRelationship::Supplier, 0.5, Uuid::new_v4()),
        ];

        let resolved = resolver.resolve(Uuid::new_v4(), &extractions);
        assert_eq!(
            resolved.records.len(),
            3,
            "a name matching two numbered groups cannot be merged safely"
        );
    }

    #[test]
    fn name_normalization_ignores_case_whitespace_punctuation() {
        let resolver = EntityResolver::new();
        let extractions = vec![
            make_extraction("Borealis  A.G.", None, EntityRelationship::Counterparty, 0.8, Uuid::new_v4()),
            make_extraction("borealis ag", None, EntityRelationship::Counterparty, 0.7, Uuid::new_v4()),
        ];

        let resolved = resolver.resolve(Uuid::new_v4(), &extractions);
        assert_eq!(resolved.records.len(), 1);
    }

    #[test]
    fn disagreeing_relationships_set_conflict() {
        let resolver = EntityResolver::new();
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        let extractions = vec![
            make_extraction("Acme Ltd", None, EntityRelationship::Subsidiary, 0.9, doc_a),
            make_extraction("Acme Ltd", None, EntityRelationship::Counterparty, 0.6, doc_b),
        ];

        let resolved = resolver.resolve(Uuid::new_v4(), &extractions);
        assert_eq!(resolved.records.len(), 1);

        let record = &resolved.records[0];
        assert!(record.conflict_flag);
        assert!(!record.human_confirmed);
        assert_eq!(
            record.relationship,
            EntityRelationship::Subsidiary,
            "highest-confidence classification is kept alongside the flag"
        );
        let detail = record.conflict_detail.as_ref().unwrap();
        assert!(detail.contains("subsidiary"), "detail lists claims: {detail}");
        assert!(detail.contains("counterparty"));
        assert!(detail.contains(&doc_a.to_string()));
        assert!(detail.contains(&doc_b.to_string()));
        assert_eq!(resolved.summary.needing_confirmation, 1);
    }

    #[test]
    fn unknown_claims_do_not_create_conflicts() {
        let resolver = EntityResolver::new();
        let extractions = vec![
            make_extraction("Acme Ltd", None, EntityRelationship::Subsidiary, 0.9, Uuid::new_v4()),
            make_extraction("Acme Ltd", None, EntityRelationship::Unknown, 0.95, Uuid::new_v4()),
        ];

        let resolved = resolver.resolve(Uuid::new_v4(), &extractions);
        let record = &resolved.records[0];
        assert!(!record.conflict_flag);
        assert_eq!(record.relationship, EntityRelationship::Subsidiary);
    }

    #[test]
    fn ownership_within_tolerance_takes_most_frequent() {
        let resolver = EntityResolver::new();
        let mut a = make_extraction("Acme Ltd", None, EntityRelationship::Subsidiary, 0.9, Uuid::new_v4());
        let mut b = make_extraction("Acme Ltd", None, EntityRelationship::Subsidiary, 0.8, Uuid::new_v4());
        let mut c = make_extraction("Acme Ltd", None, EntityRelationship::Subsidiary, 0.7, Uuid::new_v4());
        a.ownership_percent = Some(75.0);
        b.ownership_percent = Some(75.0);
        c.ownership_percent = Some(74.5);

        let resolved = resolver.resolve(Uuid::new_v4(), &[a, b, c]);
        let record = &resolved.records[0];
        assert!(!record.conflict_flag);
        assert_eq!(record.ownership_percent, Some(75.0));
    }

    #[test]
    fn ownership_beyond_tolerance_conflicts() {
        let resolver = EntityResolver::new();
        let mut a = make_extraction("Acme Ltd", None, EntityRelationship::Subsidiary, 0.9, Uuid::new_v4());
        let mut b = make_extraction("Acme Ltd", None, EntityRelationship::Subsidiary, 0.8, Uuid::new_v4());
        a.ownership_percent = Some(80.0);
        b.ownership_percent = Some(49.0);

        let resolved = resolver.resolve(Uuid::new_v4(), &[a, b]);
        let record = &resolved.records[0];
        assert!(record.conflict_flag);
        let detail = record.conflict_detail.as_ref().unwrap();
        assert!(detail.contains("Ownership"), "detail should mention ownership: {detail}");
    }

    #[test]
    fn malformed_records_dropped_and_counted() {
        let resolver = EntityResolver::new();
        let extractions = vec![
            make_extraction("", None, EntityRelationship::Supplier, 0.9, Uuid::new_v4()),
            make_extraction("   ", None, EntityRelationship::Supplier, 0.9, Uuid::new_v4()),
            make_extraction("Acme Ltd", None, EntityRelationship::Supplier, 0.9, Uuid::new_v4()),
        ];

        let resolved = resolver.resolve(Uuid::new_v4(), &extractions);
        assert_eq!(resolved.records.len(), 1);
        assert_eq!(resolved.summary.malformed_dropped, 2);
    }

    #[test]
    fn evidence_merges_and_caps() {
        let resolver = EntityResolver::new();
        let mut a = make_extraction("Acme Ltd", None, EntityRelationship::Supplier, 0.9, Uuid::new_v4());
        let mut b = make_extraction("Acme Ltd", None, EntityRelationship::Supplier, 0.8, Uuid::new_v4());
        a.evidence = Some("x".repeat(500));
        b.evidence = Some("y".repeat(500));

        let resolved = resolver.resolve(Uuid::new_v4(), &[a, b]);
        let evidence = resolved.records[0].evidence.as_ref().unwrap();
        assert_eq!(evidence.chars().count(), EVIDENCE_MAX_LEN);
        assert!(evidence.contains(" | "));
    }

    #[test]
    fn summary_counts_subsidiaries_and_counterparties() {
        let resolver = EntityResolver::new();
        let extractions = vec![
            make_extraction("Sub One", None, EntityRelationship::Subsidiary, 0.9, Uuid::new_v4()),
            make_extraction("Sub Two", None, EntityRelationship::Subsidiary, 0.9, Uuid::new_v4()),
            make_extraction("Vendor", None, EntityRelationship::Counterparty, 0.9, Uuid::new_v4()),
            make_extraction("Bank", None, EntityRelationship::Lender, 0.9, Uuid::new_v4()),
        ];

        let resolved = resolver.resolve(Uuid::new_v4(), &extractions);
        assert_eq!(resolved.summary.total_entities, 4);
        assert_eq!(resolved.summary.subsidiaries, 2);
        assert_eq!(resolved.summary.counterparties, 1);
        assert_eq!(resolved.summary.needing_confirmation, 0);
    }

    #[test]
    fn resolution_is_deterministic_for_same_input() {
        let resolver = EntityResolver::new();
        let doc = Uuid::new_v4();
        let extractions = vec![
            make_extraction("Acme Ltd", Some("HRB 1"), EntityRelationship::Subsidiary, 0.9, doc),
            make_extraction("Borealis AG", None, EntityRelationship::Counterparty, 0.8, doc),
        ];

        let first = resolver.resolve(Uuid::new_v4(), &extractions);
        let second = resolver.resolve(Uuid::new_v4(), &extractions);

        let names_first: Vec<&str> =
            first.records.iter().map(|r| r.entity_name.as_str()).collect();
        let names_second: Vec<&str> =
            second.records.iter().map(|r| r.entity_name.as_str()).collect();
        assert_eq!(names_first, names_second);
        assert_eq!(first.summary, second.summary);
    }
}
