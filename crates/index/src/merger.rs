use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use extract::ExtractionResult;
use ingest::Chunk;

use crate::model::MergeOutcome;
use crate::store::GraphStore;

/// Per-chunk merge tallies; summed across chunks by the pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub entities_created: usize,
    pub entities_updated: usize,
    pub relationships_created: usize,
    pub relationships_updated: usize,
    /// Fragments already present on the item
    pub duplicate_fragments: usize,
    pub type_conflicts: usize,
}

impl MergeReport {
    pub fn absorb(&mut self, other: &MergeReport) {
        self.entities_created += other.entities_created;
        self.entities_updated += other.entities_updated;
        self.relationships_created += other.relationships_created;
        self.relationships_updated += other.relationships_updated;
        self.duplicate_fragments += other.duplicate_fragments;
        self.type_conflicts += other.type_conflicts;
    }

    pub fn imported_relationships(&self) -> usize {
        self.relationships_created + self.relationships_updated
    }

    fn count(&mut self, outcome: &MergeOutcome, entity: bool) {
        match (entity, outcome.created) {
            (true, true) => self.entities_created += 1,
            (true, false) => self.entities_updated += 1,
            (false, true) => self.relationships_created += 1,
            (false, false) => self.relationships_updated += 1,
        }
        if !outcome.fragment_added {
            self.duplicate_fragments += 1;
        }
    }
}

/// Upserts validated candidates into a [`GraphStore`]. Holds no state of its
/// own; concurrent callers rely on the store's per-key atomicity.
#[derive(Clone)]
pub struct GraphMerger {
    store: Arc<dyn GraphStore>,
}

impl GraphMerger {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Persist the chunk, then its entities, then its relationships.
    pub async fn merge_chunk(&self, chunk: &Chunk, extraction: &ExtractionResult) -> Result<MergeReport> {
        self.store.upsert_chunk(chunk).await?;
        self.merge(extraction, Some(&chunk.chunk_id)).await
    }

    /// Merge candidates without a provenance chunk
    pub async fn merge(&self, extraction: &ExtractionResult, chunk_id: Option<&str>) -> Result<MergeReport> {
        let mut report = MergeReport::default();

        for entity in extraction.entities() {
            let outcome = self.store.merge_entity(entity, chunk_id).await?;
            if let Some(stored) = &outcome.conflicting_type {
                report.type_conflicts += 1;
                warn!(
                    entity = %entity.key,
                    stored_type = %stored,
                    incoming_type = %entity.entity_type,
                    "Entity type conflict, keeping stored type"
                );
            }
            report.count(&outcome, true);
        }

        for relationship in extraction.relationships() {
            let outcome = self.store.merge_relationship(relationship, chunk_id).await?;
            report.count(&outcome, false);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::model::RelationshipKey;
    use extract::{Candidate, EntityCandidate, RelationshipCandidate};

    fn entity(name: &str, entity_type: &str, description: &str) -> Candidate {
        Candidate::Entity(EntityCandidate {
            key: extract::normalize_key(name),
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            description: description.to_string(),
        })
    }

    fn relationship(source: &str, target: &str, description: &str, strength: f64) -> Candidate {
        Candidate::Relationship(RelationshipCandidate {
            source_key: extract::normalize_key(source),
            source_name: source.to_string(),
            target_key: extract::normalize_key(target),
            target_name: target.to_string(),
            relationship_type: "WORKS_FOR".to_string(),
            description: description.to_string(),
            strength,
        })
    }

    fn extraction(candidates: Vec<Candidate>) -> ExtractionResult {
        ExtractionResult { candidates, rejected: 0 }
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let merger = GraphMerger::new(store.clone());
        let chunk = Chunk::from_text("Alice works for Acme");
        let batch = extraction(vec![
            entity("Alice", "Person", "An engineer"),
            entity("Acme", "Organization", "A company"),
            relationship("Alice", "Acme", "Alice works for Acme", 8.0),
        ]);

        let first = merger.merge_chunk(&chunk, &batch).await.unwrap();
        let snapshot = (store.entities(), store.relationships());
        let second = merger.merge_chunk(&chunk, &batch).await.unwrap();

        assert_eq!(first.entities_created, 2);
        assert_eq!(first.relationships_created, 1);
        assert_eq!(second.duplicate_fragments, 3);
        assert_eq!((store.entities(), store.relationships()), snapshot);
    }

    #[tokio::test]
    async fn test_casing_dedups_with_first_display_name() {
        let store = Arc::new(MemoryStore::new());
        let merger = GraphMerger::new(store.clone());

        merger.merge(&extraction(vec![entity("Weaviate", "Organization", "A vector database")]), None).await.unwrap();
        merger.merge(&extraction(vec![entity("WEAVIATE", "Organization", "An open source project")]), None).await.unwrap();

        let entities = store.entities();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "Weaviate");
        assert_eq!(entities[0].fragments.len(), 2);
    }

    #[tokio::test]
    async fn test_type_conflict_keeps_first_type() {
        let store = Arc::new(MemoryStore::new());
        let merger = GraphMerger::new(store.clone());

        merger.merge(&extraction(vec![entity("Jordan", "Person", "A player")]), None).await.unwrap();
        let report = merger
            .merge(&extraction(vec![entity("Jordan", "Location", "A country")]), None)
            .await
            .unwrap();

        assert_eq!(report.type_conflicts, 1);
        let jordan = store.entity("JORDAN").unwrap();
        assert_eq!(jordan.entity_type.as_deref(), Some("Person"));
        assert_eq!(jordan.fragments, vec!["A player", "A country"]);
    }

    #[tokio::test]
    async fn test_relationship_creates_missing_endpoint() {
        let store = Arc::new(MemoryStore::new());
        let merger = GraphMerger::new(store.clone());

        let report = merger
            .merge(&extraction(vec![
                entity("Alice", "Person", "An engineer"),
                relationship("Alice", "Acme", "Alice works for Acme", 5.0),
            ]), None)
            .await
            .unwrap();

        assert_eq!(report.relationships_created, 1);
        assert_eq!(store.relationships().len(), 1);
        let acme = store.entity("ACME").unwrap();
        assert!(acme.entity_type.is_none());
        assert!(acme.fragments.is_empty());

        let later = merger
            .merge(&extraction(vec![entity("ACME", "Organization", "A company")]), None)
            .await
            .unwrap();

        assert_eq!(later.entities_created, 1);
        assert_eq!(later.type_conflicts, 0);
        let acme = store.entity("ACME").unwrap();
        assert_eq!(acme.name, "ACME");
        assert_eq!(acme.entity_type.as_deref(), Some("Organization"));
        assert_eq!(acme.fragments, vec!["A company"]);
    }

    #[tokio::test]
    async fn test_endpoint_order_does_not_matter() {
        let relationship_first = Arc::new(MemoryStore::new());
        let entity_first = Arc::new(MemoryStore::new());
        let x = extraction(vec![
            entity("Alice", "Person", "An engineer"),
            relationship("Alice", "Acme", "Alice works for Acme", 5.0),
        ]);
        let y = extraction(vec![entity("Acme", "Organization", "A company")]);

        let merger = GraphMerger::new(relationship_first.clone());
        merger.merge(&x, None).await.unwrap();
        merger.merge(&y, None).await.unwrap();
        let merger = GraphMerger::new(entity_first.clone());
        merger.merge(&y, None).await.unwrap();
        merger.merge(&x, None).await.unwrap();

        assert_eq!(relationship_first.entities(), entity_first.entities());
        assert_eq!(relationship_first.relationships(), entity_first.relationships());
    }

    #[tokio::test]
    async fn test_strength_keeps_maximum() {
        let store = Arc::new(MemoryStore::new());
        let merger = GraphMerger::new(store.clone());
        let endpoints = vec![entity("Alice", "Person", "x"), entity("Acme", "Organization", "y")];
        merger.merge(&extraction(endpoints), None).await.unwrap();

        merger.merge(&extraction(vec![relationship("Alice", "Acme", "first", 7.0)]), None).await.unwrap();
        merger.merge(&extraction(vec![relationship("Alice", "Acme", "second", 3.0)]), None).await.unwrap();

        let key = RelationshipKey {
            source: "ALICE".into(),
            target: "ACME".into(),
            relationship_type: "WORKS_FOR".into(),
        };
        let stored = store.relationship(&key).unwrap();
        assert_eq!(stored.strength, 7.0);
        assert_eq!(stored.fragments.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_merges_on_one_key() {
        let store = Arc::new(MemoryStore::new());
        let merger = GraphMerger::new(store.clone());

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..16 {
            let merger = merger.clone();
            tasks.spawn(async move {
                let batch = extraction(vec![entity("Alice", "Person", &format!("fact {}", i))]);
                merger.merge(&batch, None).await.unwrap()
            });
        }
        let mut created = 0;
        while let Some(report) = tasks.join_next().await {
            created += report.unwrap().entities_created;
        }

        assert_eq!(created, 1);
        assert_eq!(store.entity("ALICE").unwrap().fragments.len(), 16);
    }
}
