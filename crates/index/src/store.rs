use anyhow::Result;
use async_trait::async_trait;

use extract::{EntityCandidate, RelationshipCandidate};
use ingest::Chunk;

use crate::model::{
    CommunityInput, CommunityRecord, CommunityReport, DescriptionSet, GraphStats, ItemKey,
    MergeOutcome, PartitionSummary, Record,
};

/// The persisted graph. Every mutation is a single atomic operation on one
/// key; callers hold keys, never node handles.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Fails when the store is unreachable or lacks a capability the
    /// pipeline needs (e.g. the community detection procedures).
    async fn verify(&self) -> Result<()>;

    async fn init_schema(&self) -> Result<()>;

    async fn upsert_chunk(&self, chunk: &Chunk) -> Result<()>;

    /// Create the entity or append the fragment, linking the chunk when it
    /// exists. A stored type is never overwritten; an untyped endpoint takes
    /// the incoming name and type and counts as created.
    async fn merge_entity(&self, entity: &EntityCandidate, chunk_id: Option<&str>) -> Result<MergeOutcome>;

    /// Same contract as [`GraphStore::merge_entity`] for the
    /// `(source, target, type)` edge. Missing endpoints are created untyped,
    /// so the result does not depend on which chunk named the entity first.
    async fn merge_relationship(
        &self,
        relationship: &RelationshipCandidate,
        chunk_id: Option<&str>,
    ) -> Result<MergeOutcome>;

    /// Copy the only fragment into the summary of every single-fragment item
    /// that lacks an up-to-date summary. Returns the number of items updated.
    async fn adopt_single_fragments(&self) -> Result<usize>;

    /// Multi-fragment items whose summary is absent or stale
    async fn stale_descriptions(&self) -> Result<Vec<DescriptionSet>>;

    /// Store a summary computed from `fragment_count` fragments. Returns false
    /// (and writes nothing) if the item gained fragments in the meantime.
    async fn save_summary(&self, item: &ItemKey, summary: &str, fragment_count: usize) -> Result<bool>;

    /// Replace any previous community hierarchy with a fresh multi-level
    /// partition of the current entity graph.
    async fn partition(&self) -> Result<PartitionSummary>;

    async fn community_inputs(&self, level: usize) -> Result<Vec<CommunityInput>>;

    async fn save_community_report(&self, community_id: &str, report: &CommunityReport) -> Result<()>;

    async fn communities(&self) -> Result<Vec<CommunityRecord>>;

    /// Passthrough read access for downstream retrieval
    async fn query(&self, statement: &str) -> Result<Vec<Record>>;

    async fn stats(&self) -> Result<GraphStats>;
}
