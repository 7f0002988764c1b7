//! Store doubles for tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use extract::{EntityCandidate, RelationshipCandidate};
use ingest::Chunk;

use crate::memory::MemoryStore;
use crate::model::{
    CommunityInput, CommunityRecord, CommunityReport, DescriptionSet, GraphStats, ItemKey,
    MergeOutcome, PartitionSummary, Record,
};
use crate::store::GraphStore;

/// A [`MemoryStore`] whose first few entity merges fail with a connection
/// error.
pub struct FlakyStore {
    memory: MemoryStore,
    failures_left: AtomicUsize,
}

impl FlakyStore {
    pub fn failing_entity_merges(failures: usize) -> Self {
        Self {
            memory: MemoryStore::new(),
            failures_left: AtomicUsize::new(failures),
        }
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }
}

#[async_trait]
impl GraphStore for FlakyStore {
    async fn verify(&self) -> Result<()> {
        self.memory.verify().await
    }

    async fn init_schema(&self) -> Result<()> {
        self.memory.init_schema().await
    }

    async fn upsert_chunk(&self, chunk: &Chunk) -> Result<()> {
        self.memory.upsert_chunk(chunk).await
    }

    async fn merge_entity(&self, entity: &EntityCandidate, chunk_id: Option<&str>) -> Result<MergeOutcome> {
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            bail!("connection reset");
        }
        self.memory.merge_entity(entity, chunk_id).await
    }

    async fn merge_relationship(
        &self,
        relationship: &RelationshipCandidate,
        chunk_id: Option<&str>,
    ) -> Result<MergeOutcome> {
        self.memory.merge_relationship(relationship, chunk_id).await
    }

    async fn adopt_single_fragments(&self) -> Result<usize> {
        self.memory.adopt_single_fragments().await
    }

    async fn stale_descriptions(&self) -> Result<Vec<DescriptionSet>> {
        self.memory.stale_descriptions().await
    }

    async fn save_summary(&self, item: &ItemKey, summary: &str, fragment_count: usize) -> Result<bool> {
        self.memory.save_summary(item, summary, fragment_count).await
    }

    async fn partition(&self) -> Result<PartitionSummary> {
        self.memory.partition().await
    }

    async fn community_inputs(&self, level: usize) -> Result<Vec<CommunityInput>> {
        self.memory.community_inputs(level).await
    }

    async fn save_community_report(&self, community_id: &str, report: &CommunityReport) -> Result<()> {
        self.memory.save_community_report(community_id, report).await
    }

    async fn communities(&self) -> Result<Vec<CommunityRecord>> {
        self.memory.communities().await
    }

    async fn query(&self, statement: &str) -> Result<Vec<Record>> {
        self.memory.query(statement).await
    }

    async fn stats(&self) -> Result<GraphStats> {
        self.memory.stats().await
    }
}
