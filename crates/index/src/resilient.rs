use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use extract::{EntityCandidate, RelationshipCandidate, RetryPolicy};
use ingest::Chunk;

use crate::model::{
    CommunityInput, CommunityRecord, CommunityReport, DescriptionSet, GraphStats, ItemKey,
    MergeOutcome, PartitionSummary, Record,
};
use crate::store::GraphStore;

/// Wraps a store so reads and per-key writes go through the retry policy.
/// Verification, partitioning and passthrough queries run once.
pub struct ResilientStore {
    inner: Arc<dyn GraphStore>,
    policy: RetryPolicy,
}

impl ResilientStore {
    pub fn new(inner: Arc<dyn GraphStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl GraphStore for ResilientStore {
    async fn verify(&self) -> Result<()> {
        self.inner.verify().await
    }

    async fn init_schema(&self) -> Result<()> {
        self.policy.retry("store.init_schema", || self.inner.init_schema()).await
    }

    async fn upsert_chunk(&self, chunk: &Chunk) -> Result<()> {
        self.policy.retry("store.upsert_chunk", || self.inner.upsert_chunk(chunk)).await
    }

    async fn merge_entity(&self, entity: &EntityCandidate, chunk_id: Option<&str>) -> Result<MergeOutcome> {
        self.policy
            .retry("store.merge_entity", || self.inner.merge_entity(entity, chunk_id))
            .await
    }

    async fn merge_relationship(
        &self,
        relationship: &RelationshipCandidate,
        chunk_id: Option<&str>,
    ) -> Result<MergeOutcome> {
        self.policy
            .retry("store.merge_relationship", || self.inner.merge_relationship(relationship, chunk_id))
            .await
    }

    async fn adopt_single_fragments(&self) -> Result<usize> {
        self.policy
            .retry("store.adopt_single_fragments", || self.inner.adopt_single_fragments())
            .await
    }

    async fn stale_descriptions(&self) -> Result<Vec<DescriptionSet>> {
        self.policy
            .retry("store.stale_descriptions", || self.inner.stale_descriptions())
            .await
    }

    async fn save_summary(&self, item: &ItemKey, summary: &str, fragment_count: usize) -> Result<bool> {
        self.policy
            .retry("store.save_summary", || self.inner.save_summary(item, summary, fragment_count))
            .await
    }

    async fn partition(&self) -> Result<PartitionSummary> {
        self.inner.partition().await
    }

    async fn community_inputs(&self, level: usize) -> Result<Vec<CommunityInput>> {
        self.policy
            .retry("store.community_inputs", || self.inner.community_inputs(level))
            .await
    }

    async fn save_community_report(&self, community_id: &str, report: &CommunityReport) -> Result<()> {
        self.policy
            .retry("store.save_community_report", || {
                self.inner.save_community_report(community_id, report)
            })
            .await
    }

    async fn communities(&self) -> Result<Vec<CommunityRecord>> {
        self.policy.retry("store.communities", || self.inner.communities()).await
    }

    async fn query(&self, statement: &str) -> Result<Vec<Record>> {
        self.inner.query(statement).await
    }

    async fn stats(&self) -> Result<GraphStats> {
        self.policy.retry("store.stats", || self.inner.stats()).await
    }
}
