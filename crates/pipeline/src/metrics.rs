use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use extract::{ChatMessage, ChatOptions, LanguageModel, LlmError};
use index::MergeReport;
use summarize::SummaryReport;

#[derive(Default)]
pub struct Metrics {
    // Attempts that reached the model service
    model_calls: AtomicUsize,
    model_failures: AtomicUsize,

    // Extraction
    chunks_processed: AtomicUsize,
    chunks_failed: AtomicUsize,
    candidates_rejected: AtomicUsize,
    entities_merged: AtomicUsize,
    relationships_merged: AtomicUsize,
    duplicate_fragments: AtomicUsize,
    type_conflicts: AtomicUsize,

    // Summaries
    summaries_written: AtomicUsize,
    summaries_failed: AtomicUsize,
    communities_summarized: AtomicUsize,
    communities_failed: AtomicUsize,

    // Timing (in microseconds)
    total_extract_time_us: AtomicU64,
    total_summarize_time_us: AtomicU64,
    total_community_time_us: AtomicU64,
    total_query_time_us: AtomicU64,
    queries: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_model_call(&self, success: bool) {
        self.model_calls.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.model_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_chunk(&self, merge: Option<&MergeReport>, rejected: usize) {
        let Some(merge) = merge else {
            self.chunks_failed.fetch_add(1, Ordering::Relaxed);
            return;
        };
        self.chunks_processed.fetch_add(1, Ordering::Relaxed);
        self.candidates_rejected.fetch_add(rejected, Ordering::Relaxed);
        self.entities_merged
            .fetch_add(merge.entities_created + merge.entities_updated, Ordering::Relaxed);
        self.relationships_merged
            .fetch_add(merge.imported_relationships(), Ordering::Relaxed);
        self.duplicate_fragments.fetch_add(merge.duplicate_fragments, Ordering::Relaxed);
        self.type_conflicts.fetch_add(merge.type_conflicts, Ordering::Relaxed);
    }

    pub fn record_extract(&self, duration: Duration) {
        self.total_extract_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_summaries(&self, duration: Duration, report: &SummaryReport) {
        self.total_summarize_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.summaries_written
            .fetch_add(report.adopted + report.summarized, Ordering::Relaxed);
        self.summaries_failed.fetch_add(report.failed, Ordering::Relaxed);
    }

    pub fn record_communities(&self, duration: Duration, summarized: usize, failed: usize) {
        self.total_community_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.communities_summarized.fetch_add(summarized, Ordering::Relaxed);
        self.communities_failed.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn record_query(&self, duration: Duration) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.total_query_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicUsize| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            model_calls: load(&self.model_calls),
            model_failures: load(&self.model_failures),
            chunks_processed: load(&self.chunks_processed),
            chunks_failed: load(&self.chunks_failed),
            candidates_rejected: load(&self.candidates_rejected),
            entities_merged: load(&self.entities_merged),
            relationships_merged: load(&self.relationships_merged),
            duplicate_fragments: load(&self.duplicate_fragments),
            type_conflicts: load(&self.type_conflicts),
            summaries_written: load(&self.summaries_written),
            summaries_failed: load(&self.summaries_failed),
            communities_summarized: load(&self.communities_summarized),
            communities_failed: load(&self.communities_failed),
            total_extract_time_ms: to_ms(&self.total_extract_time_us),
            total_summarize_time_ms: to_ms(&self.total_summarize_time_us),
            total_community_time_ms: to_ms(&self.total_community_time_us),
            avg_query_time_ms: avg_time_ms(&self.total_query_time_us, &self.queries),
        }
    }
}

fn to_ms(total_us: &AtomicU64) -> f64 {
    total_us.load(Ordering::Relaxed) as f64 / 1000.0
}

fn avg_time_ms(total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
    let count = count.load(Ordering::Relaxed) as f64;
    if count > 0.0 { to_ms(total_us) / count } else { 0.0 }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub model_calls: usize,
    pub model_failures: usize,
    pub chunks_processed: usize,
    pub chunks_failed: usize,
    pub candidates_rejected: usize,
    pub entities_merged: usize,
    pub relationships_merged: usize,
    pub duplicate_fragments: usize,
    pub type_conflicts: usize,
    pub summaries_written: usize,
    pub summaries_failed: usize,
    pub communities_summarized: usize,
    pub communities_failed: usize,
    pub total_extract_time_ms: f64,
    pub total_summarize_time_ms: f64,
    pub total_community_time_ms: f64,
    pub avg_query_time_ms: f64,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Counts every attempt that reaches the model service
pub(crate) struct MeteredModel {
    inner: Arc<dyn LanguageModel>,
    metrics: Arc<Metrics>,
}

impl MeteredModel {
    pub(crate) fn new(inner: Arc<dyn LanguageModel>, metrics: Arc<Metrics>) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl LanguageModel for MeteredModel {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String, LlmError> {
        let result = self.inner.chat(messages, options).await;
        self.metrics.record_model_call(result.is_ok());
        result
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
