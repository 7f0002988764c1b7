pub mod config;
pub mod error;
pub mod metrics;

pub use communities::CommunityBuildReport;
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use extract::WorkerPool;
pub use index::{GraphStats, Record};
pub use metrics::{Metrics, MetricsSnapshot, TimedOperation};
pub use summarize::SummaryReport;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use communities::CommunityBuilder;
use extract::{CachedModel, Extractor, LanguageModel, ResilientModel};
use index::{GraphMerger, GraphStore, MergeReport, ResilientStore};
use ingest::Chunk;
use metrics::MeteredModel;
use summarize::Summarizer;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractReport {
    pub message: String,
    pub chunks: usize,
    pub chunks_failed: usize,
    pub rejected_candidates: usize,
    pub imported_relationships: usize,
    pub merge: MergeReport,
}

/// Entry points of the graph builder. Stages run strictly one after another;
/// units inside a stage share one bounded worker pool.
pub struct GraphRag {
    store: Arc<dyn GraphStore>,
    llm: Arc<dyn LanguageModel>,
    pool: WorkerPool,
    config: PipelineConfig,
    metrics: Arc<Metrics>,
}

impl GraphRag {
    /// Verify the store and install its schema. Any failure here is fatal.
    pub async fn new(
        store: Arc<dyn GraphStore>,
        model: Arc<dyn LanguageModel>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let store: Arc<dyn GraphStore> = Arc::new(ResilientStore::new(store, config.store_retry_policy()));
        store.verify().await.map_err(PipelineError::fatal)?;
        store.init_schema().await.map_err(PipelineError::fatal)?;

        let metrics = Metrics::new();
        let metered: Arc<dyn LanguageModel> = Arc::new(MeteredModel::new(model, metrics.clone()));
        let resilient: Arc<dyn LanguageModel> =
            Arc::new(ResilientModel::new(metered, config.retry_policy(), config.request_timeout()));
        let llm: Arc<dyn LanguageModel> = if config.cache.enabled && config.cache.max_entries > 0 {
            Arc::new(CachedModel::new(resilient, config.cache.max_entries))
        } else {
            resilient
        };

        info!(
            model = %llm.model_name(),
            workers = config.concurrency.workers,
            mode = ?config.mode,
            "Pipeline ready"
        );

        Ok(Self {
            store,
            llm,
            pool: WorkerPool::new(config.concurrency.workers),
            config,
            metrics,
        })
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract and merge every text. Texts within the chunk budget are used
    /// unmodified as one chunk each; longer texts are split.
    pub async fn extract(&self, texts: &[String], allowed_types: &[String]) -> Result<ExtractReport, PipelineError> {
        let chunks = ingest::chunk_texts(texts, self.config.chunker_config());
        self.extract_chunks(chunks, allowed_types).await
    }

    pub async fn extract_chunks(
        &self,
        chunks: Vec<Chunk>,
        allowed_types: &[String],
    ) -> Result<ExtractReport, PipelineError> {
        if allowed_types.iter().all(|t| t.trim().is_empty()) {
            return Err(PipelineError::Fatal("allowed entity types must not be empty".into()));
        }

        let timer = TimedOperation::start();
        let mut report = ExtractReport {
            chunks: chunks.len(),
            ..Default::default()
        };
        info!(chunks = chunks.len(), "Extracting entities and relationships");

        let extractor = Arc::new(
            Extractor::new(self.llm.clone())
                .with_temperature(self.config.model.temperature)
                .with_language(self.config.model.language.clone()),
        );
        let merger = GraphMerger::new(self.store.clone());
        let allowed: Arc<[String]> = allowed_types.into();
        let metrics = self.metrics.clone();

        let outcomes = self
            .pool
            .run(chunks, move |chunk| {
                let (extractor, merger, allowed, metrics) =
                    (extractor.clone(), merger.clone(), allowed.clone(), metrics.clone());
                async move {
                    let extraction = match extractor.extract_from_text(&chunk.text, &allowed).await {
                        Ok(extraction) => extraction,
                        Err(e) => {
                            warn!(chunk = %chunk.chunk_id, error = %e, "Dropping chunk after extraction failure");
                            metrics.record_chunk(None, 0);
                            return None;
                        }
                    };

                    match merger.merge_chunk(&chunk, &extraction).await {
                        Ok(merge) => {
                            debug!(
                                chunk = %chunk.chunk_id,
                                entities = merge.entities_created + merge.entities_updated,
                                relationships = merge.imported_relationships(),
                                "Merged chunk"
                            );
                            metrics.record_chunk(Some(&merge), extraction.rejected);
                            Some((merge, extraction.rejected))
                        }
                        Err(e) => {
                            warn!(chunk = %chunk.chunk_id, error = %e, "Dropping chunk after merge failure");
                            metrics.record_chunk(None, 0);
                            None
                        }
                    }
                }
            })
            .await;

        for outcome in outcomes {
            match outcome {
                Ok(Some((merge, rejected))) => {
                    report.merge.absorb(&merge);
                    report.rejected_candidates += rejected;
                }
                Ok(None) => report.chunks_failed += 1,
                Err(e) => {
                    warn!(error = %e, "Extraction task aborted");
                    report.chunks_failed += 1;
                }
            }
        }

        report.imported_relationships = report.merge.imported_relationships();
        report.message = format!(
            "Successfully imported {} relationships from {} of {} chunks",
            report.imported_relationships,
            report.chunks - report.chunks_failed,
            report.chunks
        );
        self.metrics.record_extract(timer.elapsed());
        info!(
            imported_relationships = report.imported_relationships,
            failed = report.chunks_failed,
            "Extraction finished"
        );

        Ok(report)
    }

    pub async fn summarize_entities_and_relationships(&self) -> Result<SummaryReport, PipelineError> {
        let timer = TimedOperation::start();

        let report = Summarizer::new(self.store.clone(), self.llm.clone(), self.pool.clone())
            .with_temperature(self.config.model.temperature)
            .with_language(self.config.model.language.clone())
            .run()
            .await?;

        self.metrics.record_summaries(timer.elapsed(), &report);
        Ok(report)
    }

    pub async fn summarize_communities(&self) -> Result<CommunityBuildReport, PipelineError> {
        let timer = TimedOperation::start();

        let report = CommunityBuilder::new(self.store.clone(), self.llm.clone(), self.pool.clone())
            .with_temperature(self.config.model.temperature)
            .with_language(self.config.model.language.clone())
            .with_max_input_chars(self.config.community.max_input_chars)
            .run()
            .await?;

        self.metrics
            .record_communities(timer.elapsed(), report.summarized, report.failed);
        Ok(report)
    }

    /// Passthrough read access to the store
    pub async fn query(&self, statement: &str) -> Result<Vec<Record>, PipelineError> {
        let timer = TimedOperation::start();
        let rows = self.store.query(statement).await?;
        self.metrics.record_query(timer.elapsed());
        Ok(rows)
    }

    pub async fn stats(&self) -> Result<GraphStats, PipelineError> {
        Ok(self.store.stats().await?)
    }
}
