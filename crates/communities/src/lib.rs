pub mod prompt;
pub mod report;

pub use report::{parse_report, ReportError};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use extract::{ChatMessage, ChatOptions, LanguageModel, WorkerPool};
use index::{CommunityInput, GraphStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelReport {
    pub level: usize,
    pub communities: usize,
    pub summarized: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityBuildReport {
    pub level_count: usize,
    pub community_count: usize,
    pub top_level_count: usize,
    pub summarized: usize,
    pub failed: usize,
    pub levels: Vec<LevelReport>,
}

/// Partitions the entity graph and writes one report per community,
/// finest level first.
pub struct CommunityBuilder {
    store: Arc<dyn GraphStore>,
    llm: Arc<dyn LanguageModel>,
    pool: WorkerPool,
    temperature: f32,
    language: Option<String>,
    max_input_chars: usize,
}

impl CommunityBuilder {
    pub fn new(store: Arc<dyn GraphStore>, llm: Arc<dyn LanguageModel>, pool: WorkerPool) -> Self {
        Self {
            store,
            llm,
            pool,
            temperature: 0.0,
            language: None,
            max_input_chars: prompt::DEFAULT_MAX_INPUT_CHARS,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }

    pub async fn run(&self) -> Result<CommunityBuildReport> {
        let partition = self.store.partition().await?;
        info!(
            levels = partition.levels,
            communities = partition.community_count,
            "Partitioned entity graph"
        );

        let mut report = CommunityBuildReport {
            level_count: partition.levels,
            community_count: partition.community_count,
            top_level_count: partition.top_level_count,
            ..Default::default()
        };

        // A level only starts once every report of the level below is stored
        for level in 0..partition.levels {
            let level_report = self.summarize_level(level).await?;
            report.summarized += level_report.summarized;
            report.failed += level_report.failed;
            report.levels.push(level_report);
        }

        info!(summarized = report.summarized, failed = report.failed, "Community reports written");
        Ok(report)
    }

    async fn summarize_level(&self, level: usize) -> Result<LevelReport> {
        let inputs = self.store.community_inputs(level).await?;
        debug!(level, communities = inputs.len(), "Summarizing community level");

        let mut report = LevelReport {
            level,
            communities: inputs.len(),
            ..Default::default()
        };

        let store = Arc::clone(&self.store);
        let llm = Arc::clone(&self.llm);
        let options = ChatOptions {
            temperature: self.temperature,
            json: true,
        };
        let language = self.language.clone();
        let max_chars = self.max_input_chars;

        let outcomes = self
            .pool
            .run(inputs, move |input| {
                let (store, llm, language) = (store.clone(), llm.clone(), language.clone());
                async move {
                    summarize_community(store.as_ref(), llm.as_ref(), &options, language.as_deref(), max_chars, input)
                        .await
                }
            })
            .await;

        for outcome in outcomes {
            match outcome {
                Ok(true) => report.summarized += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    warn!(level, error = %e, "Community task aborted");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

async fn summarize_community(
    store: &dyn GraphStore,
    llm: &dyn LanguageModel,
    options: &ChatOptions,
    language: Option<&str>,
    max_chars: usize,
    input: CommunityInput,
) -> bool {
    let messages = [
        ChatMessage::system(prompt::COMMUNITY_SYSTEM_PROMPT),
        ChatMessage::user(prompt::build_community_prompt(&input, max_chars, language)),
    ];

    let output = match llm.chat(&messages, options).await {
        Ok(output) => output,
        Err(e) => {
            warn!(community = %input.id, error = %e, "Community report call failed");
            return false;
        }
    };

    let report = match parse_report(&output) {
        Ok(report) => report,
        Err(e) => {
            warn!(community = %input.id, error = %e, "Unusable community report");
            return false;
        }
    };

    match store.save_community_report(&input.id, &report).await {
        Ok(()) => {
            debug!(community = %input.id, rating = report.rating, "Saved community report");
            true
        }
        Err(e) => {
            warn!(community = %input.id, error = %e, "Failed to save community report");
            false
        }
    }
}
