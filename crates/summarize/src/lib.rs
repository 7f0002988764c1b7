pub mod prompt;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use extract::{ChatMessage, ChatOptions, LanguageModel, WorkerPool};
use index::{DescriptionSet, GraphStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub status: String,
    /// Single-fragment items whose fragment became the summary
    pub adopted: usize,
    pub summarized: usize,
    /// Items that gained fragments while being summarized; left stale
    pub superseded: usize,
    pub failed: usize,
    pub model_calls: usize,
}

enum Outcome {
    Saved,
    Superseded,
    Failed,
}

/// Collapses multi-fragment descriptions into one summary per entity and
/// relationship.
pub struct Summarizer {
    store: Arc<dyn GraphStore>,
    llm: Arc<dyn LanguageModel>,
    pool: WorkerPool,
    temperature: f32,
    language: Option<String>,
}

impl Summarizer {
    pub fn new(store: Arc<dyn GraphStore>, llm: Arc<dyn LanguageModel>, pool: WorkerPool) -> Self {
        Self {
            store,
            llm,
            pool,
            temperature: 0.0,
            language: None,
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

    /// Summarize every item whose summary is missing or stale.
    ///
    /// Failures are counted per item and leave that item's summary unset;
    /// only a store failure before any work is scheduled is an error.
    pub async fn run(&self) -> Result<SummaryReport> {
        let adopted = self.store.adopt_single_fragments().await?;
        let stale = self.store.stale_descriptions().await?;
        info!(adopted, stale = stale.len(), "Summarizing descriptions");

        let mut report = SummaryReport {
            adopted,
            model_calls: stale.len(),
            ..Default::default()
        };

        let store = Arc::clone(&self.store);
        let llm = Arc::clone(&self.llm);
        let options = ChatOptions {
            temperature: self.temperature,
            json: false,
        };
        let language = self.language.clone();

        let outcomes = self
            .pool
            .run(stale, move |item| {
                let (store, llm, language) = (store.clone(), llm.clone(), language.clone());
                async move { summarize_item(store.as_ref(), llm.as_ref(), &options, language.as_deref(), item).await }
            })
            .await;

        for outcome in outcomes {
            match outcome {
                Ok(Outcome::Saved) => report.summarized += 1,
                Ok(Outcome::Superseded) => report.superseded += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Err(e) => {
                    warn!(error = %e, "Summary task aborted");
                    report.failed += 1;
                }
            }
        }

        report.status = if report.failed == 0 { "success" } else { "partial" }.to_string();
        info!(
            summarized = report.summarized,
            failed = report.failed,
            superseded = report.superseded,
            "Summarization finished"
        );

        Ok(report)
    }
}

async fn summarize_item(
    store: &dyn GraphStore,
    llm: &dyn LanguageModel,
    options: &ChatOptions,
    language: Option<&str>,
    item: DescriptionSet,
) -> Outcome {
    let messages = [
        ChatMessage::system(prompt::SUMMARY_SYSTEM_PROMPT),
        ChatMessage::user(prompt::build_summary_prompt(&item.name, &item.fragments, language)),
    ];

    let summary = match llm.chat(&messages, options).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            warn!(item = %item.name, "Model returned an empty summary");
            return Outcome::Failed;
        }
        Err(e) => {
            warn!(item = %item.name, error = %e, "Summary call failed");
            return Outcome::Failed;
        }
    };

    match store.save_summary(&item.item, &summary, item.fragments.len()).await {
        Ok(true) => {
            debug!(item = %item.name, fragments = item.fragments.len(), "Saved summary");
            Outcome::Saved
        }
        Ok(false) => {
            debug!(item = %item.name, "Item changed while summarizing, leaving it stale");
            Outcome::Superseded
        }
        Err(e) => {
            warn!(item = %item.name, error = %e, "Failed to save summary");
            Outcome::Failed
        }
    }
}
