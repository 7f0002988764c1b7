pub mod cache;
pub mod llm;
pub mod normalizer;
pub mod parser;
pub mod pool;
pub mod prompt;
pub mod retry;
pub mod schema;
pub mod testing;

pub use cache::CachedModel;
pub use llm::{ChatMessage, ChatOptions, LanguageModel, LlmError, OllamaClient, Role};
pub use normalizer::{normalize_key, EntityNormalizer};
pub use pool::WorkerPool;
pub use retry::{ResilientModel, RetryPolicy, Retryable};
pub use schema::{Candidate, EntityCandidate, ExtractionResult, RelationshipCandidate};

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Model(#[from] LlmError),

    #[error("could not parse extraction output: {0}")]
    Parse(#[from] parser::ParseError),
}

pub struct Extractor {
    llm: Arc<dyn LanguageModel>,
    temperature: f32,
    language: Option<String>,
    repair_attempts: usize,
}

impl Extractor {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            temperature: 0.0,
            language: None,
            repair_attempts: 1,
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

    /// How many times the model is asked to fix output that did not parse
    pub fn with_repair_attempts(mut self, attempts: usize) -> Self {
        self.repair_attempts = attempts;
        self
    }

    /// Extract validated entity and relationship candidates from one text.
    ///
    /// Individual records that fail validation are dropped and counted in
    /// [`ExtractionResult::rejected`]; only output with no recognizable
    /// structure at all is an error.
    pub async fn extract_from_text(
        &self,
        text: &str,
        allowed_types: &[String],
    ) -> Result<ExtractionResult, ExtractError> {
        let normalizer = EntityNormalizer::new(allowed_types);
        let prompt = prompt::build_extraction_prompt(
            text,
            &normalizer.allowed_types(),
            self.language.as_deref(),
        );
        let options = ChatOptions {
            temperature: self.temperature,
            json: true,
        };

        let mut output = self.llm
            .chat(
                &[
                    ChatMessage::system(prompt::EXTRACTION_SYSTEM_PROMPT),
                    ChatMessage::user(prompt),
                ],
                &options,
            )
            .await?;

        let mut repairs_left = self.repair_attempts;
        let parsed = loop {
            match parser::parse_extraction_output(&output) {
                Ok(parsed) => break parsed,
                Err(e) if repairs_left == 0 => return Err(e.into()),
                Err(e) => {
                    repairs_left -= 1;
                    debug!(error = %e, "Extraction output did not parse, asking model to repair it");
                    output = self.llm
                        .chat(&[ChatMessage::user(prompt::build_retry_prompt(&output))], &options)
                        .await?;
                }
            }
        };

        let mut result = ExtractionResult {
            candidates: Vec::with_capacity(parsed.entities.len() + parsed.relationships.len()),
            rejected: parsed.malformed,
        };

        for raw in &parsed.entities {
            match raw.validate(&normalizer) {
                Some(entity) => result.candidates.push(Candidate::Entity(entity)),
                None => result.rejected += 1,
            }
        }
        for raw in &parsed.relationships {
            match raw.validate(&normalizer) {
                Some(relationship) => result.candidates.push(Candidate::Relationship(relationship)),
                None => result.rejected += 1,
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    fn allowed() -> Vec<String> {
        vec!["Person".into(), "Organization".into(), "Location".into()]
    }

    #[tokio::test]
    async fn test_extracts_and_validates_candidates() {
        let model = Arc::new(ScriptedModel::constant(
            r#"{"entities": [
                {"name": "Alice", "type": "person", "description": "An engineer"},
                {"name": "Acme", "type": "Organization", "description": "A company"},
                {"name": "Blue", "type": "Color", "description": "not allowed"}
               ],
               "relationships": [
                {"source": "Alice", "target": "Acme", "type": "works for", "description": "Alice works at Acme", "strength": 9}
               ]}"#,
        ));
        let extractor = Extractor::new(model.clone());

        let result = extractor.extract_from_text("Alice works at Acme", &allowed()).await.unwrap();

        assert_eq!(result.entities().count(), 2);
        assert_eq!(result.relationships().count(), 1);
        assert_eq!(result.rejected, 1);
        let rel = result.relationships().next().unwrap();
        assert_eq!(rel.source_key, "ALICE");
        assert_eq!(rel.relationship_type, "WORKS_FOR");
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_repairs_unparseable_output_once() {
        let model = Arc::new(ScriptedModel::new(|messages| {
            if testing::user_prompt(messages).starts_with("The following JSON is invalid") {
                Ok(r#"{"entities": [{"name": "Alice", "type": "Person", "description": "x"}]}"#.into())
            } else {
                Ok("entities: Alice (person)".into())
            }
        }));
        let extractor = Extractor::new(model.clone());

        let result = extractor.extract_from_text("Alice", &allowed()).await.unwrap();

        assert_eq!(result.entities().count(), 1);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_gives_up_on_garbage() {
        let model = Arc::new(ScriptedModel::constant("no structure here"));
        let extractor = Extractor::new(model.clone()).with_repair_attempts(1);

        let result = extractor.extract_from_text("Alice", &allowed()).await;

        assert!(matches!(result, Err(ExtractError::Parse(_))));
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_model_error_propagates() {
        let model = Arc::new(ScriptedModel::new(|_| Err(LlmError::Empty)));
        let extractor = Extractor::new(model);

        let result = extractor.extract_from_text("Alice", &allowed()).await;

        assert!(matches!(result, Err(ExtractError::Model(LlmError::Empty))));
    }
}
