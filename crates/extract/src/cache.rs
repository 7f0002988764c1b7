use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::llm::{ChatMessage, ChatOptions, LanguageModel, LlmError};

/// Response cache in front of a model. Only successful completions are
/// stored; the key covers the model name, sampling options and every message.
pub struct CachedModel {
    inner: Arc<dyn LanguageModel>,
    responses: DashMap<String, String>,
    max_entries: usize,
}

impl CachedModel {
    pub fn new(inner: Arc<dyn LanguageModel>, max_entries: usize) -> Self {
        Self {
            inner,
            responses: DashMap::new(),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    fn store(&self, key: String, response: String) {
        if self.max_entries == 0 {
            return;
        }
        if self.responses.len() >= self.max_entries {
            // Simple eviction: clear 25% when full
            let to_remove: Vec<_> = self.responses.iter()
                .take((self.max_entries / 4).max(1))
                .map(|r| r.key().clone())
                .collect();
            for key in to_remove {
                self.responses.remove(&key);
            }
        }
        self.responses.insert(key, response);
    }

    fn cache_key(&self, messages: &[ChatMessage], options: &ChatOptions) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.inner.model_name().as_bytes());
        hasher.update(options.temperature.to_le_bytes());
        hasher.update([options.json as u8]);
        for message in messages {
            hasher.update(format!("{:?}", message.role).as_bytes());
            hasher.update([0u8]);
            hasher.update(message.content.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl LanguageModel for CachedModel {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String, LlmError> {
        let key = self.cache_key(messages, options);
        if let Some(hit) = self.responses.get(&key) {
            return Ok(hit.value().clone());
        }

        let response = self.inner.chat(messages, options).await?;
        self.store(key, response.clone());
        Ok(response)
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
