use serde::{Deserialize, Serialize};
use std::time::Duration;

use extract::RetryPolicy;
use ingest::ChunkerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub mode: OperationMode,
    pub model: ModelConfig,
    pub concurrency: ConcurrencyConfig,
    /// Model calls
    pub retry: RetryConfig,
    /// Graph store reads and per-key writes
    pub store_retry: RetryConfig,
    pub cache: CacheConfig,
    pub chunking: ChunkingConfig,
    pub community: CommunityConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    Fast,      // More workers, shorter timeouts, large cache
    Accurate,  // Fewer workers, patient retries, no cache
    Balanced,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub base_url: String,
    pub name: String,
    pub temperature: f32,
    /// Language every generated description is written in
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Worker pool width shared by all stages
    pub workers: usize,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub target_tokens_max: usize,
    pub overlap_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityConfig {
    /// Character budget for the data block of one community prompt
    pub max_input_chars: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            name: "llama3".to_string(),
            temperature: 0.0,
            language: None,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        let defaults = ChunkerConfig::default();
        Self {
            target_tokens_max: defaults.target_tokens_max,
            overlap_tokens: defaults.overlap_tokens,
        }
    }
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            max_input_chars: communities::prompt::DEFAULT_MAX_INPUT_CHARS,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: OperationMode::Balanced,
            model: ModelConfig::default(),
            concurrency: ConcurrencyConfig {
                workers: extract::pool::DEFAULT_WIDTH,
                request_timeout_secs: 60,
            },
            retry: RetryConfig {
                max_retries: 3,
                initial_backoff_ms: 1000,
                max_backoff_ms: 10000,
            },
            store_retry: RetryConfig {
                max_retries: 3,
                initial_backoff_ms: 50,
                max_backoff_ms: 2000,
            },
            cache: CacheConfig {
                enabled: true,
                max_entries: 10000,
            },
            chunking: ChunkingConfig::default(),
            community: CommunityConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn fast_mode() -> Self {
        Self {
            mode: OperationMode::Fast,
            concurrency: ConcurrencyConfig {
                workers: 16,
                request_timeout_secs: 30,
            },
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff_ms: 500,
                max_backoff_ms: 5000,
            },
            cache: CacheConfig {
                enabled: true,
                max_entries: 50000,
            },
            ..Self::default()
        }
    }

    pub fn accurate_mode() -> Self {
        Self {
            mode: OperationMode::Accurate,
            concurrency: ConcurrencyConfig {
                workers: 2,
                request_timeout_secs: 120,
            },
            retry: RetryConfig {
                max_retries: 5,
                initial_backoff_ms: 2000,
                max_backoff_ms: 20000,
            },
            cache: CacheConfig {
                enabled: false,
                max_entries: 0,
            },
            ..Self::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            self.retry.initial_backoff_ms,
            self.retry.max_backoff_ms,
        )
    }

    pub fn store_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.store_retry.max_retries,
            self.store_retry.initial_backoff_ms,
            self.store_retry.max_backoff_ms,
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.concurrency.request_timeout_secs)
    }

    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            target_tokens_max: self.chunking.target_tokens_max,
            overlap_tokens: self.chunking.overlap_tokens,
        }
    }
}
