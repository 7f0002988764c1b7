use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;

use pipeline::PipelineConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreBackend {
    Neo4j {
        uri: String,
        user: String,
        password: String,
    },
    /// In-process store for dry runs
    Memory,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub json_logs: bool,
    pub store: StoreBackend,
    pub pipeline: PipelineConfig,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid value for {}: {:?}", name, value)),
        Err(_) => Ok(None),
    }
}

impl Settings {
    /// Read settings from the environment, starting from the preset named by
    /// `GRAPHRAG_MODE`.
    pub fn from_env() -> Result<Self> {
        let mut pipeline = match var_or("GRAPHRAG_MODE", "balanced").to_lowercase().as_str() {
            "fast" => PipelineConfig::fast_mode(),
            "accurate" => PipelineConfig::accurate_mode(),
            "balanced" => PipelineConfig::default(),
            other => bail!("Unknown GRAPHRAG_MODE {:?}", other),
        };

        pipeline.model.base_url = var_or("OLLAMA_URL", &pipeline.model.base_url);
        pipeline.model.name = var_or("OLLAMA_MODEL", &pipeline.model.name);
        pipeline.model.language = env::var("GRAPHRAG_LANGUAGE").ok().filter(|l| !l.trim().is_empty());
        if let Some(temperature) = parsed("GRAPHRAG_TEMPERATURE")? {
            pipeline.model.temperature = temperature;
        }
        if let Some(workers) = parsed("GRAPHRAG_WORKERS")? {
            pipeline.concurrency.workers = workers;
        }
        if let Some(timeout) = parsed("GRAPHRAG_TIMEOUT_SECS")? {
            pipeline.concurrency.request_timeout_secs = timeout;
        }
        if let Some(max_chars) = parsed("GRAPHRAG_COMMUNITY_MAX_CHARS")? {
            pipeline.community.max_input_chars = max_chars;
        }

        let store = match var_or("GRAPH_STORE", "neo4j").to_lowercase().as_str() {
            "memory" => StoreBackend::Memory,
            "neo4j" => StoreBackend::Neo4j {
                uri: var_or("NEO4J_URI", "bolt://localhost:7687"),
                user: var_or("NEO4J_USER", "neo4j"),
                password: env::var("NEO4J_PASSWORD").context("NEO4J_PASSWORD must be set")?,
            },
            other => bail!("Unknown GRAPH_STORE {:?}", other),
        };

        Ok(Self {
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:3000"),
            json_logs: var_or("LOG_FORMAT", "text").eq_ignore_ascii_case("json"),
            store,
            pipeline,
        })
    }
}
