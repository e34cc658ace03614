use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::TcmRagError;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub tcmrag: TcmRagConfig,
    pub graph: GraphConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub context: ContextConfig,
}

/// Process-level settings
#[derive(Debug, Clone, Deserialize)]
pub struct TcmRagConfig {
    /// Directory holding the keyed knowledge store (one JSON file per key).
    #[serde(default = "default_knowledge_dir")]
    pub knowledge_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Graph store connection
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_graph_uri")]
    pub uri: String,
    #[serde(default = "default_graph_user")]
    pub user: String,
    #[serde(default = "default_graph_password_env")]
    pub password_env: String,
    /// JSON snapshot used in place of a live Neo4j instance.
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
}

/// Remote chat model endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Chunking and transcript limits (character counts)
#[derive(Debug, Clone, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_max_chunks_per_batch")]
    pub max_chunks_per_batch: usize,
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default = "default_max_context_length")]
    pub max_context_length: usize,
    #[serde(default = "default_max_parallel_requests")]
    pub max_parallel_requests: usize,
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_chunks_per_batch: default_max_chunks_per_batch(),
            max_chunk_size: default_max_chunk_size(),
            max_context_length: default_max_context_length(),
            max_parallel_requests: default_max_parallel_requests(),
            generation_timeout_secs: default_generation_timeout_secs(),
        }
    }
}

impl ContextConfig {
    /// Check the limits the orchestrator divides and gates by.
    pub fn validate(&self) -> crate::Result<()> {
        let positive = [
            ("max_chunks_per_batch", self.max_chunks_per_batch),
            ("max_chunk_size", self.max_chunk_size),
            ("max_context_length", self.max_context_length),
            ("max_parallel_requests", self.max_parallel_requests),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(TcmRagError::Config(format!(
                    "context.{} must be greater than 0",
                    key
                )));
            }
        }
        if self.generation_timeout_secs == 0 {
            return Err(TcmRagError::Config(
                "context.generation_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.max_chunk_size >= self.max_context_length {
            return Err(TcmRagError::Config(
                "context.max_chunk_size must be less than context.max_context_length".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_knowledge_dir() -> PathBuf {
    PathBuf::from("./knowledge")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_graph_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_graph_user() -> String {
    "neo4j".to_string()
}

fn default_graph_password_env() -> String {
    "NEO4J_PASSWORD".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_chunks_per_batch() -> usize {
    6
}

fn default_max_chunk_size() -> usize {
    6000
}

fn default_max_context_length() -> usize {
    40000
}

fn default_max_parallel_requests() -> usize {
    3
}

fn default_generation_timeout_secs() -> u64 {
    600
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in TCMRAG_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("TCMRAG_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&config_str)?;
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration text without touching the environment.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse config.toml")
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let api_base = url::Url::parse(&self.llm.api_base)
            .with_context(|| format!("llm.api_base is not a valid URL: {}", self.llm.api_base))?;
        if api_base.scheme() != "http" && api_base.scheme() != "https" {
            anyhow::bail!("llm.api_base must use http or https, got {}", api_base.scheme());
        }

        std::env::var(&self.llm.api_key_env).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable with your model API key.",
                self.llm.api_key_env
            )
        })?;

        if self.graph.snapshot.is_none() {
            std::env::var(&self.graph.password_env).with_context(|| {
                format!(
                    "Environment variable {} not set and no graph.snapshot configured.",
                    self.graph.password_env
                )
            })?;
        }

        self.context.validate()?;

        Ok(())
    }

    /// Model API key, read from the environment variable named in `llm.api_key_env`.
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.llm.api_key_env)
            .with_context(|| format!("Environment variable {} not set", self.llm.api_key_env))
    }

    /// Get the knowledge store directory
    pub fn knowledge_dir(&self) -> &Path {
        &self.tcmrag.knowledge_dir
    }
}
