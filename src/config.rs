//! TOML configuration.
//!
//! Every section is optional; a missing section or key takes the default
//! listed below. [`load_config`] parses and validates the file once at
//! startup, and the resulting [`Config`] is passed by reference to every
//! command. Nothing is read from globals after that, except the API keys
//! named by `*_api_key_env`.
//!
//! ```toml
//! [vector_store]
//! url = "http://localhost:6333"
//! collection = "medirag_knowledge"
//!
//! [embedding]
//! provider = "local"            # local | openai | ollama
//! model = "all-minilm-l6-v2"
//! dims = 384
//!
//! [chunking]
//! parent_size = 2000
//! parent_overlap = 200
//! child_size = 400
//! child_overlap = 50
//!
//! [retrieval]
//! k = 4
//! fetch_multiplier = 4
//!
//! [reranker]
//! provider = "local"            # local | http | lexical
//!
//! [llm]
//! provider = "gemini"
//! model = "gemini-2.5-pro"
//! api_key_env = "GOOGLE_API_KEY"
//!
//! [chat]
//! memory_turns = 3
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use medirag_core::chat::ChatSettings;
use medirag_core::chunk::ChunkingParams;

/// Fatal configuration problems detected at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {var} is not set (required for {purpose})")]
    MissingCredential { var: String, purpose: &'static str },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub cleaning: CleaningConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    #[serde(default = "default_store_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            collection: default_collection(),
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_store_url() -> String {
    "http://localhost:6333".to_string()
}
fn default_collection() -> String {
    "medirag_knowledge".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_parent_size")]
    pub parent_size: usize,
    #[serde(default = "default_parent_overlap")]
    pub parent_overlap: usize,
    #[serde(default = "default_child_size")]
    pub child_size: usize,
    #[serde(default = "default_child_overlap")]
    pub child_overlap: usize,
    #[serde(default = "default_min_fragment_chars")]
    pub min_fragment_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            parent_size: default_parent_size(),
            parent_overlap: default_parent_overlap(),
            child_size: default_child_size(),
            child_overlap: default_child_overlap(),
            min_fragment_chars: default_min_fragment_chars(),
        }
    }
}

fn default_parent_size() -> usize {
    2000
}
fn default_parent_overlap() -> usize {
    200
}
fn default_child_size() -> usize {
    400
}
fn default_child_overlap() -> usize {
    50
}
fn default_min_fragment_chars() -> usize {
    10
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkingParams {
        ChunkingParams {
            parent_size: self.parent_size,
            parent_overlap: self.parent_overlap,
            child_size: self.child_size,
            child_overlap: self.child_overlap,
            min_fragment_chars: self.min_fragment_chars,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CleaningConfig {
    /// Pages whose cleaned text has this many characters or fewer are dropped.
    #[serde(default = "default_min_page_chars")]
    pub min_page_chars: usize,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            min_page_chars: default_min_page_chars(),
        }
    }
}

fn default_min_page_chars() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_fetch_multiplier")]
    pub fetch_multiplier: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            fetch_multiplier: default_fetch_multiplier(),
        }
    }
}

fn default_k() -> usize {
    4
}
fn default_fetch_multiplier() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankerConfig {
    #[serde(default = "default_reranker_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    /// Defaults to `bge-reranker-base` for `local` and
    /// `ms-marco-MiniLM-L-12-v2` for `http`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: default_reranker_provider(),
            url: None,
            model: None,
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_reranker_provider() -> String {
    "local".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            temperature: 0.0,
            api_key_env: default_llm_key_env(),
            base_url: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "gemini".to_string()
}
fn default_llm_model() -> String {
    "gemini-2.5-pro".to_string()
}
fn default_llm_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_memory_turns")]
    pub memory_turns: usize,
    #[serde(default)]
    pub record_no_results: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            memory_turns: default_memory_turns(),
            record_no_results: false,
        }
    }
}

fn default_memory_turns() -> usize {
    3
}

impl Config {
    /// All defaults. Used by `check` when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Resolve the generative model API key from the environment.
    pub fn llm_api_key(&self) -> Result<String, ConfigError> {
        read_env_credential(&self.llm.api_key_env, "the language model")
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            k: self.retrieval.k,
            memory_turns: self.chat.memory_turns,
            record_no_results: self.chat.record_no_results,
        }
    }

    /// Check cross-field constraints. Called by [`load_config`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.chunking;
        if c.parent_size == 0 || c.child_size == 0 {
            return invalid("chunking sizes must be > 0");
        }
        if c.parent_overlap >= c.parent_size {
            return invalid("chunking.parent_overlap must be < chunking.parent_size");
        }
        if c.child_overlap >= c.child_size {
            return invalid("chunking.child_overlap must be < chunking.child_size");
        }
        if c.child_size > c.parent_size {
            return invalid("chunking.child_size must be <= chunking.parent_size");
        }

        if self.retrieval.k < 1 {
            return invalid("retrieval.k must be >= 1");
        }
        if self.retrieval.fetch_multiplier < 1 {
            return invalid("retrieval.fetch_multiplier must be >= 1");
        }
        if self.chat.memory_turns < 1 {
            return invalid("chat.memory_turns must be >= 1");
        }
        if self.embedding.batch_size == 0 {
            return invalid("embedding.batch_size must be > 0");
        }
        if self.embedding.dims == Some(0) {
            return invalid("embedding.dims must be > 0");
        }
        if self.vector_store.collection.trim().is_empty() {
            return invalid("vector_store.collection must not be empty");
        }

        match self.embedding.provider.as_str() {
            "local" => {}
            "openai" | "ollama" => {
                if self.embedding.model.is_none() || self.embedding.dims.is_none() {
                    return invalid(&format!(
                        "embedding.model and embedding.dims must be set when provider is '{}'",
                        self.embedding.provider
                    ));
                }
            }
            other => {
                return invalid(&format!(
                    "unknown embedding provider: '{}'. Must be local, openai, or ollama.",
                    other
                ))
            }
        }

        match self.reranker.provider.as_str() {
            "local" | "lexical" => {}
            "http" => {
                if self.reranker.url.is_none() {
                    return invalid("reranker.url must be set when provider is 'http'");
                }
            }
            other => {
                return invalid(&format!(
                    "unknown reranker provider: '{}'. Must be local, lexical, or http.",
                    other
                ))
            }
        }

        if self.llm.provider != "gemini" {
            return invalid(&format!(
                "unknown llm provider: '{}'. Must be gemini.",
                self.llm.provider
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return invalid("llm.temperature must be in [0.0, 2.0]");
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(msg.to_string()))
}

/// Read a non-empty credential from the environment variable `var`.
pub fn read_env_credential(var: &str, purpose: &'static str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingCredential {
            var: var.to_string(),
            purpose,
        }),
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}
