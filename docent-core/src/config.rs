//! Configuration system for Docent.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> explicit config file -> environment.
//! One `DocentConfig` is built at startup and each component receives the
//! section it needs.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocentConfig {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl DocentConfig {
    /// Check every section, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.validate()?;
        self.embedding.validate()?;
        self.llm.validate()?;
        self.retrieval.validate()?;
        Ok(())
    }
}

/// Text splitting parameters. Sizes are in characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Separators from most to least preferred. An empty string means
    /// "split between any two characters".
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            separators: default_separators(),
        }
    }
}

/// Paragraph, line, sentence (Japanese and Latin punctuation), word, character.
pub fn default_separators() -> Vec<String> {
    ["\n\n", "\n", "。", ". ", "! ", "? ", " ", ""]
        .into_iter()
        .map(String::from)
        .collect()
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(invalid("chunking.chunk_size must be greater than 0"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(invalid(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.separators.is_empty() {
            return Err(invalid("chunking.separators must not be empty"));
        }
        Ok(())
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider name: "ollama" (default) or "local".
    pub provider: String,
    pub model: String,
    pub base_url: String,
    /// Dimensions for the local embedder; ignored by remote providers.
    pub dimensions: usize,
    /// Number of texts sent per embedding request during index builds.
    pub batch_size: usize,
    /// Prepended to queries, e.g. "query: " for E5-family models.
    pub query_prefix: String,
    /// Prepended to documents, e.g. "passage: " for E5-family models.
    pub document_prefix: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".into(),
            model: "nomic-embed-text".into(),
            base_url: "http://localhost:11434".into(),
            dimensions: 384,
            batch_size: 32,
            query_prefix: String::new(),
            document_prefix: String::new(),
            timeout_secs: 60,
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.provider.as_str() {
            "ollama" => {
                if self.model.trim().is_empty() {
                    return Err(invalid("embedding.model must be set for the ollama provider"));
                }
                validate_base_url("embedding.base_url", &self.base_url)?;
            }
            "local" => {
                if self.dimensions == 0 {
                    return Err(invalid("embedding.dimensions must be greater than 0"));
                }
            }
            other => {
                return Err(invalid(format!(
                    "unknown embedding.provider '{other}' (expected 'ollama' or 'local')"
                )));
            }
        }
        if self.batch_size == 0 {
            return Err(invalid("embedding.batch_size must be greater than 0"));
        }
        if self.timeout_secs == 0 {
            return Err(invalid("embedding.timeout_secs must be greater than 0"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Chat model settings and generation bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    /// Maximum input context, in tokens (`num_ctx`).
    pub num_ctx: u32,
    /// Maximum output length, in tokens (`num_predict`).
    pub num_predict: u32,
    /// Wall-clock limit for one generation call.
    pub timeout_secs: u64,
    /// Most recent prior turns forwarded with each question.
    pub max_history_turns: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "qwen3:4b".into(),
            base_url: "http://localhost:11434".into(),
            temperature: 0.2,
            num_ctx: 4096,
            num_predict: 1024,
            timeout_secs: 120,
            max_history_turns: 10,
        }
    }
}

impl LlmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(invalid("llm.model must be set"));
        }
        validate_base_url("llm.base_url", &self.base_url)?;
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid(format!(
                "llm.temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }
        if self.num_ctx == 0 || self.num_predict == 0 {
            return Err(invalid("llm.num_ctx and llm.num_predict must be greater than 0"));
        }
        if self.timeout_secs == 0 {
            return Err(invalid("llm.timeout_secs must be greater than 0"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retrieval settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(invalid("retrieval.top_k must be greater than 0"));
        }
        Ok(())
    }
}

/// Where the index snapshot lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Snapshot directory; relative paths resolve against the workspace.
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data"),
        }
    }
}

impl IndexConfig {
    /// Resolve the snapshot directory against `workspace`.
    pub fn resolve(&self, workspace: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            workspace.join(&self.path)
        }
    }
}

/// HTTP API bind address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 7860,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}

fn validate_base_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value)
        .map_err(|e| invalid(format!("{field} is not a valid URL ({value}): {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("{field} must use http or https, got {value}")));
    }
    Ok(())
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `DOCENT_`, `__` separates sections)
/// 2. Explicit config file (`--config`)
/// 3. Workspace-local config (`.docent/config.toml`)
/// 4. User config (`~/.config/docent/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<DocentConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(DocentConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    // DOCENT_LLM__MODEL, DOCENT_RETRIEVAL__TOP_K, ...
    figment = figment.merge(Env::prefixed("DOCENT_").split("__"));

    let config: DocentConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// `~/.config/docent/config.toml` (platform equivalent).
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "docent", "docent")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// `<workspace>/.docent/config.toml`.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".docent").join("config.toml")
}
