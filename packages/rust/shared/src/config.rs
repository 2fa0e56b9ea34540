//! Application configuration for CertCorpus.
//!
//! User config lives at `~/.certcorpus/certcorpus.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CorpusError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "certcorpus.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".certcorpus";

// ---------------------------------------------------------------------------
// Config structs (matching certcorpus.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Fetcher policies.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Chunk sizing policy.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Corpus database directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Concurrent document pipelines in a multi-document run.
    #[serde(default = "default_ingest_concurrency")]
    pub ingest_concurrency: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ingest_concurrency: default_ingest_concurrency(),
        }
    }
}

fn default_data_dir() -> String {
    "~/certcorpus".into()
}
fn default_ingest_concurrency() -> u32 {
    4
}

/// `[fetch]` section — retry/backoff and rate-limit policy for page fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum attempts per URL (first try + retries).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff in ms, doubled per retry.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Minimum ms between requests to the same host.
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            rate_limit_ms: default_rate_limit_ms(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_backoff_ms() -> u64 {
    500
}
fn default_rate_limit_ms() -> u64 {
    200
}

/// `[chunking]` section — numeric chunk policy.
///
/// Bounds apply to chunk text length in characters; `overlap_chars = 0`
/// means adjacent chunks share no text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Minimum chunk length; shorter trailing chunks are merged backward.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,

    /// Preferred flush point while accumulating sections.
    #[serde(default = "default_target_chars")]
    pub target_chars: usize,

    /// Hard upper bound, except for flagged oversized chunks.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Trailing characters of a chunk repeated at the start of the next.
    #[serde(default)]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
            target_chars: default_target_chars(),
            max_chars: default_max_chars(),
            overlap_chars: 0,
        }
    }
}

fn default_min_chars() -> usize {
    200
}
fn default_target_chars() -> usize {
    1200
}
fn default_max_chars() -> usize {
    2000
}

/// `[embedding]` section — OpenAI-compatible embedding endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the provider (`{base_url}/embeddings` is called).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Embedding model identifier, recorded on every chunk.
    #[serde(default = "default_model")]
    pub model: String,

    /// Requested vector dimensions (provider default when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,

    /// Maximum attempts per embedding call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            dimensions: None,
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_api_key_env() -> String {
    "CERTCORPUS_EMBED_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "text-embedding-3-small".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.certcorpus/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CorpusError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.certcorpus/certcorpus.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CorpusError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| CorpusError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CorpusError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CorpusError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CorpusError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the embedding API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.embedding.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(CorpusError::config(format!(
            "embedding API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Resolve the corpus data directory, expanding a leading `~`.
pub fn resolve_data_dir(config: &AppConfig) -> Result<PathBuf> {
    let raw = &config.defaults.data_dir;
    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| CorpusError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("CERTCORPUS_EMBED_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.fetch.max_attempts, 3);
        assert_eq!(parsed.chunking.target_chars, 1200);
        assert_eq!(parsed.embedding.model, "text-embedding-3-small");
    }

    #[test]
    fn partial_config_uses_section_defaults() {
        let toml_str = r#"
[chunking]
max_chars = 900

[embedding]
model = "nomic-embed-text"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.chunking.max_chars, 900);
        assert_eq!(config.chunking.min_chars, 200);
        assert_eq!(config.embedding.model, "nomic-embed-text");
        assert_eq!(config.fetch.rate_limit_ms, 200);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.embedding.api_key_env = "CC_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
