//! Configuration
//!
//! Layered: built-in defaults, then an optional `codeloom.toml`, then
//! environment variables. The embedding dimension and tokenizer
//! encoding are pinned here and validated at startup so every component
//! agrees on them.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    /// Fixed vector width; asserted against provider responses
    pub dimension: usize,
    /// BPE encoding identity; must match the built-in tokenizer
    pub encoding: String,
    pub batch_size: usize,
    pub timeout_secs: u64,
    /// Hybrid (content + summary + file context) embedding toggle
    pub hybrid: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/embeddings".to_owned(),
            api_key: String::new(),
            model: "text-embedding-3-small".to_owned(),
            dimension: 1536,
            encoding: crate::tokenizer::ENCODING_NAME.to_owned(),
            batch_size: crate::embedding::DEFAULT_BATCH_SIZE,
            timeout_secs: 30,
            hybrid: false,
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub api_url: String,
    pub api_key: String,
    pub index: String,
    pub region: String,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: String::new(),
            index: "repo-chunks".to_owned(),
            region: "us-east-1".to_owned(),
            timeout_secs: 20,
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub secret: String,
    /// Only pushes to this ref are acknowledged
    pub branch: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self { secret: String::new(), branch: "refs/heads/main".to_owned() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub url: String,
    pub idempotency_table: String,
    /// Delivery attempts before a job moves to the dead-letter queue
    pub max_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            idempotency_table: "codeloom-idempotency".to_owned(),
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub bucket: String,
    /// Local root for the filesystem object store
    pub root: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self { bucket: String::new(), root: ".codeloom/archives".to_owned() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: String::new(),
            model: "gemini-1.5-flash".to_owned(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Bounded worker pool size for per-file processing
    pub max_workers: usize,
    pub overlap_tokens: u32,
    pub clone_timeout_secs: u64,
    pub errors_path: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            overlap_tokens: 0,
            clone_timeout_secs: 600,
            errors_path: ".codeloom/errors.jsonl".to_owned(),
        }
    }
}

impl IngestConfig {
    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    pub webhook: WebhookConfig,
    pub queue: QueueConfig,
    pub archive: ArchiveConfig,
    pub llm: LlmConfig,
    pub ingest: IngestConfig,
}

/// Flat environment names mapped onto nested config paths
const ENV_MAP: &[(&str, &str)] = &[
    ("EMBEDDING_API_KEY", "embedding.api_key"),
    ("VECTOR_STORE_API_KEY", "store.api_key"),
    ("VECTOR_STORE_INDEX", "store.index"),
    ("VECTOR_STORE_REGION", "store.region"),
    ("WEBHOOK_SECRET", "webhook.secret"),
    ("QUEUE_URL", "queue.url"),
    ("IDEMPOTENCY_TABLE", "queue.idempotency_table"),
    ("ARCHIVE_BUCKET", "archive.bucket"),
    ("LLM_API_KEY", "llm.api_key"),
];

impl Config {
    /// Load defaults <- codeloom.toml <- environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Toml::file("codeloom.toml"))
    }

    fn load_from<P: figment::Provider>(file: P) -> Result<Self, ConfigError> {
        let flat_names: Vec<&str> = ENV_MAP.iter().map(|(name, _)| *name).collect();
        let env = Env::raw()
            .only(&flat_names)
            .map(|key| {
                for (name, path) in ENV_MAP {
                    if key.as_str().eq_ignore_ascii_case(name) {
                        return (*path).into();
                    }
                }
                key.as_str().to_owned().into()
            })
            .split(".");

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(file)
            .merge(env)
            .extract()
            .map_err(Box::new)?;

        config.validate()?;
        Ok(config)
    }

    /// Startup assertions over pinned values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.dimension == 0 {
            return Err(ConfigError::Invalid("embedding.dimension must be non-zero".to_owned()));
        }
        if self.embedding.encoding != crate::tokenizer::ENCODING_NAME {
            return Err(ConfigError::Invalid(format!(
                "embedding.encoding is pinned to {}, got {}",
                crate::tokenizer::ENCODING_NAME,
                self.embedding.encoding
            )));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid("embedding.batch_size must be non-zero".to_owned()));
        }
        if self.ingest.max_workers == 0 {
            return Err(ConfigError::Invalid("ingest.max_workers must be non-zero".to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.embedding.encoding, "cl100k_base");
        assert_eq!(config.ingest.max_workers, 4);
        assert_eq!(config.webhook.branch, "refs/heads/main");
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let mut config = Config::default();
        config.embedding.dimension = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wrong_encoding_rejected() {
        let mut config = Config::default();
        config.embedding.encoding = "o200k_base".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = Config::load_from(Toml::string(
            r#"
            [embedding]
            dimension = 768

            [ingest]
            max_workers = 8
            "#,
        ))
        .unwrap();
        assert_eq!(config.embedding.dimension, 768);
        assert_eq!(config.ingest.max_workers, 8);
        // Untouched sections keep defaults
        assert_eq!(config.store.index, "repo-chunks");
    }
}
