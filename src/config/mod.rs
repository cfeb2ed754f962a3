//! Configuration management for Ragline
//!
//! Loads a TOML file, applies an optional profile and `RAGLINE_*` environment
//! overrides, then validates everything in one pass.

use crate::error::{RaglineError, Result};
use crate::retrieval::RetrievalLimits;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub vector_store: VectorStoreConfig,
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub mode: String, // "offline" (FastEmbed) or "online" (OpenAI-compatible API)
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    /// Requested vector size for online models that support truncation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

/// Completion model used for query rewriting and reranking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
}

/// Qdrant collection holding the embedded passages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    pub url: String,
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

/// Retrieval pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Passages fetched per rewritten query
    pub search_top_k: usize,
    /// Passages kept in the final context
    pub context_top_k: usize,
    pub rewrite_query_count: usize,
    pub rewrite_cache_capacity: u64,
    /// Headings must have fewer tokens than this
    pub heading_max_tokens: usize,
    /// Reranked segments must have more tokens than this
    pub rerank_min_tokens: usize,
    pub parallel_search: bool,
    pub call_timeout: String,
    pub max_retries: u32,
    pub retry_backoff: String,
}

impl RetrievalConfig {
    pub fn limits(&self) -> RetrievalLimits {
        RetrievalLimits::new(self.search_top_k, self.context_top_k)
    }

    pub fn call_timeout(&self) -> Result<Duration> {
        parse_duration(&self.call_timeout).ok_or_else(|| RaglineError::InvalidConfigValue {
            path: "retrieval.call_timeout".to_string(),
            message: format!("Invalid duration format: {}", self.call_timeout),
        })
    }

    pub fn retry_backoff(&self) -> Result<Duration> {
        parse_duration(&self.retry_backoff).ok_or_else(|| RaglineError::InvalidConfigValue {
            path: "retrieval.retry_backoff".to_string(),
            message: format!("Invalid duration format: {}", self.retry_backoff),
        })
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_top_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_top_k: Option<usize>,
}

/// Parse durations like "500ms", "30s", "2m", "1h"; a bare number is seconds
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits.parse().ok()?;

    match unit {
        "ms" => Some(Duration::from_millis(value)),
        "" | "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value.checked_mul(60)?)),
        "h" => Some(Duration::from_secs(value.checked_mul(3600)?)),
        _ => None,
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::read(path)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RaglineError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RaglineError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RaglineError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    ///
    /// Order: file, profile, environment, validation.
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.apply_profile(profile)?;
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    ///
    /// Defaults still receive environment overrides and validation. A
    /// `profile` cannot be applied without a file that defines it, so asking
    /// for one when the file is missing is an error.
    pub fn load_or_default(path: &Path, profile: Option<&str>) -> Result<Self> {
        if path.exists() {
            return match profile {
                Some(profile) => Self::load_with_profile(path, profile),
                None => Self::load(path),
            };
        }

        if let Some(profile) = profile {
            return Err(RaglineError::Config(format!(
                "Profile '{}' requested but config file {:?} does not exist",
                profile, path
            )));
        }

        tracing::warn!(
            "Config file not found, using defaults. Run 'ragline config init' to create one."
        );
        let mut config = Self::default();
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| RaglineError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(mode) = overrides.embedding_mode {
            self.embedding.mode = mode;
        }
        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(k) = overrides.search_top_k {
            self.retrieval.search_top_k = k;
        }
        if let Some(k) = overrides.context_top_k {
            self.retrieval.context_top_k = k;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: RAGLINE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    fn apply_overrides(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("RAGLINE_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        fn parse<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
            value.parse().map_err(|_| RaglineError::InvalidConfigValue {
                path: path.to_string(),
                message: format!("Cannot parse '{}'", value),
            })
        }

        match path {
            "LLM__MODEL" => self.llm.model = value.to_string(),
            "LLM__BASE_URL" => self.llm.base_url = value.to_string(),
            "LLM__TEMPERATURE" => self.llm.temperature = parse(path, value)?,
            "EMBEDDING__MODE" => self.embedding.mode = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__BASE_URL" => self.embedding.base_url = value.to_string(),
            "VECTOR_STORE__URL" => self.vector_store.url = value.to_string(),
            "VECTOR_STORE__COLLECTION" => self.vector_store.collection = value.to_string(),
            "RETRIEVAL__SEARCH_TOP_K" => self.retrieval.search_top_k = parse(path, value)?,
            "RETRIEVAL__CONTEXT_TOP_K" => self.retrieval.context_top_k = parse(path, value)?,
            "RETRIEVAL__PARALLEL_SEARCH" => self.retrieval.parallel_search = parse(path, value)?,
            "RETRIEVAL__CALL_TIMEOUT" => self.retrieval.call_timeout = value.to_string(),
            "RETRIEVAL__MAX_RETRIES" => self.retrieval.max_retries = parse(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RaglineError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("ragline").join("config.toml"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            embedding: EmbeddingConfig {
                mode: "online".to_string(),
                model: "text-embedding-3-small".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                dimensions: Some(1536),
            },
            llm: LlmConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                model: "gpt-4o-mini".to_string(),
                temperature: 0.0,
            },
            vector_store: VectorStoreConfig {
                url: "http://localhost:6333".to_string(),
                collection: "docs".to_string(),
                api_key_env: None,
            },
            retrieval: RetrievalConfig {
                search_top_k: 4,
                context_top_k: 4,
                rewrite_query_count: 2,
                rewrite_cache_capacity: 128,
                heading_max_tokens: 15,
                rerank_min_tokens: 30,
                parallel_search: true,
                call_timeout: "30s".to_string(),
                max_retries: 0,
                retry_backoff: "500ms".to_string(),
            },
            profiles: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("15"), Some(Duration::from_secs(15)));
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration("5 days"), None);
    }

    #[test]
    fn test_default_limits_are_coupled() {
        let config = Config::default();
        assert_eq!(config.retrieval.limits(), RetrievalLimits::uniform(4));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(vec![
            ("RAGLINE_LLM__MODEL".to_string(), "llama3.1:8b".to_string()),
            ("RAGLINE_RETRIEVAL__SEARCH_TOP_K".to_string(), "8".to_string()),
            ("RAGLINE_RETRIEVAL__MAX_RETRIES".to_string(), "not-a-number".to_string()),
            ("OTHER_VAR".to_string(), "ignored".to_string()),
        ]);

        assert_eq!(config.llm.model, "llama3.1:8b");
        assert_eq!(config.retrieval.search_top_k, 8);
        assert_eq!(config.retrieval.context_top_k, 4);
        assert_eq!(config.retrieval.max_retries, 0);
    }

    #[test]
    fn test_apply_profile() {
        let mut config = Config::default();
        config.profiles.insert(
            "local".to_string(),
            ProfileOverrides {
                embedding_mode: Some("offline".to_string()),
                embedding_model: Some("all-MiniLM-L6-v2".to_string()),
                llm_model: None,
                search_top_k: Some(10),
                context_top_k: None,
            },
        );

        config.apply_profile("local").unwrap();

        assert_eq!(config.embedding.mode, "offline");
        assert_eq!(config.retrieval.search_top_k, 10);
        assert_eq!(config.retrieval.context_top_k, 4);
        assert!(config.apply_profile("missing").is_err());
    }

    #[test]
    fn test_toml_roundtrip_keeps_meta_key() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();

        assert!(text.contains("[_meta]"));
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.retrieval.call_timeout, "30s");
        assert_eq!(parsed.embedding.dimensions, Some(1536));
    }
}
