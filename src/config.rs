// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for embedsearch
//!
//! Loads configuration from .embedsearchrc.toml in current directory or
//! ~/.config/embedsearch/config.toml, then applies environment overrides once
//! at startup to produce [`EngineSettings`].

use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::errors::ConfigError;

/// Default embedding dimension for Gemini `embedding-001`.
pub const DEFAULT_EMBEDDING_LENGTH: usize = 768;
/// Default embedding model identifier.
pub const DEFAULT_EMBEDDING_MODEL: &str = "embedding-001";
/// Default environment variable holding the provider credential.
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";
/// Default bound on a single provider call.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    #[default]
    Gemini,
    Command,
    Builtin,
    Hashing,
    Dummy,
}

impl std::str::FromStr for EmbeddingProviderType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "command" => Ok(Self::Command),
            "builtin" | "fastembed" => Ok(Self::Builtin),
            "hashing" => Ok(Self::Hashing),
            "dummy" => Ok(Self::Dummy),
            _ => Err(ConfigError::InvalidValue {
                name: "EMBEDDING_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Vector dimensionality D for this deployment
    pub length: Option<usize>,
    /// Model identifier for the embedding provider
    pub model: Option<String>,
    /// Provider type (gemini, command, builtin, hashing, dummy)
    pub provider: Option<EmbeddingProviderType>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Environment variable holding the provider credential
    pub api_key_env: Option<String>,
    /// Base URL for the Gemini API
    pub base_url: Option<String>,
    /// Gemini task type
    pub task_type: Option<String>,
    /// Timeout for one provider call in milliseconds
    pub timeout_ms: Option<u64>,
    /// Retry items whose previous embedding attempt failed
    pub retry_failed: Option<bool>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Gemini)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    /// Get credential variable name (defaults to GEMINI_API_KEY)
    pub fn api_key_env(&self) -> &str {
        self.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV)
    }

    /// Get timeout (defaults to 30s)
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    /// Get retry policy (defaults to true)
    pub fn retry_failed(&self) -> bool {
        self.retry_failed.unwrap_or(true)
    }
}

/// Store configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database
    pub path: Option<PathBuf>,
}

/// Search configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of results when no limit is given
    pub default_limit: Option<usize>,
}

impl SearchConfig {
    /// Get default limit (defaults to 10)
    pub fn default_limit(&self) -> usize {
        self.default_limit.unwrap_or(10)
    }
}

/// Configuration loaded from .embedsearchrc.toml or ~/.config/embedsearch/config.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Store configuration
    pub store: StoreConfig,
    /// Search configuration
    pub search: SearchConfig,
}

impl Config {
    /// Load configuration from files
    ///
    /// Precedence (highest to lowest):
    /// 1. .embedsearchrc.toml in current directory
    /// 2. ~/.config/embedsearch/config.toml
    pub fn load() -> Self {
        if let Some(config) = Self::load_from_path(Path::new(".embedsearchrc.toml")) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("embedsearch").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Get the embedding configuration
    pub fn embeddings(&self) -> &EmbeddingConfig {
        &self.embeddings
    }

    /// Get the search configuration
    pub fn search(&self) -> &SearchConfig {
        &self.search
    }
}

/// Validated settings handed to providers and the search engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Vector dimensionality D
    pub dimension: usize,
    pub model: String,
    pub provider: EmbeddingProviderType,
    pub command: String,
    /// Provider credential, required for Gemini
    pub api_key: Option<String>,
    /// Variable the credential is read from
    pub api_key_env: String,
    pub base_url: Option<String>,
    pub task_type: Option<String>,
    pub timeout: Duration,
    pub retry_failed: bool,
}

impl EngineSettings {
    /// Settings for tests and embedding without a config file.
    pub fn new(provider: EmbeddingProviderType, dimension: usize) -> Self {
        Self {
            dimension,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            provider,
            command: "embedder".to_string(),
            api_key: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            base_url: None,
            task_type: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retry_failed: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_failed(mut self, retry_failed: bool) -> Self {
        self.retry_failed = retry_failed;
        self
    }

    /// Resolves settings from the config file and the process environment.
    ///
    /// `EMBEDDING_LENGTH`, `EMBEDDING_MODEL` and `EMBEDDING_PROVIDER` override
    /// the file. The credential is read from the variable named by
    /// `embeddings.api_key_env`.
    pub fn resolve(config: &Config) -> Result<Self, ConfigError> {
        Self::resolve_with(config, |name| env::var(name).ok())
    }

    /// Like [`EngineSettings::resolve`] with an explicit variable lookup.
    pub fn resolve_with<F>(config: &Config, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let embeddings = config.embeddings();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let dimension = match var("EMBEDDING_LENGTH") {
            Some(raw) => parse_usize("EMBEDDING_LENGTH", &raw)?,
            None => embeddings.length.unwrap_or(DEFAULT_EMBEDDING_LENGTH),
        };
        if dimension == 0 {
            return Err(ConfigError::InvalidValue {
                name: "EMBEDDING_LENGTH".to_string(),
                value: "0".to_string(),
            });
        }

        let model = var("EMBEDDING_MODEL")
            .or_else(|| embeddings.model.clone())
            .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());

        let provider = match var("EMBEDDING_PROVIDER") {
            Some(raw) => raw.parse()?,
            None => embeddings.provider(),
        };

        let timeout_ms = embeddings.timeout_ms();
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                name: "embeddings.timeout_ms".to_string(),
                value: "0".to_string(),
            });
        }

        let api_key_env = embeddings.api_key_env();
        let api_key = var(api_key_env);
        if provider == EmbeddingProviderType::Gemini && api_key.is_none() {
            return Err(ConfigError::MissingCredential(api_key_env.to_string()));
        }

        Ok(Self {
            dimension,
            model,
            provider,
            command: embeddings.command().to_string(),
            api_key,
            api_key_env: api_key_env.to_string(),
            base_url: embeddings.base_url.clone(),
            task_type: embeddings.task_type.clone(),
            timeout: Duration::from_millis(timeout_ms),
            retry_failed: embeddings.retry_failed(),
        })
    }
}

fn parse_usize(name: &str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_require_credential() {
        let config = Config::default();
        let err = EngineSettings::resolve_with(&config, env_of(&[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingCredential("GEMINI_API_KEY".to_string()));
    }

    #[test]
    fn test_defaults_with_credential() {
        let config = Config::default();
        let settings =
            EngineSettings::resolve_with(&config, env_of(&[("GEMINI_API_KEY", "secret")]))
                .unwrap();
        assert_eq!(settings.dimension, 768);
        assert_eq!(settings.model, "embedding-001");
        assert_eq!(settings.provider, EmbeddingProviderType::Gemini);
        assert_eq!(settings.api_key.as_deref(), Some("secret"));
        assert_eq!(settings.api_key_env, "GEMINI_API_KEY");
        assert_eq!(settings.timeout, Duration::from_millis(30_000));
        assert!(settings.retry_failed);
    }

    #[test]
    fn test_toml_and_env_overrides() {
        let config: Config = toml::from_str(
            r#"
[embeddings]
provider = "hashing"
length = 64
model = "bag-of-words"
timeout_ms = 500
retry_failed = false

[search]
default_limit = 3
"#,
        )
        .unwrap();

        let settings = EngineSettings::resolve_with(&config, env_of(&[])).unwrap();
        assert_eq!(settings.provider, EmbeddingProviderType::Hashing);
        assert_eq!(settings.dimension, 64);
        assert_eq!(settings.model, "bag-of-words");
        assert_eq!(settings.timeout, Duration::from_millis(500));
        assert!(!settings.retry_failed);
        assert_eq!(config.search().default_limit(), 3);

        let settings = EngineSettings::resolve_with(
            &config,
            env_of(&[("EMBEDDING_LENGTH", "128"), ("EMBEDDING_MODEL", "other")]),
        )
        .unwrap();
        assert_eq!(settings.dimension, 128);
        assert_eq!(settings.model, "other");
    }

    #[test]
    fn test_custom_credential_variable() {
        let config: Config =
            toml::from_str("[embeddings]\napi_key_env = \"TEAM_KEY\"\n").unwrap();

        let err = EngineSettings::resolve_with(&config, env_of(&[("GEMINI_API_KEY", "x")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingCredential("TEAM_KEY".to_string()));

        let settings =
            EngineSettings::resolve_with(&config, env_of(&[("TEAM_KEY", "k")])).unwrap();
        assert_eq!(settings.api_key_env, "TEAM_KEY");
        assert_eq!(settings.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn test_invalid_length() {
        let config = Config::default();
        for raw in ["0", "abc", "-3"] {
            let err = EngineSettings::resolve_with(
                &config,
                env_of(&[("EMBEDDING_LENGTH", raw), ("EMBEDDING_PROVIDER", "dummy")]),
            )
            .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { .. }), "{raw}");
        }
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!(
            "FastEmbed".parse::<EmbeddingProviderType>().unwrap(),
            EmbeddingProviderType::Builtin
        );
        assert!("nope".parse::<EmbeddingProviderType>().is_err());
    }
}
