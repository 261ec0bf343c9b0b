//! Codevec Configuration Management
//!
//! Handles configuration from environment variables and TOML files
//! with defaults suited to indexing a local checkout.
//!
//! Author: codevec contributors

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::VectorDatabaseOptions;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Vector backend selection and connection
    pub vector: VectorConfig,

    /// Embedding function configuration
    pub embedding: EmbeddingConfig,

    /// Workspace indexing configuration
    pub indexing: IndexingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Vector backend
        if let Ok(provider) = std::env::var("CODEVEC_PROVIDER") {
            self.vector.provider = provider.to_lowercase();
        }
        if let Ok(enabled) = std::env::var("CODEVEC_ENABLED") {
            self.vector.enabled = parse_bool("CODEVEC_ENABLED", &enabled)?;
        }
        if let Ok(collection) = std::env::var("CODEVEC_COLLECTION") {
            self.vector.collection = collection;
        }
        if let Ok(path) = std::env::var("CODEVEC_STORAGE_PATH") {
            self.vector.storage_path = Some(PathBuf::from(path));
        }

        // Qdrant
        if let Ok(url) = std::env::var("QDRANT_URL") {
            self.vector.qdrant_url = url;
        }
        if let Ok(key) = std::env::var("QDRANT_API_KEY") {
            self.vector.qdrant_api_key = Some(key);
        }

        // Embeddings
        if let Ok(provider) = std::env::var("EMBEDDING_PROVIDER") {
            self.embedding.provider = provider.parse()?;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.embedding.openai_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            self.embedding.ollama_url = url;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Vector backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Backend name ("local" or "qdrant")
    pub provider: String,

    /// Whether indexing and search are enabled
    pub enabled: bool,

    /// Collection name
    pub collection: String,

    /// Directory for the local backend's snapshot (in-memory only if unset)
    pub storage_path: Option<PathBuf>,

    /// Qdrant gRPC URL
    pub qdrant_url: String,

    /// Qdrant API key
    pub qdrant_api_key: Option<String>,

    /// Vector dimension override (defaults to the embedding client's)
    pub dimension: Option<usize>,

    /// Request timeout in seconds for networked backends
    pub timeout_secs: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            enabled: true,
            collection: "codevec".to_string(),
            storage_path: None,
            qdrant_url: "http://localhost:6334".to_string(),
            qdrant_api_key: None,
            dimension: None,
            timeout_secs: 30,
        }
    }
}

impl VectorConfig {
    /// Initialization options for the configured backend
    pub fn to_options(&self) -> VectorDatabaseOptions {
        VectorDatabaseOptions {
            collection: Some(self.collection.clone()),
            storage_path: self.storage_path.clone(),
            url: Some(self.qdrant_url.clone()),
            api_key: self.qdrant_api_key.clone(),
            dimension: self.dimension,
            timeout_secs: Some(self.timeout_secs),
            extra: Default::default(),
        }
    }
}

/// Embedding function configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding provider
    pub provider: EmbeddingProviderKind,

    /// Embedding model name
    pub model: String,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI-compatible base URL
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Dimension of the offline hashing embedding
    pub hash_dimension: usize,

    /// Maximum number of cached embeddings (0 disables the cache)
    pub cache_capacity: u64,

    /// Time-to-live for cached embeddings in seconds
    pub cache_ttl_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Hash,
            model: "text-embedding-3-small".to_string(),
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            hash_dimension: 384,
            cache_capacity: 10_000,
            cache_ttl_secs: 3600,
        }
    }
}

/// Supported embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Offline feature-hashing embedding
    Hash,
    OpenAI,
    Ollama,
}

impl std::str::FromStr for EmbeddingProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hash" | "local" => Ok(Self::Hash),
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ConfigError::InvalidValue {
                key: "EMBEDDING_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Default include pattern for workspace indexing
pub const DEFAULT_INCLUDE: &str = "**/*.{js,ts,jsx,tsx,py,java,c,cpp,h,hpp,cs,go,rs,rust}";

/// Default exclude patterns for workspace indexing
pub const DEFAULT_EXCLUDE: &str = "**/node_modules/**,**/dist/**,**/build/**,**/.git/**,**/target/**";

/// Workspace indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Files per `add_documents` call
    pub batch_size: usize,

    /// Files longer than this many characters are skipped
    pub max_file_chars: usize,

    /// Include glob(s), comma-separated
    pub include: String,

    /// Exclude glob(s), comma-separated
    pub exclude: String,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_file_chars: 100_000,
            include: DEFAULT_INCLUDE.to_string(),
            exclude: DEFAULT_EXCLUDE.to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl From<ConfigError> for crate::CodevecError {
    fn from(err: ConfigError) -> Self {
        crate::CodevecError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.vector.provider, "local");
        assert!(config.vector.enabled);
        assert_eq!(config.indexing.batch_size, 10);
        assert_eq!(config.indexing.max_file_chars, 100_000);
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Hash);
    }

    #[test]
    fn test_embedding_provider_parse() {
        assert_eq!(
            "openai".parse::<EmbeddingProviderKind>().unwrap(),
            EmbeddingProviderKind::OpenAI
        );
        assert_eq!(
            "Ollama".parse::<EmbeddingProviderKind>().unwrap(),
            EmbeddingProviderKind::Ollama
        );
        assert!("invalid".parse::<EmbeddingProviderKind>().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("K", "true").unwrap());
        assert!(!parse_bool("K", "off").unwrap());
        assert!(parse_bool("K", "maybe").is_err());
    }

    #[test]
    fn test_from_file_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[vector]\nprovider = \"qdrant\"\ncollection = \"repo\"\n\n[indexing]\nbatch_size = 25"
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.vector.provider, "qdrant");
        assert_eq!(config.vector.collection, "repo");
        assert_eq!(config.vector.qdrant_url, "http://localhost:6334");
        assert_eq!(config.indexing.batch_size, 25);
        assert_eq!(config.indexing.max_file_chars, 100_000);
    }

    #[test]
    fn test_from_file_missing() {
        let err = AppConfig::from_file("/nonexistent/codevec.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }

    #[test]
    fn test_to_options() {
        let config = VectorConfig {
            storage_path: Some(PathBuf::from("/tmp/codevec")),
            ..Default::default()
        };
        let options = config.to_options();
        assert_eq!(options.collection.as_deref(), Some("codevec"));
        assert_eq!(options.storage_path, Some(PathBuf::from("/tmp/codevec")));
        assert_eq!(options.timeout_secs, Some(30));
    }
}
