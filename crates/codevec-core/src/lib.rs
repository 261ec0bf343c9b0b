//! Codevec Core - Document model, errors, and shared types
//!
//! This crate defines the abstractions shared by every codevec layer:
//! - Vector documents, patches, and search results
//! - Search and backend initialization options
//! - The error taxonomy used by backends, the manager, and the indexer
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ConfigError, EmbeddingConfig, EmbeddingProviderKind, IndexingConfig,
    LoggingConfig, VectorConfig,
};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for codevec operations
#[derive(Error, Debug)]
pub enum CodevecError {
    /// Backend used before `initialize` or after `close`
    #[error("Backend not initialized: {0}")]
    NotInitialized(String),

    /// Malformed id, document, or query; raised before any state change
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Storage, network, or client failure inside a backend
    #[error("Backend failure: {0}")]
    BackendFailure(String),

    /// Indexing is disabled or no backend is active
    #[error("Vector search not ready: {0}")]
    NotReady(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CodevecError {
    /// Whether this error belongs to the backend-failure family
    ///
    /// Embedding, I/O, and opaque errors all originate below the provider
    /// contract and are treated like storage failures by the manager.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Self::BackendFailure(_) | Self::EmbeddingError(_) | Self::Io(_) | Self::Other(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CodevecError>;

// ============================================================================
// Documents
// ============================================================================

/// Open metadata map attached to a document.
///
/// Values are expected to be JSON scalars; backends reject arrays and objects.
pub type Metadata = HashMap<String, serde_json::Value>;

/// A document stored in a vector backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
    /// Stable identifier (a file URI for indexed code)
    pub id: String,

    /// Raw text that was embedded
    pub content: String,

    /// Embedding vector, computed by the backend when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Caller-defined scalar metadata
    #[serde(default)]
    pub metadata: Metadata,
}

impl VectorDocument {
    /// Create a new document without an embedding
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            embedding: None,
            metadata: HashMap::new(),
        }
    }

    /// Attach a precomputed embedding
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Add a metadata value
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether the document carries a non-empty embedding
    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }
}

/// Partial update for a stored document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentPatch {
    /// Replacement content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Replacement embedding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Metadata entries merged key-by-key into the stored map
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl DocumentPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set new content
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set a new embedding
    pub fn embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Set a metadata entry
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Whether the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.embedding.is_none() && self.metadata.is_none()
    }

    /// Merge this patch over an existing document.
    ///
    /// Returns the merged document and whether its embedding must be
    /// recomputed: new content arrived without a matching embedding.
    pub fn merge_into(self, existing: &VectorDocument) -> (VectorDocument, bool) {
        let content_changed = self
            .content
            .as_ref()
            .is_some_and(|c| *c != existing.content);

        let mut merged = existing.clone();
        if let Some(content) = self.content {
            merged.content = content;
        }
        if let Some(metadata) = self.metadata {
            merged.metadata.extend(metadata);
        }

        let needs_embedding = match self.embedding {
            Some(embedding) => {
                merged.embedding = Some(embedding);
                false
            }
            None if content_changed => {
                merged.embedding = None;
                true
            }
            None => !merged.has_embedding(),
        };

        (merged, needs_embedding)
    }
}

// ============================================================================
// Search Types
// ============================================================================

/// Query accepted by a backend search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchQuery {
    /// Raw text, embedded by the backend before searching
    Text(String),
    /// An already-computed query vector
    Vector(Vec<f32>),
}

impl From<&str> for SearchQuery {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for SearchQuery {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<f32>> for SearchQuery {
    fn from(vector: Vec<f32>) -> Self {
        Self::Vector(vector)
    }
}

/// Default number of search results
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Options for a search call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Maximum number of results
    pub limit: usize,

    /// Drop results scoring below this value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,

    /// Exact-match metadata filter
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub filter: Metadata,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_SEARCH_LIMIT,
            min_score: None,
            filter: HashMap::new(),
        }
    }
}

impl SearchOptions {
    /// Options with the given result limit
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    /// Set a minimum score
    pub fn min_score(mut self, score: f32) -> Self {
        self.min_score = Some(score);
        self
    }

    /// Require a metadata key to equal a value
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.filter.insert(key.into(), value.into());
        self
    }

    /// Whether a document's metadata satisfies the filter
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.filter
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value))
    }
}

/// A ranked search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Matched document
    pub document: VectorDocument,

    /// Similarity score (higher is better)
    pub score: f32,
}

/// Sort results descending by score, then apply `min_score` and `limit`.
///
/// NaN scores sort last.
pub fn rank_results(mut results: Vec<SearchResult>, options: &SearchOptions) -> Vec<SearchResult> {
    results.sort_by(|a, b| match (a.score.is_nan(), b.score.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal),
    });

    if let Some(min) = options.min_score {
        results.retain(|r| r.score >= min);
    }
    results.truncate(options.limit);
    results
}

// ============================================================================
// Backend Options
// ============================================================================

/// Backend-specific initialization parameters.
///
/// Each backend reads the fields it understands and ignores the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorDatabaseOptions {
    /// Collection (or table) name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    /// Directory for on-disk storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<PathBuf>,

    /// Server endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Server API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override for the embedding dimension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,

    /// Request timeout for networked backends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Anything else; ignored by backends that do not know the key
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

impl VectorDatabaseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set collection name
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Set storage directory
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Set server URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set embedding dimension
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
