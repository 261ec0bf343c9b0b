//! Embedding clients for generating vector representations
//!
//! Supports an offline hashing embedding plus the OpenAI and Ollama
//! embedding APIs.
//!
//! Author: codevec contributors

use async_trait::async_trait;
use codevec_core::{CodevecError, EmbeddingConfig, EmbeddingProviderKind, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CachedEmbedding;

// ============================================================================
// Embedding Trait
// ============================================================================

/// Trait for embedding generation
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimension
    fn dimension(&self) -> usize;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Identifies the vector space this client produces.
    ///
    /// Stored vectors are only comparable with query vectors carrying the
    /// same id, so persistent stores record it and refuse mismatches.
    fn model_id(&self) -> String {
        format!("{}/{}", self.name(), self.dimension())
    }
}

// ============================================================================
// Hashing Embedding
// ============================================================================

/// Offline embedding built by feature-hashing identifiers and token bigrams.
///
/// Buckets come from BLAKE3, so vectors are identical across builds and
/// platforms. Needs no model or network, and keeps texts sharing
/// identifiers close under cosine similarity.
pub struct HashingEmbedding {
    dimension: usize,
}

impl HashingEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn tokens(text: &str) -> Vec<String> {
        text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect()
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = blake3::hash(feature.as_bytes());
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest.as_bytes()[..8]);
        let hash = u64::from_le_bytes(word);

        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }

    fn compute(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let tokens = Self::tokens(text);

        for token in &tokens {
            self.add_feature(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingClient for HashingEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.compute(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.compute(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash"
    }

    fn model_id(&self) -> String {
        format!("hash-blake3/{}", self.dimension)
    }
}

// ============================================================================
// HTTP Embedding Clients
// ============================================================================

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

fn http_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Known output sizes of hosted and local embedding models
fn model_dimension(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        "nomic-embed-text" => Some(768),
        "mxbai-embed-large" => Some(1024),
        "all-minilm" => Some(384),
        _ => None,
    }
}

/// Turn a non-success HTTP status into an embedding error
async fn check_status(provider: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CodevecError::EmbeddingError(format!(
        "{provider} embedding request returned {status}: {body}"
    )))
}

/// OpenAI (or compatible) embeddings endpoint
pub struct OpenAiEmbedding {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingItem {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbedding {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            client: http_client(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            dimension: model_dimension(&model).unwrap_or(1536),
            model,
        }
    }

    /// Point at an OpenAI-compatible endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let Some(api_key) = &config.openai_api_key else {
            return Err(CodevecError::ConfigError(
                "OPENAI_API_KEY is required for the openai embedding provider".to_string(),
            ));
        };

        let client = Self::new(api_key.clone(), config.model.clone());
        Ok(match &config.openai_base_url {
            Some(url) => client.with_base_url(url.clone()),
            None => client,
        })
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| CodevecError::EmbeddingError("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&OpenAiRequest {
                input: texts,
                model: &self.model,
            })
            .send()
            .await
            .map_err(|e| CodevecError::EmbeddingError(format!("OpenAI request failed: {e}")))?;

        let mut items = check_status("OpenAI", response)
            .await?
            .json::<OpenAiResponse>()
            .await
            .map_err(|e| {
                CodevecError::EmbeddingError(format!("Malformed OpenAI embedding response: {e}"))
            })?
            .data;

        if items.len() != texts.len() {
            return Err(CodevecError::EmbeddingError(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                items.len()
            )));
        }
        items.sort_by_key(|item| item.index);
        Ok(items.into_iter().map(|item| item.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> String {
        format!("openai/{}", self.model)
    }
}

/// Local Ollama server embeddings
pub struct OllamaEmbedding {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            client: http_client(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            dimension: model_dimension(&model).unwrap_or(768),
            model,
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(config.ollama_url.clone(), config.model.clone())
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&OllamaRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| CodevecError::EmbeddingError(format!("Ollama request failed: {e}")))?;

        let body: OllamaResponse = check_status("Ollama", response)
            .await?
            .json()
            .await
            .map_err(|e| {
                CodevecError::EmbeddingError(format!("Malformed Ollama embedding response: {e}"))
            })?;
        Ok(body.embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // One prompt per request on this endpoint
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model_id(&self) -> String {
        format!("ollama/{}", self.model)
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an embedding client from config, wrapped in a cache when enabled
pub fn create_embedding_client(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingClient>> {
    let client: Arc<dyn EmbeddingClient> = match config.provider {
        EmbeddingProviderKind::Hash => Arc::new(HashingEmbedding::new(config.hash_dimension)),
        EmbeddingProviderKind::OpenAI => Arc::new(OpenAiEmbedding::from_config(config)?),
        EmbeddingProviderKind::Ollama => Arc::new(OllamaEmbedding::from_config(config)),
    };

    if config.cache_capacity == 0 {
        return Ok(client);
    }

    Ok(Arc::new(CachedEmbedding::new(
        client,
        config.cache_capacity,
        Duration::from_secs(config.cache_ttl_secs),
    )))
}

// ============================================================================
// Tests
// ============================================================================
