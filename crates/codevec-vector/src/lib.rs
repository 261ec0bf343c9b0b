//! Codevec Vector - Vector database abstraction
//!
//! Provides the capability contract every similarity-search backend
//! implements, the two shipped backends (in-process and Qdrant), and the
//! [`ProviderManager`] that owns backend lifecycle.

use async_trait::async_trait;
use codevec_core::{
    CodevecError, DocumentPatch, Result, SearchOptions, SearchQuery, SearchResult,
    VectorDatabaseOptions, VectorDocument,
};

pub mod cache;
pub mod embedding;
pub mod manager;
pub mod memory_store;
pub mod qdrant_store;
pub mod validate;

pub use cache::{CacheStats, CacheStatsReport, CachedEmbedding};
pub use embedding::{
    create_embedding_client, EmbeddingClient, HashingEmbedding, OllamaEmbedding, OpenAiEmbedding,
};
pub use manager::{ManagerEvent, ProviderManager};
pub use memory_store::LocalVectorStore;
pub use qdrant_store::QdrantStore;

/// Trait for vector database backends
///
/// Implementations own their document store and are shared behind `Arc`,
/// so every operation takes `&self` and synchronizes internally.
#[async_trait]
pub trait VectorDatabase: Send + Sync {
    /// Stable display name, used as the registry key
    fn name(&self) -> &str;

    /// True after a successful `initialize` and before `close`
    fn is_available(&self) -> bool;

    /// Embedding dimension this backend stores
    fn dimension(&self) -> usize;

    /// Open the underlying collection or connection
    async fn initialize(&self, options: &VectorDatabaseOptions) -> Result<()>;

    /// Store a document, embedding it first if needed; upserts by id
    async fn add_document(&self, document: VectorDocument) -> Result<String>;

    /// Store several documents in one call
    async fn add_documents(&self, documents: Vec<VectorDocument>) -> Result<Vec<String>>;

    /// Fetch a document; `None` for unknown ids
    async fn get_document(&self, id: &str) -> Result<Option<VectorDocument>>;

    /// Apply a partial update; `false` for unknown ids
    async fn update_document(&self, id: &str, patch: DocumentPatch) -> Result<bool>;

    /// Delete a document; `false` for unknown ids
    async fn delete_document(&self, id: &str) -> Result<bool>;

    /// Remove every document
    async fn delete_all(&self) -> Result<()>;

    /// Rank stored documents against a text or vector query
    async fn search(&self, query: SearchQuery, options: &SearchOptions)
        -> Result<Vec<SearchResult>>;

    /// Embed text with this backend's embedding function
    async fn get_embedding(&self, text: &str) -> Result<Vec<f32>>;

    /// Number of stored documents
    async fn count(&self) -> Result<usize>;

    /// Release resources; the backend reports unavailable afterwards
    async fn close(&self) -> Result<()>;
}

/// Fill in missing embeddings with one batch call.
///
/// Supplied embeddings are kept; the computed ones are checked against
/// `dimension` before being attached.
pub(crate) async fn ensure_embeddings(
    embedder: &dyn EmbeddingClient,
    dimension: usize,
    documents: &mut [VectorDocument],
) -> Result<()> {
    let missing: Vec<usize> = documents
        .iter()
        .enumerate()
        .filter(|(_, d)| !d.has_embedding())
        .map(|(i, _)| i)
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    let texts: Vec<String> = missing
        .iter()
        .map(|&i| documents[i].content.clone())
        .collect();
    let embeddings = embedder.embed_batch(&texts).await?;

    if embeddings.len() != missing.len() {
        return Err(CodevecError::EmbeddingError(format!(
            "{} returned {} embeddings for {} texts",
            embedder.name(),
            embeddings.len(),
            missing.len()
        )));
    }

    for (i, embedding) in missing.into_iter().zip(embeddings) {
        if embedding.len() != dimension {
            return Err(CodevecError::EmbeddingError(format!(
                "{} produced a {}-dimensional embedding, backend expects {dimension}",
                embedder.name(),
                embedding.len()
            )));
        }
        documents[i].embedding = Some(embedding);
    }

    Ok(())
}

/// Merge a patch into a stored document.
///
/// The stored embedding is carried over unless the content changed without
/// a replacement vector, in which case the merged content is re-embedded.
pub(crate) async fn apply_patch(
    embedder: &dyn EmbeddingClient,
    dimension: usize,
    existing: &VectorDocument,
    patch: DocumentPatch,
) -> Result<VectorDocument> {
    let (merged, needs_embedding) = patch.merge_into(existing);
    let mut batch = [merged];
    if needs_embedding {
        ensure_embeddings(embedder, dimension, &mut batch).await?;
    }
    let [merged] = batch;
    validate::document(&merged, dimension)?;
    Ok(merged)
}

/// Resolve a query to a vector, embedding text queries
pub(crate) async fn query_vector(
    embedder: &dyn EmbeddingClient,
    dimension: usize,
    query: SearchQuery,
) -> Result<Vec<f32>> {
    match query {
        SearchQuery::Vector(vector) => {
            validate::query_vector(&vector, dimension)?;
            Ok(vector)
        }
        SearchQuery::Text(text) => {
            let vector = embedder.embed(&text).await?;
            if vector.len() != dimension {
                return Err(CodevecError::EmbeddingError(format!(
                    "Query embedding has {} dimensions, backend expects {dimension}",
                    vector.len()
                )));
            }
            Ok(vector)
        }
    }
}

/// Cosine similarity; zero when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_ensure_embeddings_fills_only_missing() {
        let embedder = HashingEmbedding::new(4);
        let mut docs = vec![
            VectorDocument::new("a", "alpha"),
            VectorDocument::new("b", "").with_embedding(vec![1.0, 0.0, 0.0, 0.0]),
        ];

        ensure_embeddings(&embedder, 4, &mut docs).await.unwrap();

        assert_eq!(docs[0].embedding.as_ref().map(Vec::len), Some(4));
        assert_eq!(docs[1].embedding, Some(vec![1.0, 0.0, 0.0, 0.0]));
    }

    #[tokio::test]
    async fn test_ensure_embeddings_dimension_mismatch() {
        let embedder = HashingEmbedding::new(8);
        let mut docs = vec![VectorDocument::new("a", "alpha")];

        let err = ensure_embeddings(&embedder, 4, &mut docs).await.unwrap_err();
        assert!(matches!(err, CodevecError::EmbeddingError(_)));
        assert!(docs[0].embedding.is_none());
    }

    #[tokio::test]
    async fn test_apply_patch_keeps_supplied_vector_on_metadata_change() {
        let embedder = HashingEmbedding::new(4);
        let stored = VectorDocument::new("ext", "").with_embedding(vec![0.6, 0.8, 0.0, 0.0]);

        let merged = apply_patch(&embedder, 4, &stored, DocumentPatch::new().metadata("tag", "x"))
            .await
            .unwrap();

        assert_eq!(merged.embedding, Some(vec![0.6, 0.8, 0.0, 0.0]));
        assert_eq!(merged.metadata.get("tag"), Some(&serde_json::json!("x")));
    }

    #[tokio::test]
    async fn test_apply_patch_reembeds_changed_content() {
        let embedder = HashingEmbedding::new(4);
        let stored = VectorDocument::new("a", "old").with_embedding(vec![0.0, 0.0, 1.0, 0.0]);

        let merged = apply_patch(&embedder, 4, &stored, DocumentPatch::new().content("new"))
            .await
            .unwrap();

        assert_eq!(merged.embedding, Some(embedder.embed("new").await.unwrap()));
    }

    #[tokio::test]
    async fn test_query_vector_rejects_wrong_shape() {
        let embedder = HashingEmbedding::new(4);
        let err = query_vector(&embedder, 4, SearchQuery::Vector(vec![1.0, 2.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, CodevecError::ValidationError(_)));
    }
}
