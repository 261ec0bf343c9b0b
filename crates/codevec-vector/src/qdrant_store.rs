//! Qdrant implementation for vector storage
//!
//! Provides connection management and document operations against a
//! Qdrant server. Document ids are arbitrary strings (file URIs), so each
//! one is mapped to a deterministic UUIDv5 point id and the original id is
//! kept in the payload.
//!
//! Author: codevec contributors

use async_trait::async_trait;
use codevec_core::{
    rank_results, CodevecError, DocumentPatch, Metadata, Result, SearchOptions, SearchQuery,
    SearchResult, VectorDatabaseOptions, VectorDocument,
};
use qdrant_client::qdrant::{
    value::Kind, vectors::VectorsOptions, Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder,
    Distance, Filter, GetPointsBuilder, PointStruct, PointsIdsList, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder, Vectors,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::embedding::EmbeddingClient;
use crate::{apply_patch, ensure_embeddings, query_vector, validate, VectorDatabase};

const DEFAULT_URL: &str = "http://localhost:6334";
const DEFAULT_COLLECTION: &str = "codevec";

const FIELD_ID: &str = "doc_id";
const FIELD_CONTENT: &str = "content";
const FIELD_METADATA: &str = "metadata";

/// Qdrant vector store implementation
pub struct QdrantStore {
    embedder: Arc<dyn EmbeddingClient>,
    connection: RwLock<Option<Connection>>,
    available: AtomicBool,
    dimension: AtomicUsize,
}

#[derive(Clone)]
struct Connection {
    client: Arc<Qdrant>,
    collection: String,
}

impl QdrantStore {
    /// Create a store embedding text with `embedder`; connects on `initialize`
    pub fn new(embedder: Arc<dyn EmbeddingClient>) -> Self {
        let dimension = embedder.dimension();
        Self {
            embedder,
            connection: RwLock::new(None),
            available: AtomicBool::new(false),
            dimension: AtomicUsize::new(dimension),
        }
    }

    async fn connection(&self) -> Result<Connection> {
        self.connection.read().await.clone().ok_or_else(|| {
            CodevecError::NotInitialized("qdrant store is not initialized".to_string())
        })
    }

    /// Create the collection if missing (cosine distance)
    async fn init_collection(client: &Qdrant, collection: &str, dimension: usize) -> Result<()> {
        let collections = client.list_collections().await.map_err(|e| {
            CodevecError::BackendFailure(format!("Failed to list collections: {e}"))
        })?;

        let exists = collections.collections.iter().any(|c| c.name == collection);

        if !exists {
            create_collection(client, collection, dimension).await?;
            tracing::info!(collection, dimension, "Created Qdrant collection");
        }

        Ok(())
    }

    async fn upsert(&self, conn: &Connection, documents: &[VectorDocument]) -> Result<()> {
        let points = documents
            .iter()
            .map(|doc| {
                let vector = doc.embedding.clone().ok_or_else(|| {
                    CodevecError::BackendFailure(format!("Document '{}' lost its embedding", doc.id))
                })?;
                Ok(PointStruct::new(point_id(&doc.id), vector, to_payload(doc)))
            })
            .collect::<Result<Vec<_>>>()?;

        conn.client
            .upsert_points(UpsertPointsBuilder::new(&conn.collection, points).wait(true))
            .await
            .map_err(|e| CodevecError::BackendFailure(format!("Failed to upsert points: {e}")))?;

        Ok(())
    }
}

async fn create_collection(client: &Qdrant, collection: &str, dimension: usize) -> Result<()> {
    client
        .create_collection(
            CreateCollectionBuilder::new(collection)
                .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
        )
        .await
        .map_err(|e| CodevecError::BackendFailure(format!("Failed to create collection: {e}")))?;
    Ok(())
}

/// Deterministic point id for a document id
fn point_id(id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, id.as_bytes()).to_string()
}

fn to_payload(doc: &VectorDocument) -> HashMap<String, QdrantValue> {
    let metadata: serde_json::Map<String, serde_json::Value> = doc
        .metadata
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    HashMap::from([
        (
            FIELD_ID.to_string(),
            serde_json::Value::String(doc.id.clone()).into(),
        ),
        (
            FIELD_CONTENT.to_string(),
            serde_json::Value::String(doc.content.clone()).into(),
        ),
        (
            FIELD_METADATA.to_string(),
            serde_json::Value::Object(metadata).into(),
        ),
    ])
}

fn to_json(value: QdrantValue) -> serde_json::Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(to_json).collect())
        }
        Some(Kind::StructValue(st)) => serde_json::Value::Object(
            st.fields.into_iter().map(|(k, v)| (k, to_json(v))).collect(),
        ),
    }
}

/// Rebuild a document from a point payload, without its embedding
fn from_payload(mut payload: HashMap<String, QdrantValue>) -> Option<VectorDocument> {
    let id = match payload.remove(FIELD_ID).map(to_json) {
        Some(serde_json::Value::String(id)) => id,
        _ => return None,
    };
    let content = match payload.remove(FIELD_CONTENT).map(to_json) {
        Some(serde_json::Value::String(content)) => content,
        _ => String::new(),
    };
    let metadata: Metadata = match payload.remove(FIELD_METADATA).map(to_json) {
        Some(serde_json::Value::Object(map)) => map.into_iter().collect(),
        _ => Metadata::new(),
    };

    Some(VectorDocument {
        id,
        content,
        embedding: None,
        metadata,
    })
}

/// Unnamed dense vector of a point; named or sparse layouts yield `None`
fn dense_vector(vectors: Option<Vectors>) -> Option<Vec<f32>> {
    match vectors?.vectors_options? {
        VectorsOptions::Vector(vector) => Some(vector.data),
        VectorsOptions::Vectors(_) => None,
    }
}

/// Rebuild a document together with its stored embedding
fn from_point(
    payload: HashMap<String, QdrantValue>,
    vectors: Option<Vectors>,
) -> Option<VectorDocument> {
    let mut doc = from_payload(payload)?;
    doc.embedding = dense_vector(vectors);
    Some(doc)
}

/// Translate exact-match filters Qdrant can express; others are ignored
fn build_filter(filter: &Metadata) -> Option<Filter> {
    let conditions: Vec<Condition> = filter
        .iter()
        .filter_map(|(key, value)| {
            let field = format!("{FIELD_METADATA}.{key}");
            match value {
                serde_json::Value::String(s) => Some(Condition::matches(field, s.clone())),
                serde_json::Value::Bool(b) => Some(Condition::matches(field, *b)),
                serde_json::Value::Number(n) => n.as_i64().map(|i| Condition::matches(field, i)),
                _ => None,
            }
        })
        .collect();

    if conditions.is_empty() {
        None
    } else {
        Some(Filter::must(conditions))
    }
}

#[async_trait]
impl VectorDatabase for QdrantStore {
    fn name(&self) -> &str {
        "qdrant"
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    fn dimension(&self) -> usize {
        self.dimension.load(Ordering::Acquire)
    }

    async fn initialize(&self, options: &VectorDatabaseOptions) -> Result<()> {
        let url = options.url.as_deref().unwrap_or(DEFAULT_URL);
        let collection = options
            .collection
            .clone()
            .unwrap_or_else(|| DEFAULT_COLLECTION.to_string());
        let dimension = options.dimension.unwrap_or_else(|| self.embedder.dimension());
        if dimension == 0 {
            return Err(CodevecError::ValidationError(
                "Vector dimension must be positive".to_string(),
            ));
        }

        let mut builder = Qdrant::from_url(url);
        if let Some(key) = &options.api_key {
            builder = builder.api_key(key.clone());
        }
        if let Some(secs) = options.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| CodevecError::BackendFailure(format!("Qdrant connection failed: {e}")))?;

        Self::init_collection(&client, &collection, dimension).await?;
        tracing::info!(url, collection = %collection, "Qdrant store initialized");

        let mut connection = self.connection.write().await;
        *connection = Some(Connection {
            client: Arc::new(client),
            collection,
        });
        self.dimension.store(dimension, Ordering::Release);
        self.available.store(true, Ordering::Release);
        Ok(())
    }

    async fn add_document(&self, document: VectorDocument) -> Result<String> {
        let mut ids = self.add_documents(vec![document]).await?;
        ids.pop().ok_or_else(|| {
            CodevecError::BackendFailure("Qdrant store returned no id for document".to_string())
        })
    }

    async fn add_documents(&self, mut documents: Vec<VectorDocument>) -> Result<Vec<String>> {
        let conn = self.connection().await?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let dimension = self.dimension();
        for doc in &documents {
            validate::document(doc, dimension)?;
        }
        ensure_embeddings(self.embedder.as_ref(), dimension, &mut documents).await?;

        self.upsert(&conn, &documents).await?;
        tracing::debug!(count = documents.len(), "Upserted documents into Qdrant");
        Ok(documents.into_iter().map(|d| d.id).collect())
    }

    async fn get_document(&self, id: &str) -> Result<Option<VectorDocument>> {
        let conn = self.connection().await?;
        validate::id(id)?;

        let response = conn
            .client
            .get_points(
                GetPointsBuilder::new(&conn.collection, vec![point_id(id).into()])
                    .with_payload(true)
                    .with_vectors(true),
            )
            .await
            .map_err(|e| CodevecError::BackendFailure(format!("Failed to get point: {e}")))?;

        Ok(response
            .result
            .into_iter()
            .next()
            .and_then(|point| from_point(point.payload, point.vectors)))
    }

    async fn update_document(&self, id: &str, patch: DocumentPatch) -> Result<bool> {
        let conn = self.connection().await?;
        validate::id(id)?;
        let dimension = self.dimension();
        validate::patch(&patch, dimension)?;

        let Some(existing) = self.get_document(id).await? else {
            return Ok(false);
        };

        let merged = apply_patch(self.embedder.as_ref(), dimension, &existing, patch).await?;
        self.upsert(&conn, std::slice::from_ref(&merged)).await?;
        Ok(true)
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let conn = self.connection().await?;
        validate::id(id)?;

        if self.get_document(id).await?.is_none() {
            return Ok(false);
        }

        conn.client
            .delete_points(
                DeletePointsBuilder::new(&conn.collection)
                    .points(PointsIdsList {
                        ids: vec![point_id(id).into()],
                    })
                    .wait(true),
            )
            .await
            .map_err(|e| CodevecError::BackendFailure(format!("Failed to delete point: {e}")))?;

        Ok(true)
    }

    async fn delete_all(&self) -> Result<()> {
        let conn = self.connection().await?;

        conn.client
            .delete_collection(conn.collection.as_str())
            .await
            .map_err(|e| {
                CodevecError::BackendFailure(format!("Failed to drop collection: {e}"))
            })?;
        create_collection(&conn.client, &conn.collection, self.dimension()).await?;

        tracing::info!(collection = %conn.collection, "Cleared Qdrant collection");
        Ok(())
    }

    async fn search(
        &self,
        query: SearchQuery,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let conn = self.connection().await?;
        if options.limit == 0 {
            return Ok(Vec::new());
        }

        let vector = query_vector(self.embedder.as_ref(), self.dimension(), query).await?;

        let mut request =
            SearchPointsBuilder::new(&conn.collection, vector, options.limit as u64)
                .with_payload(true);
        if let Some(filter) = build_filter(&options.filter) {
            request = request.filter(filter);
        }
        if let Some(min) = options.min_score {
            request = request.score_threshold(min);
        }

        let response = conn
            .client
            .search_points(request)
            .await
            .map_err(|e| CodevecError::BackendFailure(format!("Vector search failed: {e}")))?;

        let results = response
            .result
            .into_iter()
            .filter_map(|point| {
                let score = point.score;
                from_payload(point.payload).map(|document| SearchResult { document, score })
            })
            .collect();

        Ok(rank_results(results, options))
    }

    async fn get_embedding(&self, text: &str) -> Result<Vec<f32>> {
        self.connection().await?;
        self.embedder.embed(text).await
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.connection().await?;
        let response = conn
            .client
            .count(CountPointsBuilder::new(&conn.collection).exact(true))
            .await
            .map_err(|e| CodevecError::BackendFailure(format!("Failed to count points: {e}")))?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    async fn close(&self) -> Result<()> {
        let mut connection = self.connection.write().await;
        self.available.store(false, Ordering::Release);
        if let Some(conn) = connection.take() {
            tracing::info!(collection = %conn.collection, "Qdrant store closed");
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedding;
    use serde_json::json;

    #[test]
    fn test_point_id_deterministic() {
        let a = point_id("file:///src/main.rs");
        assert_eq!(a, point_id("file:///src/main.rs"));
        assert_ne!(a, point_id("file:///src/lib.rs"));
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_payload_round_trip() {
        let doc = VectorDocument::new("file:///a.py", "print('hi')")
            .with_metadata("language", "python")
            .with_metadata("lineCount", 1)
            .with_metadata("ratio", 0.5);

        let restored = from_payload(to_payload(&doc)).unwrap();
        assert_eq!(restored.id, doc.id);
        assert_eq!(restored.content, doc.content);
        assert_eq!(restored.metadata.get("language"), Some(&json!("python")));
        assert_eq!(restored.metadata.get("lineCount"), Some(&json!(1)));
        assert_eq!(restored.metadata.get("ratio"), Some(&json!(0.5)));
        assert!(restored.embedding.is_none());
    }

    #[test]
    fn test_point_restores_dense_vector() {
        let doc = VectorDocument::new("file:///a.rs", "fn a() {}");

        let restored = from_point(to_payload(&doc), Some(vec![0.6, 0.8].into())).unwrap();
        assert_eq!(restored.embedding, Some(vec![0.6, 0.8]));

        let restored = from_point(to_payload(&doc), None).unwrap();
        assert!(restored.embedding.is_none());
    }

    #[tokio::test]
    async fn test_metadata_patch_keeps_stored_vector() {
        let embedder = HashingEmbedding::new(4);
        let doc = VectorDocument::new("ext", "").with_embedding(vec![0.6, 0.8, 0.0, 0.0]);
        let stored = from_point(
            to_payload(&doc),
            Some(vec![0.6, 0.8, 0.0, 0.0].into()),
        )
        .unwrap();

        let patch = DocumentPatch::new().metadata("tag", "x");
        validate::patch(&patch, 4).unwrap();
        let merged = apply_patch(&embedder, 4, &stored, patch).await.unwrap();

        assert_eq!(merged.embedding, Some(vec![0.6, 0.8, 0.0, 0.0]));
        assert_eq!(merged.metadata.get("tag"), Some(&json!("x")));
    }

    #[tokio::test]
    async fn test_content_patch_reembeds_stored_vector() {
        let embedder = HashingEmbedding::new(4);
        let doc = VectorDocument::new("a", "old body");
        let stored = from_point(to_payload(&doc), Some(vec![0.0, 0.0, 0.0, 1.0].into())).unwrap();

        let merged = apply_patch(&embedder, 4, &stored, DocumentPatch::new().content("new body"))
            .await
            .unwrap();

        assert_eq!(merged.content, "new body");
        assert_eq!(merged.embedding, Some(embedder.embed("new body").await.unwrap()));
    }

    #[test]
    fn test_payload_without_id_is_skipped() {
        assert!(from_payload(HashMap::new()).is_none());
    }

    #[test]
    fn test_build_filter() {
        assert!(build_filter(&Metadata::new()).is_none());

        let mut filter = Metadata::new();
        filter.insert("ratio".into(), json!(0.5));
        assert!(build_filter(&filter).is_none());

        filter.insert("language".into(), json!("rust"));
        assert!(build_filter(&filter).is_some());
    }

    #[tokio::test]
    async fn test_not_initialized() {
        let store = QdrantStore::new(Arc::new(HashingEmbedding::new(8)));
        assert!(!store.is_available());
        assert!(matches!(
            store.add_document(VectorDocument::new("a", "b")).await,
            Err(CodevecError::NotInitialized(_))
        ));
        assert!(matches!(
            store.get_embedding("text").await,
            Err(CodevecError::NotInitialized(_))
        ));
        store.close().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a running Qdrant server on localhost:6334"]
    async fn test_qdrant_lifecycle() {
        let store = QdrantStore::new(Arc::new(HashingEmbedding::new(32)));
        let options = VectorDatabaseOptions::new()
            .with_url(DEFAULT_URL)
            .with_collection(format!("codevec_test_{}", Uuid::new_v4().simple()));
        store.initialize(&options).await.unwrap();
        store.delete_all().await.unwrap();

        store
            .add_documents(vec![
                VectorDocument::new("file:///a.rs", "fn parse_config() {}"),
                VectorDocument::new("file:///b.rs", "fn render_widget() {}"),
            ])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let results = store
            .search("fn parse_config() {}".into(), &SearchOptions::with_limit(1))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, "file:///a.rs");

        let external = vec![1.0; 32];
        store
            .add_document(VectorDocument::new("file:///c.rs", "").with_embedding(external.clone()))
            .await
            .unwrap();
        assert!(store
            .update_document("file:///c.rs", DocumentPatch::new().metadata("tag", "x"))
            .await
            .unwrap());
        let updated = store.get_document("file:///c.rs").await.unwrap().unwrap();
        assert_eq!(updated.embedding, Some(external));

        assert!(store
            .update_document("file:///a.rs", DocumentPatch::new().content("fn other() {}"))
            .await
            .unwrap());
        assert!(store.delete_document("file:///b.rs").await.unwrap());
        assert!(!store.delete_document("file:///b.rs").await.unwrap());

        store.delete_all().await.unwrap();
        store.close().await.unwrap();
    }
}
