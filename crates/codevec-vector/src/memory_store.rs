//! In-process vector store
//!
//! Keeps documents in memory and ranks them with exact cosine similarity.
//! When a storage path is configured, the collection is loaded from
//! `<storage_path>/<collection>.json` on initialize and written back by
//! [`LocalVectorStore::flush`] and on close, so the index survives restarts
//! without any external service.
//!
//! Author: codevec contributors

use async_trait::async_trait;
use codevec_core::{
    rank_results, CodevecError, DocumentPatch, Result, SearchOptions, SearchQuery, SearchResult,
    VectorDatabaseOptions, VectorDocument,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::embedding::EmbeddingClient;
use crate::{apply_patch, cosine_similarity, ensure_embeddings, query_vector, validate, VectorDatabase};

const SNAPSHOT_VERSION: u32 = 1;
const DEFAULT_COLLECTION: &str = "codevec";

/// In-memory vector store with optional JSON persistence
///
/// Mutations only touch memory. The snapshot is written by [`flush`] and
/// by `close`, never while a mutation holds the store lock.
///
/// [`flush`]: LocalVectorStore::flush
pub struct LocalVectorStore {
    embedder: Arc<dyn EmbeddingClient>,
    state: RwLock<Option<LocalState>>,
    /// Serializes snapshot writers
    flush_lock: Mutex<()>,
    available: AtomicBool,
    dimension: AtomicUsize,
}

struct LocalState {
    documents: HashMap<String, VectorDocument>,
    snapshot_path: Option<PathBuf>,
    /// Bumped by every mutation
    generation: u64,
    /// Generation last written to the snapshot
    persisted: u64,
}

impl LocalState {
    fn touch(&mut self) {
        self.generation += 1;
    }

    fn is_dirty(&self) -> bool {
        self.snapshot_path.is_some() && self.generation != self.persisted
    }
}

/// On-disk layout of a persisted collection
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    dimension: usize,
    /// [`EmbeddingClient::model_id`] of the client that produced the vectors
    embedder: String,
    documents: Vec<VectorDocument>,
}

impl LocalVectorStore {
    /// Create a store embedding text with `embedder`
    pub fn new(embedder: Arc<dyn EmbeddingClient>) -> Self {
        let dimension = embedder.dimension();
        Self {
            embedder,
            state: RwLock::new(None),
            flush_lock: Mutex::new(()),
            available: AtomicBool::new(false),
            dimension: AtomicUsize::new(dimension),
        }
    }

    fn not_initialized() -> CodevecError {
        CodevecError::NotInitialized("local vector store is not initialized".to_string())
    }

    fn ensure_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(Self::not_initialized())
        }
    }

    async fn load_snapshot(
        path: &Path,
        dimension: usize,
        embedder: &str,
    ) -> Result<HashMap<String, VectorDocument>> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(CodevecError::BackendFailure(format!(
                    "Failed to read snapshot {}: {e}",
                    path.display()
                )))
            }
        };

        let snapshot: Snapshot = serde_json::from_slice(&raw).map_err(|e| {
            CodevecError::BackendFailure(format!("Corrupt snapshot {}: {e}", path.display()))
        })?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CodevecError::BackendFailure(format!(
                "Unsupported snapshot version {} in {}",
                snapshot.version,
                path.display()
            )));
        }
        if snapshot.embedder != embedder {
            return Err(CodevecError::BackendFailure(format!(
                "Snapshot {} was built with embedder '{}', current embedder is '{embedder}'",
                path.display(),
                snapshot.embedder
            )));
        }
        if snapshot.dimension != dimension {
            return Err(CodevecError::BackendFailure(format!(
                "Snapshot {} holds {}-dimensional vectors, expected {dimension}",
                path.display(),
                snapshot.dimension
            )));
        }

        Ok(snapshot
            .documents
            .into_iter()
            .map(|doc| (doc.id.clone(), doc))
            .collect())
    }

    fn snapshot(&self, state: &LocalState) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            dimension: self.dimension(),
            embedder: self.embedder.model_id(),
            documents: state.documents.values().cloned().collect(),
        }
    }

    async fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
        let bytes = serde_json::to_vec(snapshot)
            .map_err(|e| CodevecError::BackendFailure(format!("Failed to encode snapshot: {e}")))?;

        // Write-then-rename keeps the previous snapshot intact on failure
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(|e| {
            CodevecError::BackendFailure(format!("Failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, path).await.map_err(|e| {
            CodevecError::BackendFailure(format!("Failed to replace {}: {e}", path.display()))
        })?;

        tracing::debug!(
            path = %path.display(),
            documents = snapshot.documents.len(),
            "Persisted local vector snapshot"
        );
        Ok(())
    }

    /// Write pending changes to the snapshot file.
    ///
    /// A no-op without a storage path or when nothing changed since the last
    /// write. The store lock is only held while the documents are copied, so
    /// readers and writers keep running during the file write. On failure the
    /// in-memory collection is untouched and stays dirty for the next flush.
    pub async fn flush(&self) -> Result<()> {
        self.ensure_available()?;
        let _writer = self.flush_lock.lock().await;

        let (path, snapshot, generation) = {
            let guard = self.state.read().await;
            let state = guard.as_ref().ok_or_else(Self::not_initialized)?;
            if !state.is_dirty() {
                return Ok(());
            }
            let Some(path) = state.snapshot_path.clone() else {
                return Ok(());
            };
            (path, self.snapshot(state), state.generation)
        };

        Self::write_snapshot(&path, &snapshot).await?;

        if let Some(state) = self.state.write().await.as_mut() {
            state.persisted = state.persisted.max(generation);
        }
        Ok(())
    }

    /// Validate and embed documents without holding the store lock
    async fn prepare(&self, mut documents: Vec<VectorDocument>) -> Result<Vec<VectorDocument>> {
        let dimension = self.dimension();
        for doc in &documents {
            validate::document(doc, dimension)?;
        }
        ensure_embeddings(self.embedder.as_ref(), dimension, &mut documents).await?;
        Ok(documents)
    }
}

#[async_trait]
impl VectorDatabase for LocalVectorStore {
    fn name(&self) -> &str {
        "local"
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    fn dimension(&self) -> usize {
        self.dimension.load(Ordering::Acquire)
    }

    async fn initialize(&self, options: &VectorDatabaseOptions) -> Result<()> {
        let dimension = options.dimension.unwrap_or_else(|| self.embedder.dimension());
        if dimension == 0 {
            return Err(CodevecError::ValidationError(
                "Vector dimension must be positive".to_string(),
            ));
        }

        let snapshot_path = match &options.storage_path {
            Some(dir) => {
                tokio::fs::create_dir_all(dir).await.map_err(|e| {
                    CodevecError::BackendFailure(format!(
                        "Failed to create storage directory {}: {e}",
                        dir.display()
                    ))
                })?;
                let collection = options.collection.as_deref().unwrap_or(DEFAULT_COLLECTION);
                Some(dir.join(format!("{collection}.json")))
            }
            None => None,
        };

        let documents = match &snapshot_path {
            Some(path) => {
                Self::load_snapshot(path, dimension, &self.embedder.model_id()).await?
            }
            None => HashMap::new(),
        };

        tracing::info!(
            documents = documents.len(),
            dimension,
            embedder = %self.embedder.model_id(),
            persistent = snapshot_path.is_some(),
            "Local vector store initialized"
        );

        let mut state = self.state.write().await;
        *state = Some(LocalState {
            documents,
            snapshot_path,
            generation: 0,
            persisted: 0,
        });
        self.dimension.store(dimension, Ordering::Release);
        self.available.store(true, Ordering::Release);
        Ok(())
    }

    async fn add_document(&self, document: VectorDocument) -> Result<String> {
        let mut ids = self.add_documents(vec![document]).await?;
        ids.pop().ok_or_else(|| {
            CodevecError::BackendFailure("Local store returned no id for document".to_string())
        })
    }

    async fn add_documents(&self, documents: Vec<VectorDocument>) -> Result<Vec<String>> {
        self.ensure_available()?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let documents = self.prepare(documents).await?;

        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or_else(Self::not_initialized)?;

        let ids: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();
        for doc in documents {
            state.documents.insert(doc.id.clone(), doc);
        }
        state.touch();

        tracing::debug!(count = ids.len(), "Stored documents in local store");
        Ok(ids)
    }

    async fn get_document(&self, id: &str) -> Result<Option<VectorDocument>> {
        self.ensure_available()?;
        validate::id(id)?;

        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or_else(Self::not_initialized)?;
        Ok(state.documents.get(id).cloned())
    }

    async fn update_document(&self, id: &str, patch: DocumentPatch) -> Result<bool> {
        self.ensure_available()?;
        validate::id(id)?;
        let dimension = self.dimension();
        validate::patch(&patch, dimension)?;

        let Some(existing) = self.get_document(id).await? else {
            return Ok(false);
        };
        let merged = apply_patch(self.embedder.as_ref(), dimension, &existing, patch).await?;

        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or_else(Self::not_initialized)?;
        if !state.documents.contains_key(id) {
            // deleted while the new embedding was computed
            return Ok(false);
        }
        state.documents.insert(id.to_string(), merged);
        state.touch();
        Ok(true)
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        self.ensure_available()?;
        validate::id(id)?;

        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or_else(Self::not_initialized)?;
        if state.documents.remove(id).is_none() {
            return Ok(false);
        }
        state.touch();
        Ok(true)
    }

    async fn delete_all(&self) -> Result<()> {
        self.ensure_available()?;

        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or_else(Self::not_initialized)?;
        let removed = state.documents.len();
        state.documents.clear();
        state.touch();

        tracing::info!(removed, "Cleared local vector store");
        Ok(())
    }

    async fn search(
        &self,
        query: SearchQuery,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        self.ensure_available()?;
        if options.limit == 0 {
            return Ok(Vec::new());
        }

        let vector = query_vector(self.embedder.as_ref(), self.dimension(), query).await?;

        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or_else(Self::not_initialized)?;

        let results: Vec<SearchResult> = state
            .documents
            .values()
            .filter(|doc| options.matches(&doc.metadata))
            .filter_map(|doc| {
                let embedding = doc.embedding.as_ref()?;
                Some(SearchResult {
                    score: cosine_similarity(&vector, embedding),
                    document: doc.clone(),
                })
            })
            .collect();

        Ok(rank_results(results, options))
    }

    async fn get_embedding(&self, text: &str) -> Result<Vec<f32>> {
        self.ensure_available()?;
        self.embedder.embed(text).await
    }

    async fn count(&self) -> Result<usize> {
        self.ensure_available()?;
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or_else(Self::not_initialized)?;
        Ok(state.documents.len())
    }

    /// Writes pending changes, then drops the collection.
    ///
    /// The store is closed even when the final write fails; the write error
    /// is returned so the caller can report it.
    async fn close(&self) -> Result<()> {
        let _writer = self.flush_lock.lock().await;
        let mut guard = self.state.write().await;
        self.available.store(false, Ordering::Release);
        let Some(state) = guard.take() else {
            return Ok(());
        };

        let written = match &state.snapshot_path {
            Some(path) if state.is_dirty() => {
                Self::write_snapshot(path, &self.snapshot(&state)).await
            }
            _ => Ok(()),
        };
        if let Err(e) = &written {
            tracing::error!(error = %e, "Failed to persist local vector store on close");
        }

        tracing::info!(documents = state.documents.len(), "Local vector store closed");
        written
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{HashingEmbedding, OllamaEmbedding};
    use proptest::prelude::*;
    use serde_json::json;

    async fn open_store(dimension: usize) -> LocalVectorStore {
        let store = LocalVectorStore::new(Arc::new(HashingEmbedding::new(dimension)));
        store
            .initialize(&VectorDatabaseOptions::default())
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_requires_initialize() {
        let store = LocalVectorStore::new(Arc::new(HashingEmbedding::new(8)));
        assert!(!store.is_available());

        let err = store
            .add_document(VectorDocument::new("a", "text"))
            .await
            .unwrap_err();
        assert!(matches!(err, CodevecError::NotInitialized(_)));
    }

    #[tokio::test]
    async fn test_add_get_embeds_missing_vector() {
        let store = open_store(16).await;
        let id = store
            .add_document(VectorDocument::new("file:///a.rs", "fn main() {}"))
            .await
            .unwrap();

        let doc = store.get_document(&id).await.unwrap().unwrap();
        assert_eq!(doc.embedding.as_ref().map(Vec::len), Some(16));
        assert!(store.get_document("file:///missing.rs").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_is_upsert_by_id() {
        let store = open_store(16).await;
        store
            .add_document(VectorDocument::new("a", "first version"))
            .await
            .unwrap();
        store
            .add_document(VectorDocument::new("a", "second version"))
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let doc = store.get_document("a").await.unwrap().unwrap();
        assert_eq!(doc.content, "second version");
    }

    #[tokio::test]
    async fn test_invalid_batch_leaves_state_unchanged() {
        let store = open_store(4).await;
        store.add_document(VectorDocument::new("keep", "kept")).await.unwrap();

        let batch = vec![
            VectorDocument::new("ok", "fine"),
            VectorDocument::new("bad", "wrong shape").with_embedding(vec![1.0, 2.0]),
        ];
        let err = store.add_documents(batch).await.unwrap_err();

        assert!(matches!(err, CodevecError::ValidationError(_)));
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.get_document("ok").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_new_content_reembeds() {
        let store = open_store(32).await;
        store
            .add_document(VectorDocument::new("a", "old text about parsing"))
            .await
            .unwrap();
        let before = store.get_document("a").await.unwrap().unwrap().embedding;

        let updated = store
            .update_document("a", DocumentPatch::new().content("new text"))
            .await
            .unwrap();
        assert!(updated);

        let after = store.get_document("a").await.unwrap().unwrap();
        assert_eq!(after.content, "new text");
        assert!(after.embedding.is_some());
        assert_ne!(after.embedding, before);
    }

    #[tokio::test]
    async fn test_update_metadata_keeps_embedding() {
        let store = open_store(8).await;
        store
            .add_document(VectorDocument::new("a", "content").with_metadata("path", "/a"))
            .await
            .unwrap();
        let before = store.get_document("a").await.unwrap().unwrap();

        store
            .update_document("a", DocumentPatch::new().metadata("language", "rust"))
            .await
            .unwrap();

        let after = store.get_document("a").await.unwrap().unwrap();
        assert_eq!(after.embedding, before.embedding);
        assert_eq!(after.metadata.get("language"), Some(&json!("rust")));
        assert_eq!(after.metadata.get("path"), Some(&json!("/a")));
    }

    #[tokio::test]
    async fn test_update_and_delete_unknown_id() {
        let store = open_store(8).await;
        assert!(!store
            .update_document("nope", DocumentPatch::new().content("x"))
            .await
            .unwrap());
        assert!(!store.delete_document("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_id_rejected() {
        let store = open_store(8).await;
        assert!(matches!(
            store.get_document("").await,
            Err(CodevecError::ValidationError(_))
        ));
        assert!(matches!(
            store.delete_document("a\u{0}b").await,
            Err(CodevecError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_search_limit_and_order() {
        let store = open_store(64).await;
        let docs: Vec<VectorDocument> = (0..10)
            .map(|i| VectorDocument::new(format!("doc{i}"), format!("foo bar item{i} value{}", i % 3)))
            .collect();
        store.add_documents(docs).await.unwrap();

        let results = store
            .search("foo".into(), &SearchOptions::with_limit(3))
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_search_by_vector_and_filter() {
        let store = open_store(2).await;
        store
            .add_documents(vec![
                VectorDocument::new("x", "").with_embedding(vec![1.0, 0.0]).with_metadata("language", "rust"),
                VectorDocument::new("y", "").with_embedding(vec![0.0, 1.0]).with_metadata("language", "go"),
                VectorDocument::new("z", "").with_embedding(vec![0.7, 0.7]).with_metadata("language", "rust"),
            ])
            .await
            .unwrap();

        let results = store
            .search(vec![1.0, 0.0].into(), &SearchOptions::with_limit(5))
            .await
            .unwrap();
        assert_eq!(results[0].document.id, "x");
        assert_eq!(results.last().unwrap().document.id, "y");

        let filtered = store
            .search(
                vec![0.0, 1.0].into(),
                &SearchOptions::with_limit(5).filter("language", "rust"),
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].document.id, "z");
    }

    #[tokio::test]
    async fn test_search_rejects_bad_query_vector() {
        let store = open_store(4).await;
        let err = store
            .search(vec![f32::NAN; 4].into(), &SearchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CodevecError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_delete_all_and_close() {
        let store = open_store(8).await;
        store.add_document(VectorDocument::new("a", "one")).await.unwrap();
        store.add_document(VectorDocument::new("b", "two")).await.unwrap();

        store.delete_all().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);

        store.close().await.unwrap();
        assert!(!store.is_available());
        assert!(matches!(
            store.search("a".into(), &SearchOptions::default()).await,
            Err(CodevecError::NotInitialized(_))
        ));
        // closing twice is harmless
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let options = VectorDatabaseOptions::new()
            .with_storage_path(dir.path())
            .with_collection("repo");

        let store = LocalVectorStore::new(Arc::new(HashingEmbedding::new(8)));
        store.initialize(&options).await.unwrap();
        store
            .add_document(VectorDocument::new("file:///lib.rs", "pub fn lib() {}").with_metadata("lineCount", 1))
            .await
            .unwrap();
        store.close().await.unwrap();
        assert!(dir.path().join("repo.json").exists());

        let reopened = LocalVectorStore::new(Arc::new(HashingEmbedding::new(8)));
        reopened.initialize(&options).await.unwrap();
        let doc = reopened.get_document("file:///lib.rs").await.unwrap().unwrap();
        assert_eq!(doc.metadata.get("lineCount"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_mutations_defer_snapshot_until_flush() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("codevec.json");
        let store = LocalVectorStore::new(Arc::new(HashingEmbedding::new(8)));
        store
            .initialize(&VectorDatabaseOptions::new().with_storage_path(dir.path()))
            .await
            .unwrap();

        store.add_document(VectorDocument::new("a", "one")).await.unwrap();
        store.add_document(VectorDocument::new("b", "two")).await.unwrap();
        assert!(!snapshot.exists());

        store.flush().await.unwrap();
        let written = std::fs::metadata(&snapshot).unwrap().modified().unwrap();

        // nothing changed, nothing rewritten
        store.flush().await.unwrap();
        assert_eq!(std::fs::metadata(&snapshot).unwrap().modified().unwrap(), written);

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&snapshot).unwrap()).unwrap();
        assert_eq!(raw["documents"].as_array().map(Vec::len), Some(2));
        assert_eq!(raw["embedder"], json!("hash-blake3/8"));
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_memory_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("codevec.json");
        let store = LocalVectorStore::new(Arc::new(HashingEmbedding::new(8)));
        store
            .initialize(&VectorDatabaseOptions::new().with_storage_path(dir.path()))
            .await
            .unwrap();

        // a non-empty directory where the snapshot goes makes the rename fail
        std::fs::create_dir_all(snapshot.join("blocker")).unwrap();

        let id = store.add_document(VectorDocument::new("a", "one")).await.unwrap();
        assert_eq!(id, "a");
        assert!(store.get_document("a").await.unwrap().is_some());

        let err = store.flush().await.unwrap_err();
        assert!(matches!(err, CodevecError::BackendFailure(_)));
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.get_document("a").await.unwrap().is_some());

        // still dirty, so the next flush writes once the path is usable
        std::fs::remove_dir_all(&snapshot).unwrap();
        store.flush().await.unwrap();
        assert!(snapshot.is_file());
    }

    #[tokio::test]
    async fn test_close_reports_failed_write() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("codevec.json");
        let store = LocalVectorStore::new(Arc::new(HashingEmbedding::new(8)));
        store
            .initialize(&VectorDatabaseOptions::new().with_storage_path(dir.path()))
            .await
            .unwrap();
        std::fs::create_dir_all(snapshot.join("blocker")).unwrap();

        store.add_document(VectorDocument::new("a", "one")).await.unwrap();
        assert!(matches!(
            store.close().await,
            Err(CodevecError::BackendFailure(_))
        ));
        assert!(!store.is_available());
    }

    #[tokio::test]
    async fn test_snapshot_embedder_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let options = VectorDatabaseOptions::new()
            .with_storage_path(dir.path())
            .with_dimension(8);

        let store = LocalVectorStore::new(Arc::new(HashingEmbedding::new(8)));
        store.initialize(&options).await.unwrap();
        store.add_document(VectorDocument::new("a", "text")).await.unwrap();
        store.close().await.unwrap();

        let other = LocalVectorStore::new(Arc::new(OllamaEmbedding::new(
            "http://localhost:11434",
            "nomic-embed-text",
        )));
        let err = other.initialize(&options).await.unwrap_err();
        assert!(matches!(err, CodevecError::BackendFailure(ref m) if m.contains("hash-blake3/8")));
        assert!(!other.is_available());
    }

    #[tokio::test]
    async fn test_snapshot_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let options = VectorDatabaseOptions::new().with_storage_path(dir.path());

        let store = LocalVectorStore::new(Arc::new(HashingEmbedding::new(8)));
        store.initialize(&options).await.unwrap();
        store.add_document(VectorDocument::new("a", "text")).await.unwrap();
        store.close().await.unwrap();

        let other = LocalVectorStore::new(Arc::new(HashingEmbedding::new(8)));
        let err = other
            .initialize(&options.clone().with_dimension(16))
            .await
            .unwrap_err();
        assert!(matches!(err, CodevecError::BackendFailure(ref m) if m.contains("8-dimensional")));
        assert!(!other.is_available());
    }

    proptest! {
        #[test]
        fn prop_search_ranked_and_limited(
            vectors in proptest::collection::vec(proptest::collection::vec(-1.0f32..1.0, 3), 0..20),
            query in proptest::collection::vec(-1.0f32..1.0, 3),
            limit in 0usize..25,
        ) {
            let results = tokio_test::block_on(async {
                let store = open_store(3).await;
                let docs: Vec<VectorDocument> = vectors
                    .iter()
                    .enumerate()
                    .map(|(i, v)| VectorDocument::new(format!("d{i}"), "").with_embedding(v.clone()))
                    .collect();
                store.add_documents(docs).await.unwrap();
                store
                    .search(query.clone().into(), &SearchOptions::with_limit(limit))
                    .await
                    .unwrap()
            });

            prop_assert!(results.len() <= limit);
            prop_assert!(results.len() <= vectors.len());
            for pair in results.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
        }
    }
}
