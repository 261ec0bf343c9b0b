//! Codevec Index - Workspace indexing and semantic code search
//!
//! [`IndexingService`] reads source files, turns them into
//! [`VectorDocument`]s keyed by file URI, and hands them to the
//! [`ProviderManager`] one batch at a time. Searches go straight to the
//! active backend so failures reach the caller; they are also reported
//! through the manager so its observers see them.
//!
//! Author: codevec contributors

use chrono::Utc;
use codevec_core::{
    CodevecError, IndexingConfig, Result, SearchOptions, SearchQuery, SearchResult,
    VectorDocument,
};
use codevec_vector::{ProviderManager, VectorDatabase};
use futures::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod language;
pub mod workspace;

pub use language::detect_language;
pub use workspace::{file_uri, resolve_workspace_files, split_patterns, FileSystem, LocalFileSystem};

/// Default result count for explicit searches
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Default result count for contextual retrieval
pub const DEFAULT_CONTEXT_LIMIT: usize = 3;

// ============================================================================
// Progress reporting
// ============================================================================

/// Progress after one indexing batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub message: String,

    /// Files processed so far over total files, in `[0, 1]`
    pub fraction_complete: f32,

    /// Documents stored so far
    pub indexed: usize,
}

/// Receiver of indexing progress
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        self(update)
    }
}

/// Discards progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _update: ProgressUpdate) {}
}

/// Logs progress at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, update: ProgressUpdate) {
        tracing::info!(
            indexed = update.indexed,
            percent = (update.fraction_complete * 100.0).round() as u32,
            "{}",
            update.message
        );
    }
}

// ============================================================================
// Indexing service
// ============================================================================

/// Bridges workspace files and text queries to the provider manager
pub struct IndexingService {
    manager: Arc<ProviderManager>,
    fs: Arc<dyn FileSystem>,
    config: IndexingConfig,
}

impl IndexingService {
    /// Create a service reading from the local disk
    pub fn new(manager: Arc<ProviderManager>, config: IndexingConfig) -> Self {
        Self {
            manager,
            fs: Arc::new(LocalFileSystem),
            config,
        }
    }

    /// Read files through `fs` instead of the local disk
    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn config(&self) -> &IndexingConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<ProviderManager> {
        &self.manager
    }

    /// Active backend, or `NotReady` when disabled or nothing is active
    async fn ensure_ready(&self) -> Result<Arc<dyn VectorDatabase>> {
        if !self.manager.is_enabled() {
            return Err(CodevecError::NotReady(
                "vector search is disabled".to_string(),
            ));
        }
        self.manager
            .active_provider()
            .await
            .ok_or_else(|| CodevecError::NotReady("no active vector provider".to_string()))
    }

    /// Rank indexed code against a user query
    pub async fn semantic_search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let results = self
            .search("semantic_search", SearchQuery::from(query), limit)
            .await?;

        tracing::debug!(query, results = results.len(), "Semantic search complete");
        Ok(results)
    }

    /// Retrieve code related to the text around a cursor or selection
    pub async fn get_relevant_code(
        &self,
        context_text: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        self.search("get_relevant_code", SearchQuery::from(context_text), limit)
            .await
    }

    async fn search(
        &self,
        operation: &str,
        query: SearchQuery,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let provider = self.ensure_ready().await?;
        match provider.search(query, &SearchOptions::with_limit(limit)).await {
            Ok(results) => Ok(results),
            Err(e) => {
                self.manager.report_failure(operation, &e);
                Err(e)
            }
        }
    }

    /// Read a file into a document; `None` if unreadable, empty, or too large
    async fn load_document(&self, path: &Path) -> Option<VectorDocument> {
        let content = match self.fs.read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read file");
                return None;
            }
        };

        if content.is_empty() {
            tracing::debug!(path = %path.display(), "Skipping empty file");
            return None;
        }
        let chars = content.chars().count();
        if chars > self.config.max_file_chars {
            tracing::debug!(
                path = %path.display(),
                chars,
                limit = self.config.max_file_chars,
                "Skipping oversized file"
            );
            return None;
        }

        let now = Utc::now();
        let last_modified = self.fs.modified(path).await.unwrap_or(now);
        let line_count = content.lines().count();

        Some(
            VectorDocument::new(file_uri(path), content)
                .with_metadata("path", path.to_string_lossy().to_string())
                .with_metadata("language", detect_language(path))
                .with_metadata("lineCount", line_count as u64)
                .with_metadata("lastModified", last_modified.to_rfc3339())
                .with_metadata("indexedAt", now.to_rfc3339()),
        )
    }

    /// Index a single file; `false` if skipped or not stored
    pub async fn index_file(&self, path: &Path) -> bool {
        let Some(document) = self.load_document(path).await else {
            return false;
        };
        self.manager.add_document(document).await.is_some()
    }

    /// Index files in batches, one `add_documents` call per batch.
    ///
    /// Cancellation is checked before each batch; a started batch runs to
    /// completion. Returns the number of documents stored.
    pub async fn index_files(
        &self,
        files: &[PathBuf],
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> usize {
        let total = files.len();
        let batch_size = self.config.batch_size.max(1);
        let mut processed = 0;
        let mut indexed = 0;

        for batch in files.chunks(batch_size) {
            if cancel.is_cancelled() {
                tracing::info!(processed, indexed, total, "Indexing cancelled");
                break;
            }

            let loaded = join_all(batch.iter().map(|path| self.load_document(path))).await;
            let documents: Vec<VectorDocument> = loaded.into_iter().flatten().collect();

            indexed += self.store_batch(documents).await;
            processed += batch.len();

            progress.report(ProgressUpdate {
                message: format!("Indexed {indexed} documents ({processed}/{total} files)"),
                fraction_complete: processed as f32 / total as f32,
                indexed,
            });

            tokio::task::yield_now().await;
        }

        indexed
    }

    async fn store_batch(&self, documents: Vec<VectorDocument>) -> usize {
        if documents.is_empty() {
            return 0;
        }
        if let Some(ids) = self.manager.add_documents(documents.clone()).await {
            return ids.len();
        }

        // Batch rejected; retry singly so one bad document cannot sink the rest
        if !self.manager.is_enabled() {
            return 0;
        }
        let mut stored = 0;
        for document in documents {
            if self.manager.add_document(document).await.is_some() {
                stored += 1;
            }
        }
        stored
    }

    /// Resolve files under `root` and index them.
    ///
    /// `None` patterns fall back to the configured include/exclude globs.
    pub async fn index_workspace(
        &self,
        root: &Path,
        include: Option<&str>,
        exclude: Option<&str>,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        self.ensure_ready().await?;

        let root = root.to_path_buf();
        let include = include.unwrap_or(&self.config.include).to_string();
        let exclude = exclude.unwrap_or(&self.config.exclude).to_string();

        let files = tokio::task::spawn_blocking(move || {
            resolve_workspace_files(&root, &include, &exclude)
        })
        .await
        .map_err(|e| CodevecError::Io(std::io::Error::other(e)))??;

        tracing::info!(files = files.len(), "Indexing workspace");
        Ok(self.index_files(&files, progress, cancel).await)
    }

    /// Drop a file's document from the index
    pub async fn remove_file(&self, path: &Path) -> bool {
        self.manager.delete_document(&file_uri(path)).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use codevec_vector::{HashingEmbedding, LocalVectorStore};
    use std::sync::Mutex;

    async fn local_service() -> IndexingService {
        let manager = Arc::new(ProviderManager::new());
        manager
            .register_provider(Arc::new(LocalVectorStore::new(Arc::new(
                HashingEmbedding::new(64),
            ))))
            .await;
        manager.set_active_provider("local", None).await.unwrap();
        IndexingService::new(manager, IndexingConfig::default())
    }

    #[tokio::test]
    async fn test_index_file_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.rs");
        std::fs::write(&path, "fn one() {}\nfn two() {}\n").unwrap();

        let service = local_service().await;
        assert!(service.index_file(&path).await);

        let doc = service.manager().get_document(&file_uri(&path)).await.unwrap();
        assert_eq!(doc.metadata["language"], "rust");
        assert_eq!(doc.metadata["lineCount"], 2);
        assert_eq!(doc.metadata["path"], &*path.to_string_lossy());
        assert!(doc.metadata.contains_key("lastModified"));
        assert!(doc.metadata.contains_key("indexedAt"));
    }

    #[tokio::test]
    async fn test_reindex_upserts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.py");
        std::fs::write(&path, "print('a')").unwrap();

        let service = local_service().await;
        assert!(service.index_file(&path).await);
        std::fs::write(&path, "print('b')").unwrap();
        assert!(service.index_file(&path).await);

        assert_eq!(service.manager().count().await, Some(1));
        let doc = service.manager().get_document(&file_uri(&path)).await.unwrap();
        assert_eq!(doc.content, "print('b')");

        assert!(service.remove_file(&path).await);
        assert_eq!(service.manager().count().await, Some(0));
    }

    #[tokio::test]
    async fn test_index_file_skips_missing_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.rs");
        std::fs::write(&empty, "").unwrap();

        let service = local_service().await;
        assert!(!service.index_file(&empty).await);
        assert!(!service.index_file(&dir.path().join("missing.rs")).await);
    }

    #[tokio::test]
    async fn test_progress_reports_each_batch() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<PathBuf> = (0..5)
            .map(|i| {
                let path = dir.path().join(format!("f{i}.go"));
                std::fs::write(&path, format!("package f{i}")).unwrap();
                path
            })
            .collect();

        let manager = local_service().await.manager().clone();
        let config = IndexingConfig {
            batch_size: 2,
            ..IndexingConfig::default()
        };
        let service = IndexingService::new(manager, config);

        let updates = Mutex::new(Vec::new());
        let sink = |update: ProgressUpdate| updates.lock().unwrap().push(update);
        let count = service
            .index_files(&files, &sink, &CancellationToken::new())
            .await;

        assert_eq!(count, 5);
        let updates = updates.into_inner().unwrap();
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].indexed, 2);
        assert!((updates[0].fraction_complete - 0.4).abs() < 1e-6);
        assert_eq!(updates[2].fraction_complete, 1.0);
    }

    #[tokio::test]
    async fn test_search_not_ready_without_provider() {
        let service =
            IndexingService::new(Arc::new(ProviderManager::new()), IndexingConfig::default());
        assert!(matches!(
            service.semantic_search("foo", DEFAULT_SEARCH_LIMIT).await,
            Err(CodevecError::NotReady(_))
        ));
        assert!(matches!(
            service
                .index_workspace(
                    Path::new("."),
                    None,
                    None,
                    &NoopProgress,
                    &CancellationToken::new()
                )
                .await,
            Err(CodevecError::NotReady(_))
        ));
    }
}
