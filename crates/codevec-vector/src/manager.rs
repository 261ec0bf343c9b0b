//! Provider registry and lifecycle manager
//!
//! The manager owns every registered backend, keeps at most one of them
//! active, and gates document operations behind an enabled flag. Document
//! operations never fail: when the manager is disabled, has no active
//! backend, or the backend errors, they return an empty sentinel and the
//! failure is logged and broadcast as a [`ManagerEvent`].
//!
//! Author: codevec contributors

use codevec_core::{
    CodevecError, DocumentPatch, Result, SearchOptions, SearchQuery, SearchResult,
    VectorDatabaseOptions, VectorDocument,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::VectorDatabase;

const EVENT_CAPACITY: usize = 64;

/// State changes and failures surfaced to observers (status bars, logs)
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    EnabledChanged(bool),
    ProviderActivated(String),
    ProviderClosed(String),
    /// `backend` is false for caller mistakes such as validation errors
    OperationFailed {
        operation: String,
        message: String,
        backend: bool,
    },
}

/// Registry of vector backends with a single active slot
pub struct ProviderManager {
    providers: RwLock<HashMap<String, Arc<dyn VectorDatabase>>>,
    active: Mutex<Option<Arc<dyn VectorDatabase>>>,
    enabled: AtomicBool,
    events: broadcast::Sender<ManagerEvent>,
}

impl ProviderManager {
    /// Create an empty manager with indexing enabled
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            providers: RwLock::new(HashMap::new()),
            active: Mutex::new(None),
            enabled: AtomicBool::new(true),
            events,
        }
    }

    /// Subscribe to manager events
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ManagerEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Log a failed operation and broadcast it to subscribers.
    ///
    /// Backend faults are logged as errors, rejected input as warnings.
    /// Callers that surface errors themselves use this so observers still
    /// see the failure.
    pub fn report_failure(&self, operation: &str, error: &CodevecError) {
        let backend = error.is_backend_failure();
        if backend {
            tracing::error!(operation, error = %error, "Vector backend operation failed");
        } else {
            tracing::warn!(operation, error = %error, "Vector operation rejected");
        }
        self.emit(ManagerEvent::OperationFailed {
            operation: operation.to_string(),
            message: error.to_string(),
            backend,
        });
    }

    /// Register a backend under its lower-cased name; last registration wins
    pub async fn register_provider(&self, provider: Arc<dyn VectorDatabase>) {
        let key = provider.name().to_lowercase();
        let replaced = self
            .providers
            .write()
            .await
            .insert(key.clone(), provider)
            .is_some();

        tracing::debug!(provider = %key, replaced, "Registered vector provider");
    }

    /// Names of all registered backends, sorted
    pub async fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Make `name` the active backend.
    ///
    /// The current backend is closed first. Returns `Ok(false)` when no
    /// backend has that name and `Err` when initialization fails; both leave
    /// no backend active.
    pub async fn set_active_provider(
        &self,
        name: &str,
        options: Option<VectorDatabaseOptions>,
    ) -> Result<bool> {
        let mut active = self.active.lock().await;

        if let Some(previous) = active.take() {
            self.close_provider(previous.as_ref()).await;
        }

        let provider = self.providers.read().await.get(&name.to_lowercase()).cloned();
        let Some(provider) = provider else {
            tracing::warn!(provider = name, "Unknown vector provider");
            return Ok(false);
        };

        let options = options.unwrap_or_default();
        if let Err(e) = provider.initialize(&options).await {
            self.report_failure("initialize", &e);
            return Err(e);
        }

        tracing::info!(provider = provider.name(), "Activated vector provider");
        self.emit(ManagerEvent::ProviderActivated(provider.name().to_string()));
        *active = Some(provider);
        Ok(true)
    }

    async fn close_provider(&self, provider: &dyn VectorDatabase) {
        if let Err(e) = provider.close().await {
            self.report_failure("close", &e);
        }
        tracing::info!(provider = provider.name(), "Closed vector provider");
        self.emit(ManagerEvent::ProviderClosed(provider.name().to_string()));
    }

    /// Toggle indexing and search; the active backend is left untouched
    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            tracing::info!(enabled, "Vector search toggled");
            self.emit(ManagerEvent::EnabledChanged(enabled));
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// The active backend, regardless of the enabled flag
    pub async fn active_provider(&self) -> Option<Arc<dyn VectorDatabase>> {
        self.active.lock().await.clone()
    }

    pub async fn active_provider_name(&self) -> Option<String> {
        self.active_provider()
            .await
            .map(|provider| provider.name().to_string())
    }

    /// Active backend when enabled, otherwise `None`
    async fn ready(&self, operation: &str) -> Option<Arc<dyn VectorDatabase>> {
        if !self.is_enabled() {
            tracing::debug!(operation, "Vector search disabled, skipping");
            return None;
        }
        let provider = self.active_provider().await;
        if provider.is_none() {
            tracing::debug!(operation, "No active vector provider, skipping");
        }
        provider
    }

    fn settle<T>(&self, operation: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.report_failure(operation, &e);
                None
            }
        }
    }

    /// Store a document; `None` if nothing was stored
    pub async fn add_document(&self, document: VectorDocument) -> Option<String> {
        let provider = self.ready("add_document").await?;
        let result = provider.add_document(document).await;
        self.settle("add_document", result)
    }

    /// Store documents in one backend call; `None` if nothing was stored
    pub async fn add_documents(&self, documents: Vec<VectorDocument>) -> Option<Vec<String>> {
        let provider = self.ready("add_documents").await?;
        let result = provider.add_documents(documents).await;
        self.settle("add_documents", result)
    }

    /// Search the active backend; empty when unavailable or on failure
    pub async fn search(
        &self,
        query: impl Into<SearchQuery>,
        options: Option<SearchOptions>,
    ) -> Vec<SearchResult> {
        let Some(provider) = self.ready("search").await else {
            return Vec::new();
        };
        let options = options.unwrap_or_default();
        let result = provider.search(query.into(), &options).await;
        self.settle("search", result).unwrap_or_default()
    }

    /// Embed text with the active backend
    pub async fn get_embedding(&self, text: &str) -> Option<Vec<f32>> {
        let provider = self.ready("get_embedding").await?;
        let result = provider.get_embedding(text).await;
        self.settle("get_embedding", result)
    }

    pub async fn get_document(&self, id: &str) -> Option<VectorDocument> {
        let provider = self.ready("get_document").await?;
        let result = provider.get_document(id).await;
        self.settle("get_document", result).flatten()
    }

    /// Apply a partial update; `false` if nothing changed
    pub async fn update_document(&self, id: &str, patch: DocumentPatch) -> bool {
        let Some(provider) = self.ready("update_document").await else {
            return false;
        };
        let result = provider.update_document(id, patch).await;
        self.settle("update_document", result).unwrap_or(false)
    }

    pub async fn delete_document(&self, id: &str) -> bool {
        let Some(provider) = self.ready("delete_document").await else {
            return false;
        };
        let result = provider.delete_document(id).await;
        self.settle("delete_document", result).unwrap_or(false)
    }

    /// Clear the active backend; `false` if nothing was cleared
    pub async fn delete_all(&self) -> bool {
        let Some(provider) = self.ready("delete_all").await else {
            return false;
        };
        let result = provider.delete_all().await;
        self.settle("delete_all", result).is_some()
    }

    /// Document count of the active backend
    pub async fn count(&self) -> Option<usize> {
        let provider = self.ready("count").await?;
        let result = provider.count().await;
        self.settle("count", result)
    }

    /// Close the active backend, if any
    pub async fn close(&self) {
        let mut active = self.active.lock().await;
        if let Some(provider) = active.take() {
            self.close_provider(provider.as_ref()).await;
        }
    }
}

impl Default for ProviderManager {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedding;
    use crate::memory_store::LocalVectorStore;

    fn local() -> Arc<dyn VectorDatabase> {
        Arc::new(LocalVectorStore::new(Arc::new(HashingEmbedding::new(16))))
    }

    #[tokio::test]
    async fn test_register_is_case_insensitive() {
        let manager = ProviderManager::new();
        manager.register_provider(local()).await;
        manager.register_provider(local()).await;

        assert_eq!(manager.provider_names().await, vec!["local".to_string()]);
        assert!(manager.set_active_provider("LOCAL", None).await.unwrap());
        assert_eq!(manager.active_provider_name().await.as_deref(), Some("local"));
    }

    #[tokio::test]
    async fn test_unknown_provider_leaves_none_active() {
        let manager = ProviderManager::new();
        manager.register_provider(local()).await;
        manager.set_active_provider("local", None).await.unwrap();

        assert!(!manager.set_active_provider("pinecone", None).await.unwrap());
        assert!(manager.active_provider().await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_returns_sentinels() {
        let manager = ProviderManager::new();
        manager.register_provider(local()).await;
        manager.set_active_provider("local", None).await.unwrap();
        manager.set_enabled(false);

        assert!(manager.add_document(VectorDocument::new("a", "x")).await.is_none());
        assert!(manager.search("x", None).await.is_empty());
        assert!(manager.get_embedding("x").await.is_none());
        assert!(manager.active_provider().await.is_some());
    }

    #[tokio::test]
    async fn test_backend_error_becomes_sentinel_and_event() {
        let manager = ProviderManager::new();
        manager.register_provider(local()).await;
        manager.set_active_provider("local", None).await.unwrap();
        let mut events = manager.subscribe();

        let id = manager.add_document(VectorDocument::new("", "bad id")).await;
        assert!(id.is_none());

        match events.recv().await.unwrap() {
            ManagerEvent::OperationFailed {
                operation, backend, ..
            } => {
                assert_eq!(operation, "add_document");
                assert!(!backend);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_report_failure_classifies_error() {
        let manager = ProviderManager::new();
        let mut events = manager.subscribe();

        manager.report_failure(
            "semantic_search",
            &CodevecError::BackendFailure("connection reset".to_string()),
        );
        manager.report_failure(
            "semantic_search",
            &CodevecError::ValidationError("empty query".to_string()),
        );

        assert_eq!(
            events.recv().await.unwrap(),
            ManagerEvent::OperationFailed {
                operation: "semantic_search".to_string(),
                message: "Backend failure: connection reset".to_string(),
                backend: true,
            }
        );
        assert!(matches!(
            events.recv().await.unwrap(),
            ManagerEvent::OperationFailed { backend: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_enabled_event_only_on_change() {
        let manager = ProviderManager::new();
        let mut events = manager.subscribe();

        manager.set_enabled(true);
        manager.set_enabled(false);

        assert_eq!(events.recv().await.unwrap(), ManagerEvent::EnabledChanged(false));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let manager = ProviderManager::new();
        let provider = local();
        manager.register_provider(provider.clone()).await;
        manager.set_active_provider("local", None).await.unwrap();

        manager.close().await;
        manager.close().await;

        assert!(!provider.is_available());
        assert!(manager.active_provider().await.is_none());
        assert!(manager.search("x", None).await.is_empty());
    }
}
