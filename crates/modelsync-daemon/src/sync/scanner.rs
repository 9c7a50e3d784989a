//! Paginated scan of reconcilable model records

use crate::error::{StorageError, SyncResult};
use crate::storage::{Document, DocumentStore, PageRequest, SearchQuery};
use futures::stream::{self, BoxStream, StreamExt};
use modelsync_types::model::MODEL_STATE_FIELD;
use modelsync_types::{ModelId, ModelRecord, RECONCILABLE_STATES};
use std::sync::Arc;

enum Cursor {
    Start,
    After(String),
    Done,
}

/// Reads model records from the model collection
pub struct ModelStateIndexScanner {
    store: Arc<dyn DocumentStore>,
    collection: String,
    page_size: usize,
}

impl ModelStateIndexScanner {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>, page_size: usize) -> Self {
        Self {
            store,
            collection: collection.into(),
            page_size: page_size.max(1),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Whether the model collection exists at all
    pub async fn exists(&self) -> SyncResult<bool> {
        Ok(self.store.collection_exists(&self.collection).await?)
    }

    /// Lazily stream every record in a reconcilable state, one page at a time.
    ///
    /// Records that fail to parse are logged and skipped. A storage error
    /// yields one `Err` item and ends the stream. A missing collection is an
    /// empty stream.
    pub fn scan_reconcilable(&self) -> BoxStream<'_, SyncResult<ModelRecord>> {
        let query = SearchQuery::field_in(
            MODEL_STATE_FIELD,
            RECONCILABLE_STATES.iter().map(|state| state.as_str()),
        );

        stream::unfold(Cursor::Start, move |cursor| {
            let query = query.clone();
            async move {
                let search_after = match cursor {
                    Cursor::Done => return None,
                    Cursor::Start => None,
                    Cursor::After(id) => Some(id),
                };
                let page = PageRequest {
                    search_after,
                    size: self.page_size,
                };

                match self.store.search(&self.collection, &query, page).await {
                    Ok(page) => {
                        let next = page.next.map_or(Cursor::Done, Cursor::After);
                        let records: Vec<SyncResult<ModelRecord>> = page
                            .hits
                            .into_iter()
                            .filter_map(|doc| self.parse(doc))
                            .map(Ok)
                            .collect();
                        Some((records, next))
                    }
                    Err(StorageError::NotFound(_)) => None,
                    Err(error) => {
                        tracing::error!(
                            collection = %self.collection,
                            error = %error,
                            "Model state scan failed"
                        );
                        Some((vec![Err(error.into())], Cursor::Done))
                    }
                }
            }
        })
        .flat_map(stream::iter)
        .boxed()
    }

    fn parse(&self, doc: Document) -> Option<ModelRecord> {
        match ModelRecord::from_document(ModelId::new(doc.id.clone()), &doc.source) {
            Ok(record) => Some(record),
            Err(error) => {
                tracing::warn!(model_id = %doc.id, error = %error, "Skipping unreadable model record");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::storage::InMemoryDocumentStore;
    use futures::TryStreamExt;
    use serde_json::json;

    const MODELS: &str = ".plugins-ml-model";

    async fn put(store: &InMemoryDocumentStore, id: &str, source: serde_json::Value) {
        store
            .put(MODELS, Document::new(id, source))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_exists() {
        let store = InMemoryDocumentStore::new();
        let scanner = ModelStateIndexScanner::new(Arc::new(store.clone()), MODELS, 10);
        assert!(!scanner.exists().await.unwrap());
        store.create_collection(MODELS).await;
        assert!(scanner.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_filters_states_across_pages() {
        let store = InMemoryDocumentStore::new();
        for i in 0..7 {
            put(
                &store,
                &format!("m{}", i),
                json!({ "model_state": "DEPLOYED", "planning_worker_node_count": 1 }),
            )
            .await;
        }
        put(
            &store,
            "registered",
            json!({ "model_state": "REGISTERED", "planning_worker_node_count": 1 }),
        )
        .await;

        let scanner = ModelStateIndexScanner::new(Arc::new(store), MODELS, 3);
        let records: Vec<ModelRecord> = scanner.scan_reconcilable().try_collect().await.unwrap();

        assert_eq!(records.len(), 7);
        assert!(records.iter().all(|r| r.state.is_reconcilable()));
    }

    #[tokio::test]
    async fn test_scan_skips_unreadable_records() {
        let store = InMemoryDocumentStore::new();
        put(&store, "good", json!({ "model_state": "DEPLOYING", "planning_worker_node_count": 2 })).await;
        put(&store, "bad", json!({ "model_state": "DEPLOYING" })).await;

        let scanner = ModelStateIndexScanner::new(Arc::new(store), MODELS, 10);
        let records: Vec<ModelRecord> = scanner.scan_reconcilable().try_collect().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].model_id, ModelId::new("good"));
    }

    #[tokio::test]
    async fn test_scan_missing_collection_is_empty() {
        let scanner =
            ModelStateIndexScanner::new(Arc::new(InMemoryDocumentStore::new()), MODELS, 10);
        let records: Vec<_> = scanner.scan_reconcilable().collect().await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_scan_transport_error_ends_stream() {
        let store = crate::sync::testing::RecordingStore::new();
        store.inner().create_collection(MODELS).await;
        store.fail_search(true);

        let scanner = ModelStateIndexScanner::new(Arc::new(store), MODELS, 10);
        let items: Vec<_> = scanner.scan_reconcilable().collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(SyncError::Storage(StorageError::Transport(_)))));
    }
}
