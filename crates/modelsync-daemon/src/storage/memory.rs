//! In-memory storage implementation

use super::traits::*;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use modelsync_types::model::TENANT_ID_FIELD;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::RwLock;

type Collection = BTreeMap<String, Value>;

/// In-memory document store for development and testing
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl InMemoryDocumentStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty collection if it does not exist yet
    pub async fn create_collection(&self, collection: &str) {
        let mut collections = self.collections.write().await;
        collections.entry(collection.to_string()).or_default();
    }

    /// Number of documents in a collection
    pub async fn len(&self, collection: &str) -> usize {
        let collections = self.collections.read().await;
        collections.get(collection).map_or(0, BTreeMap::len)
    }
}

fn merge(target: &mut Value, partial: &Value) -> StorageResult<()> {
    let (Some(target), Some(partial)) = (target.as_object_mut(), partial.as_object()) else {
        return Err(StorageError::InvalidData(
            "partial update requires object documents".to_string(),
        ));
    };
    for (key, value) in partial {
        target.insert(key.clone(), value.clone());
    }
    Ok(())
}

fn tenant_matches(source: &Value, item: &BulkUpdateItem) -> bool {
    match &item.tenant_id {
        None => true,
        Some(tenant) => source
            .get(TENANT_ID_FIELD)
            .and_then(Value::as_str)
            .is_some_and(|stored| stored == tenant.as_str()),
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn collection_exists(&self, collection: &str) -> StorageResult<bool> {
        let collections = self.collections.read().await;
        Ok(collections.contains_key(collection))
    }

    async fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|source| Document::new(id, source.clone())))
    }

    async fn put(&self, collection: &str, document: Document) -> StorageResult<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(document.id, document.source);
        Ok(())
    }

    async fn create_if_absent(&self, collection: &str, document: Document) -> StorageResult<()> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(&document.id) {
            return Err(StorageError::Conflict(format!(
                "{}/{} already exists",
                collection, document.id
            )));
        }
        docs.insert(document.id, document.source);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &SearchQuery,
        page: PageRequest,
    ) -> StorageResult<SearchPage> {
        let collections = self.collections.read().await;
        let docs = collections
            .get(collection)
            .ok_or_else(|| StorageError::NotFound(format!("collection {}", collection)))?;

        let lower = match &page.search_after {
            Some(id) => Bound::Excluded(id.clone()),
            None => Bound::Unbounded,
        };

        let hits: Vec<Document> = docs
            .range((lower, Bound::Unbounded))
            .filter(|(_, source)| query.matches(source))
            .take(page.size)
            .map(|(id, source)| Document::new(id.clone(), source.clone()))
            .collect();

        let next = if page.size > 0 && hits.len() == page.size {
            hits.last().map(|doc| doc.id.clone())
        } else {
            None
        };

        Ok(SearchPage { hits, next })
    }

    async fn bulk_update(
        &self,
        collection: &str,
        items: Vec<BulkUpdateItem>,
    ) -> StorageResult<BulkResponse> {
        let mut collections = self.collections.write().await;
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| StorageError::NotFound(format!("collection {}", collection)))?;

        let items = items
            .into_iter()
            .map(|item| {
                let error = match docs.get_mut(&item.id) {
                    Some(source) if tenant_matches(source, &item) => {
                        merge(source, &item.partial).err()
                    }
                    _ => Some(StorageError::NotFound(format!(
                        "{}/{}",
                        collection, item.id
                    ))),
                };
                BulkItemResult { id: item.id, error }
            })
            .collect();

        Ok(BulkResponse { items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelsync_types::TenantId;
    use serde_json::json;

    const MODELS: &str = ".plugins-ml-model";

    async fn seeded(count: usize) -> InMemoryDocumentStore {
        let store = InMemoryDocumentStore::new();
        for i in 0..count {
            store
                .put(
                    MODELS,
                    Document::new(format!("m{:02}", i), json!({ "model_state": "DEPLOYED" })),
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_collection_exists() {
        let store = InMemoryDocumentStore::new();
        assert!(!store.collection_exists(MODELS).await.unwrap());
        store.create_collection(MODELS).await;
        assert!(store.collection_exists(MODELS).await.unwrap());
        assert_eq!(store.len(MODELS).await, 0);
    }

    #[tokio::test]
    async fn test_create_if_absent_conflicts() {
        let store = InMemoryDocumentStore::new();
        let doc = Document::new("master_key", json!({ "master_key": "a" }));
        store.create_if_absent("config", doc.clone()).await.unwrap();

        let err = store
            .create_if_absent("config", Document::new("master_key", json!({ "master_key": "b" })))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        let stored = store.get("config", "master_key").await.unwrap().unwrap();
        assert_eq!(stored, doc);
    }

    #[tokio::test]
    async fn test_search_pages_by_id() {
        let store = seeded(5).await;
        let query = SearchQuery::field_in("model_state", ["DEPLOYED"]);

        let first = store
            .search(MODELS, &query, PageRequest::first(2))
            .await
            .unwrap();
        assert_eq!(first.hits.len(), 2);
        assert_eq!(first.next.as_deref(), Some("m01"));

        let second = store
            .search(MODELS, &query, PageRequest::after("m01", 2))
            .await
            .unwrap();
        assert_eq!(second.hits[0].id, "m02");

        let last = store
            .search(MODELS, &query, PageRequest::after("m03", 2))
            .await
            .unwrap();
        assert_eq!(last.hits.len(), 1);
        assert!(last.next.is_none());
    }

    #[tokio::test]
    async fn test_search_missing_collection() {
        let store = InMemoryDocumentStore::new();
        let query = SearchQuery::field_in("model_state", ["DEPLOYED"]);
        let err = store
            .search(MODELS, &query, PageRequest::first(10))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_bulk_update_merges_and_reports_items() {
        let store = InMemoryDocumentStore::new();
        store
            .put(
                MODELS,
                Document::new(
                    "m1",
                    json!({ "model_state": "DEPLOYING", "tenant_id": "t1", "name": "bert" }),
                ),
            )
            .await
            .unwrap();

        let response = store
            .bulk_update(
                MODELS,
                vec![
                    BulkUpdateItem {
                        id: "m1".into(),
                        tenant_id: Some(TenantId::new("t1")),
                        partial: json!({ "model_state": "DEPLOYED" }),
                    },
                    BulkUpdateItem {
                        id: "missing".into(),
                        tenant_id: None,
                        partial: json!({ "model_state": "DEPLOYED" }),
                    },
                ],
            )
            .await
            .unwrap();

        assert!(response.items[0].error.is_none());
        assert!(matches!(
            response.items[1].error,
            Some(StorageError::NotFound(_))
        ));

        let doc = store.get(MODELS, "m1").await.unwrap().unwrap();
        assert_eq!(doc.source["model_state"], "DEPLOYED");
        assert_eq!(doc.source["name"], "bert");
    }

    #[tokio::test]
    async fn test_bulk_update_respects_tenant() {
        let store = InMemoryDocumentStore::new();
        store
            .put(
                MODELS,
                Document::new("m1", json!({ "model_state": "DEPLOYED", "tenant_id": "t1" })),
            )
            .await
            .unwrap();

        let response = store
            .bulk_update(
                MODELS,
                vec![BulkUpdateItem {
                    id: "m1".into(),
                    tenant_id: Some(TenantId::new("t2")),
                    partial: json!({ "model_state": "DEPLOY_FAILED" }),
                }],
            )
            .await
            .unwrap();

        assert!(response.has_failures());
        let doc = store.get(MODELS, "m1").await.unwrap().unwrap();
        assert_eq!(doc.source["model_state"], "DEPLOYED");
    }
}
