//! Storage trait definitions

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use modelsync_types::TenantId;
use serde_json::Value;

/// A stored document: id plus JSON source
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub source: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, source: Value) -> Self {
        Self {
            id: id.into(),
            source,
        }
    }
}

/// Term filter: `field` must equal one of `any_of`
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub field: String,
    pub any_of: Vec<Value>,
}

impl SearchQuery {
    pub fn field_in<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            field: field.into(),
            any_of: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, source: &Value) -> bool {
        source
            .get(&self.field)
            .is_some_and(|value| self.any_of.contains(value))
    }
}

/// One page of a search, ordered by document id
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    /// Return only documents whose id sorts after this one
    pub search_after: Option<String>,
    pub size: usize,
}

impl PageRequest {
    pub fn first(size: usize) -> Self {
        Self {
            search_after: None,
            size,
        }
    }

    pub fn after(id: impl Into<String>, size: usize) -> Self {
        Self {
            search_after: Some(id.into()),
            size,
        }
    }
}

/// Search results plus the cursor for the next page
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub hits: Vec<Document>,
    /// Cursor to pass as `search_after`; `None` when no more pages exist
    pub next: Option<String>,
}

/// Partial update of one document
#[derive(Debug, Clone, PartialEq)]
pub struct BulkUpdateItem {
    pub id: String,
    /// Tenant the document must belong to
    pub tenant_id: Option<TenantId>,
    /// Fields to merge into the stored source
    pub partial: Value,
}

/// Per-item outcome of a bulk update
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemResult {
    pub id: String,
    pub error: Option<StorageError>,
}

/// Outcome of a bulk update request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResponse {
    pub items: Vec<BulkItemResult>,
}

impl BulkResponse {
    pub fn has_failures(&self) -> bool {
        self.items.iter().any(|item| item.error.is_some())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &StorageError)> {
        self.items
            .iter()
            .filter_map(|item| item.error.as_ref().map(|e| (item.id.as_str(), e)))
    }
}

/// Document store the sync-up cycle reads and writes
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Whether the collection has been created
    async fn collection_exists(&self, collection: &str) -> StorageResult<bool>;

    /// Get a document by id
    async fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>>;

    /// Create or replace a document, creating the collection if needed
    async fn put(&self, collection: &str, document: Document) -> StorageResult<()>;

    /// Create a document only if its id is unused; `Conflict` otherwise
    async fn create_if_absent(&self, collection: &str, document: Document) -> StorageResult<()>;

    /// Search a collection; `NotFound` if the collection does not exist
    async fn search(
        &self,
        collection: &str,
        query: &SearchQuery,
        page: PageRequest,
    ) -> StorageResult<SearchPage>;

    /// Merge partial documents in one request
    async fn bulk_update(
        &self,
        collection: &str,
        items: Vec<BulkUpdateItem>,
    ) -> StorageResult<BulkResponse>;
}
