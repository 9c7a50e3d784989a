//! Recording doubles for sync-up tests

use crate::error::{StorageError, StorageResult};
use crate::storage::{
    BulkResponse, BulkUpdateItem, Document, DocumentStore, InMemoryDocumentStore, PageRequest,
    SearchPage, SearchQuery,
};
use async_trait::async_trait;
use modelsync_crypto::{CryptoResult, Encryptor, KeyMaterial, MasterKeyEncryptor};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory store that counts calls and can inject failures
#[derive(Debug, Clone, Default)]
pub struct RecordingStore {
    inner: InMemoryDocumentStore,
    searches: Arc<AtomicUsize>,
    bulk_calls: Arc<AtomicUsize>,
    creates: Arc<AtomicUsize>,
    fail_search: Arc<AtomicBool>,
    fail_bulk: Arc<AtomicBool>,
    fail_get: Arc<AtomicBool>,
    stale_reads: Arc<AtomicUsize>,
    bulk_requests: Arc<Mutex<Vec<Vec<BulkUpdateItem>>>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryDocumentStore {
        &self.inner
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn bulk_count(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn bulk_requests(&self) -> Vec<Vec<BulkUpdateItem>> {
        self.bulk_requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn fail_search(&self, fail: bool) {
        self.fail_search.store(fail, Ordering::SeqCst);
    }

    pub fn fail_bulk(&self, fail: bool) {
        self.fail_bulk.store(fail, Ordering::SeqCst);
    }

    pub fn fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    /// Make the next `count` gets report the document as absent
    pub fn stale_reads(&self, count: usize) {
        self.stale_reads.store(count, Ordering::SeqCst);
    }
}

fn transport(op: &str) -> StorageError {
    StorageError::Transport(format!("injected {} failure", op))
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn collection_exists(&self, collection: &str) -> StorageResult<bool> {
        self.inner.collection_exists(collection).await
    }

    async fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(transport("get"));
        }
        let stale = self
            .stale_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(None);
        }
        self.inner.get(collection, id).await
    }

    async fn put(&self, collection: &str, document: Document) -> StorageResult<()> {
        self.inner.put(collection, document).await
    }

    async fn create_if_absent(&self, collection: &str, document: Document) -> StorageResult<()> {
        let result = self.inner.create_if_absent(collection, document).await;
        if result.is_ok() {
            self.creates.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    async fn search(
        &self,
        collection: &str,
        query: &SearchQuery,
        page: PageRequest,
    ) -> StorageResult<SearchPage> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(transport("search"));
        }
        self.inner.search(collection, query, page).await
    }

    async fn bulk_update(
        &self,
        collection: &str,
        items: Vec<BulkUpdateItem>,
    ) -> StorageResult<BulkResponse> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.bulk_requests.lock() {
            requests.push(items.clone());
        }
        if self.fail_bulk.load(Ordering::SeqCst) {
            return Err(transport("bulk"));
        }
        self.inner.bulk_update(collection, items).await
    }
}

/// Encryptor that counts installs and the keys it was handed
#[derive(Debug, Default)]
pub struct CountingEncryptor {
    inner: MasterKeyEncryptor,
    installed: Mutex<Vec<String>>,
}

impl CountingEncryptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install_count(&self) -> u64 {
        self.inner.install_count()
    }

    /// Fingerprints of every installed key, in order
    pub fn installed(&self) -> Vec<String> {
        self.installed
            .lock()
            .map(|installed| installed.clone())
            .unwrap_or_default()
    }
}

impl Encryptor for CountingEncryptor {
    fn has_key(&self) -> bool {
        self.inner.has_key()
    }

    fn fingerprint(&self) -> Option<String> {
        self.inner.fingerprint()
    }

    fn install_key(&self, material: KeyMaterial) -> CryptoResult<()> {
        if let Ok(mut installed) = self.installed.lock() {
            installed.push(material.fingerprint());
        }
        self.inner.install_key(material)
    }

    fn generate_key(&self) -> KeyMaterial {
        self.inner.generate_key()
    }
}
