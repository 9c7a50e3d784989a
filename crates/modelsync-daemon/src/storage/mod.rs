//! Storage layer for modelsync-daemon
//!
//! A small document-store abstraction over the model and config collections.

mod memory;
mod traits;

pub use memory::InMemoryDocumentStore;
pub use traits::{
    BulkItemResult, BulkResponse, BulkUpdateItem, Document, DocumentStore, PageRequest,
    SearchPage, SearchQuery,
};
