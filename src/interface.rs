use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::stream::BoxStream;
use mongodb::options::FindOptions;

use crate::core::Result;

/// Forward-only sequence of raw documents backed by one live cursor.
///
/// Dropping the stream releases the cursor.
pub type DocumentStream = BoxStream<'static, Result<Document>>;

/// Outcome of a single-document update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Outcome of a single-document delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteOutcome {
    pub deleted_count: u64,
}

/// A connection to a document store.
///
/// Implemented for `mongodb::Client` and for the in-memory backend, so model
/// code is agnostic to which one it runs against.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Get a handle to the named database. Does not touch the server.
    fn database(&self, name: &str) -> Arc<dyn StoreDatabase>;

    /// Close the connection and release pooled sockets.
    async fn shutdown(&self) -> Result<()>;
}

/// A database inside a store.
#[async_trait]
pub trait StoreDatabase: Send + Sync {
    fn name(&self) -> &str;

    /// List collection names, optionally filtered (e.g. `{ name: "users" }`).
    async fn list_collection_names(&self, filter: Option<Document>) -> Result<Vec<String>>;

    /// Explicitly create a collection. Fails if it already exists.
    async fn create_collection(&self, name: &str) -> Result<()>;

    /// Get a handle to the named collection.
    fn collection(&self, name: &str) -> Arc<dyn StoreCollection>;

    async fn drop_database(&self) -> Result<()>;
}

/// A collection of documents.
///
/// Filters passed here have already been through identifier fix-up; options
/// are forwarded to the backend untouched.
#[async_trait]
pub trait StoreCollection: Send + Sync {
    fn name(&self) -> &str;

    async fn find(&self, filter: Document, options: Option<FindOptions>) -> Result<DocumentStream>;

    async fn find_one(
        &self,
        filter: Document,
        options: Option<FindOptions>,
    ) -> Result<Option<Document>>;

    /// Insert one document and return its `_id`, generated when absent.
    async fn insert_one(&self, document: Document) -> Result<Bson>;

    /// Apply an update document (e.g. `{ $set: {...} }`) to the first match.
    async fn update_one(&self, filter: Document, update: Document) -> Result<UpdateOutcome>;

    async fn delete_one(&self, filter: Document) -> Result<DeleteOutcome>;

    async fn count_documents(&self, filter: Document) -> Result<u64>;
}
