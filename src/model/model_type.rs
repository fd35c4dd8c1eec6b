use std::fmt;
use std::sync::Arc;

use bson::{Document, doc};
use futures::future::{self, BoxFuture, Shared};
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt, TryFutureExt, TryStreamExt};
use mongodb::error::ErrorKind;
use mongodb::options::FindOptions;
use serde::Serialize;
use tracing::{debug, warn};

use super::{LifecycleObserver, Record};
use crate::core::{AdapterError, Result, fix_query_identifier};
use crate::interface::{StoreClient, StoreCollection, StoreDatabase};

/// Forward-only sequence of records over one live cursor.
pub type RecordStream = BoxStream<'static, Result<Record>>;

type CollectionFuture = Shared<BoxFuture<'static, Option<Arc<dyn StoreCollection>>>>;

/// Server error code for "collection already exists".
const NAMESPACE_EXISTS: i32 = 48;

/// A model type bound to one collection.
///
/// Cheap to clone. The collection binding is resolved once, on first use, and
/// the result is shared by every clone and every record built from it.
#[derive(Clone)]
pub struct ModelType {
    inner: Arc<ModelTypeInner>,
}

struct ModelTypeInner {
    name: String,
    collection: CollectionFuture,
    db: Arc<dyn StoreDatabase>,
    client: Option<Arc<dyn StoreClient>>,
    observers: Vec<Arc<dyn LifecycleObserver>>,
}

impl ModelType {
    pub(crate) fn new(
        name: &str,
        db: Arc<dyn StoreDatabase>,
        client: Option<Arc<dyn StoreClient>>,
        observers: Vec<Arc<dyn LifecycleObserver>>,
    ) -> Self {
        let collection = ensure_collection(Arc::clone(&db), name.to_string())
            .boxed()
            .shared();

        Self {
            inner: Arc::new(ModelTypeInner {
                name: name.to_string(),
                collection,
                db,
                client,
                observers,
            }),
        }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The bound collection, or `None` if resolving it failed.
    pub async fn collection(&self) -> Option<Arc<dyn StoreCollection>> {
        self.inner.collection.clone().await
    }

    pub(crate) async fn resolved_collection(&self) -> Result<Arc<dyn StoreCollection>> {
        self.collection()
            .await
            .ok_or_else(|| AdapterError::CollectionUnavailable(self.name().to_string()))
    }

    pub fn db(&self) -> &Arc<dyn StoreDatabase> {
        &self.inner.db
    }

    /// Present only when the model was derived from a connection.
    pub fn client(&self) -> Option<&Arc<dyn StoreClient>> {
        self.inner.client.as_ref()
    }

    pub(crate) fn observers(&self) -> &[Arc<dyn LifecycleObserver>] {
        &self.inner.observers
    }

    /// Empty, unsaved record of this type.
    pub fn new_record(&self) -> Record {
        Record::new(self.clone())
    }

    /// Record holding `document`; an `_id` in it becomes the identifier.
    pub fn build(&self, document: Document) -> Result<Record> {
        let mut record = self.new_record();
        record.assign(document)?;
        Ok(record)
    }

    /// Record built from any serializable value.
    pub fn build_from<T: Serialize>(&self, value: &T) -> Result<Record> {
        self.build(bson::to_document(value)?)
    }

    /// Every matching record, in store order.
    pub async fn find(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOptions>>,
    ) -> Result<Vec<Record>> {
        self.find_iterator(filter, options).try_collect().await
    }

    pub async fn find_one(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOptions>>,
    ) -> Result<Option<Record>> {
        let filter = fix_query_identifier(filter.into().unwrap_or_default())?;
        let collection = self.resolved_collection().await?;

        collection
            .find_one(filter, options.into())
            .await?
            .map(|document| self.build(document))
            .transpose()
    }

    /// Lazily stream matching records.
    ///
    /// Nothing is sent to the store until the stream is first polled. Records
    /// are built one document at a time; dropping the stream closes the cursor.
    pub fn find_iterator(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOptions>>,
    ) -> RecordStream {
        let filter = filter.into().unwrap_or_default();
        let options = options.into();

        let query = {
            let model = self.clone();
            async move {
                let filter = fix_query_identifier(filter)?;
                let collection = model.resolved_collection().await?;
                collection.find(filter, options).await
            }
        };

        let model = self.clone();
        query
            .try_flatten_stream()
            .and_then(move |document| future::ready(model.build(document)))
            .boxed()
    }

    pub async fn count(&self, filter: impl Into<Option<Document>>) -> Result<u64> {
        let filter = fix_query_identifier(filter.into().unwrap_or_default())?;
        let collection = self.resolved_collection().await?;
        collection.count_documents(filter).await
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.inner.name)
            .field("db", &self.inner.db.name())
            .field("client", &self.inner.client.is_some())
            .field("observers", &self.inner.observers.len())
            .finish()
    }
}

/// Bind `name`, creating the collection when the database does not list it.
///
/// Failures are logged and resolve to `None`; the model stays usable as a
/// value and its operations report `CollectionUnavailable`.
async fn ensure_collection(
    db: Arc<dyn StoreDatabase>,
    name: String,
) -> Option<Arc<dyn StoreCollection>> {
    match bind_collection(db.as_ref(), &name).await {
        Ok(collection) => Some(collection),
        Err(err) => {
            warn!(database = db.name(), collection = %name, error = %err, "failed to bind collection");
            None
        }
    }
}

async fn bind_collection(db: &dyn StoreDatabase, name: &str) -> Result<Arc<dyn StoreCollection>> {
    let listed = db
        .list_collection_names(Some(doc! { "name": name }))
        .await?;

    if !listed.iter().any(|listed| listed == name) {
        match db.create_collection(name).await {
            Ok(()) => {}
            // Lost a creation race with another model of the same name
            Err(err) if already_exists(&err) => {
                debug!(database = db.name(), collection = name, "collection created concurrently");
            }
            Err(err) => return Err(err),
        }
    }

    Ok(db.collection(name))
}

fn already_exists(err: &AdapterError) -> bool {
    match err {
        AdapterError::CollectionExists(_) => true,
        AdapterError::Store(err) => matches!(
            err.kind.as_ref(),
            ErrorKind::Command(command) if command.code == NAMESPACE_EXISTS
        ),
        _ => false,
    }
}
