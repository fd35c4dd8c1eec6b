//! Store traits implemented directly on the `mongodb` driver handles.
//!
//! Every call is forwarded as-is; driver errors surface unchanged through
//! `AdapterError::Store`.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::{StreamExt, TryStreamExt};
use mongodb::options::{FindOneOptions, FindOptions};
use mongodb::{Client, Collection, Database};
use tracing::debug;

use crate::core::{AdapterError, Result};
use crate::interface::{
    DeleteOutcome, DocumentStream, StoreClient, StoreCollection, StoreDatabase, UpdateOutcome,
};

#[async_trait]
impl StoreClient for Client {
    fn database(&self, name: &str) -> Arc<dyn StoreDatabase> {
        Arc::new(Client::database(self, name))
    }

    async fn shutdown(&self) -> Result<()> {
        Client::shutdown(self.clone()).await;
        Ok(())
    }
}

#[async_trait]
impl StoreDatabase for Database {
    fn name(&self) -> &str {
        Database::name(self)
    }

    async fn list_collection_names(&self, filter: Option<Document>) -> Result<Vec<String>> {
        Ok(Database::list_collection_names(self, filter).await?)
    }

    async fn create_collection(&self, name: &str) -> Result<()> {
        Database::create_collection(self, name, None).await?;
        debug!(database = Database::name(self), collection = name, "created collection");
        Ok(())
    }

    fn collection(&self, name: &str) -> Arc<dyn StoreCollection> {
        Arc::new(Database::collection::<Document>(self, name))
    }

    async fn drop_database(&self) -> Result<()> {
        Ok(Database::drop(self, None).await?)
    }
}

#[async_trait]
impl StoreCollection for Collection<Document> {
    fn name(&self) -> &str {
        Collection::name(self)
    }

    async fn find(&self, filter: Document, options: Option<FindOptions>) -> Result<DocumentStream> {
        let cursor = Collection::find(self, filter, options).await?;
        Ok(cursor.map_err(AdapterError::from).boxed())
    }

    async fn find_one(
        &self,
        filter: Document,
        options: Option<FindOptions>,
    ) -> Result<Option<Document>> {
        let options = options.map(find_one_options);
        Ok(Collection::find_one(self, filter, options).await?)
    }

    async fn insert_one(&self, document: Document) -> Result<Bson> {
        let result = Collection::insert_one(self, document, None).await?;
        Ok(result.inserted_id)
    }

    async fn update_one(&self, filter: Document, update: Document) -> Result<UpdateOutcome> {
        let result = Collection::update_one(self, filter, update, None).await?;
        Ok(UpdateOutcome {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    async fn delete_one(&self, filter: Document) -> Result<DeleteOutcome> {
        let result = Collection::delete_one(self, filter, None).await?;
        Ok(DeleteOutcome {
            deleted_count: result.deleted_count,
        })
    }

    async fn count_documents(&self, filter: Document) -> Result<u64> {
        Ok(Collection::count_documents(self, filter, None).await?)
    }
}

/// The model layer speaks `FindOptions` everywhere; single-document lookups
/// carry over the fields that still apply.
fn find_one_options(options: FindOptions) -> FindOneOptions {
    let mut one = FindOneOptions::default();
    one.sort = options.sort;
    one.projection = options.projection;
    one.skip = options.skip;
    one.max_time = options.max_time;
    one.collation = options.collation;
    one.hint = options.hint;
    one
}
