use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use futures::StreamExt;
use mongodb::options::FindOptions;
use tokio::sync::RwLock;
use tracing::debug;

use super::filter;
use crate::core::{AdapterError, Result, STORE_ID_FIELD, identifier_to_string};
use crate::interface::{
    DeleteOutcome, DocumentStream, StoreClient, StoreCollection, StoreDatabase, UpdateOutcome,
};

type Documents = Arc<RwLock<Vec<Document>>>;

/// Collections of one database, each with its own lock.
#[derive(Default)]
struct DatabaseState {
    collections: RwLock<HashMap<String, Documents>>,
}

/// In-memory stand-in for a store connection.
///
/// Databases are created on first access and shared by every clone, so two
/// handles obtained from the same client see the same data.
#[derive(Clone, Default)]
pub struct InMemoryClient {
    databases: Arc<Mutex<HashMap<String, Arc<DatabaseState>>>>,
}

impl InMemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete handle to the named database.
    pub fn db(&self, name: &str) -> InMemoryDatabase {
        let mut databases = self
            .databases
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let state = databases.entry(name.to_string()).or_default().clone();
        InMemoryDatabase {
            name: name.to_string(),
            state,
        }
    }
}

#[async_trait]
impl StoreClient for InMemoryClient {
    fn database(&self, name: &str) -> Arc<dyn StoreDatabase> {
        Arc::new(self.db(name))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory database. Cheap to clone; clones share storage.
#[derive(Clone)]
pub struct InMemoryDatabase {
    name: String,
    state: Arc<DatabaseState>,
}

impl InMemoryDatabase {
    /// Standalone database not attached to any client.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(DatabaseState::default()),
        }
    }

    /// Concrete handle to the named collection.
    pub fn coll(&self, name: &str) -> InMemoryCollection {
        InMemoryCollection {
            name: name.to_string(),
            state: Arc::clone(&self.state),
        }
    }
}

#[async_trait]
impl StoreDatabase for InMemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_collection_names(&self, filter: Option<Document>) -> Result<Vec<String>> {
        let collections = self.state.collections.read().await;
        let mut names = Vec::new();
        for name in collections.keys() {
            let entry = doc! { "name": name.as_str(), "type": "collection" };
            match &filter {
                Some(filter) if !filter::matches(&entry, filter)? => {}
                _ => names.push(name.clone()),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn create_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.state.collections.write().await;
        if collections.contains_key(name) {
            return Err(AdapterError::CollectionExists(name.to_string()));
        }
        collections.insert(name.to_string(), Documents::default());
        debug!(database = %self.name, collection = name, "created in-memory collection");
        Ok(())
    }

    fn collection(&self, name: &str) -> Arc<dyn StoreCollection> {
        Arc::new(self.coll(name))
    }

    async fn drop_database(&self) -> Result<()> {
        self.state.collections.write().await.clear();
        Ok(())
    }
}

/// In-memory collection handle.
///
/// Like a driver handle it is only a name: reads against a collection that
/// does not exist yet see nothing, and the first insert creates it.
#[derive(Clone)]
pub struct InMemoryCollection {
    name: String,
    state: Arc<DatabaseState>,
}

impl InMemoryCollection {
    async fn documents(&self) -> Option<Documents> {
        self.state.collections.read().await.get(&self.name).cloned()
    }

    async fn documents_or_create(&self) -> Documents {
        let mut collections = self.state.collections.write().await;
        collections.entry(self.name.clone()).or_default().clone()
    }

    async fn select(&self, filter: &Document) -> Result<Vec<Document>> {
        let Some(documents) = self.documents().await else {
            return Ok(Vec::new());
        };
        let documents = documents.read().await;

        let mut selected = Vec::new();
        for document in documents.iter() {
            if filter::matches(document, filter)? {
                selected.push(document.clone());
            }
        }
        Ok(selected)
    }
}

#[async_trait]
impl StoreCollection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, filter: Document, options: Option<FindOptions>) -> Result<DocumentStream> {
        let selected = self.select(&filter).await?;
        let documents = filter::apply_find_options(selected, options.as_ref())?;
        Ok(futures::stream::iter(documents.into_iter().map(Ok)).boxed())
    }

    async fn find_one(
        &self,
        filter: Document,
        options: Option<FindOptions>,
    ) -> Result<Option<Document>> {
        let selected = self.select(&filter).await?;
        let documents = filter::apply_find_options(selected, options.as_ref())?;
        Ok(documents.into_iter().next())
    }

    async fn insert_one(&self, document: Document) -> Result<Bson> {
        let id = match document.get(STORE_ID_FIELD) {
            Some(id) => id.clone(),
            None => Bson::ObjectId(ObjectId::new()),
        };

        let mut stored = Document::new();
        stored.insert(STORE_ID_FIELD, id.clone());
        for (key, value) in document {
            if key != STORE_ID_FIELD {
                stored.insert(key, value);
            }
        }

        let documents = self.documents_or_create().await;
        let mut documents = documents.write().await;
        let duplicate = documents.iter().any(|existing| {
            existing
                .get(STORE_ID_FIELD)
                .is_some_and(|existing_id| filter::values_equal(existing_id, &id))
        });
        if duplicate {
            return Err(AdapterError::DuplicateKey(identifier_to_string(&id)));
        }

        documents.push(stored);
        Ok(id)
    }

    async fn update_one(&self, filter: Document, update: Document) -> Result<UpdateOutcome> {
        let assignments = set_assignments(update)?;

        let Some(documents) = self.documents().await else {
            return Ok(UpdateOutcome::default());
        };
        let mut documents = documents.write().await;

        let mut target = None;
        for (index, document) in documents.iter().enumerate() {
            if filter::matches(document, &filter)? {
                target = Some(index);
                break;
            }
        }
        let Some(index) = target else {
            return Ok(UpdateOutcome::default());
        };

        let document = &mut documents[index];
        let mut modified = false;
        for (key, value) in assignments {
            if key == STORE_ID_FIELD {
                if document
                    .get(STORE_ID_FIELD)
                    .is_some_and(|current| filter::values_equal(current, &value))
                {
                    continue;
                }
                return Err(AdapterError::UnsupportedOperation(
                    "cannot modify the immutable field '_id'".to_string(),
                ));
            }
            if document.get(&key) != Some(&value) {
                document.insert(key, value);
                modified = true;
            }
        }

        Ok(UpdateOutcome {
            matched_count: 1,
            modified_count: u64::from(modified),
        })
    }

    async fn delete_one(&self, filter: Document) -> Result<DeleteOutcome> {
        let Some(documents) = self.documents().await else {
            return Ok(DeleteOutcome::default());
        };
        let mut documents = documents.write().await;

        for index in 0..documents.len() {
            if filter::matches(&documents[index], &filter)? {
                documents.remove(index);
                return Ok(DeleteOutcome { deleted_count: 1 });
            }
        }
        Ok(DeleteOutcome::default())
    }

    async fn count_documents(&self, filter: Document) -> Result<u64> {
        Ok(self.select(&filter).await?.len() as u64)
    }
}

/// Only `$set` with top-level field names is understood.
fn set_assignments(update: Document) -> Result<Document> {
    let mut assignments = Document::new();
    for (op, operand) in update {
        match (op.as_str(), operand) {
            ("$set", Bson::Document(fields)) => {
                for (key, value) in fields {
                    if key.contains('.') || key.starts_with('$') {
                        return Err(AdapterError::UnsupportedOperation(format!(
                            "update path '{}'",
                            key
                        )));
                    }
                    assignments.insert(key, value);
                }
            }
            ("$set", _) => {
                return Err(AdapterError::UnsupportedOperation(
                    "$set requires a document".to_string(),
                ));
            }
            (other, _) => {
                return Err(AdapterError::UnsupportedOperation(format!(
                    "update operator {}",
                    other
                )));
            }
        }
    }
    Ok(assignments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn seeded() -> InMemoryCollection {
        let db = InMemoryDatabase::new("test");
        let coll = db.coll("items");
        coll.insert_one(doc! { "name": "a", "n": 1 }).await.unwrap();
        coll.insert_one(doc! { "name": "b", "n": 2 }).await.unwrap();
        coll.insert_one(doc! { "name": "c", "n": 3 }).await.unwrap();
        coll
    }

    #[tokio::test]
    async fn test_insert_generates_object_id_first() {
        let coll = InMemoryDatabase::new("test").coll("items");
        let id = coll.insert_one(doc! { "name": "a" }).await.unwrap();
        assert!(matches!(id, Bson::ObjectId(_)));

        let stored = coll.find_one(doc! {}, None).await.unwrap().unwrap();
        assert_eq!(stored.keys().next().map(String::as_str), Some("_id"));
        assert_eq!(stored.get("_id"), Some(&id));
    }

    #[tokio::test]
    async fn test_insert_keeps_caller_id_and_rejects_duplicates() {
        let coll = InMemoryDatabase::new("test").coll("items");
        let id = coll.insert_one(doc! { "_id": 7, "name": "a" }).await.unwrap();
        assert_eq!(id, Bson::Int32(7));

        let err = coll.insert_one(doc! { "_id": 7_i64 }).await.unwrap_err();
        assert!(matches!(err, AdapterError::DuplicateKey(ref key) if key == "7"));
    }

    #[tokio::test]
    async fn test_find_preserves_insertion_order() {
        let coll = seeded().await;
        let docs: Vec<Document> = coll
            .find(doc! {}, None)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d.get_str("name").unwrap()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_find_one_honours_sort() {
        let coll = seeded().await;
        let mut options = FindOptions::default();
        options.sort = Some(doc! { "n": -1 });

        let doc = coll.find_one(doc! {}, Some(options)).await.unwrap().unwrap();
        assert_eq!(doc.get_str("name").unwrap(), "c");
    }

    #[tokio::test]
    async fn test_update_one_sets_fields_on_first_match() {
        let coll = seeded().await;
        let outcome = coll
            .update_one(doc! { "n": { "$gte": 2 } }, doc! { "$set": { "flag": true } })
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { matched_count: 1, modified_count: 1 });

        assert_eq!(coll.count_documents(doc! { "flag": true }).await.unwrap(), 1);
        let updated = coll.find_one(doc! { "flag": true }, None).await.unwrap().unwrap();
        assert_eq!(updated.get_str("name").unwrap(), "b");
    }

    #[tokio::test]
    async fn test_update_one_without_match() {
        let coll = seeded().await;
        let outcome = coll
            .update_one(doc! { "name": "zzz" }, doc! { "$set": { "x": 1 } })
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::default());
    }

    #[tokio::test]
    async fn test_update_rejects_other_operators() {
        let coll = seeded().await;
        let err = coll
            .update_one(doc! { "name": "a" }, doc! { "$inc": { "n": 1 } })
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::UnsupportedOperation(_)));
    }

    #[tokio::test]
    async fn test_delete_one_removes_single_document() {
        let coll = seeded().await;
        let outcome = coll.delete_one(doc! { "n": { "$gt": 1 } }).await.unwrap();
        assert_eq!(outcome.deleted_count, 1);
        assert_eq!(coll.count_documents(doc! {}).await.unwrap(), 2);

        let missing = coll.delete_one(doc! { "name": "zzz" }).await.unwrap();
        assert_eq!(missing.deleted_count, 0);
    }

    #[tokio::test]
    async fn test_reads_against_unknown_collection_are_empty() {
        let coll = InMemoryDatabase::new("test").coll("nothing");
        assert_eq!(coll.count_documents(doc! {}).await.unwrap(), 0);
        assert!(coll.find_one(doc! {}, None).await.unwrap().is_none());
        assert_eq!(coll.delete_one(doc! {}).await.unwrap().deleted_count, 0);
    }

    #[tokio::test]
    async fn test_create_and_list_collections() {
        let db = InMemoryDatabase::new("test");
        db.create_collection("users").await.unwrap();
        db.create_collection("orders").await.unwrap();

        let err = db.create_collection("users").await.unwrap_err();
        assert!(matches!(err, AdapterError::CollectionExists(_)));

        assert_eq!(
            db.list_collection_names(None).await.unwrap(),
            vec!["orders".to_string(), "users".to_string()]
        );
        assert_eq!(
            db.list_collection_names(Some(doc! { "name": "users" })).await.unwrap(),
            vec!["users".to_string()]
        );
    }

    #[tokio::test]
    async fn test_client_shares_databases_between_handles() {
        let client = InMemoryClient::new();
        client
            .db("shared")
            .coll("items")
            .insert_one(doc! { "x": 1 })
            .await
            .unwrap();

        let other = client.database("shared");
        let count = other.collection("items").count_documents(doc! {}).await.unwrap();
        assert_eq!(count, 1);

        other.drop_database().await.unwrap();
        assert!(client.db("shared").list_collection_names(None).await.unwrap().is_empty());
    }
}
