use std::fmt;

use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::ModelType;
use crate::core::{
    AdapterError, ID_FIELD, Result, STORE_ID_FIELD, identifier_to_string, normalize_identifier,
};
use crate::interface::DeleteOutcome;

/// One logical record: an ordered field map plus an identifier.
///
/// The identifier lives outside the field map, so it can never leak into the
/// set of fields written on insert or update. `id` and `_id` are reserved and
/// always routed to it.
#[derive(Clone)]
pub struct Record {
    model: ModelType,
    id: Option<Bson>,
    fields: Document,
}

impl Record {
    pub(crate) fn new(model: ModelType) -> Self {
        Self {
            model,
            id: None,
            fields: Document::new(),
        }
    }

    pub fn model(&self) -> &ModelType {
        &self.model
    }

    pub fn id(&self) -> Option<&Bson> {
        self.id.as_ref()
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        match self.id {
            Some(Bson::ObjectId(oid)) => Some(oid),
            _ => None,
        }
    }

    /// A record is new until it has an identifier.
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn get(&self, key: &str) -> Option<&Bson> {
        match key {
            ID_FIELD | STORE_ID_FIELD => self.id.as_ref(),
            _ => self.fields.get(key),
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Bson::as_str)
    }

    /// Write one field.
    ///
    /// `_id` is redirected to `id`; `id` replaces the identifier with its
    /// normalized form (null clears it). Anything else goes to the field map.
    pub fn set(&mut self, key: &str, value: impl Into<Bson>) -> Result<()> {
        match key {
            STORE_ID_FIELD => self.set(ID_FIELD, value),
            ID_FIELD => {
                self.id = match normalize_identifier(value.into())? {
                    Bson::Null | Bson::Undefined => None,
                    id => Some(id),
                };
                Ok(())
            }
            _ => {
                self.fields.insert(key, value.into());
                Ok(())
            }
        }
    }

    /// `set` every entry of `document`, in order.
    pub fn assign(&mut self, document: Document) -> Result<()> {
        for (key, value) in document {
            self.set(&key, value)?;
        }
        Ok(())
    }

    pub fn fields(&self) -> &Document {
        &self.fields
    }

    /// Fields written on insert/update. Never contains the identifier.
    pub fn changes(&self) -> Document {
        self.fields.clone()
    }

    /// Filter addressing this record in the store.
    pub fn id_query(&self) -> Document {
        doc! { "_id": self.id.clone().unwrap_or(Bson::Null) }
    }

    /// Load the stored document for this identifier, if any.
    pub async fn fetch_raw(&self) -> Result<Option<Document>> {
        let collection = self.model.resolved_collection().await?;
        collection.find_one(self.id_query(), None).await
    }

    /// Insert the record's changes as a new document.
    ///
    /// Returns `{ _id: <generated>, ...fields }`; nothing else the server may
    /// have generated is echoed back.
    pub async fn save_raw(&self) -> Result<Document> {
        let collection = self.model.resolved_collection().await?;
        let inserted_id = collection.insert_one(self.changes()).await?;
        debug!(model = self.model.name(), id = %identifier_to_string(&inserted_id), "inserted");

        let mut stored = Document::new();
        stored.insert(STORE_ID_FIELD, inserted_id);
        for (key, value) in &self.fields {
            stored.insert(key.clone(), value.clone());
        }
        Ok(stored)
    }

    /// Overwrite the changed fields of the stored document (`$set`, not replace).
    pub async fn update_raw(&self) -> Result<&Self> {
        let collection = self.model.resolved_collection().await?;
        collection
            .update_one(self.id_query(), doc! { "$set": self.changes() })
            .await?;
        Ok(self)
    }

    /// Delete the stored document.
    ///
    /// Deleting nothing is an error: the record believed it was persisted. On
    /// success the identifier is cleared and the record is new again.
    pub async fn remove_raw(&mut self) -> Result<DeleteOutcome> {
        let collection = self.model.resolved_collection().await?;
        let outcome = collection.delete_one(self.id_query()).await?;

        if outcome.deleted_count == 0 {
            let id = self
                .id
                .as_ref()
                .map(identifier_to_string)
                .unwrap_or_else(|| "null".to_string());
            return Err(AdapterError::RemoveFailed(id));
        }

        self.id = None;
        Ok(outcome)
    }

    /// Plain field map, without the identifier.
    pub fn to_document(&self) -> Document {
        self.fields.clone()
    }

    /// Fields as relaxed extended JSON.
    pub fn to_json(&self) -> serde_json::Value {
        Bson::Document(self.to_document()).into_relaxed_extjson()
    }

    /// Deserialize into a typed struct; the identifier is offered as `_id`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        let mut document = Document::new();
        if let Some(id) = &self.id {
            document.insert(STORE_ID_FIELD, id.clone());
        }
        for (key, value) in &self.fields {
            document.insert(key.clone(), value.clone());
        }
        Ok(bson::from_document(document)?)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("model", &self.model.name())
            .field("id", &self.id)
            .field("fields", &self.fields)
            .finish()
    }
}
