//! Record lifecycle: save/fetch/remove with observer hooks, and the bulk
//! create/update/remove operations built on top of them.
//!
//! Hook order follows the usual active-record shape:
//!
//! - create: `validate`, `beforeCreate`, `beforeSave`, insert, `afterSave`, `afterCreate`
//! - update: `validate`, `beforeUpdate`, `beforeSave`, `$set`, `afterSave`, `afterUpdate`
//! - fetch: `beforeFetch`, load, `afterFetch`
//! - remove: `beforeRemove`, delete, `afterRemove`
//!
//! Any observer error aborts the operation at that point.

use std::fmt;

use bson::{Bson, Document};
use futures::{StreamExt, TryStreamExt};

use super::{ModelType, Record, RecordStream};
use crate::core::{AdapterError, ID_FIELD, Result, STORE_ID_FIELD, normalize_identifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    Validate,
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeSave,
    AfterSave,
    BeforeFetch,
    AfterFetch,
    BeforeRemove,
    AfterRemove,
}

impl Hook {
    pub fn as_str(&self) -> &'static str {
        match self {
            Hook::Validate => "validate",
            Hook::BeforeCreate => "beforeCreate",
            Hook::AfterCreate => "afterCreate",
            Hook::BeforeUpdate => "beforeUpdate",
            Hook::AfterUpdate => "afterUpdate",
            Hook::BeforeSave => "beforeSave",
            Hook::AfterSave => "afterSave",
            Hook::BeforeFetch => "beforeFetch",
            Hook::AfterFetch => "afterFetch",
            Hook::BeforeRemove => "beforeRemove",
            Hook::AfterRemove => "afterRemove",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives every lifecycle event of the records of a model type.
///
/// Observers may modify the record. Returning an error (typically
/// `AdapterError::Validation` from `Hook::Validate`) aborts the operation.
pub trait LifecycleObserver: Send + Sync {
    fn observe(&self, hook: Hook, record: &mut Record) -> Result<()>;
}

impl<F> LifecycleObserver for F
where
    F: Fn(Hook, &mut Record) -> Result<()> + Send + Sync,
{
    fn observe(&self, hook: Hook, record: &mut Record) -> Result<()> {
        self(hook, record)
    }
}

impl Record {
    fn emit(&mut self, hook: Hook) -> Result<()> {
        let model = self.model().clone();
        for observer in model.observers() {
            observer.observe(hook, self)?;
        }
        Ok(())
    }

    /// Insert when new, `$set` the fields otherwise.
    pub async fn save(&mut self) -> Result<()> {
        self.emit(Hook::Validate)?;

        if self.is_new() {
            self.emit(Hook::BeforeCreate)?;
            self.emit(Hook::BeforeSave)?;
            let stored = self.save_raw().await?;
            if let Some(id) = stored.get(STORE_ID_FIELD) {
                self.set(ID_FIELD, id.clone())?;
            }
            self.emit(Hook::AfterSave)?;
            self.emit(Hook::AfterCreate)
        } else {
            self.emit(Hook::BeforeUpdate)?;
            self.emit(Hook::BeforeSave)?;
            self.update_raw().await?;
            self.emit(Hook::AfterSave)?;
            self.emit(Hook::AfterUpdate)
        }
    }

    /// Apply `changes` and persist them.
    pub async fn update(&mut self, changes: Document) -> Result<()> {
        if self.is_new() {
            return Err(AdapterError::Unsaved("update"));
        }
        self.assign(changes)?;
        self.save().await
    }

    /// Reload the stored fields over the local ones.
    pub async fn fetch(&mut self) -> Result<()> {
        if self.is_new() {
            return Err(AdapterError::Unsaved("fetch"));
        }

        self.emit(Hook::BeforeFetch)?;
        let document = self
            .fetch_raw()
            .await?
            .ok_or(AdapterError::RecordNotFound)?;
        self.assign(document)?;
        self.emit(Hook::AfterFetch)
    }

    pub async fn remove(&mut self) -> Result<()> {
        if self.is_new() {
            return Err(AdapterError::Unsaved("remove"));
        }

        self.emit(Hook::BeforeRemove)?;
        self.remove_raw().await?;
        self.emit(Hook::AfterRemove)
    }
}

impl ModelType {
    /// Build a record from `data` and save it.
    pub async fn create(&self, data: Document) -> Result<Record> {
        let mut record = self.build(data)?;
        record.save().await?;
        Ok(record)
    }

    /// Load by identifier. Loading does not emit fetch hooks.
    pub async fn find_by_id(&self, id: impl Into<Bson>) -> Result<Record> {
        let mut filter = Document::new();
        filter.insert(STORE_ID_FIELD, normalize_identifier(id.into())?);

        self.find_one(filter, None)
            .await?
            .ok_or(AdapterError::RecordNotFound)
    }

    /// First record matching `data`, or a new one created from it.
    pub async fn find_or_create(&self, data: Document) -> Result<Record> {
        match self.find_one(data.clone(), None).await? {
            Some(record) => Ok(record),
            None => self.create(data).await,
        }
    }

    /// Update the first match, or create a record from `filter` merged with
    /// `changes`.
    pub async fn create_or_update(&self, filter: Document, changes: Document) -> Result<Record> {
        if let Some(mut record) = self.find_one(filter.clone(), None).await? {
            record.update(changes).await?;
            return Ok(record);
        }

        let mut data = filter;
        for (key, value) in changes {
            data.insert(key, value);
        }
        self.create(data).await
    }

    pub async fn update(
        &self,
        filter: impl Into<Option<Document>>,
        changes: Document,
    ) -> Result<Vec<Record>> {
        self.update_iterator(filter, changes).try_collect().await
    }

    pub async fn update_one(
        &self,
        filter: impl Into<Option<Document>>,
        changes: Document,
    ) -> Result<Option<Record>> {
        match self.find_one(filter, None).await? {
            Some(mut record) => {
                record.update(changes).await?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub async fn update_by_id(&self, id: impl Into<Bson>, changes: Document) -> Result<Record> {
        let mut record = self.find_by_id(id).await?;
        record.update(changes).await?;
        Ok(record)
    }

    /// Stream of matching records, each updated as it is pulled.
    pub fn update_iterator(
        &self,
        filter: impl Into<Option<Document>>,
        changes: Document,
    ) -> RecordStream {
        self.find_iterator(filter, None)
            .and_then(move |mut record| {
                let changes = changes.clone();
                async move {
                    record.update(changes).await?;
                    Ok::<_, AdapterError>(record)
                }
            })
            .boxed()
    }

    pub async fn remove(&self, filter: impl Into<Option<Document>>) -> Result<Vec<Record>> {
        self.remove_iterator(filter).try_collect().await
    }

    pub async fn remove_one(&self, filter: impl Into<Option<Document>>) -> Result<Option<Record>> {
        match self.find_one(filter, None).await? {
            Some(mut record) => {
                record.remove().await?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub async fn remove_by_id(&self, id: impl Into<Bson>) -> Result<Record> {
        let mut record = self.find_by_id(id).await?;
        record.remove().await?;
        Ok(record)
    }

    /// Stream of matching records, each removed as it is pulled.
    pub fn remove_iterator(&self, filter: impl Into<Option<Document>>) -> RecordStream {
        self.find_iterator(filter, None)
            .and_then(|mut record| async move {
                record.remove().await?;
                Ok::<_, AdapterError>(record)
            })
            .boxed()
    }
}
