//! Everything a typical model module imports.
//!
//! ```
//! use mongomodel::prelude::*;
//! ```

pub use crate::{AdapterError, Hook, LifecycleObserver, ModelType, Record, Result, StoreAdapter};
pub use bson::{Bson, Document, doc, oid::ObjectId};
pub use futures::{StreamExt, TryStreamExt};
pub use mongodb::options::FindOptions;
