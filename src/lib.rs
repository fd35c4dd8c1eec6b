// ============================================================================
// mongomodel: model persistence over a document store
// ============================================================================

pub mod core;
pub mod connection;
pub mod interface;
pub mod storage;
pub mod model;
pub mod facade;
pub mod prelude;

// Re-export main types for convenience
pub use facade::StoreAdapter;
pub use crate::core::{AdapterError, Result};
pub use model::{Hook, LifecycleObserver, ModelType, Record, RecordStream};

// Re-export connection API
pub use connection::{StoreTarget, config::ConnectionConfig};

// ============================================================================
// Store seams and backends
// ============================================================================

pub use interface::{
    DeleteOutcome, DocumentStream, StoreClient, StoreCollection, StoreDatabase, UpdateOutcome,
};
pub use storage::{InMemoryClient, InMemoryCollection, InMemoryDatabase};
