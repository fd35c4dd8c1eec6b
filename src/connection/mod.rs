pub mod config;

use std::fmt;
use std::sync::Arc;

use mongodb::options::ClientOptions;

use crate::interface::{StoreClient, StoreDatabase};
use crate::storage::{InMemoryClient, InMemoryDatabase};
use config::ConnectionConfig;

/// What an adapter can be built from
///
/// A connection handle, a database handle, or anything else, which is taken
/// to be a connection string.
#[derive(Clone)]
pub enum StoreTarget {
    Url(String),
    Config(ConnectionConfig),
    Options(ClientOptions),
    Client(Arc<dyn StoreClient>),
    Database(Arc<dyn StoreDatabase>),
}

impl fmt::Debug for StoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreTarget::Url(_) => write!(f, "Url"),
            StoreTarget::Config(config) => write!(f, "Config({})", config.to_url()),
            StoreTarget::Options(options) => write!(f, "Options({:?})", options.hosts),
            StoreTarget::Client(_) => write!(f, "Client"),
            StoreTarget::Database(db) => write!(f, "Database({})", db.name()),
        }
    }
}

impl From<&str> for StoreTarget {
    fn from(url: &str) -> Self {
        Self::Url(url.to_string())
    }
}

impl From<String> for StoreTarget {
    fn from(url: String) -> Self {
        Self::Url(url)
    }
}

impl From<ConnectionConfig> for StoreTarget {
    fn from(config: ConnectionConfig) -> Self {
        Self::Config(config)
    }
}

impl From<ClientOptions> for StoreTarget {
    fn from(options: ClientOptions) -> Self {
        Self::Options(options)
    }
}

impl From<Arc<dyn StoreClient>> for StoreTarget {
    fn from(client: Arc<dyn StoreClient>) -> Self {
        Self::Client(client)
    }
}

impl From<Arc<dyn StoreDatabase>> for StoreTarget {
    fn from(db: Arc<dyn StoreDatabase>) -> Self {
        Self::Database(db)
    }
}

impl From<mongodb::Client> for StoreTarget {
    fn from(client: mongodb::Client) -> Self {
        Self::Client(Arc::new(client))
    }
}

impl From<mongodb::Database> for StoreTarget {
    fn from(db: mongodb::Database) -> Self {
        Self::Database(Arc::new(db))
    }
}

impl From<InMemoryClient> for StoreTarget {
    fn from(client: InMemoryClient) -> Self {
        Self::Client(Arc::new(client))
    }
}

impl From<InMemoryDatabase> for StoreTarget {
    fn from(db: InMemoryDatabase) -> Self {
        Self::Database(Arc::new(db))
    }
}
