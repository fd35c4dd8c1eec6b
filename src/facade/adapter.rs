use std::fmt;
use std::sync::Arc;

use bson::doc;
use mongodb::options::ClientOptions;
use tracing::{debug, info};

use crate::connection::StoreTarget;
use crate::connection::config::{ConnectionConfig, DEFAULT_DATABASE, validate_database_name};
use crate::core::Result;
use crate::interface::{StoreClient, StoreDatabase};
use crate::model::{LifecycleObserver, ModelType};

/// Entry point: a database handle from which model types are made.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use mongomodel::{InMemoryDatabase, StoreAdapter};
/// use bson::doc;
///
/// # #[tokio::main]
/// # async fn main() -> mongomodel::Result<()> {
/// let adapter = StoreAdapter::from_database(Arc::new(InMemoryDatabase::new("shop")));
/// let products = adapter.make_model("products");
///
/// products.create(doc! { "name": "lamp" }).await?;
/// assert_eq!(products.count(doc! { "name": "lamp" }).await?, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct StoreAdapter {
    db: Arc<dyn StoreDatabase>,
    client: Option<Arc<dyn StoreClient>>,
    observers: Vec<Arc<dyn LifecycleObserver>>,
}

impl StoreAdapter {
    /// Build from whatever the caller has: a client, a database, or a URL.
    pub async fn connect(target: impl Into<StoreTarget>) -> Result<Self> {
        match target.into() {
            StoreTarget::Client(client) => Ok(Self::from_client(client, None)),
            StoreTarget::Database(db) => Ok(Self::from_database(db)),
            StoreTarget::Config(config) => Self::from_config(config).await,
            StoreTarget::Options(options) => Self::from_options(options, None).await,
            StoreTarget::Url(url) => Self::from_url(&url).await,
        }
    }

    /// Connect to `url`; the first path segment names the database.
    pub async fn from_url(url: &str) -> Result<Self> {
        Self::from_config(ConnectionConfig::from_url(url)?).await
    }

    /// Connect with the settings of `config`.
    ///
    /// The database is the driver's `default_database` as resolved by
    /// [`ConnectionConfig::client_options`].
    pub async fn from_config(config: ConnectionConfig) -> Result<Self> {
        let options = config.client_options().await?;
        debug!(url = %config.to_url(), "resolved client options");
        Self::from_options(options, None).await
    }

    /// Connect with caller-built driver options.
    ///
    /// `database` wins over `options.default_database`; with neither,
    /// `"mongodb"` is used. The server is pinged once so that an unreachable
    /// store fails here rather than on the first model operation.
    pub async fn from_options(options: ClientOptions, database: Option<&str>) -> Result<Self> {
        let database = database
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| options.default_database.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        validate_database_name(&database)?;

        let hosts: Vec<String> = options.hosts.iter().map(ToString::to_string).collect();
        let client = mongodb::Client::with_options(options)?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await?;
        info!(hosts = ?hosts, database = %database, "connected");

        Ok(Self::from_client(Arc::new(client), Some(&database)))
    }

    /// Reuse an open connection. A missing or empty name selects `"mongodb"`.
    pub fn from_client(client: Arc<dyn StoreClient>, database: Option<&str>) -> Self {
        let name = database
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_DATABASE);

        Self {
            db: client.database(name),
            client: Some(client),
            observers: Vec::new(),
        }
    }

    pub fn from_database(db: Arc<dyn StoreDatabase>) -> Self {
        Self {
            db,
            client: None,
            observers: Vec::new(),
        }
    }

    /// Register an observer for every model type made afterwards.
    pub fn observe(mut self, observer: impl LifecycleObserver + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    pub fn db(&self) -> &Arc<dyn StoreDatabase> {
        &self.db
    }

    pub fn client(&self) -> Option<&Arc<dyn StoreClient>> {
        self.client.as_ref()
    }

    /// Model type bound to collection `name`.
    ///
    /// The collection is looked up, and created if missing, the first time the
    /// model touches the store.
    pub fn make_model(&self, name: &str) -> ModelType {
        debug!(database = self.db.name(), collection = name, "making model");
        ModelType::new(
            name,
            Arc::clone(&self.db),
            self.client.clone(),
            self.observers.clone(),
        )
    }

    /// Close the underlying connection, if this adapter owns one.
    pub async fn close(&self) -> Result<()> {
        match &self.client {
            Some(client) => client.shutdown().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for StoreAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreAdapter")
            .field("db", &self.db.name())
            .field("client", &self.client.is_some())
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryClient, InMemoryDatabase};

    #[test]
    fn test_from_client_default_database() {
        let client: Arc<dyn StoreClient> = Arc::new(InMemoryClient::new());

        let adapter = StoreAdapter::from_client(Arc::clone(&client), None);
        assert_eq!(adapter.db().name(), "mongodb");

        let adapter = StoreAdapter::from_client(Arc::clone(&client), Some(""));
        assert_eq!(adapter.db().name(), "mongodb");

        let adapter = StoreAdapter::from_client(client, Some("shop"));
        assert_eq!(adapter.db().name(), "shop");
        assert!(adapter.client().is_some());
    }

    #[test]
    fn test_from_database_has_no_client() {
        let adapter = StoreAdapter::from_database(Arc::new(InMemoryDatabase::new("shop")));
        assert_eq!(adapter.db().name(), "shop");
        assert!(adapter.client().is_none());

        let model = adapter.make_model("products");
        assert_eq!(model.name(), "products");
        assert!(model.client().is_none());
        assert_eq!(model.db().name(), "shop");
    }

    #[tokio::test]
    async fn test_connect_dispatch() {
        let adapter = StoreAdapter::connect(InMemoryClient::new()).await.unwrap();
        assert_eq!(adapter.db().name(), "mongodb");
        assert!(adapter.client().is_some());

        let adapter = StoreAdapter::connect(InMemoryDatabase::new("shop"))
            .await
            .unwrap();
        assert_eq!(adapter.db().name(), "shop");
        assert!(adapter.client().is_none());
    }

    #[tokio::test]
    async fn test_from_options_rejects_bad_database_name() {
        let options = ClientOptions::builder()
            .default_database("bad.name".to_string())
            .build();
        let err = StoreAdapter::from_options(options, None).await.unwrap_err();
        assert!(matches!(err, crate::core::AdapterError::InvalidConfig(_)));

        let err = StoreAdapter::from_options(ClientOptions::default(), Some("has space"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::core::AdapterError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let err = StoreAdapter::connect("not a url").await.unwrap_err();
        assert!(matches!(err, crate::core::AdapterError::InvalidUrl(_)));
    }
}
