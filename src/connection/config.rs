use std::time::Duration;

use mongodb::options::ClientOptions;

use crate::core::{AdapterError, Result};

/// Database selected when the URL path names none.
pub const DEFAULT_DATABASE: &str = "mongodb";

/// Environment variable read by [`ConnectionConfig::from_env`].
pub const URL_ENV: &str = "MONGODB_URL";

const SCHEMES: [&str; 2] = ["mongodb://", "mongodb+srv://"];

/// Store connection configuration
///
/// Built from a standard connection string; the first path segment names the
/// database. Driver-level knobs set here override whatever the URL carries.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Full connection string, handed to the driver as-is
    pub url: String,

    /// Database name
    pub database: String,

    /// Application name reported to the server
    pub app_name: Option<String>,

    /// Connection timeout
    pub connect_timeout: Option<Duration>,

    /// How long to wait for a suitable server
    pub server_selection_timeout: Option<Duration>,

    /// Maximum number of pooled connections per server
    pub max_pool_size: Option<u32>,

    /// Minimum number of pooled connections per server
    pub min_pool_size: Option<u32>,

    /// Caller-built driver options used in place of parsing `url`
    pub base_options: Option<ClientOptions>,
}

impl ConnectionConfig {
    /// Parse from connection string
    ///
    /// Format: `mongodb://[user:password@]host[:port][,host...]/[database][?options]`
    ///
    /// # Examples
    ///
    /// ```
    /// # use mongomodel::ConnectionConfig;
    /// let config = ConnectionConfig::from_url("mongodb://localhost:27017/shop").unwrap();
    /// assert_eq!(config.database, "shop");
    /// ```
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = SCHEMES
            .iter()
            .find_map(|scheme| url.strip_prefix(scheme))
            .ok_or_else(|| {
                AdapterError::InvalidUrl(
                    "URL must start with 'mongodb://' or 'mongodb+srv://'".to_string(),
                )
            })?;

        let rest = rest.split('?').next().unwrap_or(rest);
        let (authority, path) = match rest.find('/') {
            Some(slash) => (&rest[..slash], &rest[slash + 1..]),
            None => (rest, ""),
        };

        let hosts = authority.rsplit('@').next().unwrap_or(authority);
        if hosts.is_empty() {
            return Err(AdapterError::InvalidUrl("Missing host".to_string()));
        }

        let segment = path.split('/').next().unwrap_or("");
        let database = percent_decode(segment)?;

        Ok(Self {
            url: url.to_string(),
            database: if database.is_empty() {
                DEFAULT_DATABASE.to_string()
            } else {
                database
            },
            app_name: None,
            connect_timeout: None,
            server_selection_timeout: None,
            max_pool_size: None,
            min_pool_size: None,
            base_options: None,
        })
    }

    /// Read the connection string from `MONGODB_URL`
    pub fn from_env() -> Result<Self> {
        let url = std::env::var(URL_ENV)
            .map_err(|_| AdapterError::InvalidConfig(format!("{} is not set", URL_ENV)))?;
        Self::from_url(&url)
    }

    /// Set the database name
    pub fn database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    /// Set the application name
    pub fn app_name(mut self, app_name: &str) -> Self {
        self.app_name = Some(app_name.to_string());
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set server selection timeout
    pub fn server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = Some(timeout);
        self
    }

    /// Set maximum pool size
    pub fn max_pool_size(mut self, max: u32) -> Self {
        self.max_pool_size = Some(max);
        self
    }

    /// Set minimum pool size
    pub fn min_pool_size(mut self, min: u32) -> Self {
        self.min_pool_size = Some(min);
        self
    }

    /// Start from caller-built driver options instead of the URL
    ///
    /// For settings with no connection-string form, such as `server_api`,
    /// `driver_info` or credential mechanism properties. The setters above
    /// still apply on top.
    pub fn base_options(mut self, options: ClientOptions) -> Self {
        self.base_options = Some(options);
        self
    }

    /// Connection string with the password masked
    pub fn to_url(&self) -> String {
        let Some((scheme, rest)) = self.url.split_once("://") else {
            return self.url.clone();
        };

        let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
        let (authority, tail) = rest.split_at(authority_end);

        match authority.rsplit_once('@') {
            Some((credentials, hosts)) => {
                let user = credentials.split(':').next().unwrap_or("");
                format!("{}://{}:***@{}{}", scheme, user, hosts, tail)
            }
            None => self.url.clone(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        validate_database_name(&self.database)?;

        if self.max_pool_size == Some(0) {
            return Err(AdapterError::InvalidConfig(
                "max_pool_size must be > 0".to_string(),
            ));
        }

        if let (Some(min), Some(max)) = (self.min_pool_size, self.max_pool_size) {
            if min > max {
                return Err(AdapterError::InvalidConfig(
                    "min_pool_size cannot exceed max_pool_size".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Driver options: the parsed URL (or `base_options`) plus the overrides
    /// set on this config
    ///
    /// `default_database` keeps the driver's value unless `database` was
    /// changed after the URL was parsed.
    pub async fn client_options(&self) -> Result<ClientOptions> {
        self.validate()?;

        let mut options = match &self.base_options {
            Some(options) => options.clone(),
            None => ClientOptions::parse(&self.url).await?,
        };
        if options.default_database.is_none() || self.database != self.url_database() {
            options.default_database = Some(self.database.clone());
        }
        if let Some(app_name) = &self.app_name {
            options.app_name = Some(app_name.clone());
        }
        if self.connect_timeout.is_some() {
            options.connect_timeout = self.connect_timeout;
        }
        if self.server_selection_timeout.is_some() {
            options.server_selection_timeout = self.server_selection_timeout;
        }
        if self.max_pool_size.is_some() {
            options.max_pool_size = self.max_pool_size;
        }
        if self.min_pool_size.is_some() {
            options.min_pool_size = self.min_pool_size;
        }

        Ok(options)
    }

    fn url_database(&self) -> String {
        Self::from_url(&self.url)
            .map(|config| config.database)
            .unwrap_or_default()
    }
}

/// Database names the server refuses.
pub fn validate_database_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AdapterError::InvalidConfig(
            "Database name cannot be empty".to_string(),
        ));
    }

    if name.len() > 63 {
        return Err(AdapterError::InvalidConfig(
            "Database name too long (max 63 bytes)".to_string(),
        ));
    }

    if let Some(bad) = name
        .chars()
        .find(|c| matches!(c, '/' | '\\' | '.' | '"' | '$' | ' ' | '\0'))
    {
        return Err(AdapterError::InvalidConfig(format!(
            "Database name cannot contain {:?}",
            bad
        )));
    }

    Ok(())
}

fn percent_decode(input: &str) -> Result<String> {
    let invalid = || AdapterError::InvalidUrl(format!("Malformed escape in '{}'", input));

    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input.get(i + 1..i + 3).ok_or_else(invalid)?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            let byte = u8::from_str_radix(hex, 16).map_err(|_| invalid())?;
            decoded.push(byte);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(decoded)
        .map_err(|_| AdapterError::InvalidUrl("Database name is not valid UTF-8".to_string()))
}
