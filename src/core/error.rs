use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Failed to remove record \"{0}\"")]
    RemoveFailed(String),

    #[error("Record not found")]
    RecordNotFound,

    #[error("Can not {0} unsaved model")]
    Unsaved(&'static str),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid connection url: {0}")]
    InvalidUrl(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Collection '{0}' is unavailable")]
    CollectionUnavailable(String),

    #[error("Collection '{0}' already exists")]
    CollectionExists(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Store(#[from] mongodb::error::Error),
}

pub type Result<T> = std::result::Result<T, AdapterError>;

impl From<bson::oid::Error> for AdapterError {
    fn from(err: bson::oid::Error) -> Self {
        Self::InvalidIdentifier(err.to_string())
    }
}

impl From<bson::ser::Error> for AdapterError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<bson::de::Error> for AdapterError {
    fn from(err: bson::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
