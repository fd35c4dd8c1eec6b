pub mod error;
pub mod identifier;

pub use error::{AdapterError, Result};
pub use identifier::{
    ID_FIELD, STORE_ID_FIELD, fix_query_identifier, identifier_to_string, normalize_identifier,
};
