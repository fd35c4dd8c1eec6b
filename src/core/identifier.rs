//! Identifier normalization between the model layer and the store.
//!
//! Records address themselves through `id`; the store only understands `_id`
//! holding its native `ObjectId`. Callers may pass either name, and either the
//! `ObjectId` itself or its 24-character hex encoding.

use bson::oid::ObjectId;
use bson::{Bson, Document};

use super::error::Result;

/// Identifier name used by the model layer.
pub const ID_FIELD: &str = "id";

/// Identifier name used by the store.
pub const STORE_ID_FIELD: &str = "_id";

/// Converts string identifiers into the store's native `ObjectId`.
///
/// Non-string values pass through unchanged, so integer or composite keys
/// chosen by the caller are never rewritten.
pub fn normalize_identifier(value: Bson) -> Result<Bson> {
    match value {
        Bson::String(hex) => Ok(Bson::ObjectId(ObjectId::parse_str(&hex)?)),
        other => Ok(other),
    }
}

/// Rewrites a filter so that the store only ever sees `_id`.
///
/// `id` is copied into `_id` when the latter is missing, then always removed.
/// A string `_id` is converted to an `ObjectId`.
pub fn fix_query_identifier(mut filter: Document) -> Result<Document> {
    let id = filter.remove(ID_FIELD);

    let has_store_id = matches!(filter.get(STORE_ID_FIELD), Some(value) if !is_missing(value));
    if !has_store_id {
        if let Some(id) = id.filter(|value| !is_missing(value)) {
            filter.insert(STORE_ID_FIELD, id);
        }
    }

    if let Some(Bson::String(_)) = filter.get(STORE_ID_FIELD) {
        if let Some(value) = filter.remove(STORE_ID_FIELD) {
            filter.insert(STORE_ID_FIELD, normalize_identifier(value)?);
        }
    }

    Ok(filter)
}

/// Canonical string form of an identifier, as embedded in error messages.
pub fn identifier_to_string(value: &Bson) -> String {
    match value {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_missing(value: &Bson) -> bool {
    matches!(value, Bson::Null | Bson::Undefined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    const HEX: &str = "5f1d7a3b9c8e4f2a1b3c4d5e";

    #[test]
    fn test_normalize_string_identifier() {
        let value = normalize_identifier(Bson::String(HEX.to_string())).unwrap();
        match value {
            Bson::ObjectId(oid) => assert_eq!(oid.to_hex(), HEX),
            other => panic!("expected ObjectId, got {:?}", other),
        }
    }

    #[test]
    fn test_normalize_passes_through_non_strings() {
        let oid = ObjectId::new();
        assert_eq!(
            normalize_identifier(Bson::ObjectId(oid)).unwrap(),
            Bson::ObjectId(oid)
        );
        assert_eq!(normalize_identifier(Bson::Int32(7)).unwrap(), Bson::Int32(7));
        assert_eq!(normalize_identifier(Bson::Null).unwrap(), Bson::Null);
    }

    #[test]
    fn test_normalize_rejects_malformed_hex() {
        assert!(normalize_identifier(Bson::String("not-an-id".into())).is_err());
        assert!(normalize_identifier(Bson::String("abc".into())).is_err());
    }

    #[test]
    fn test_hex_round_trip() {
        for _ in 0..16 {
            let hex = ObjectId::new().to_hex();
            let value = normalize_identifier(Bson::String(hex.clone())).unwrap();
            assert_eq!(identifier_to_string(&value), hex);
        }
    }

    #[test]
    fn test_fix_copies_id_into_store_id() {
        let filter = fix_query_identifier(doc! { "id": HEX, "name": "a" }).unwrap();

        assert!(!filter.contains_key("id"));
        assert_eq!(
            filter.get_object_id("_id").unwrap(),
            ObjectId::parse_str(HEX).unwrap()
        );
        assert_eq!(filter.get_str("name").unwrap(), "a");
    }

    #[test]
    fn test_fix_keeps_existing_store_id() {
        let other = ObjectId::new();
        let filter = fix_query_identifier(doc! { "_id": other, "id": HEX }).unwrap();

        assert!(!filter.contains_key("id"));
        assert_eq!(filter.get_object_id("_id").unwrap(), other);
    }

    #[test]
    fn test_fix_normalizes_string_store_id() {
        let filter = fix_query_identifier(doc! { "_id": HEX }).unwrap();
        assert_eq!(
            filter.get_object_id("_id").unwrap(),
            ObjectId::parse_str(HEX).unwrap()
        );
    }

    #[test]
    fn test_fix_null_store_id_is_replaced() {
        let filter = fix_query_identifier(doc! { "_id": Bson::Null, "id": HEX }).unwrap();
        assert!(filter.get_object_id("_id").is_ok());
    }

    #[test]
    fn test_fix_leaves_other_filters_alone() {
        let filter = fix_query_identifier(doc! { "test": "x" }).unwrap();
        assert_eq!(filter, doc! { "test": "x" });

        let empty = fix_query_identifier(Document::new()).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_fix_propagates_bad_identifier() {
        assert!(fix_query_identifier(doc! { "id": "zzz" }).is_err());
    }

    #[test]
    fn test_identifier_to_string() {
        let oid = ObjectId::parse_str(HEX).unwrap();
        assert_eq!(identifier_to_string(&Bson::ObjectId(oid)), HEX);
        assert_eq!(identifier_to_string(&Bson::String("k".into())), "k");
        assert_eq!(identifier_to_string(&Bson::Int32(3)), "3");
    }
}
