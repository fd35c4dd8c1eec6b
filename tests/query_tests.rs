/// Bulk query tests
///
/// find / find_one / find_iterator / count, including identifier fix-up and
/// driver options.
/// Run with: cargo test --test query_tests
use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{Bson, doc};
use futures::{StreamExt, TryStreamExt};
use mongodb::options::FindOptions;
use mongomodel::{
    AdapterError, InMemoryDatabase, ModelType, StoreAdapter, StoreCollection, StoreDatabase,
};

async fn seeded(values: &[&str]) -> (InMemoryDatabase, ModelType) {
    let db = InMemoryDatabase::new("test");
    let collection = db.coll("model");
    for (n, value) in values.iter().enumerate() {
        let n = n as i32;
        collection
            .insert_one(doc! { "test": *value, "n": n })
            .await
            .unwrap();
    }
    let model = StoreAdapter::from_database(Arc::new(db.clone())).make_model("model");
    (db, model)
}

#[tokio::test]
async fn test_find_on_empty_collection() {
    let (_, model) = seeded(&[]).await;
    assert!(model.find(None, None).await.unwrap().is_empty());
    assert_eq!(model.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_find_filters_in_store_order() {
    let (_, model) = seeded(&["find", "other", "find"]).await;

    let found = model.find(doc! { "test": "find" }, None).await.unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|record| record.get_str("test") == Some("find")));
    assert_eq!(found[0].get("n"), Some(&Bson::Int32(0)));
    assert_eq!(found[1].get("n"), Some(&Bson::Int32(2)));
    assert!(found.iter().all(|record| !record.is_new()));

    let empty = model
        .find(doc! { "test": "doesNotExist" }, None)
        .await
        .unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn test_find_with_options() {
    let (_, model) = seeded(&["a", "b", "c", "d"]).await;

    let options = FindOptions::builder()
        .sort(doc! { "n": -1 })
        .skip(1)
        .limit(2)
        .build();
    let found = model.find(None, options).await.unwrap();

    let values: Vec<&str> = found.iter().filter_map(|r| r.get_str("test")).collect();
    assert_eq!(values, vec!["c", "b"]);
}

#[tokio::test]
async fn test_find_one() {
    let (_, model) = seeded(&["findOne", "other"]).await;

    let record = model
        .find_one(doc! { "test": "findOne" }, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.get_str("test"), Some("findOne"));
    assert!(record.object_id().is_some());

    let missing = model
        .find_one(doc! { "test": "doesNotExist" }, None)
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_find_one_by_model_identifier() {
    let (db, model) = seeded(&["x"]).await;
    let id = ObjectId::new();
    db.coll("model")
        .insert_one(doc! { "_id": id, "test": "target" })
        .await
        .unwrap();

    // `id` as hex, as an ObjectId, and as `_id`
    for filter in [
        doc! { "id": id.to_hex() },
        doc! { "id": id },
        doc! { "_id": id.to_hex() },
    ] {
        let record = model.find_one(filter, None).await.unwrap().unwrap();
        assert_eq!(record.get_str("test"), Some("target"));
        assert_eq!(record.object_id(), Some(id));
    }
}

#[tokio::test]
async fn test_store_identifier_wins_over_model_identifier() {
    let (db, model) = seeded(&[]).await;
    let first = db.coll("model").insert_one(doc! { "k": 1 }).await.unwrap();
    let second = db.coll("model").insert_one(doc! { "k": 2 }).await.unwrap();

    let found = model
        .find(doc! { "_id": first, "id": second }, None)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("k"), Some(&Bson::Int32(1)));
}

#[tokio::test]
async fn test_malformed_identifier_in_filter() {
    let (_, model) = seeded(&["x"]).await;

    let err = model
        .find(doc! { "id": "not-hex" }, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::InvalidIdentifier(_)));

    let err = model.count(doc! { "_id": "zz" }).await.unwrap_err();
    assert!(matches!(err, AdapterError::InvalidIdentifier(_)));
}

#[tokio::test]
async fn test_find_iterator() {
    let (_, model) = seeded(&["findIterator", "other", "findIterator"]).await;

    let mut stream = model.find_iterator(doc! { "test": "findIterator" }, None);
    let mut seen = 0;
    while let Some(record) = stream.try_next().await.unwrap() {
        assert_eq!(record.get_str("test"), Some("findIterator"));
        seen += 1;
    }
    assert_eq!(seen, 2);

    let mut empty = model.find_iterator(doc! { "test": "doesNotExist" }, None);
    assert!(empty.next().await.is_none());
}

#[tokio::test]
async fn test_find_iterator_is_lazy() {
    let db = InMemoryDatabase::new("test");
    let model = StoreAdapter::from_database(Arc::new(db.clone())).make_model("model");

    let stream = model.find_iterator(None, None);
    // Nothing has touched the store yet
    assert!(db.list_collection_names(None).await.unwrap().is_empty());

    let records: Vec<_> = stream.try_collect().await.unwrap();
    assert!(records.is_empty());
    assert_eq!(db.list_collection_names(None).await.unwrap(), vec!["model"]);
}

#[tokio::test]
async fn test_find_iterator_can_stop_early() {
    let (_, model) = seeded(&["a", "b", "c"]).await;

    let first_two: Vec<_> = model
        .find_iterator(None, None)
        .take(2)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(first_two.len(), 2);
}

#[tokio::test]
async fn test_count() {
    let (_, model) = seeded(&["count", "count", "other"]).await;

    assert_eq!(model.count(None).await.unwrap(), 3);
    assert_eq!(model.count(doc! { "test": "count" }).await.unwrap(), 2);
    assert_eq!(model.count(doc! { "test": "none" }).await.unwrap(), 0);
    assert_eq!(
        model.count(doc! { "n": { "$gte": 1 } }).await.unwrap(),
        2
    );
}
