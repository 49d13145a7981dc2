//! In-memory [`DocumentStore`] backing the test suites. Ordering on
//! `createdAt` goes through the same timestamp normalization the engine uses,
//! so heterogeneous timestamps sort identically everywhere.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::models::CreatedAt;

use super::{Direction, Document, DocumentStore, FieldOp, OrderBy, StoreError, MAX_IN_KEYS};

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, collection: &str, id: &str, fields: Value) {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }

    async fn snapshot(&self, collection: &str) -> Vec<Document> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn created_at_key(value: Option<&Value>) -> f64 {
    value
        .cloned()
        .and_then(|v| serde_json::from_value::<CreatedAt>(v).ok())
        .map(|ts| ts.epoch_seconds())
        .unwrap_or(f64::NEG_INFINITY)
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NEG_INFINITY);
            let y = y.as_f64().unwrap_or(f64::NEG_INFINITY);
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

fn compare_field(field: &str, a: &Document, b: &Document) -> Ordering {
    let (va, vb) = (a.fields.get(field), b.fields.get(field));
    if field == "createdAt" {
        created_at_key(va).total_cmp(&created_at_key(vb))
    } else {
        compare_values(va, vb)
    }
}

fn apply_order_and_limit(
    mut docs: Vec<Document>,
    order_by: Option<OrderBy>,
    limit: Option<usize>,
) -> Vec<Document> {
    if let Some(order) = order_by {
        docs.sort_by(|a, b| {
            let ord = compare_field(&order.field, a, b);
            match order.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        });
    }
    if let Some(limit) = limit {
        docs.truncate(limit);
    }
    docs
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn get_by_ids(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<Document>, StoreError> {
        if ids.len() > MAX_IN_KEYS {
            return Err(StoreError::TooManyKeys(ids.len()));
        }
        let collections = self.collections.read().await;
        let docs = collections.get(collection);
        Ok(ids
            .iter()
            .filter_map(|id| {
                docs.and_then(|d| d.get(id))
                    .map(|fields| Document::new(id.clone(), fields.clone()))
            })
            .collect())
    }

    async fn list(
        &self,
        collection: &str,
        order_by: Option<OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        Ok(apply_order_and_limit(self.snapshot(collection).await, order_by, limit))
    }

    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        op: FieldOp,
        value: Value,
        order_by: Option<OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        let docs = self
            .snapshot(collection)
            .await
            .into_iter()
            .filter(|doc| {
                let actual = doc.fields.get(field);
                match op {
                    FieldOp::Eq => actual == Some(&value),
                    FieldOp::Lt => {
                        actual.is_some()
                            && compare_values(actual, Some(&value)) == Ordering::Less
                    }
                }
            })
            .collect();
        Ok(apply_order_and_limit(docs, order_by, limit))
    }

    async fn query_by_field_in(
        &self,
        collection: &str,
        field: &str,
        values: &[String],
        order_by: Option<OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        if values.len() > MAX_IN_KEYS {
            return Err(StoreError::TooManyKeys(values.len()));
        }
        let docs = self
            .snapshot(collection)
            .await
            .into_iter()
            .filter(|doc| {
                doc.str_field(field)
                    .map(|v| values.iter().any(|candidate| candidate == v))
                    .unwrap_or(false)
            })
            .collect();
        Ok(apply_order_and_limit(docs, order_by, limit))
    }

    async fn upsert_merge(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let entry = collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));

        match (entry, fields) {
            (Value::Object(existing), Value::Object(incoming)) => {
                for (key, value) in incoming {
                    existing.insert(key, value);
                }
            }
            (entry, fields) => *entry = fields,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::collections;
    use serde_json::json;

    #[tokio::test]
    async fn orders_heterogeneous_created_at_newest_first() {
        let store = MemoryStore::new();
        store
            .insert(collections::POSTS, "numeric", json!({"createdAt": {"seconds": 2000.0}}))
            .await;
        store
            .insert(
                collections::POSTS,
                "formatted",
                json!({"createdAt": "March 26, 2025 at 6:41:41 PM UTC+5:30"}),
            )
            .await;
        store
            .insert(collections::POSTS, "garbage", json!({"createdAt": "yesterday-ish"}))
            .await;

        let docs = store
            .list(collections::POSTS, Some(OrderBy::desc("createdAt")), None)
            .await
            .unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["formatted", "numeric", "garbage"]);
    }

    #[tokio::test]
    async fn rejects_oversized_key_sets() {
        let store = MemoryStore::new();
        let ids: Vec<String> = (0..11).map(|i| format!("u{i}")).collect();
        let err = store.get_by_ids(collections::USERS, &ids).await.unwrap_err();
        assert!(matches!(err, StoreError::TooManyKeys(11)));
    }

    #[tokio::test]
    async fn merge_write_preserves_unrelated_fields() {
        let store = MemoryStore::new();
        store
            .insert(collections::BUSINESSES, "b1", json!({"businessName": "Cafe", "x": 1}))
            .await;
        store
            .upsert_merge(collections::BUSINESSES, "b1", json!({"geohash": "tdr1v9"}))
            .await
            .unwrap();

        let doc = store.get_by_id(collections::BUSINESSES, "b1").await.unwrap().unwrap();
        assert_eq!(doc.str_field("businessName"), Some("Cafe"));
        assert_eq!(doc.str_field("geohash"), Some("tdr1v9"));
    }

    #[tokio::test]
    async fn lt_filter_compares_strings() {
        let store = MemoryStore::new();
        store
            .insert(collections::BUSINESSES, "stale", json!({"locationUpdatedAt": "2024-01-01T00:00:00Z"}))
            .await;
        store
            .insert(collections::BUSINESSES, "fresh", json!({"locationUpdatedAt": "2026-01-01T00:00:00Z"}))
            .await;

        let docs = store
            .query_by_field(
                collections::BUSINESSES,
                "locationUpdatedAt",
                FieldOp::Lt,
                json!("2025-01-01T00:00:00Z"),
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "stale");
    }
}
