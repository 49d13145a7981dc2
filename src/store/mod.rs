//! Abstract document-store seam. The engine only ever talks to the store
//! through [`DocumentStore`]; the concrete client (and its index
//! provisioning) lives outside this crate.

pub mod batch;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Hard cap on key-in-set queries, a property of the store.
pub const MAX_IN_KEYS: usize = 10;

/// Collection paths of the document layout this engine reads.
pub mod collections {
    pub const USERS: &str = "users";
    pub const BUSINESSES: &str = "businesses";
    pub const POSTS: &str = "posts";
    pub const LOCATION_INDEX: &str = "location_index";

    pub fn following(user_id: &str) -> String {
        format!("users/{user_id}/following")
    }

    pub fn likes(user_id: &str) -> String {
        format!("users/{user_id}/likes")
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("key-in-set query over {0} keys exceeds the limit of {MAX_IN_KEYS}")]
    TooManyKeys(usize),
}

/// Schemaless document: opaque id plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Value) -> Self {
        Self { id: id.into(), fields }
    }

    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Eq,
    Lt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: &str) -> Self {
        Self { field: field.to_string(), direction: Direction::Ascending }
    }

    pub fn desc(field: &str) -> Self {
        Self { field: field.to_string(), direction: Direction::Descending }
    }
}

/// Read/merge-write surface of the document store. All reads are best-effort
/// snapshots; absent ids are simply missing from results, never errors.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_by_id(&self, collection: &str, id: &str)
        -> Result<Option<Document>, StoreError>;

    /// Key-in-set lookup. At most [`MAX_IN_KEYS`] ids per call; callers that
    /// need more go through [`batch::fetch_map`].
    async fn get_by_ids(&self, collection: &str, ids: &[String])
        -> Result<Vec<Document>, StoreError>;

    async fn list(
        &self,
        collection: &str,
        order_by: Option<OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError>;

    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        op: FieldOp,
        value: Value,
        order_by: Option<OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Field-in-set query, same [`MAX_IN_KEYS`] cap as [`get_by_ids`].
    ///
    /// [`get_by_ids`]: DocumentStore::get_by_ids
    async fn query_by_field_in(
        &self,
        collection: &str,
        field: &str,
        values: &[String],
        order_by: Option<OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Idempotent merge-write of `fields` onto the document.
    async fn upsert_merge(&self, collection: &str, id: &str, fields: Value)
        -> Result<(), StoreError>;
}
