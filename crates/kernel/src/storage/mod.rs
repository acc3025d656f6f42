//! Storage executors for sanitized list queries.
//!
//! The list pipeline hands a storage backend a descriptor that has already
//! been validated, bounded and role-scoped. Backends only execute it:
//! filter, order, window and count. Includes and projection are resolved
//! by the pipeline on top of [`Storage::fetch`].

mod memory;
mod postgres;

use async_trait::async_trait;
use serde_json::Value;
use talentdesk_query::{Predicate, QueryDescriptor};

use crate::schema::EntitySchema;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

/// One window of rows plus the total number of matching rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoragePage {
    pub rows: Vec<Value>,
    pub total_count: u64,
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Rows of `schema` matching `query.where`, ordered and windowed.
    ///
    /// Rows carry every field of the entity under its wire name.
    async fn fetch(
        &self,
        schema: &EntitySchema,
        query: &QueryDescriptor,
    ) -> anyhow::Result<StoragePage>;

    /// Number of rows of `schema` matching `filter`.
    async fn count(&self, schema: &EntitySchema, filter: Option<&Predicate>) -> anyhow::Result<u64>;

    /// Whether the backend is reachable.
    async fn healthy(&self) -> bool;
}

/// Read a field of a result row as a string key.
///
/// Returns `None` for null or missing values to prevent false matches.
pub fn extract_field_value(row: &Value, field: &str) -> Option<String> {
    row.get(field).and_then(json_value_to_string)
}

/// Convert a JSON value to its string representation for comparison.
/// Returns `None` for null values to prevent false matches.
pub fn json_value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
