//! In-process storage for tests and `--memory` development mode.
//!
//! Rows are JSON objects keyed by wire field names. Predicates that walk a
//! relation are evaluated against a copy of the row with the traversed
//! relations embedded, mirroring the `EXISTS` semantics of the SQL backend.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use talentdesk_query::{Predicate, QueryDescriptor, SortDirection};

use super::{Storage, StoragePage, extract_field_value};
use crate::schema::{EntitySchema, SchemaRegistry};

type Tables = HashMap<String, Vec<Value>>;

/// Relations a predicate walks, as a tree of relation names.
#[derive(Debug, Default)]
struct Hops(BTreeMap<String, Hops>);

impl Hops {
    fn of(filter: &Predicate) -> Self {
        let mut hops = Hops::default();
        filter.for_each_path(&mut |path| {
            let mut node = &mut hops;
            for relation in path.relations() {
                node = node.0.entry(relation.clone()).or_default();
            }
        });
        hops
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct MemoryStorage {
    registry: Arc<SchemaRegistry>,
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self::with_tables(registry, Tables::new())
    }

    pub fn with_tables(registry: Arc<SchemaRegistry>, tables: Tables) -> Self {
        Self {
            registry,
            tables: RwLock::new(tables),
        }
    }

    pub fn insert(&self, entity: &str, row: Value) {
        self.tables
            .write()
            .entry(entity.to_string())
            .or_default()
            .push(row);
    }

    pub fn extend(&self, entity: &str, rows: impl IntoIterator<Item = Value>) {
        self.tables
            .write()
            .entry(entity.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn len(&self, entity: &str) -> usize {
        self.tables.read().get(entity).map_or(0, Vec::len)
    }

    fn matching(&self, schema: &EntitySchema, filter: Option<&Predicate>) -> Vec<Value> {
        let tables = self.tables.read();
        let Some(rows) = tables.get(schema.name) else {
            return Vec::new();
        };

        let Some(filter) = filter.filter(|f| !f.is_empty()) else {
            return rows.clone();
        };

        let hops = Hops::of(filter);
        rows.iter()
            .filter(|row| {
                if hops.is_empty() {
                    filter.matches(row)
                } else {
                    filter.matches(&self.embed(&tables, schema, row, &hops))
                }
            })
            .cloned()
            .collect()
    }

    /// Copy of `row` with every relation in `hops` embedded.
    fn embed(&self, tables: &Tables, schema: &EntitySchema, row: &Value, hops: &Hops) -> Value {
        let mut embedded = row.clone();
        let Some(object) = embedded.as_object_mut() else {
            return embedded;
        };

        for (name, nested) in &hops.0 {
            let Some(relation) = schema.relation(name) else {
                continue;
            };
            let Some(target) = self.registry.get(relation.target) else {
                continue;
            };
            let key = extract_field_value(row, relation.local_field);
            let related: Vec<Value> = tables
                .get(target.name)
                .into_iter()
                .flatten()
                .filter(|child| {
                    key.is_some() && extract_field_value(child, relation.foreign_field) == key
                })
                .map(|child| self.embed(tables, target, child, nested))
                .collect();

            let value = if relation.singular {
                related.into_iter().next().unwrap_or(Value::Null)
            } else {
                Value::Array(related)
            };
            object.insert(name.clone(), value);
        }

        embedded
    }
}

/// Order two field values the way PostgreSQL does by default: nulls sort
/// after every other value ascending, and before them descending.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn sort_rows(rows: &mut [Value], query: &QueryDescriptor) {
    let keys = query
        .order_by
        .as_ref()
        .map(|o| o.keys().to_vec())
        .unwrap_or_default();

    rows.sort_by(|a, b| {
        keys.iter()
            .map(|key| {
                let field = key.path.leaf();
                let ordering = compare_values(
                    a.get(field).unwrap_or(&Value::Null),
                    b.get(field).unwrap_or(&Value::Null),
                );
                match key.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| {
                compare_values(
                    a.get("id").unwrap_or(&Value::Null),
                    b.get("id").unwrap_or(&Value::Null),
                )
            })
    });
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn fetch(&self, schema: &EntitySchema, query: &QueryDescriptor) -> Result<StoragePage> {
        let mut rows = self.matching(schema, query.filter.as_ref());
        let total_count = rows.len() as u64;
        sort_rows(&mut rows, query);

        let skip = usize::try_from(query.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let take = query
            .take
            .map_or(usize::MAX, |t| usize::try_from(t).unwrap_or(usize::MAX));

        Ok(StoragePage {
            rows: rows.into_iter().skip(skip).take(take).collect(),
            total_count,
        })
    }

    async fn count(&self, schema: &EntitySchema, filter: Option<&Predicate>) -> Result<u64> {
        Ok(self.matching(schema, filter).len() as u64)
    }

    async fn healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn storage() -> (Arc<SchemaRegistry>, MemoryStorage) {
        let registry = Arc::new(SchemaRegistry::ats_default());
        let storage = MemoryStorage::new(registry.clone());
        storage.extend(
            "jobs",
            [
                json!({"id": "j1", "title": "Rust Engineer", "status": "OPEN", "ownerId": "u1", "salaryMin": 90}),
                json!({"id": "j2", "title": "Go Engineer", "status": "CLOSED", "ownerId": "u2", "salaryMin": null}),
                json!({"id": "j3", "title": "Designer", "status": "OPEN", "ownerId": "u2", "salaryMin": 60}),
            ],
        );
        storage.extend(
            "applications",
            [
                json!({"id": "a1", "jobId": "j1", "candidateId": "c1", "status": "NEW"}),
                json!({"id": "a2", "jobId": "j2", "candidateId": "c1", "status": "NEW"}),
                json!({"id": "a3", "jobId": "j3", "candidateId": "c2", "status": "HIRED"}),
            ],
        );
        (registry, storage)
    }

    fn query(value: serde_json::Value) -> QueryDescriptor {
        serde_json::from_value(value).unwrap()
    }

    fn ids(page: &StoragePage) -> Vec<&str> {
        page.rows.iter().map(|r| r["id"].as_str().unwrap()).collect()
    }

    #[tokio::test]
    async fn filters_orders_and_windows() {
        let (registry, storage) = storage();
        let jobs = registry.get("jobs").unwrap();

        let page = storage
            .fetch(jobs, &query(json!({"orderBy": {"salaryMin": "asc"}, "take": 2})))
            .await
            .unwrap();
        assert_eq!(page.total_count, 3);
        assert_eq!(ids(&page), ["j3", "j1"]);

        let page = storage
            .fetch(jobs, &query(json!({"orderBy": {"salaryMin": "desc"}, "skip": 0, "take": 1})))
            .await
            .unwrap();
        assert_eq!(ids(&page), ["j2"], "nulls sort first descending");

        let page = storage
            .fetch(jobs, &query(json!({"where": {"status": "OPEN"}, "skip": 1})))
            .await
            .unwrap();
        assert_eq!(page.total_count, 2);
        assert_eq!(ids(&page), ["j3"]);
    }

    #[tokio::test]
    async fn relation_paths_are_evaluated_through_embedded_rows() {
        let (registry, storage) = storage();
        let applications = registry.get("applications").unwrap();

        let page = storage
            .fetch(applications, &query(json!({"where": {"job": {"ownerId": "u2"}}})))
            .await
            .unwrap();
        assert_eq!(ids(&page), ["a2", "a3"]);
        assert!(page.rows[0].get("job").is_none(), "returned rows are not hydrated");

        let jobs = registry.get("jobs").unwrap();
        let count = storage
            .count(
                jobs,
                Some(&Predicate::from_json(&json!({"applications": {"status": "HIRED"}})).unwrap()),
            )
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn null_columns_follow_sql_semantics() {
        let (registry, storage) = storage();
        let jobs = registry.get("jobs").unwrap();
        let count = |filter: serde_json::Value| {
            let predicate = Predicate::from_json(&filter).unwrap();
            let storage = &storage;
            async move { storage.count(jobs, Some(&predicate)).await.unwrap() }
        };

        assert_eq!(count(json!({"NOT": {"salaryMin": {"gt": 70}}})).await, 1);
        assert_eq!(count(json!({"salaryMin": {"not": 90}})).await, 2);
        assert_eq!(count(json!({"salaryMin": {"equals": null}})).await, 1);
        assert_eq!(count(json!({"salaryMin": {"not": null}})).await, 2);
    }

    #[tokio::test]
    async fn missing_tables_are_empty() {
        let (registry, storage) = storage();
        let candidates = registry.get("candidates").unwrap();
        let page = storage.fetch(candidates, &QueryDescriptor::new()).await.unwrap();
        assert_eq!(page, StoragePage::default());
    }
}
