//! Batched loading of include trees.
//!
//! One storage query per include node: parent keys are collected,
//! deduplicated and sent as a single `in` filter, then the children are
//! distributed back onto their parents.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use talentdesk_query::{
    FieldFilter, IncludeEntry, IncludeTree, Predicate, QueryDescriptor, Scalar, Select,
    merge_where_and,
};

use crate::schema::{EntitySchema, SchemaRegistry};
use crate::storage::{Storage, extract_field_value};

/// Most children loaded for one include node.
pub const CHILD_LIMIT: u64 = 1000;

/// Embed every requested relation of `include` into `rows`.
///
/// `depth` is the level of `include` itself; trees deeper than
/// `max_depth` are not expanded.
pub fn load_includes<'a>(
    storage: &'a dyn Storage,
    registry: &'a SchemaRegistry,
    schema: &'a EntitySchema,
    rows: &'a mut [Value],
    include: &'a IncludeTree,
    depth: usize,
    max_depth: usize,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        if depth > max_depth {
            tracing::warn!(
                depth,
                max_depth,
                "include depth limit reached, skipping nested includes"
            );
            return Ok(());
        }

        for (name, entry) in include.iter().filter(|(_, entry)| entry.is_requested()) {
            let relation = schema
                .relation(name)
                .with_context(|| format!("`{}` has no relation `{name}`", schema.name))?;
            let target = registry
                .get(relation.target)
                .with_context(|| format!("unknown entity `{}`", relation.target))?;
            let node = entry.node();

            // 1. Collect and deduplicate parent keys
            let mut seen = HashSet::new();
            let keys: Vec<String> = rows
                .iter()
                .filter_map(|row| extract_field_value(row, relation.local_field))
                .filter(|key| seen.insert(key.clone()))
                .collect();

            let mut children = if keys.is_empty() {
                Vec::new()
            } else {
                // 2. One batched child query
                let batch = Predicate::op(
                    relation.foreign_field,
                    FieldFilter::one_of(keys.into_iter().map(Scalar::Text).collect()),
                );
                let query = QueryDescriptor {
                    filter: merge_where_and([node.and_then(|n| n.filter.clone()), Some(batch)]),
                    skip: Some(0),
                    take: Some(CHILD_LIMIT),
                    ..Default::default()
                };

                let page = storage
                    .fetch(target, &query)
                    .await
                    .with_context(|| format!("failed to load include '{name}'"))?;

                if page.total_count > page.rows.len() as u64 {
                    tracing::warn!(
                        include = %name,
                        returned = page.rows.len(),
                        total = page.total_count,
                        "include results truncated"
                    );
                }
                page.rows
            };

            // 3. Nested includes on the children before they are distributed
            let nested = node.and_then(|n| n.include.as_ref());
            if let Some(nested) = nested
                && !children.is_empty()
            {
                load_includes(
                    storage,
                    registry,
                    target,
                    &mut children,
                    nested,
                    depth + 1,
                    max_depth,
                )
                .await?;
            }

            // 4. Distribute children onto parents
            let select = node.and_then(|n| n.select.as_ref());
            for row in rows.iter_mut() {
                let key = extract_field_value(row, relation.local_field);
                let mut matching = children
                    .iter()
                    .filter(|child| {
                        key.is_some() && extract_field_value(child, relation.foreign_field) == key
                    })
                    .map(|child| project(child.clone(), select, nested));

                let value = if relation.singular {
                    matching.next().unwrap_or(Value::Null)
                } else {
                    Value::Array(matching.collect())
                };

                if let Some(object) = row.as_object_mut() {
                    object.insert(name.clone(), value);
                }
            }
        }

        Ok(())
    })
}

/// Apply a `select` to one row, keeping embedded relations.
///
/// With at least one `true` entry only those fields are kept; otherwise
/// the `false` entries are dropped.
pub fn project(row: Value, select: Option<&Select>, include: Option<&IncludeTree>) -> Value {
    let (Some(select), Value::Object(object)) = (select, &row) else {
        return row;
    };

    let whitelist = select.values().any(|keep| *keep);
    let included = |key: &str| {
        include
            .and_then(|tree| tree.get(key))
            .is_some_and(IncludeEntry::is_requested)
    };

    let projected: Map<String, Value> = object
        .iter()
        .filter(|(key, _)| {
            included(key)
                || match select.get(key.as_str()) {
                    Some(keep) => *keep,
                    None => !whitelist,
                }
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Value::Object(projected)
}
