//! Query descriptor and response types shared by server and client.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::QueryError;
use crate::path::FieldPath;
use crate::predicate::Predicate;

/// Sort direction for an `orderBy` entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One `orderBy` entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortKey {
    pub path: FieldPath,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(path: impl Into<FieldPath>) -> Self {
        Self {
            path: path.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(path: impl Into<FieldPath>) -> Self {
        Self {
            path: path.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Priority-ordered sort keys; later keys break ties of earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct OrderBy(pub Vec<SortKey>);

impl OrderBy {
    pub fn keys(&self) -> &[SortKey] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse `{field: "asc"}` or `[{a: "asc"}, {b: {c: "desc"}}]`.
    pub fn from_json(value: &Value) -> Result<Self, QueryError> {
        let mut keys = Vec::new();
        match value {
            Value::Array(entries) => {
                for entry in entries {
                    collect_sort_keys(entry, None, &mut keys)?;
                }
            }
            Value::Object(_) => collect_sort_keys(value, None, &mut keys)?,
            _ => {
                return Err(QueryError::InvalidOrderBy(
                    "expected an object or an array of objects".to_string(),
                ));
            }
        }
        Ok(Self(keys))
    }

    pub fn to_json(&self) -> Value {
        Value::Array(
            self.0
                .iter()
                .map(|key| {
                    let leaf = serde_json::to_value(key.direction).unwrap_or(Value::Null);
                    key.path
                        .segments()
                        .iter()
                        .rev()
                        .fold(leaf, |inner, segment| {
                            let mut map = Map::new();
                            map.insert(segment.clone(), inner);
                            Value::Object(map)
                        })
                })
                .collect(),
        )
    }
}

fn collect_sort_keys(
    value: &Value,
    prefix: Option<&FieldPath>,
    out: &mut Vec<SortKey>,
) -> Result<(), QueryError> {
    let Value::Object(map) = value else {
        return Err(QueryError::InvalidOrderBy(
            "each entry must be an object".to_string(),
        ));
    };
    if map.is_empty() {
        return Err(QueryError::InvalidOrderBy("empty entry".to_string()));
    }
    for (field, direction) in map {
        FieldPath::segment(field).map_err(|e| QueryError::InvalidOrderBy(e.to_string()))?;
        let path = match prefix {
            Some(parent) => parent.child(field),
            None => FieldPath::from(field.as_str()),
        };
        match direction {
            Value::String(dir) => {
                let direction = match dir.as_str() {
                    "asc" => SortDirection::Asc,
                    "desc" => SortDirection::Desc,
                    other => {
                        return Err(QueryError::InvalidOrderBy(format!(
                            "unknown direction '{other}' for '{path}'"
                        )));
                    }
                };
                out.push(SortKey { path, direction });
            }
            Value::Object(_) => collect_sort_keys(direction, Some(&path), out)?,
            _ => {
                return Err(QueryError::InvalidOrderBy(format!(
                    "'{path}' must map to \"asc\" or \"desc\""
                )));
            }
        }
    }
    Ok(())
}

impl Serialize for OrderBy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for OrderBy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        OrderBy::from_json(&value).map_err(serde::de::Error::custom)
    }
}

/// Field projection: field name → included.
pub type Select = BTreeMap<String, bool>;

/// Relation name → inclusion directive.
pub type IncludeTree = BTreeMap<String, IncludeEntry>;

/// Value of one `include` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IncludeEntry {
    /// `null`: treated like `false`.
    Null,
    /// `true` fetches the relation without expanding it; `false` skips it.
    Flag(bool),
    /// A relation with its own directives.
    Nested(Box<IncludeNode>),
}

impl IncludeEntry {
    pub fn nested(node: IncludeNode) -> Self {
        IncludeEntry::Nested(Box::new(node))
    }

    /// Whether the relation is fetched at all.
    pub fn is_requested(&self) -> bool {
        match self {
            IncludeEntry::Null | IncludeEntry::Flag(false) => false,
            IncludeEntry::Flag(true) | IncludeEntry::Nested(_) => true,
        }
    }

    pub fn node(&self) -> Option<&IncludeNode> {
        match self {
            IncludeEntry::Nested(node) => Some(node),
            _ => None,
        }
    }
}

/// Directives attached to an included relation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IncludeNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<IncludeTree>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Select>,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Predicate>,
}

/// A list query: filter, sort, relation tree, projection and window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QueryDescriptor {
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Predicate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<IncludeTree>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Select>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take: Option<u64>,
}

impl QueryDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_where(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_order_by(mut self, keys: Vec<SortKey>) -> Self {
        self.order_by = Some(OrderBy(keys));
        self
    }

    pub fn with_include(mut self, relation: &str, entry: IncludeEntry) -> Self {
        self.include
            .get_or_insert_with(IncludeTree::new)
            .insert(relation.to_string(), entry);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_take(mut self, take: u64) -> Self {
        self.take = Some(take);
        self
    }

    /// Canonical JSON text; equal descriptors produce equal text.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Response of a list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    /// Rows matching `query.where`, ignoring the window.
    pub count: u64,
    /// The descriptor that was actually executed.
    pub query: QueryDescriptor,
}
