//! Predicate trees for `where` clauses.
//!
//! On the wire a predicate is a Prisma-style JSON object:
//! `{"status": "OPEN", "job": {"title": {"contains": "rust", "mode": "insensitive"}}}`.
//! In memory it is a tagged tree, so malformed shapes are rejected while
//! parsing instead of at execution time.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::QueryError;
use crate::path::FieldPath;

/// Comparable leaf value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Convert a JSON leaf. Arrays and objects are not scalars.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Scalar::Null),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Scalar::Int)
                .or_else(|| n.as_f64().map(Scalar::Float)),
            Value::String(s) => Some(Scalar::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::from(*i),
            Scalar::Float(f) => Value::from(*f),
            Scalar::Text(s) => Value::String(s.clone()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    /// String form used for ownership checks and SQL literals.
    pub fn as_string(&self) -> Option<String> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(b) => Some(b.to_string()),
            Scalar::Int(i) => Some(i.to_string()),
            Scalar::Float(f) => Some(f.to_string()),
            Scalar::Text(s) => Some(s.clone()),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// String matching mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    Default,
    Insensitive,
}

impl MatchMode {
    fn is_default(&self) -> bool {
        *self == MatchMode::Default
    }

    pub fn is_insensitive(self) -> bool {
        self == MatchMode::Insensitive
    }
}

/// Operator object applied to a single field.
///
/// Several operators in one object must all hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldFilter {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub equals: Option<Scalar>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub not: Option<Scalar>,
    #[serde(rename = "in", default, skip_serializing_if = "Option::is_none")]
    pub in_list: Option<Vec<Scalar>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_in: Option<Vec<Scalar>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub lt: Option<Scalar>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub lte: Option<Scalar>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub gt: Option<Scalar>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub gte: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_with: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_with: Option<String>,
    #[serde(default, skip_serializing_if = "MatchMode::is_default")]
    pub mode: MatchMode,
}

/// A key that is present always yields `Some`, so `{"not": null}` keeps its
/// `Scalar::Null` operand instead of collapsing into an absent operator.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Scalar>, D::Error> {
    Scalar::deserialize(deserializer).map(Some)
}

/// Keys recognised inside an operator object.
pub const OPERATOR_KEYS: &[&str] = &[
    "equals",
    "not",
    "in",
    "notIn",
    "lt",
    "lte",
    "gt",
    "gte",
    "contains",
    "startsWith",
    "endsWith",
    "mode",
];

impl FieldFilter {
    pub fn contains(term: impl Into<String>) -> Self {
        Self {
            contains: Some(term.into()),
            ..Default::default()
        }
    }

    pub fn starts_with(term: impl Into<String>) -> Self {
        Self {
            starts_with: Some(term.into()),
            ..Default::default()
        }
    }

    pub fn ends_with(term: impl Into<String>) -> Self {
        Self {
            ends_with: Some(term.into()),
            ..Default::default()
        }
    }

    pub fn equals(value: impl Into<Scalar>) -> Self {
        Self {
            equals: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn one_of(values: Vec<Scalar>) -> Self {
        Self {
            in_list: Some(values),
            ..Default::default()
        }
    }

    pub fn insensitive(mut self) -> Self {
        self.mode = MatchMode::Insensitive;
        self
    }

    /// True when no comparison operator is set (`mode` alone does not count).
    pub fn has_no_operator(&self) -> bool {
        self.equals.is_none()
            && self.not.is_none()
            && self.in_list.is_none()
            && self.not_in.is_none()
            && self.lt.is_none()
            && self.lte.is_none()
            && self.gt.is_none()
            && self.gte.is_none()
            && self.contains.is_none()
            && self.starts_with.is_none()
            && self.ends_with.is_none()
    }

    /// True when any substring operator is set.
    pub fn uses_text_matching(&self) -> bool {
        self.contains.is_some() || self.starts_with.is_some() || self.ends_with.is_some()
    }

    /// Values this filter pins the field to (`equals` and `in`).
    pub fn pinned_values(&self) -> Vec<Scalar> {
        let mut values: Vec<Scalar> = self.equals.iter().cloned().collect();
        if let Some(list) = &self.in_list {
            values.extend(list.iter().cloned());
        }
        values
    }
}

/// A node of a `where` tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `{field: value}`
    Equals { path: FieldPath, value: Scalar },
    /// `{field: {contains: ..., mode: ...}}`
    Operator { path: FieldPath, filter: FieldFilter },
    /// `{AND: [...]}`; an empty AND is the empty filter `{}`.
    And(Vec<Predicate>),
    /// `{OR: [...]}`; an empty OR matches nothing.
    Or(Vec<Predicate>),
    /// `{NOT: {...}}`
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn eq(path: impl Into<FieldPath>, value: impl Into<Scalar>) -> Self {
        Predicate::Equals {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn op(path: impl Into<FieldPath>, filter: FieldFilter) -> Self {
        Predicate::Operator {
            path: path.into(),
            filter,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Predicate) -> Self {
        Predicate::Not(Box::new(inner))
    }

    /// The `{}` filter.
    pub fn empty() -> Self {
        Predicate::And(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Predicate::And(children) if children.is_empty())
    }

    /// Field path for leaf predicates.
    pub fn path(&self) -> Option<&FieldPath> {
        match self {
            Predicate::Equals { path, .. } | Predicate::Operator { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Top-level conjuncts: the children of a top-level AND, or the
    /// predicate itself.
    pub fn into_conjuncts(self) -> Vec<Predicate> {
        match self {
            Predicate::And(children) => children,
            other => vec![other],
        }
    }

    /// Visit every leaf path in the tree.
    pub fn for_each_path<'a>(&'a self, visit: &mut impl FnMut(&'a FieldPath)) {
        match self {
            Predicate::Equals { path, .. } | Predicate::Operator { path, .. } => visit(path),
            Predicate::And(children) | Predicate::Or(children) => {
                for child in children {
                    child.for_each_path(visit);
                }
            }
            Predicate::Not(inner) => inner.for_each_path(visit),
        }
    }

    /// Parse a JSON `where` object.
    pub fn from_json(value: &Value) -> Result<Self, QueryError> {
        parse_object(value, None)
    }

    /// Canonical JSON form.
    pub fn to_json(&self) -> Value {
        match self {
            Predicate::Equals { path, value } => nest(path, value.to_json()),
            Predicate::Operator { path, filter } => {
                nest(path, serde_json::to_value(filter).unwrap_or(Value::Null))
            }
            Predicate::And(children) if children.is_empty() => Value::Object(Map::new()),
            Predicate::And(children) => single_key(
                "AND",
                Value::Array(children.iter().map(Predicate::to_json).collect()),
            ),
            Predicate::Or(children) => single_key(
                "OR",
                Value::Array(children.iter().map(Predicate::to_json).collect()),
            ),
            Predicate::Not(inner) => single_key("NOT", inner.to_json()),
        }
    }
}

fn single_key(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

/// Wrap `leaf` in one object per path segment, innermost last.
fn nest(path: &FieldPath, leaf: Value) -> Value {
    path.segments()
        .iter()
        .rev()
        .fold(leaf, |inner, segment| single_key(segment, inner))
}

/// Parse one `where` object; `prefix` is the relation path the object sits under.
fn parse_object(value: &Value, prefix: Option<&FieldPath>) -> Result<Predicate, QueryError> {
    let Value::Object(map) = value else {
        return Err(QueryError::InvalidWhere(format!(
            "expected an object, found {}",
            json_kind(value)
        )));
    };

    let mut parts = Vec::with_capacity(map.len());
    for (key, child) in map {
        let part = match key.as_str() {
            "AND" => Predicate::And(parse_list(child, prefix, "AND")?),
            "OR" => match child {
                Value::Array(_) => Predicate::Or(parse_list(child, prefix, "OR")?),
                _ => {
                    return Err(QueryError::InvalidWhere(
                        "OR requires an array of clauses".to_string(),
                    ));
                }
            },
            "NOT" => match child {
                Value::Array(_) => {
                    Predicate::not(Predicate::And(parse_list(child, prefix, "NOT")?))
                }
                _ => Predicate::not(parse_object(child, prefix)?),
            },
            field => {
                let segment = FieldPath::segment(field)?;
                let path = match prefix {
                    Some(parent) => parent.child(field),
                    None => segment,
                };
                parse_field(path, child)?
            }
        };
        parts.push(part);
    }

    Ok(if parts.len() == 1 {
        parts.remove(0)
    } else {
        Predicate::And(parts)
    })
}

fn parse_list(
    value: &Value,
    prefix: Option<&FieldPath>,
    keyword: &str,
) -> Result<Vec<Predicate>, QueryError> {
    match value {
        Value::Array(items) => items.iter().map(|item| parse_object(item, prefix)).collect(),
        Value::Object(_) if keyword != "OR" => Ok(vec![parse_object(value, prefix)?]),
        other => Err(QueryError::InvalidWhere(format!(
            "{keyword} requires an array of clauses, found {}",
            json_kind(other)
        ))),
    }
}

fn parse_field(path: FieldPath, value: &Value) -> Result<Predicate, QueryError> {
    match value {
        Value::Object(inner) if inner.keys().any(|k| OPERATOR_KEYS.contains(&k.as_str())) => {
            let filter: FieldFilter = serde_json::from_value(value.clone()).map_err(|e| {
                QueryError::InvalidWhere(format!("invalid operator object for '{path}': {e}"))
            })?;
            if filter.has_no_operator() {
                return Err(QueryError::InvalidWhere(format!(
                    "operator object for '{path}' has no comparison"
                )));
            }
            Ok(Predicate::Operator { path, filter })
        }
        // Relation hop: desugar the nested object under this path.
        Value::Object(_) => parse_object(value, Some(&path)),
        Value::Array(_) => Err(QueryError::InvalidWhere(format!(
            "'{path}' cannot be compared to an array; use the `in` operator"
        ))),
        scalar => match Scalar::from_json(scalar) {
            Some(value) => Ok(Predicate::Equals { path, value }),
            None => Err(QueryError::InvalidWhere(format!(
                "unsupported value for '{path}'"
            ))),
        },
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl Serialize for Predicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Predicate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Predicate::from_json(&value).map_err(serde::de::Error::custom)
    }
}
