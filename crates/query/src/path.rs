//! Dotted field paths (`job.ownerId`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::QueryError;

/// A field addressed through zero or more relation hops.
///
/// Every segment but the last names a relation; the last names a field on
/// the final entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Parse and validate a dotted path from untrusted input.
    pub fn parse(dotted: &str) -> Result<Self, QueryError> {
        let segments: Vec<String> = dotted.split('.').map(str::to_string).collect();
        if segments.iter().all(|s| is_valid_segment(s)) {
            Ok(Self(segments))
        } else {
            Err(QueryError::InvalidPath(dotted.to_string()))
        }
    }

    /// Build a single-segment path, validating it.
    pub fn segment(name: &str) -> Result<Self, QueryError> {
        if is_valid_segment(name) {
            Ok(Self(vec![name.to_string()]))
        } else {
            Err(QueryError::InvalidPath(name.to_string()))
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// First segment: the top-level key this path hangs off.
    pub fn head(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or_default()
    }

    /// Last segment: the field compared at the end of the path.
    pub fn leaf(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    /// Relation hops leading to the leaf (everything but the last segment).
    pub fn relations(&self) -> &[String] {
        match self.0.split_last() {
            Some((_, hops)) => hops,
            None => &[],
        }
    }

    pub fn is_nested(&self) -> bool {
        self.0.len() > 1
    }

    /// Path with one more segment appended, used when desugaring nested objects.
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    /// True when `prefix` equals this path or is one of its leading prefixes.
    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }
}

/// Field segments follow identifier rules so they can be used as SQL
/// aliases and JSON keys without quoting surprises.
fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Trusted paths from code (role tables, fixtures). Not validated.
impl From<&str> for FieldPath {
    fn from(dotted: &str) -> Self {
        Self(dotted.split('.').map(str::to_string).collect())
    }
}

impl FromStr for FieldPath {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
