//! In-memory evaluation of predicates against JSON rows.
//!
//! Rows carry related records under their relation names (an object for a
//! singular relation, an array for a to-many one). A path through a to-many
//! relation matches when any related record matches.

use std::cmp::Ordering;

use serde_json::Value;

use crate::path::FieldPath;
use crate::predicate::{FieldFilter, MatchMode, Predicate, Scalar};

impl Predicate {
    /// Whether `row` satisfies this predicate.
    ///
    /// Comparisons against a null column are unknown rather than false, the
    /// way PostgreSQL evaluates them, so `NOT` over such a comparison still
    /// excludes the row.
    pub fn matches(&self, row: &Value) -> bool {
        self.truth(row) == Some(true)
    }

    fn truth(&self, row: &Value) -> Truth {
        match self {
            Predicate::Equals { path, value } => {
                leaf(row, path, |c| equals(c, value, MatchMode::Default))
            }
            Predicate::Operator { path, filter } => leaf(row, path, |c| filter_truth(filter, c)),
            Predicate::And(children) => children
                .iter()
                .fold(Some(true), |acc, child| and(acc, child.truth(row))),
            Predicate::Or(children) => children
                .iter()
                .fold(Some(false), |acc, child| or(acc, child.truth(row))),
            Predicate::Not(inner) => inner.truth(row).map(|b| !b),
        }
    }
}

/// SQL truth value; `None` is unknown.
type Truth = Option<bool>;

fn and(a: Truth, b: Truth) -> Truth {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn or(a: Truth, b: Truth) -> Truth {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

/// Evaluate `test` at the end of `path`. A relation hop behaves like
/// `EXISTS`: true when some related record passes, false otherwise.
fn leaf(row: &Value, path: &FieldPath, test: impl Fn(&Value) -> Truth) -> Truth {
    let candidates = resolve(row, path);
    if path.segments().len() > 1 {
        return Some(candidates.into_iter().any(|c| test(c) == Some(true)));
    }
    candidates
        .into_iter()
        .fold(Some(false), |acc, candidate| or(acc, test(candidate)))
}

static NULL: Value = Value::Null;

/// Every value reachable along `path`, flattening arrays. A missing field
/// resolves to `null`; a missing related record contributes nothing.
fn resolve<'a>(row: &'a Value, path: &FieldPath) -> Vec<&'a Value> {
    let last = path.segments().len().saturating_sub(1);
    let mut current = vec![row];
    for (depth, segment) in path.segments().iter().enumerate() {
        let mut next = Vec::with_capacity(current.len());
        for value in current {
            match value {
                Value::Array(items) => {
                    next.extend(items.iter().map(|item| field(item, segment)));
                }
                other => next.push(field(other, segment)),
            }
        }
        if depth < last {
            next.retain(|value| !value.is_null());
        }
        current = next;
    }
    current
        .into_iter()
        .flat_map(|value| match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        })
        .collect()
}

fn field<'a>(value: &'a Value, name: &str) -> &'a Value {
    value.get(name).unwrap_or(&NULL)
}

fn normalize(text: &str, mode: MatchMode) -> String {
    match mode {
        MatchMode::Insensitive => text.to_lowercase(),
        MatchMode::Default => text.to_string(),
    }
}

/// Order `candidate` against `scalar`; `None` when the types don't compare.
fn compare(candidate: &Value, scalar: &Scalar, mode: MatchMode) -> Option<Ordering> {
    match (candidate, scalar) {
        (Value::Null, Scalar::Null) => Some(Ordering::Equal),
        (Value::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
        (Value::Number(a), Scalar::Int(b)) => a.as_f64()?.partial_cmp(&(*b as f64)),
        (Value::Number(a), Scalar::Float(b)) => a.as_f64()?.partial_cmp(b),
        (Value::String(a), Scalar::Text(b)) => Some(normalize(a, mode).cmp(&normalize(b, mode))),
        _ => None,
    }
}

fn equal(candidate: &Value, scalar: &Scalar, mode: MatchMode) -> bool {
    compare(candidate, scalar, mode) == Some(Ordering::Equal)
}

/// `equals`: a null operand is `IS NULL`, otherwise `=` (unknown on null).
fn equals(candidate: &Value, value: &Scalar, mode: MatchMode) -> Truth {
    match (candidate, value) {
        (_, Scalar::Null) => Some(candidate.is_null()),
        (Value::Null, _) => None,
        _ => Some(equal(candidate, value, mode)),
    }
}

/// `not`: a null operand is `IS NOT NULL`; otherwise null columns pass.
fn not_equals(candidate: &Value, value: &Scalar, mode: MatchMode) -> Truth {
    match (candidate, value) {
        (_, Scalar::Null) => Some(!candidate.is_null()),
        (Value::Null, _) => Some(true),
        _ => Some(!equal(candidate, value, mode)),
    }
}

fn one_of(candidate: &Value, list: &[Scalar], mode: MatchMode) -> Truth {
    if candidate.is_null() && !list.contains(&Scalar::Null) && !list.is_empty() {
        return None;
    }
    Some(list.iter().any(|v| equal(candidate, v, mode)))
}

fn none_of(candidate: &Value, list: &[Scalar], mode: MatchMode) -> Truth {
    if !candidate.is_null() {
        return Some(!list.iter().any(|v| equal(candidate, v, mode)));
    }
    let excludes_null = list.contains(&Scalar::Null);
    let has_values = list.iter().any(|v| *v != Scalar::Null);
    match (has_values, excludes_null) {
        (_, false) => Some(true),
        (false, true) => Some(false),
        (true, true) => None,
    }
}

fn ordered(
    candidate: &Value,
    bound: &Scalar,
    mode: MatchMode,
    accept: fn(Ordering) -> bool,
) -> Truth {
    if candidate.is_null() || *bound == Scalar::Null {
        return None;
    }
    Some(compare(candidate, bound, mode).is_some_and(accept))
}

fn text_op(
    candidate: &Value,
    term: &str,
    mode: MatchMode,
    op: fn(&str, &str) -> bool,
) -> Truth {
    match candidate {
        Value::Null => None,
        Value::String(text) => Some(op(&normalize(text, mode), &normalize(term, mode))),
        _ => Some(false),
    }
}

fn filter_truth(filter: &FieldFilter, candidate: &Value) -> Truth {
    let mode = filter.mode;
    let mut parts: Vec<Truth> = Vec::new();

    if let Some(value) = &filter.equals {
        parts.push(equals(candidate, value, mode));
    }
    if let Some(value) = &filter.not {
        parts.push(not_equals(candidate, value, mode));
    }
    if let Some(list) = &filter.in_list {
        parts.push(one_of(candidate, list, mode));
    }
    if let Some(list) = &filter.not_in {
        parts.push(none_of(candidate, list, mode));
    }

    let bounds: [(&Option<Scalar>, fn(Ordering) -> bool); 4] = [
        (&filter.lt, Ordering::is_lt),
        (&filter.lte, Ordering::is_le),
        (&filter.gt, Ordering::is_gt),
        (&filter.gte, Ordering::is_ge),
    ];
    for (bound, accept) in bounds {
        if let Some(bound) = bound {
            parts.push(ordered(candidate, bound, mode, accept));
        }
    }

    if let Some(term) = &filter.contains {
        parts.push(text_op(candidate, term, mode, |a, b| a.contains(b)));
    }
    if let Some(term) = &filter.starts_with {
        parts.push(text_op(candidate, term, mode, |a, b| a.starts_with(b)));
    }
    if let Some(term) = &filter.ends_with {
        parts.push(text_op(candidate, term, mode, |a, b| a.ends_with(b)));
    }

    parts.into_iter().fold(Some(true), and)
}
