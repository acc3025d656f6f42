//! Free-text search compiled into predicate trees.
//!
//! One term becomes an OR across the searched fields. Several terms become
//! an AND of such ORs: every term has to match some field.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::merge::merge_where_and;
use crate::path::FieldPath;
use crate::predicate::{FieldFilter, Predicate};

/// Operator used for each search branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchOperator {
    #[default]
    Contains,
    StartsWith,
    EndsWith,
    Equals,
}

impl SearchOperator {
    fn filter(self, term: &str, case_sensitive: bool) -> FieldFilter {
        let filter = match self {
            SearchOperator::Contains => FieldFilter::contains(term),
            SearchOperator::StartsWith => FieldFilter::starts_with(term),
            SearchOperator::EndsWith => FieldFilter::ends_with(term),
            SearchOperator::Equals => FieldFilter::equals(term),
        };
        if case_sensitive {
            filter
        } else {
            filter.insensitive()
        }
    }
}

fn branches(
    fields: &[FieldPath],
    term: &str,
    operator: SearchOperator,
    case_sensitive: bool,
) -> Vec<Predicate> {
    fields
        .iter()
        .map(|field| Predicate::op(field.clone(), operator.filter(term, case_sensitive)))
        .collect()
}

/// Compile `text` into search predicates over `fields`.
///
/// Blank text compiles to an empty list. A single term yields one branch
/// per field, meant to be OR-ed. Several terms yield a single
/// `AND[OR[..], OR[..], ...]` with one OR per term.
pub fn compile_search(
    fields: &[FieldPath],
    text: &str,
    operator: SearchOperator,
    case_sensitive: bool,
) -> Vec<Predicate> {
    let terms: Vec<&str> = text.split_whitespace().collect();
    match terms.as_slice() {
        [] => Vec::new(),
        _ if fields.is_empty() => Vec::new(),
        [term] => branches(fields, term, operator, case_sensitive),
        many => vec![Predicate::And(
            many.iter()
                .map(|term| Predicate::Or(branches(fields, term, operator, case_sensitive)))
                .collect(),
        )],
    }
}

/// An OR whose branches are leaf predicates on exactly `fields`.
fn is_search_or(predicate: &Predicate, fields: &BTreeSet<&FieldPath>) -> bool {
    let Predicate::Or(children) = predicate else {
        return false;
    };
    let mut seen = BTreeSet::new();
    for child in children {
        match child {
            Predicate::Operator { path, .. } | Predicate::Equals { path, .. }
                if fields.contains(path) =>
            {
                seen.insert(path);
            }
            _ => return false,
        }
    }
    !children.is_empty() && seen == *fields
}

fn is_search_branch(predicate: &Predicate, fields: &BTreeSet<&FieldPath>) -> bool {
    match predicate {
        Predicate::And(children) => {
            !children.is_empty() && children.iter().all(|child| is_search_or(child, fields))
        }
        other => is_search_or(other, fields),
    }
}

/// Drop top-level conjuncts produced by an earlier search over `fields`.
pub fn remove_search_branches(
    filter: Option<Predicate>,
    fields: &[FieldPath],
) -> Option<Predicate> {
    let field_set: BTreeSet<&FieldPath> = fields.iter().collect();
    let kept = filter?
        .into_conjuncts()
        .into_iter()
        .filter(|conjunct| !is_search_branch(conjunct, &field_set))
        .map(Some);
    merge_where_and(kept)
}

/// Replace any previous search over `fields` in `filter` with a search for `text`.
pub fn apply_search(
    filter: Option<Predicate>,
    fields: &[FieldPath],
    text: &str,
    operator: SearchOperator,
    case_sensitive: bool,
) -> Option<Predicate> {
    let cleaned = remove_search_branches(filter, fields);
    let compiled = compile_search(fields, text, operator, case_sensitive);
    let multi_term = matches!(compiled.as_slice(), [Predicate::And(_)]);
    let search = if compiled.is_empty() {
        None
    } else if multi_term {
        compiled.into_iter().next()
    } else {
        Some(Predicate::Or(compiled))
    };

    let mut conjuncts: Vec<Option<Predicate>> = cleaned
        .map(Predicate::into_conjuncts)
        .unwrap_or_default()
        .into_iter()
        .map(Some)
        .collect();
    conjuncts.push(search);
    merge_where_and(conjuncts)
}

/// Case-insensitive helper used by list screens: `contains` over `fields`.
pub fn search_fields(filter: Option<Predicate>, fields: &[&str], text: &str) -> Option<Predicate> {
    let fields: Vec<FieldPath> = fields.iter().map(|f| FieldPath::from(*f)).collect();
    apply_search(filter, &fields, text, SearchOperator::Contains, false)
}
