//! Predicate composition and authorization overlays.
//!
//! The overlay primitives never merge a mandatory constraint into the
//! caller's tree in a way that lets a caller-supplied `OR` branch satisfy
//! the query on its own: mandatory alternatives are always AND-wrapped.

use crate::path::FieldPath;
use crate::predicate::{Predicate, Scalar};

fn non_empty(clauses: impl IntoIterator<Item = Option<Predicate>>) -> Vec<Predicate> {
    clauses
        .into_iter()
        .flatten()
        .filter(|clause| !clause.is_empty())
        .collect()
}

fn compose(
    mut clauses: Vec<Predicate>,
    wrap: fn(Vec<Predicate>) -> Predicate,
) -> Option<Predicate> {
    match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(wrap(clauses)),
    }
}

/// AND of every non-empty clause. Zero clauses → `None`, one → itself.
pub fn merge_where_and(clauses: impl IntoIterator<Item = Option<Predicate>>) -> Option<Predicate> {
    compose(non_empty(clauses), Predicate::And)
}

/// OR of every non-empty clause. Zero clauses → `None`, one → itself.
pub fn merge_where_or(clauses: impl IntoIterator<Item = Option<Predicate>>) -> Option<Predicate> {
    compose(non_empty(clauses), Predicate::Or)
}

/// Require at least one of `constraints` on top of the caller's `filter`.
///
/// An empty `filter` yields `OR(constraints)`; anything else, including a
/// filter that is itself an `OR`, yields `AND(filter, OR(constraints))`.
/// An empty constraint list yields an `OR` with no branches, which matches
/// nothing.
pub fn add_or_constraints(filter: Option<Predicate>, constraints: Vec<Predicate>) -> Predicate {
    let overlay = Predicate::Or(constraints);
    match filter {
        Some(filter) if !filter.is_empty() => Predicate::And(vec![filter, overlay]),
        _ => overlay,
    }
}

/// Strip every leaf whose path is, or passes through, one of `restricted`.
///
/// Walks through `AND`, `OR` and `NOT`; combinators left without children
/// disappear. Returns `None` when nothing is left.
pub fn remove_restricted_fields(
    filter: Option<Predicate>,
    restricted: &[FieldPath],
) -> Option<Predicate> {
    let filter = filter?;
    if restricted.is_empty() {
        return (!filter.is_empty()).then_some(filter);
    }
    strip(filter, restricted)
}

fn strip(predicate: Predicate, restricted: &[FieldPath]) -> Option<Predicate> {
    match predicate {
        Predicate::Equals { ref path, .. } | Predicate::Operator { ref path, .. } => {
            let blocked = restricted.iter().any(|r| path.starts_with(r));
            (!blocked).then_some(predicate)
        }
        Predicate::And(children) => compose(
            children
                .into_iter()
                .filter_map(|child| strip(child, restricted))
                .collect(),
            Predicate::And,
        ),
        Predicate::Or(children) => compose(
            children
                .into_iter()
                .filter_map(|child| strip(child, restricted))
                .collect(),
            Predicate::Or,
        ),
        Predicate::Not(inner) => strip(*inner, restricted).map(Predicate::not),
    }
}

/// Force `path = value`, overwriting any top-level condition the caller put
/// on the same path.
pub fn assign_equals(filter: Option<Predicate>, path: FieldPath, value: Scalar) -> Predicate {
    let mut conjuncts: Vec<Predicate> = filter
        .map(Predicate::into_conjuncts)
        .unwrap_or_default()
        .into_iter()
        .filter(|conjunct| conjunct.path() != Some(&path))
        .collect();
    conjuncts.push(Predicate::Equals { path, value });
    compose(conjuncts, Predicate::And).unwrap_or_else(Predicate::empty)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::predicate::FieldFilter;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Predicate {
        Predicate::from_json(&value).unwrap()
    }

    #[test]
    fn merge_drops_empty_clauses() {
        assert_eq!(merge_where_and([None, Some(Predicate::empty())]), None);
        let only = parse(json!({"status": "OPEN"}));
        assert_eq!(
            merge_where_and([None, Some(only.clone()), Some(Predicate::empty())]),
            Some(only.clone())
        );
        assert_eq!(merge_where_or([Some(only.clone())]), Some(only));
    }

    #[test]
    fn merge_wraps_multiple_clauses() {
        let a = parse(json!({"status": "OPEN"}));
        let b = parse(json!({"department": "Eng"}));
        assert_eq!(
            merge_where_and([Some(a.clone()), Some(b.clone())]).unwrap().to_json(),
            json!({"AND": [{"status": "OPEN"}, {"department": "Eng"}]})
        );
        assert_eq!(
            merge_where_or([Some(a), Some(b)]).unwrap().to_json(),
            json!({"OR": [{"status": "OPEN"}, {"department": "Eng"}]})
        );
    }

    #[test]
    fn or_constraints_on_empty_filter() {
        let merged = add_or_constraints(None, vec![Predicate::eq("ownerId", "u1")]);
        assert_eq!(merged.to_json(), json!({"OR": [{"ownerId": "u1"}]}));

        let merged =
            add_or_constraints(Some(Predicate::empty()), vec![Predicate::eq("ownerId", "u1")]);
        assert_eq!(merged.to_json(), json!({"OR": [{"ownerId": "u1"}]}));
    }

    #[test]
    fn or_constraints_wrap_caller_or_instead_of_merging() {
        let caller = parse(json!({"OR": [{"status": "CLOSED"}, {"department": "Eng"}]}));
        let merged = add_or_constraints(
            Some(caller),
            vec![Predicate::eq("ownerId", "u1"), Predicate::eq("status", "OPEN")],
        );
        assert_eq!(
            merged.to_json(),
            json!({"AND": [
                {"OR": [{"status": "CLOSED"}, {"department": "Eng"}]},
                {"OR": [{"ownerId": "u1"}, {"status": "OPEN"}]}
            ]})
        );
    }

    #[test]
    fn overlay_cannot_be_bypassed_by_caller_or() {
        let caller = parse(json!({"OR": [{"status": "CLOSED"}, {"ownerId": "u2"}]}));
        let merged = add_or_constraints(Some(caller), vec![Predicate::eq("ownerId", "u1")]);

        let foreign_closed = json!({"status": "CLOSED", "ownerId": "u2"});
        let own_closed = json!({"status": "CLOSED", "ownerId": "u1"});
        let own_draft = json!({"status": "DRAFT", "ownerId": "u1"});

        assert!(!merged.matches(&foreign_closed));
        assert!(merged.matches(&own_closed));
        assert!(!merged.matches(&own_draft));
    }

    #[test]
    fn empty_constraint_list_matches_nothing() {
        let merged = add_or_constraints(Some(Predicate::eq("status", "OPEN")), Vec::new());
        assert!(!merged.matches(&json!({"status": "OPEN"})));
    }

    #[test]
    fn removes_restricted_top_level_keys() {
        let filter = parse(json!({"score": {"gte": 4}, "status": "NEW"}));
        let cleaned = remove_restricted_fields(Some(filter), &[FieldPath::from("score")]);
        assert_eq!(cleaned, Some(Predicate::eq("status", "NEW")));
    }

    #[test]
    fn removing_everything_yields_none() {
        let filter = parse(json!({"score": 5}));
        assert_eq!(remove_restricted_fields(Some(filter), &[FieldPath::from("score")]), None);
        assert_eq!(remove_restricted_fields(Some(Predicate::empty()), &[]), None);
        assert_eq!(remove_restricted_fields(None, &[FieldPath::from("score")]), None);
    }

    #[test]
    fn removes_nested_and_combinator_occurrences() {
        let filter = parse(json!({
            "OR": [{"reviewNotes": {"contains": "strong"}}, {"status": "NEW"}],
            "NOT": {"score": 1},
            "job": {"salaryMin": {"gte": 100000}, "title": "Engineer"}
        }));
        let restricted = [
            FieldPath::from("reviewNotes"),
            FieldPath::from("score"),
            FieldPath::from("job.salaryMin"),
        ];
        let cleaned = remove_restricted_fields(Some(filter), &restricted).unwrap();

        assert_eq!(
            cleaned.to_json(),
            json!({"AND": [{"status": "NEW"}, {"job": {"title": "Engineer"}}]})
        );
        let mut seen = Vec::new();
        cleaned.for_each_path(&mut |p| seen.push(p.clone()));
        assert!(seen.iter().all(|p| restricted.iter().all(|r| !p.starts_with(r))));
    }

    #[test]
    fn restricted_relation_removes_all_paths_through_it() {
        let filter = parse(json!({"owner": {"email": "x@example.com"}, "status": "OPEN"}));
        let cleaned = remove_restricted_fields(Some(filter), &[FieldPath::from("owner")]);
        assert_eq!(cleaned, Some(Predicate::eq("status", "OPEN")));
    }

    #[test]
    fn assign_overwrites_same_path_and_keeps_the_rest() {
        let filter = parse(json!({"candidateId": "someone-else", "status": "NEW"}));
        let assigned =
            assign_equals(Some(filter), FieldPath::from("candidateId"), Scalar::from("me"));
        assert_eq!(
            assigned.to_json(),
            json!({"AND": [{"status": "NEW"}, {"candidateId": "me"}]})
        );

        let assigned = assign_equals(None, FieldPath::from("id"), Scalar::from("me"));
        assert_eq!(assigned.to_json(), json!({"id": "me"}));
    }

    #[test]
    fn assign_keeps_caller_or_under_and() {
        let filter = parse(json!({"OR": [{"candidateId": "other"}, {"status": "NEW"}]}));
        let assigned =
            assign_equals(Some(filter), FieldPath::from("candidateId"), Scalar::from("me"));
        assert!(!assigned.matches(&json!({"candidateId": "other", "status": "NEW"})));
        assert!(assigned.matches(&json!({"candidateId": "me", "status": "NEW"})));
    }

    #[test]
    fn assign_drops_operator_on_same_path() {
        let filter = Predicate::op("status", FieldFilter::contains("CLO"));
        let assigned = assign_equals(Some(filter), FieldPath::from("status"), Scalar::from("OPEN"));
        assert_eq!(assigned, Predicate::eq("status", "OPEN"));
    }
}
