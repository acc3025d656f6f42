//! Resource bounds: include-depth collapsing and take clamping.
//!
//! Neither transform fails. Over-limit requests are narrowed to the bound
//! and still answered.

use crate::types::{IncludeEntry, IncludeNode, IncludeTree, QueryDescriptor};

/// Include depth allowed when none is configured: one level of relations.
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 1;

/// Collapse every include node at depth `max_depth` or deeper to `true`.
///
/// Top-level entries sit at depth 0. A nested node below the limit keeps its
/// `select` and `where` and has its own `include` sanitized one level
/// deeper. `true`, `false` and `null` entries are returned unchanged.
pub fn sanitize_include(include: &IncludeTree, max_depth: usize) -> IncludeTree {
    sanitize_at(include, 0, max_depth)
}

fn sanitize_at(tree: &IncludeTree, depth: usize, max_depth: usize) -> IncludeTree {
    tree.iter()
        .map(|(relation, entry)| {
            let entry = match entry {
                IncludeEntry::Nested(_) if depth >= max_depth => IncludeEntry::Flag(true),
                IncludeEntry::Nested(node) => IncludeEntry::nested(IncludeNode {
                    include: node
                        .include
                        .as_ref()
                        .map(|child| sanitize_at(child, depth + 1, max_depth)),
                    select: node.select.clone(),
                    filter: node.filter.clone(),
                }),
                other => other.clone(),
            };
            (relation.clone(), entry)
        })
        .collect()
}

/// Nesting depth of an include tree, counted in nested `include` levels.
///
/// An absent or flat tree has depth 0; `{a: {include: {b: true}}}` has depth 1.
pub fn include_depth(include: &IncludeTree) -> usize {
    include
        .values()
        .filter_map(IncludeEntry::node)
        .filter_map(|node| node.include.as_ref())
        .map(|child| 1 + include_depth(child))
        .max()
        .unwrap_or(0)
}

/// Number of nested nodes `sanitize_include` would collapse.
pub fn collapsed_nodes(include: &IncludeTree, max_depth: usize) -> usize {
    fn walk(tree: &IncludeTree, depth: usize, max_depth: usize) -> usize {
        tree.values()
            .filter_map(IncludeEntry::node)
            .map(|node| {
                if depth >= max_depth {
                    1
                } else {
                    node.include
                        .as_ref()
                        .map_or(0, |child| walk(child, depth + 1, max_depth))
                }
            })
            .sum()
    }
    walk(include, 0, max_depth)
}

/// Upper bounds applied to a caller-supplied window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampLimits {
    pub max_take: u64,
}

impl Default for ClampLimits {
    fn default() -> Self {
        Self { max_take: 100 }
    }
}

/// Replace `take` with `min(take, max_take)`. An absent `take` stays absent.
pub fn clamp_query(mut query: QueryDescriptor, limits: ClampLimits) -> QueryDescriptor {
    if let Some(take) = query.take {
        query.take = Some(take.min(limits.max_take));
    }
    query
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::predicate::Predicate;
    use serde_json::json;

    fn tree(value: serde_json::Value) -> IncludeTree {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn collapses_nodes_at_the_limit() {
        let include = tree(json!({
            "applications": {
                "where": {"status": "NEW"},
                "select": {"id": true},
                "include": {
                    "candidate": {"include": {"applications": true}},
                    "job": true
                }
            }
        }));

        let sanitized = sanitize_include(&include, 1);

        assert_eq!(
            serde_json::to_value(&sanitized).unwrap(),
            json!({
                "applications": {
                    "include": {"candidate": true, "job": true},
                    "select": {"id": true},
                    "where": {"status": "NEW"}
                }
            })
        );
        assert_eq!(include_depth(&include), 2);
        assert_eq!(include_depth(&sanitized), 1);
        assert_eq!(collapsed_nodes(&include, 1), 1);
    }

    #[test]
    fn depth_zero_collapses_every_nested_entry() {
        let include = tree(json!({
            "owner": {"select": {"name": true}},
            "applications": true,
            "skipped": false,
            "missing": null
        }));
        let sanitized = sanitize_include(&include, 0);
        assert_eq!(
            serde_json::to_value(&sanitized).unwrap(),
            json!({"applications": true, "missing": null, "owner": true, "skipped": false})
        );
    }

    #[test]
    fn depth_never_exceeds_limit_and_never_grows() {
        let deep = tree(json!({
            "a": {"include": {"b": {"include": {"c": {"include": {"d": true}}}}}}
        }));
        for max in 0..5 {
            let sanitized = sanitize_include(&deep, max);
            assert_eq!(include_depth(&sanitized), include_depth(&deep).min(max));
        }
    }

    #[test]
    fn preserved_node_keeps_where_verbatim() {
        let mut include = IncludeTree::new();
        include.insert(
            "applications".to_string(),
            IncludeEntry::nested(IncludeNode {
                include: None,
                select: None,
                filter: Some(Predicate::eq("status", "NEW")),
            }),
        );
        let sanitized = sanitize_include(&include, 1);
        assert_eq!(sanitized, include);
    }

    #[test]
    fn sanitizing_is_deterministic() {
        let include = tree(json!({"a": {"include": {"b": {"include": {"c": true}}}}}));
        assert_eq!(sanitize_include(&include, 1), sanitize_include(&include, 1));
    }

    #[test]
    fn clamp_take() {
        let limits = ClampLimits { max_take: 100 };
        for (requested, expected) in [(500, 100), (100, 100), (10, 10), (0, 0)] {
            let q = clamp_query(QueryDescriptor::new().with_take(requested), limits);
            assert_eq!(q.take, Some(expected));
        }
        let q = clamp_query(QueryDescriptor::new().with_skip(40), limits);
        assert_eq!(q.take, None);
        assert_eq!(q.skip, Some(40));
    }
}
