//! Role-scoped query rewriting.
//!
//! The last step before storage. Each `(role, entity)` pair maps to one
//! [`ScopeRule`]: fields the role may not filter on and an [`Overlay`] that
//! is merged on top of whatever the caller asked for. Include trees are
//! scoped with the rule of the entity each node targets. Restricted fields
//! are also removed from the rows handed back to the caller.

use std::collections::HashSet;

use serde_json::Value;
use talentdesk_query::{
    FieldPath, IncludeEntry, IncludeNode, IncludeTree, OrderBy, Predicate, QueryDescriptor,
    Scalar, add_or_constraints, assign_equals, remove_restricted_fields,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{Caller, Role};
use crate::schema::{EntitySchema, SchemaRegistry};
use crate::storage::Storage;

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("role `{role}` may not read `{entity}`")]
    Forbidden { role: Role, entity: String },

    #[error("`{entity}` record `{id}` is not owned by the caller")]
    NotOwned { entity: String, id: String },

    #[error("ownership lookup failed")]
    Lookup(#[source] anyhow::Error),
}

/// Constraint merged into a role's queries on one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Overlay {
    PassThrough,
    /// Force `path = value`, replacing any caller condition on `path`.
    Assign { path: FieldPath, value: Scalar },
    /// Require at least one alternative, AND-wrapped over the caller's filter.
    AnyOf(Vec<Predicate>),
    /// Visible through ownership of a parent record. A caller-supplied
    /// `foreign_key` is checked against `parent` before `owner_path = caller`
    /// is assigned.
    ParentOwner {
        foreign_key: FieldPath,
        parent: &'static str,
        owner_field: &'static str,
        owner_path: FieldPath,
        owner: Scalar,
    },
    Deny,
}

impl Overlay {
    fn is_pass_through(&self) -> bool {
        matches!(self, Overlay::PassThrough)
    }

    /// Merge into `filter` without any ownership check.
    fn apply(&self, filter: Option<Predicate>) -> Option<Predicate> {
        match self {
            Overlay::PassThrough | Overlay::Deny => filter,
            Overlay::Assign { path, value } => {
                Some(assign_equals(filter, path.clone(), value.clone()))
            }
            Overlay::AnyOf(alternatives) => Some(add_or_constraints(filter, alternatives.clone())),
            Overlay::ParentOwner {
                owner_path, owner, ..
            } => Some(assign_equals(filter, owner_path.clone(), owner.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeRule {
    pub overlay: Overlay,
    /// Fields the role may not filter, sort on or read.
    pub restricted: Vec<FieldPath>,
}

impl ScopeRule {
    fn pass_through() -> Self {
        Self::with(Overlay::PassThrough)
    }

    fn with(overlay: Overlay) -> Self {
        Self {
            overlay,
            restricted: Vec::new(),
        }
    }

    fn restricting(mut self, fields: &[&str]) -> Self {
        self.restricted = fields.iter().map(|f| FieldPath::from(*f)).collect();
        self
    }
}

/// The rule for `caller` reading `entity`.
pub fn scope_rule(caller: &Caller, entity: &str) -> ScopeRule {
    let me = Scalar::Text(caller.id.to_string());

    match (caller.role, entity) {
        (Role::Admin, _) => ScopeRule::pass_through(),

        (Role::Recruiter, "jobs") => ScopeRule::with(Overlay::AnyOf(vec![
            Predicate::eq("ownerId", me),
            Predicate::eq("status", "OPEN"),
        ])),
        (Role::Recruiter, "applications") => ScopeRule::with(Overlay::ParentOwner {
            foreign_key: FieldPath::from("jobId"),
            parent: "jobs",
            owner_field: "ownerId",
            owner_path: FieldPath::from("job.ownerId"),
            owner: me,
        }),
        (Role::Recruiter, "candidates" | "users") => ScopeRule::pass_through(),

        (Role::Candidate, "jobs") => ScopeRule::with(Overlay::Assign {
            path: FieldPath::from("status"),
            value: Scalar::from("OPEN"),
        })
        .restricting(&["ownerId"]),
        (Role::Candidate, "applications") => ScopeRule::with(Overlay::Assign {
            path: FieldPath::from("candidateId"),
            value: me,
        })
        .restricting(&["score", "reviewNotes"]),
        (Role::Candidate, "candidates") => ScopeRule::with(Overlay::Assign {
            path: FieldPath::from("id"),
            value: me,
        }),

        _ => ScopeRule::with(Overlay::Deny),
    }
}

/// Rewrites descriptors for one caller.
pub struct RoleScope<'a> {
    registry: &'a SchemaRegistry,
    caller: Caller,
}

impl<'a> RoleScope<'a> {
    pub fn new(registry: &'a SchemaRegistry, caller: Caller) -> Self {
        Self { registry, caller }
    }

    /// Overlay the caller's constraints on `query` for `schema`.
    ///
    /// Restricted fields are stripped first, then includes are scoped,
    /// then the entity overlay is merged. Parent-ownership overlays check
    /// every parent id the caller pinned and fail if one is not theirs.
    pub async fn apply(
        &self,
        mut query: QueryDescriptor,
        schema: &EntitySchema,
        storage: &dyn Storage,
    ) -> Result<QueryDescriptor, ScopeError> {
        let rule = scope_rule(&self.caller, schema.name);
        if rule.overlay == Overlay::Deny {
            return Err(ScopeError::Forbidden {
                role: self.caller.role,
                entity: schema.name.to_string(),
            });
        }

        let filter = self.strip(schema, query.filter.take());

        if let Some(order_by) = query.order_by.take() {
            let keys: Vec<_> = order_by
                .0
                .into_iter()
                .filter(|key| !rule.restricted.contains(&key.path))
                .collect();
            query.order_by = (!keys.is_empty()).then_some(OrderBy(keys));
        }

        query.include = query
            .include
            .take()
            .map(|include| self.scope_include(schema, include));

        if let Overlay::ParentOwner {
            foreign_key,
            parent,
            owner_field,
            ..
        } = &rule.overlay
        {
            self.check_parent_ownership(
                filter.as_ref(),
                foreign_key,
                parent,
                owner_field,
                storage,
            )
            .await?;
        }

        query.filter = rule.overlay.apply(filter);
        Ok(query)
    }

    /// Drop every leaf the caller may not filter on: restricted fields of
    /// the entity owning the leaf, and any path walking into an entity the
    /// role does not read unconstrained.
    fn strip(&self, schema: &EntitySchema, filter: Option<Predicate>) -> Option<Predicate> {
        let filter = filter?;
        let mut blocked = Vec::new();
        filter.for_each_path(&mut |path| {
            if self.is_blocked(schema, path) {
                blocked.push(path.clone());
            }
        });

        if !blocked.is_empty() {
            debug!(
                entity = schema.name,
                role = %self.caller.role,
                fields = ?blocked.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "removing restricted filter fields"
            );
        }
        remove_restricted_fields(Some(filter), &blocked)
    }

    fn is_blocked(&self, schema: &EntitySchema, path: &FieldPath) -> bool {
        let mut owner = schema;
        for hop in path.relations() {
            let Some(target) = self.registry.target(owner, hop) else {
                return true;
            };
            if !scope_rule(&self.caller, target.name).overlay.is_pass_through() {
                return true;
            }
            owner = target;
        }

        let leaf = FieldPath::from(path.leaf());
        scope_rule(&self.caller, owner.name).restricted.contains(&leaf)
    }

    fn scope_include(&self, schema: &EntitySchema, include: IncludeTree) -> IncludeTree {
        include
            .into_iter()
            .filter_map(|(relation, entry)| {
                if !entry.is_requested() {
                    return Some((relation, entry));
                }
                let Some(target) = self.registry.target(schema, &relation) else {
                    return Some((relation, entry));
                };

                let rule = scope_rule(&self.caller, target.name);
                if rule.overlay == Overlay::Deny {
                    debug!(
                        relation = %relation,
                        role = %self.caller.role,
                        "dropping include the role may not read"
                    );
                    return None;
                }

                let node = match entry {
                    IncludeEntry::Nested(node) => *node,
                    _ => IncludeNode::default(),
                };
                let filter = rule.overlay.apply(self.strip(target, node.filter));
                let include = node.include.map(|child| self.scope_include(target, child));

                let entry = if filter.is_none() && include.is_none() && node.select.is_none() {
                    IncludeEntry::Flag(true)
                } else {
                    IncludeEntry::nested(IncludeNode {
                        include,
                        select: node.select,
                        filter,
                    })
                };
                Some((relation, entry))
            })
            .collect()
    }

    async fn check_parent_ownership(
        &self,
        filter: Option<&Predicate>,
        foreign_key: &FieldPath,
        parent: &str,
        owner_field: &str,
        storage: &dyn Storage,
    ) -> Result<(), ScopeError> {
        let ids = pinned_values(filter, foreign_key);
        if ids.is_empty() {
            return Ok(());
        }

        let Some(parent_schema) = self.registry.get(parent) else {
            return Err(ScopeError::Lookup(anyhow::anyhow!("unknown entity `{parent}`")));
        };

        for id in ids {
            let owned = Predicate::And(vec![
                Predicate::eq("id", id.clone()),
                Predicate::eq(owner_field, self.caller.id.to_string()),
            ]);
            let count = storage
                .count(parent_schema, Some(&owned))
                .await
                .map_err(ScopeError::Lookup)?;

            if count == 0 {
                warn!(
                    entity = parent,
                    id = %id,
                    caller = %self.caller.id,
                    "referenced record is not owned by caller"
                );
                return Err(ScopeError::NotOwned {
                    entity: parent.to_string(),
                    id,
                });
            }
        }

        Ok(())
    }
}

/// Distinct non-null values the top-level conjuncts pin `path` to.
fn pinned_values(filter: Option<&Predicate>, path: &FieldPath) -> Vec<String> {
    let conjuncts: Vec<&Predicate> = match filter {
        Some(Predicate::And(children)) => children.iter().collect(),
        Some(other) => vec![other],
        None => Vec::new(),
    };

    let mut seen = HashSet::new();
    conjuncts
        .into_iter()
        .flat_map(|conjunct| match conjunct {
            Predicate::Equals { path: p, value } if p == path => vec![value.clone()],
            Predicate::Operator { path: p, filter } if p == path => filter.pinned_values(),
            _ => Vec::new(),
        })
        .filter_map(|value| value.as_string())
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

/// Remove the fields `caller` may not read from `row` and from every
/// related row embedded under a relation key.
pub fn redact_row(
    registry: &SchemaRegistry,
    caller: &Caller,
    schema: &EntitySchema,
    row: &mut Value,
) {
    let Value::Object(map) = row else {
        return;
    };
    for field in &scope_rule(caller, schema.name).restricted {
        map.remove(field.leaf());
    }

    for relation in &schema.relations {
        let Some(target) = registry.get(relation.target) else {
            continue;
        };
        match map.get_mut(relation.name) {
            Some(Value::Array(children)) => {
                for child in children {
                    redact_row(registry, caller, target, child);
                }
            }
            Some(child) if child.is_object() => redact_row(registry, caller, target, child),
            _ => {}
        }
    }
}

/// Apply the role rules of `caller` to `query` on `schema`.
pub async fn apply_role_constraints(
    query: QueryDescriptor,
    caller: &Caller,
    schema: &EntitySchema,
    registry: &SchemaRegistry,
    storage: &dyn Storage,
) -> Result<QueryDescriptor, ScopeError> {
    RoleScope::new(registry, *caller)
        .apply(query, schema, storage)
        .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    struct Fixture {
        registry: Arc<SchemaRegistry>,
        storage: MemoryStorage,
        recruiter: Caller,
        candidate: Caller,
        own_job: String,
        other_job: String,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(SchemaRegistry::ats_default());
        let storage = MemoryStorage::new(registry.clone());
        let recruiter = Caller::new(Uuid::now_v7(), Role::Recruiter);
        let candidate = Caller::new(Uuid::now_v7(), Role::Candidate);
        let own_job = Uuid::now_v7().to_string();
        let other_job = Uuid::now_v7().to_string();
        storage.extend(
            "jobs",
            [
                json!({"id": own_job, "ownerId": recruiter.id.to_string(), "status": "OPEN"}),
                json!({"id": other_job, "ownerId": Uuid::now_v7().to_string(), "status": "OPEN"}),
            ],
        );
        Fixture {
            registry,
            storage,
            recruiter,
            candidate,
            own_job,
            other_job,
        }
    }

    fn query(value: serde_json::Value) -> QueryDescriptor {
        serde_json::from_value(value).unwrap()
    }

    fn where_of(value: serde_json::Value) -> Option<Predicate> {
        Some(Predicate::from_json(&value).unwrap())
    }

    async fn apply(
        f: &Fixture,
        caller: Caller,
        entity: &str,
        q: serde_json::Value,
    ) -> Result<QueryDescriptor, ScopeError> {
        let schema = f.registry.get(entity).unwrap();
        apply_role_constraints(query(q), &caller, schema, &f.registry, &f.storage).await
    }

    #[tokio::test]
    async fn admin_is_pass_through() {
        let f = fixture();
        let admin = Caller::new(Uuid::now_v7(), Role::Admin);
        let body = json!({
            "where": {"OR": [{"status": "X"}, {"score": {"gt": 3}}]},
            "include": {"job": {"include": {"owner": true}}},
            "take": 10
        });
        let resolved = apply(&f, admin, "applications", body.clone()).await.unwrap();
        assert_eq!(resolved, query(body));
    }

    #[tokio::test]
    async fn recruiter_or_cannot_bypass_job_visibility() {
        let f = fixture();
        let me = f.recruiter.id.to_string();
        let resolved = apply(&f, f.recruiter, "jobs", json!({"where": {"OR": [{"status": "X"}]}}))
            .await
            .unwrap();

        assert_eq!(
            resolved.filter,
            where_of(json!({"AND": [
                {"OR": [{"status": "X"}]},
                {"OR": [{"ownerId": me}, {"status": "OPEN"}]}
            ]}))
        );

        let row = json!({"status": "X", "ownerId": Uuid::now_v7().to_string()});
        assert!(!resolved.filter.unwrap().matches(&row));
    }

    #[tokio::test]
    async fn recruiter_applications_are_scoped_to_owned_jobs() {
        let f = fixture();
        let me = f.recruiter.id.to_string();

        let resolved = apply(&f, f.recruiter, "applications", json!({"where": {"status": "NEW"}}))
            .await
            .unwrap();
        assert_eq!(
            resolved.filter,
            where_of(json!({"AND": [{"status": "NEW"}, {"job": {"ownerId": me}}]}))
        );

        let body = json!({"where": {"jobId": f.own_job}});
        let resolved = apply(&f, f.recruiter, "applications", body).await.unwrap();
        assert_eq!(
            resolved.filter,
            where_of(json!({"AND": [{"jobId": f.own_job}, {"job": {"ownerId": me}}]}))
        );
    }

    #[tokio::test]
    async fn recruiter_parent_check_rejects_foreign_parent() {
        let f = fixture();

        let body = json!({"where": {"jobId": f.other_job}});
        let err = apply(&f, f.recruiter, "applications", body).await.unwrap_err();
        assert!(matches!(
            err,
            ScopeError::NotOwned { ref entity, ref id } if entity == "jobs" && *id == f.other_job
        ));

        let err = apply(
            &f,
            f.recruiter,
            "applications",
            json!({"where": {"jobId": {"in": [f.own_job, f.other_job]}}}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ScopeError::NotOwned { .. }));
    }

    #[tokio::test]
    async fn candidate_restricted_fields_are_removed_and_identity_forced() {
        let f = fixture();
        let me = f.candidate.id.to_string();
        let someone_else = Uuid::now_v7().to_string();

        let resolved = apply(
            &f,
            f.candidate,
            "applications",
            json!({
                "where": {
                    "candidateId": someone_else,
                    "OR": [{"score": {"gt": 4}}, {"status": "NEW"}],
                    "reviewNotes": {"contains": "strong"}
                },
                "orderBy": [{"score": "desc"}, {"createdAt": "asc"}]
            }),
        )
        .await
        .unwrap();

        assert_eq!(
            resolved.filter,
            where_of(json!({"AND": [{"status": "NEW"}, {"candidateId": me}]}))
        );
        assert_eq!(
            resolved.order_by,
            Some(serde_json::from_value(json!({"createdAt": "asc"})).unwrap())
        );
    }

    #[tokio::test]
    async fn candidate_jobs_are_open_only() {
        let f = fixture();
        let resolved = apply(
            &f,
            f.candidate,
            "jobs",
            json!({"where": {"status": "CLOSED", "ownerId": f.recruiter.id.to_string()}}),
        )
        .await
        .unwrap();
        assert_eq!(resolved.filter, where_of(json!({"status": "OPEN"})));
    }

    #[tokio::test]
    async fn relation_filters_cannot_read_around_overlays() {
        let f = fixture();
        let resolved = apply(
            &f,
            f.candidate,
            "jobs",
            json!({"where": {"applications": {"candidateId": Uuid::now_v7().to_string()}}}),
        )
        .await
        .unwrap();
        assert_eq!(resolved.filter, where_of(json!({"status": "OPEN"})));
    }

    #[tokio::test]
    async fn includes_are_scoped_by_target_rule() {
        let f = fixture();
        let me = f.candidate.id.to_string();

        let resolved = apply(
            &f,
            f.candidate,
            "jobs",
            json!({"include": {
                "owner": true,
                "applications": {"where": {"score": {"gt": 1}}, "select": {"id": true}}
            }}),
        )
        .await
        .unwrap();

        let include = resolved.include.unwrap();
        assert!(!include.contains_key("owner"));
        let node = include["applications"].node().unwrap();
        assert_eq!(node.filter, where_of(json!({"candidateId": me})));
        assert_eq!(node.select.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recruiter_included_applications_use_parent_ownership() {
        let f = fixture();
        let me = f.recruiter.id.to_string();

        let resolved = apply(
            &f,
            f.recruiter,
            "candidates",
            json!({"include": {"applications": true}}),
        )
        .await
        .unwrap();

        let include = resolved.include.unwrap();
        assert_eq!(
            include["applications"].node().unwrap().filter,
            where_of(json!({"job": {"ownerId": me}}))
        );
        assert_eq!(resolved.filter, None);
    }

    #[tokio::test]
    async fn denied_entity_is_forbidden() {
        let f = fixture();
        let err = apply(&f, f.candidate, "users", json!({})).await.unwrap_err();
        assert!(matches!(err, ScopeError::Forbidden { role: Role::Candidate, .. }));
    }

    #[test]
    fn redaction_strips_restricted_fields_at_every_level() {
        let registry = SchemaRegistry::ats_default();
        let candidate = Caller::new(Uuid::now_v7(), Role::Candidate);
        let admin = Caller::new(Uuid::now_v7(), Role::Admin);
        let applications = registry.get("applications").unwrap();
        let row = json!({
            "id": "a1",
            "status": "NEW",
            "score": 4.5,
            "reviewNotes": "strong",
            "job": {"id": "j1", "title": "Rust", "ownerId": "u1"}
        });

        let mut seen = row.clone();
        redact_row(&registry, &candidate, applications, &mut seen);
        assert_eq!(
            seen,
            json!({"id": "a1", "status": "NEW", "job": {"id": "j1", "title": "Rust"}})
        );

        let mut seen = row.clone();
        redact_row(&registry, &admin, applications, &mut seen);
        assert_eq!(seen, row);

        let candidates = registry.get("candidates").unwrap();
        let mut seen = json!({"id": "c1", "applications": [{"id": "a1", "score": 1}]});
        redact_row(&registry, &candidate, candidates, &mut seen);
        assert_eq!(seen, json!({"id": "c1", "applications": [{"id": "a1"}]}));
    }
}
