//! Entity schema registry.
//!
//! Describes the listable entities, their columns and the relations a
//! query may traverse. Wire names are camelCase; columns are snake_case.

mod validate;

use std::collections::BTreeMap;

pub use validate::validate_query;

/// Storage type of a field, used to check filter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Decimal,
    Bool,
    Timestamp,
    Uuid,
}

impl FieldKind {
    pub fn is_text(self) -> bool {
        self == FieldKind::Text
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
}

/// A traversable link to another entity.
///
/// A row relates to every `target` row whose `foreign_field` equals its
/// own `local_field`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub name: &'static str,
    pub target: &'static str,
    pub local_field: &'static str,
    pub foreign_field: &'static str,
    /// Singular relations embed an object (or null), to-many ones an array.
    pub singular: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    pub name: &'static str,
    pub table: &'static str,
    pub fields: Vec<FieldDef>,
    pub relations: Vec<Relation>,
    /// Include-only entities have no list endpoint.
    pub listable: bool,
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }
}

/// Where a dotted path ends up after following its relation hops.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedPath<'a> {
    /// Relations traversed, in order.
    pub hops: &'a [String],
    /// Entity owning the leaf field.
    pub owner: &'a EntitySchema,
    pub field: &'a FieldDef,
}

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entities: BTreeMap<&'static str, EntitySchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: EntitySchema) {
        self.entities.insert(schema.name, schema);
    }

    pub fn get(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.get(name)
    }

    /// Entity behind a list endpoint; include-only entities are hidden.
    pub fn listable(&self, name: &str) -> Option<&EntitySchema> {
        self.get(name).filter(|schema| schema.listable)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntitySchema> {
        self.entities.values()
    }

    /// Target entity of `relation` on `schema`.
    pub fn target(&self, schema: &EntitySchema, relation: &str) -> Option<&EntitySchema> {
        schema.relation(relation).and_then(|r| self.get(r.target))
    }

    /// Follow `segments` from `schema`: every segment but the last must be
    /// a relation, the last a field of the entity reached.
    pub fn resolve<'a>(
        &'a self,
        schema: &'a EntitySchema,
        segments: &'a [String],
    ) -> Result<ResolvedPath<'a>, String> {
        let Some((leaf, hops)) = segments.split_last() else {
            return Err("empty field path".to_string());
        };

        let mut owner = schema;
        for hop in hops {
            owner = self
                .target(owner, hop)
                .ok_or_else(|| format!("`{}` has no relation `{hop}`", owner.name))?;
        }

        let field = owner
            .field(leaf)
            .ok_or_else(|| format!("`{}` has no field `{leaf}`", owner.name))?;

        Ok(ResolvedPath {
            hops,
            owner,
            field,
        })
    }

    /// The applicant-tracking schema: jobs, applications, candidates and
    /// the include-only users table.
    pub fn ats_default() -> Self {
        use FieldKind::*;

        let field = |name, column, kind| FieldDef { name, column, kind };

        let mut registry = Self::new();

        registry.register(EntitySchema {
            name: "jobs",
            table: "jobs",
            fields: vec![
                field("id", "id", Uuid),
                field("title", "title", Text),
                field("description", "description", Text),
                field("department", "department", Text),
                field("location", "location", Text),
                field("status", "status", Text),
                field("salaryMin", "salary_min", Integer),
                field("salaryMax", "salary_max", Integer),
                field("ownerId", "owner_id", Uuid),
                field("createdAt", "created_at", Timestamp),
            ],
            relations: vec![
                Relation {
                    name: "owner",
                    target: "users",
                    local_field: "ownerId",
                    foreign_field: "id",
                    singular: true,
                },
                Relation {
                    name: "applications",
                    target: "applications",
                    local_field: "id",
                    foreign_field: "jobId",
                    singular: false,
                },
            ],
            listable: true,
        });

        registry.register(EntitySchema {
            name: "applications",
            table: "applications",
            fields: vec![
                field("id", "id", Uuid),
                field("jobId", "job_id", Uuid),
                field("candidateId", "candidate_id", Uuid),
                field("status", "status", Text),
                field("score", "score", Decimal),
                field("reviewNotes", "review_notes", Text),
                field("createdAt", "created_at", Timestamp),
            ],
            relations: vec![
                Relation {
                    name: "job",
                    target: "jobs",
                    local_field: "jobId",
                    foreign_field: "id",
                    singular: true,
                },
                Relation {
                    name: "candidate",
                    target: "candidates",
                    local_field: "candidateId",
                    foreign_field: "id",
                    singular: true,
                },
            ],
            listable: true,
        });

        registry.register(EntitySchema {
            name: "candidates",
            table: "candidates",
            fields: vec![
                field("id", "id", Uuid),
                field("firstName", "first_name", Text),
                field("lastName", "last_name", Text),
                field("email", "email", Text),
                field("phone", "phone", Text),
                field("createdAt", "created_at", Timestamp),
            ],
            relations: vec![Relation {
                name: "applications",
                target: "applications",
                local_field: "id",
                foreign_field: "candidateId",
                singular: false,
            }],
            listable: true,
        });

        registry.register(EntitySchema {
            name: "users",
            table: "users",
            fields: vec![
                field("id", "id", Uuid),
                field("name", "name", Text),
                field("email", "email", Text),
                field("role", "role", Text),
            ],
            relations: Vec::new(),
            listable: false,
        });

        registry
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use talentdesk_query::FieldPath;

    #[test]
    fn relations_point_at_registered_entities() {
        let registry = SchemaRegistry::ats_default();
        for schema in registry.entities() {
            for relation in &schema.relations {
                let target = registry.get(relation.target).unwrap();
                assert!(schema.field(relation.local_field).is_some(), "{}", relation.name);
                assert!(target.field(relation.foreign_field).is_some(), "{}", relation.name);
            }
        }
    }

    #[test]
    fn users_are_include_only() {
        let registry = SchemaRegistry::ats_default();
        assert!(registry.get("users").is_some());
        assert!(registry.listable("users").is_none());
        assert!(registry.listable("jobs").is_some());
    }

    #[test]
    fn resolves_paths_through_relations() {
        let registry = SchemaRegistry::ats_default();
        let applications = registry.get("applications").unwrap();

        let path = FieldPath::parse("job.owner.email").unwrap();
        let resolved = registry.resolve(applications, path.segments()).unwrap();
        assert_eq!(resolved.owner.name, "users");
        assert_eq!(resolved.field.column, "email");
        assert_eq!(resolved.hops.len(), 2);

        let bad = FieldPath::parse("job.salary").unwrap();
        assert_eq!(
            registry.resolve(applications, bad.segments()).unwrap_err(),
            "`jobs` has no field `salary`"
        );
        let bad = FieldPath::parse("employer.name").unwrap();
        assert!(registry.resolve(applications, bad.segments()).is_err());
    }
}
