//! Shape validation of a descriptor against an entity schema.

use talentdesk_query::{FieldFilter, IncludeTree, Predicate, QueryDescriptor, Scalar, Select};

use super::{EntitySchema, FieldKind, SchemaRegistry};

/// Check every path, operator and value in `query` against `schema`.
///
/// Returns a list of validation errors. Empty list means valid.
pub fn validate_query(
    registry: &SchemaRegistry,
    schema: &EntitySchema,
    query: &QueryDescriptor,
) -> Vec<String> {
    let mut errors = Vec::new();

    if let Some(filter) = &query.filter {
        check_predicate(registry, schema, filter, "where", &mut errors);
    }

    if let Some(order_by) = &query.order_by {
        for key in order_by.keys() {
            if key.path.is_nested() {
                errors.push(format!(
                    "orderBy: `{}` is not a field of `{}`; sorting through relations is not supported",
                    key.path, schema.name
                ));
            } else if schema.field(key.path.leaf()).is_none() {
                errors.push(format!("orderBy: `{}` has no field `{}`", schema.name, key.path));
            }
        }
    }

    if let Some(select) = &query.select {
        check_select(schema, select, "select", &mut errors);
    }

    if let Some(include) = &query.include {
        check_include(registry, schema, include, "include", &mut errors);
    }

    errors
}

fn check_select(schema: &EntitySchema, select: &Select, at: &str, errors: &mut Vec<String>) {
    for name in select.keys() {
        if schema.field(name).is_none() {
            errors.push(format!("{at}: `{}` has no field `{name}`", schema.name));
        }
    }
}

fn check_include(
    registry: &SchemaRegistry,
    schema: &EntitySchema,
    include: &IncludeTree,
    at: &str,
    errors: &mut Vec<String>,
) {
    for (relation, entry) in include {
        let Some(target) = registry.target(schema, relation) else {
            errors.push(format!("{at}: `{}` has no relation `{relation}`", schema.name));
            continue;
        };

        let Some(node) = entry.node() else {
            continue;
        };
        let at = format!("{at}.{relation}");
        if let Some(filter) = &node.filter {
            check_predicate(registry, target, filter, &format!("{at}.where"), errors);
        }
        if let Some(select) = &node.select {
            check_select(target, select, &format!("{at}.select"), errors);
        }
        if let Some(child) = &node.include {
            check_include(registry, target, child, &format!("{at}.include"), errors);
        }
    }
}

fn check_predicate(
    registry: &SchemaRegistry,
    schema: &EntitySchema,
    predicate: &Predicate,
    at: &str,
    errors: &mut Vec<String>,
) {
    match predicate {
        Predicate::Equals { path, value } => {
            match registry.resolve(schema, path.segments()) {
                Ok(resolved) => {
                    if let Err(e) = check_value(resolved.field.kind, value, true) {
                        errors.push(format!("{at}: `{path}` {e}"));
                    }
                }
                Err(e) => errors.push(format!("{at}: {e}")),
            }
        }
        Predicate::Operator { path, filter } => match registry.resolve(schema, path.segments()) {
            Ok(resolved) => {
                for e in check_filter(resolved.field.kind, filter) {
                    errors.push(format!("{at}: `{path}` {e}"));
                }
            }
            Err(e) => errors.push(format!("{at}: {e}")),
        },
        Predicate::And(children) | Predicate::Or(children) => {
            for child in children {
                check_predicate(registry, schema, child, at, errors);
            }
        }
        Predicate::Not(inner) => check_predicate(registry, schema, inner, at, errors),
    }
}

fn check_filter(kind: FieldKind, filter: &FieldFilter) -> Vec<String> {
    let mut errors = Vec::new();

    if !kind.is_text() && (filter.uses_text_matching() || filter.mode.is_insensitive()) {
        errors.push("only text fields support contains, startsWith, endsWith and mode".to_string());
    }

    let nullable = [("equals", &filter.equals), ("not", &filter.not)];
    for (op, value) in nullable {
        if let Some(value) = value
            && let Err(e) = check_value(kind, value, true)
        {
            errors.push(format!("{op}: {e}"));
        }
    }

    let ordered = [
        ("lt", &filter.lt),
        ("lte", &filter.lte),
        ("gt", &filter.gt),
        ("gte", &filter.gte),
    ];
    for (op, value) in ordered {
        if let Some(value) = value
            && let Err(e) = check_value(kind, value, false)
        {
            errors.push(format!("{op}: {e}"));
        }
    }

    for (op, list) in [("in", &filter.in_list), ("notIn", &filter.not_in)] {
        for value in list.iter().flatten() {
            if let Err(e) = check_value(kind, value, false) {
                errors.push(format!("{op}: {e}"));
            }
        }
    }

    errors
}

/// Whether `value` can be compared with a field of `kind`.
fn check_value(kind: FieldKind, value: &Scalar, allow_null: bool) -> Result<(), String> {
    let ok = match (kind, value) {
        (_, Scalar::Null) => allow_null,
        (FieldKind::Text, Scalar::Text(_)) => true,
        (FieldKind::Integer, Scalar::Int(_)) => true,
        (FieldKind::Decimal, Scalar::Int(_) | Scalar::Float(_)) => true,
        (FieldKind::Bool, Scalar::Bool(_)) => true,
        (FieldKind::Timestamp, Scalar::Text(text)) => {
            chrono::DateTime::parse_from_rfc3339(text).is_ok()
        }
        (FieldKind::Uuid, Scalar::Text(text)) => uuid::Uuid::parse_str(text).is_ok(),
        _ => false,
    };

    if ok {
        Ok(())
    } else {
        Err(format!("expects a {} value", kind_name(kind)))
    }
}

fn kind_name(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text => "text",
        FieldKind::Integer => "integer",
        FieldKind::Decimal => "numeric",
        FieldKind::Bool => "boolean",
        FieldKind::Timestamp => "RFC 3339 timestamp",
        FieldKind::Uuid => "uuid",
    }
}
