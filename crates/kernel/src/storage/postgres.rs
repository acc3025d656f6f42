//! PostgreSQL executor using SeaQuery.
//!
//! Predicates compile to WHERE conditions on the entity table aliased `e`.
//! A path through a relation becomes an `EXISTS` sub-select joined on the
//! relation's keys, so a to-many hop matches when any related row matches.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sea_query::extension::postgres::PgExpr;
use sea_query::{
    Alias, Asterisk, Cond, Expr, ExprTrait, Order, PostgresQueryBuilder, Query, SelectStatement,
    SimpleExpr,
};
use serde_json::Value;
use sqlx::PgPool;
use talentdesk_query::{FieldFilter, Predicate, QueryDescriptor, Scalar, SortDirection};

use super::{Storage, StoragePage};
use crate::schema::{EntitySchema, SchemaRegistry};

/// Alias of the queried entity table.
const MAIN: &str = "e";

#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
    registry: Arc<SchemaRegistry>,
    statement_timeout_secs: u64,
}

impl PgStorage {
    pub fn new(pool: PgPool, registry: Arc<SchemaRegistry>, statement_timeout_secs: u64) -> Self {
        Self {
            pool,
            registry,
            statement_timeout_secs,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// SELECT of one window, every field aliased to its wire name.
    pub fn build_select(&self, schema: &EntitySchema, query: &QueryDescriptor) -> Result<String> {
        let mut select = Query::select();
        for field in &schema.fields {
            select.expr_as(
                Expr::col((Alias::new(MAIN), Alias::new(field.column))),
                Alias::new(field.name),
            );
        }
        select.from_as(Alias::new(schema.table), Alias::new(MAIN));
        self.add_filter(&mut select, schema, query.filter.as_ref())?;

        let mut ordered_by_id = false;
        for key in query.order_by.iter().flat_map(|o| o.keys()) {
            let field = schema
                .field(key.path.leaf())
                .with_context(|| format!("`{}` has no field `{}`", schema.name, key.path))?;
            ordered_by_id |= field.name == "id";
            let order = match key.direction {
                SortDirection::Asc => Order::Asc,
                SortDirection::Desc => Order::Desc,
            };
            select.order_by((Alias::new(MAIN), Alias::new(field.column)), order);
        }
        // Stable windows need a total order.
        if !ordered_by_id && let Some(id) = schema.field("id") {
            select.order_by((Alias::new(MAIN), Alias::new(id.column)), Order::Asc);
        }

        if let Some(take) = query.take {
            select.limit(take);
        }
        if let Some(skip) = query.skip.filter(|skip| *skip > 0) {
            select.offset(skip);
        }

        Ok(select.to_string(PostgresQueryBuilder))
    }

    /// COUNT(*) of rows matching `filter`.
    pub fn build_count(&self, schema: &EntitySchema, filter: Option<&Predicate>) -> Result<String> {
        let mut select = Query::select();
        select.expr(Expr::col(Asterisk).count());
        select.from_as(Alias::new(schema.table), Alias::new(MAIN));
        self.add_filter(&mut select, schema, filter)?;
        Ok(select.to_string(PostgresQueryBuilder))
    }

    fn add_filter(
        &self,
        select: &mut SelectStatement,
        schema: &EntitySchema,
        filter: Option<&Predicate>,
    ) -> Result<()> {
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            let condition = ConditionBuilder::new(&self.registry).predicate(schema, MAIN, filter)?;
            select.and_where(condition);
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn fetch(&self, schema: &EntitySchema, query: &QueryDescriptor) -> Result<StoragePage> {
        let count_sql = self.build_count(schema, query.filter.as_ref())?;
        let main_sql = self.build_select(schema, query)?;

        // SET LOCAL only lasts for the transaction.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        sqlx::query(&format!(
            "SET LOCAL statement_timeout = '{}s'",
            self.statement_timeout_secs
        ))
        .execute(&mut *tx)
        .await
        .context("failed to set statement timeout")?;

        let total: i64 = sqlx::query_scalar(&count_sql)
            .fetch_one(&mut *tx)
            .await
            .context("failed to execute count query")?;

        let rows: Vec<Value> =
            sqlx::query_scalar(&format!("SELECT row_to_json(t) FROM ({main_sql}) t"))
                .fetch_all(&mut *tx)
                .await
                .context("failed to execute list query")?;

        tx.commit()
            .await
            .context("failed to commit list transaction")?;

        Ok(StoragePage {
            rows,
            total_count: u64::try_from(total).unwrap_or(0),
        })
    }

    async fn count(&self, schema: &EntitySchema, filter: Option<&Predicate>) -> Result<u64> {
        let sql = self.build_count(schema, filter)?;
        let total: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .context("failed to execute count query")?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn healthy(&self) -> bool {
        crate::db::check_health(&self.pool).await
    }
}

/// Compiles predicate trees into SeaQuery conditions.
struct ConditionBuilder<'a> {
    registry: &'a SchemaRegistry,
    aliases: usize,
}

impl<'a> ConditionBuilder<'a> {
    fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            aliases: 0,
        }
    }

    fn predicate(
        &mut self,
        schema: &EntitySchema,
        alias: &str,
        predicate: &Predicate,
    ) -> Result<SimpleExpr> {
        match predicate {
            Predicate::Equals { path, value } => {
                self.scoped(schema, alias, path.segments(), &|col| equals(col, value))
            }
            Predicate::Operator { path, filter } => {
                self.scoped(schema, alias, path.segments(), &|col| operator(col, filter))
            }
            Predicate::And(children) if children.is_empty() => Ok(Expr::cust("TRUE")),
            Predicate::Or(children) if children.is_empty() => Ok(Expr::cust("FALSE")),
            Predicate::And(children) => {
                let mut cond = Cond::all();
                for child in children {
                    cond = cond.add(self.predicate(schema, alias, child)?);
                }
                Ok(cond.into())
            }
            Predicate::Or(children) => {
                let mut cond = Cond::any();
                for child in children {
                    cond = cond.add(self.predicate(schema, alias, child)?);
                }
                Ok(cond.into())
            }
            Predicate::Not(inner) => Ok(self.predicate(schema, alias, inner)?.not()),
        }
    }

    /// Apply `leaf` to the column at the end of `segments`, wrapping one
    /// `EXISTS` per relation hop.
    fn scoped(
        &mut self,
        schema: &EntitySchema,
        alias: &str,
        segments: &[String],
        leaf: &dyn Fn(Expr) -> SimpleExpr,
    ) -> Result<SimpleExpr> {
        let Some((head, rest)) = segments.split_first() else {
            anyhow::bail!("empty field path");
        };

        if rest.is_empty() {
            let field = schema
                .field(head)
                .with_context(|| format!("`{}` has no field `{head}`", schema.name))?;
            return Ok(leaf(Expr::col((Alias::new(alias), Alias::new(field.column)))));
        }

        let relation = schema
            .relation(head)
            .with_context(|| format!("`{}` has no relation `{head}`", schema.name))?;
        let target = self
            .registry
            .get(relation.target)
            .with_context(|| format!("unknown entity `{}`", relation.target))?;
        let local = schema
            .field(relation.local_field)
            .with_context(|| format!("`{}` has no field `{}`", schema.name, relation.local_field))?;
        let foreign = target
            .field(relation.foreign_field)
            .with_context(|| {
                format!("`{}` has no field `{}`", target.name, relation.foreign_field)
            })?;

        self.aliases += 1;
        let sub_alias = format!("r{}", self.aliases);
        let inner = self.scoped(target, &sub_alias, rest, leaf)?;

        let mut sub = Query::select();
        sub.expr(Expr::val(1))
            .from_as(Alias::new(target.table), Alias::new(&sub_alias))
            .and_where(
                Expr::col((Alias::new(&sub_alias), Alias::new(foreign.column)))
                    .equals((Alias::new(alias), Alias::new(local.column))),
            )
            .and_where(inner);

        Ok(Expr::exists(sub))
    }
}

fn sql_value(value: &Scalar) -> sea_query::Value {
    match value {
        Scalar::Null => sea_query::Value::String(None),
        Scalar::Bool(b) => (*b).into(),
        Scalar::Int(i) => (*i).into(),
        Scalar::Float(f) => (*f).into(),
        Scalar::Text(s) => s.clone().into(),
    }
}

fn equals(col: Expr, value: &Scalar) -> SimpleExpr {
    match value {
        Scalar::Null => col.is_null(),
        other => col.eq(sql_value(other)),
    }
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn matches_pattern(col: Expr, pattern: String, insensitive: bool) -> SimpleExpr {
    if insensitive {
        col.ilike(pattern)
    } else {
        col.like(pattern)
    }
}

/// `col = value`, honouring `mode: insensitive` for text.
fn equal_to(col: &Expr, value: &Scalar, insensitive: bool) -> SimpleExpr {
    match value {
        Scalar::Text(text) if insensitive => {
            matches_pattern(col.clone(), escape_like_wildcards(text), true)
        }
        other => equals(col.clone(), other),
    }
}

fn operator(col: Expr, filter: &FieldFilter) -> SimpleExpr {
    let insensitive = filter.mode.is_insensitive();
    let mut cond = Cond::all();

    if let Some(value) = &filter.equals {
        cond = cond.add(equal_to(&col, value, insensitive));
    }

    if let Some(value) = &filter.not {
        cond = cond.add(match value {
            Scalar::Null => col.clone().is_not_null(),
            other => Cond::any()
                .add(equal_to(&col, other, insensitive).not())
                .add(col.clone().is_null())
                .into(),
        });
    }

    if let Some(list) = &filter.in_list {
        let mut any = Cond::any();
        if insensitive {
            for value in list {
                any = any.add(equal_to(&col, value, true));
            }
        } else {
            let values: Vec<sea_query::Value> = list
                .iter()
                .filter(|v| **v != Scalar::Null)
                .map(sql_value)
                .collect();
            if !values.is_empty() {
                any = any.add(col.clone().is_in(values));
            }
            if list.contains(&Scalar::Null) {
                any = any.add(col.clone().is_null());
            }
        }
        // An empty list matches nothing.
        cond = cond.add(if list.is_empty() {
            Expr::cust("FALSE")
        } else {
            any.into()
        });
    }

    if let Some(list) = &filter.not_in {
        let values: Vec<sea_query::Value> = list
            .iter()
            .filter(|v| **v != Scalar::Null)
            .map(sql_value)
            .collect();
        let excludes_null = list.contains(&Scalar::Null);
        let condition: SimpleExpr = match (values.is_empty(), excludes_null) {
            (true, false) => Expr::cust("TRUE"),
            (true, true) => col.clone().is_not_null(),
            (false, true) => col.clone().is_not_in(values),
            (false, false) => Cond::any()
                .add(col.clone().is_not_in(values))
                .add(col.clone().is_null())
                .into(),
        };
        cond = cond.add(condition);
    }

    if let Some(value) = &filter.lt {
        cond = cond.add(col.clone().lt(sql_value(value)));
    }
    if let Some(value) = &filter.lte {
        cond = cond.add(col.clone().lte(sql_value(value)));
    }
    if let Some(value) = &filter.gt {
        cond = cond.add(col.clone().gt(sql_value(value)));
    }
    if let Some(value) = &filter.gte {
        cond = cond.add(col.clone().gte(sql_value(value)));
    }

    if let Some(term) = &filter.contains {
        let pattern = format!("%{}%", escape_like_wildcards(term));
        cond = cond.add(matches_pattern(col.clone(), pattern, insensitive));
    }
    if let Some(term) = &filter.starts_with {
        let pattern = format!("{}%", escape_like_wildcards(term));
        cond = cond.add(matches_pattern(col.clone(), pattern, insensitive));
    }
    if let Some(term) = &filter.ends_with {
        let pattern = format!("%{}", escape_like_wildcards(term));
        cond = cond.add(matches_pattern(col.clone(), pattern, insensitive));
    }

    cond.into()
}
