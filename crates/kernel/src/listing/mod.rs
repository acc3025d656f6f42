//! The list pipeline.
//!
//! Every list request runs the same steps in the same order:
//! 1. Validation of paths, operators and values against the entity schema
//! 2. Include depth collapsing
//! 3. `take` clamping and window defaults
//! 4. Role-scoped rewriting
//! 5. Storage fetch, batched include loading and `select` projection
//! 6. Removal of fields the caller's role may not read

mod includes;

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use talentdesk_query::{
    ClampLimits, PaginatedResponse, Predicate, QueryDescriptor, clamp_query, collapsed_nodes,
    merge_where_and, sanitize_include,
};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub use includes::{CHILD_LIMIT, load_includes, project};

use crate::config::Config;
use crate::metrics::Metrics;
use crate::models::Caller;
use crate::schema::{EntitySchema, SchemaRegistry, validate_query};
use crate::scope::{ScopeError, apply_role_constraints, redact_row};
use crate::storage::Storage;

#[derive(Debug, Error)]
pub enum ListError {
    #[error("unknown entity `{0}`")]
    UnknownEntity(String),

    #[error("invalid query: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("record not found")]
    NotFound,
}

/// Resource bounds applied to every list request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListLimits {
    pub max_take: u64,
    pub default_take: u64,
    pub max_include_depth: usize,
}

impl Default for ListLimits {
    fn default() -> Self {
        Self {
            max_take: 100,
            default_take: 20,
            max_include_depth: 1,
        }
    }
}

impl From<&Config> for ListLimits {
    fn from(config: &Config) -> Self {
        Self {
            max_take: config.query_max_take,
            default_take: config.query_default_take,
            max_include_depth: config.query_max_include_depth,
        }
    }
}

pub struct ListService {
    registry: Arc<SchemaRegistry>,
    storage: Arc<dyn Storage>,
    limits: ListLimits,
    metrics: Arc<Metrics>,
}

impl ListService {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        storage: Arc<dyn Storage>,
        limits: ListLimits,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            storage,
            limits,
            metrics,
        }
    }

    pub fn limits(&self) -> ListLimits {
        self.limits
    }

    fn schema(&self, entity: &str) -> Result<&EntitySchema, ListError> {
        self.registry
            .listable(entity)
            .ok_or_else(|| ListError::UnknownEntity(entity.to_string()))
    }

    /// Run steps 1 to 4 and return the descriptor storage will execute.
    pub async fn resolve(
        &self,
        entity: &str,
        caller: &Caller,
        mut query: QueryDescriptor,
    ) -> Result<QueryDescriptor, ListError> {
        let schema = self.schema(entity)?;

        let errors = validate_query(&self.registry, schema, &query);
        if !errors.is_empty() {
            debug!(entity, ?errors, "rejected list query");
            return Err(ListError::Invalid(errors));
        }

        if let Some(include) = &query.include {
            let collapsed = collapsed_nodes(include, self.limits.max_include_depth);
            if collapsed > 0 {
                warn!(
                    entity,
                    collapsed,
                    max_depth = self.limits.max_include_depth,
                    "include depth exceeds maximum, collapsing"
                );
                self.metrics
                    .record_include_collapsed(entity, collapsed as u64);
            }
            query.include = Some(sanitize_include(include, self.limits.max_include_depth));
        }

        if let Some(take) = query.take
            && take > self.limits.max_take
        {
            warn!(
                entity,
                requested = take,
                capped = self.limits.max_take,
                "take exceeds maximum, capping"
            );
            self.metrics.record_take_clamped(entity);
        }
        let mut query = clamp_query(
            query,
            ClampLimits {
                max_take: self.limits.max_take,
            },
        );
        query.skip.get_or_insert(0);
        query
            .take
            .get_or_insert(self.limits.default_take.min(self.limits.max_take));

        apply_role_constraints(query, caller, schema, &self.registry, self.storage.as_ref())
            .await
            .map_err(|e| {
                if let ScopeError::Forbidden { role, .. } = &e {
                    self.metrics.record_scope_denied(entity, role.as_str());
                }
                ListError::Scope(e)
            })
    }

    /// One page of `entity` as seen by `caller`.
    pub async fn list(
        &self,
        entity: &str,
        caller: &Caller,
        query: QueryDescriptor,
    ) -> Result<PaginatedResponse<Value>, ListError> {
        let query = self.resolve(entity, caller, query).await?;
        let schema = self.schema(entity)?;

        let started = Instant::now();
        let page = self
            .storage
            .fetch(schema, &query)
            .await
            .map_err(ListError::Storage)?;

        let mut rows = page.rows;
        if let Some(include) = &query.include
            && !rows.is_empty()
        {
            load_includes(
                self.storage.as_ref(),
                &self.registry,
                schema,
                &mut rows,
                include,
                0,
                self.limits.max_include_depth,
            )
            .await
            .map_err(ListError::Storage)?;
        }
        self.metrics
            .record_list_query(started.elapsed().as_secs_f64());

        let data = rows
            .into_iter()
            .map(|row| {
                let mut row = project(row, query.select.as_ref(), query.include.as_ref());
                redact_row(&self.registry, caller, schema, &mut row);
                row
            })
            .collect();

        Ok(PaginatedResponse {
            data,
            count: page.total_count,
            query,
        })
    }

    /// A single record, if `caller` can see it.
    ///
    /// The role overlay is ANDed with the id filter, so records outside the
    /// caller's scope are indistinguishable from missing ones.
    pub async fn get(&self, entity: &str, caller: &Caller, id: Uuid) -> Result<Value, ListError> {
        let scoped = self.resolve(entity, caller, QueryDescriptor::new()).await?;
        let schema = self.schema(entity)?;

        let query = QueryDescriptor {
            filter: merge_where_and([Some(Predicate::eq("id", id.to_string())), scoped.filter]),
            skip: Some(0),
            take: Some(1),
            ..Default::default()
        };

        let page = self
            .storage
            .fetch(schema, &query)
            .await
            .map_err(ListError::Storage)?;

        let mut row = page.rows.into_iter().next().ok_or(ListError::NotFound)?;
        redact_row(&self.registry, caller, schema, &mut row);
        Ok(row)
    }
}
