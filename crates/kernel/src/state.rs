//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::listing::{ListLimits, ListService};
use crate::metrics::Metrics;
use crate::schema::SchemaRegistry;
use crate::services::TokenService;
use crate::storage::{PgStorage, Storage};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Entities, fields and relations exposed by the list endpoints.
    registry: Arc<SchemaRegistry>,

    /// Row source for list queries and ownership checks.
    storage: Arc<dyn Storage>,

    /// The list pipeline.
    lists: ListService,

    /// Prometheus metrics.
    metrics: Arc<Metrics>,

    /// Bearer token verification.
    tokens: TokenService,
}

impl AppState {
    /// Create application state backed by PostgreSQL.
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = db::create_pool(config)
            .await
            .context("failed to create database pool")?;
        info!("Connected to PostgreSQL");

        let registry = Arc::new(SchemaRegistry::ats_default());
        let storage = Arc::new(PgStorage::new(
            pool,
            registry.clone(),
            config.statement_timeout_secs,
        ));

        Ok(Self::with_storage(config, registry, storage))
    }

    /// Create application state over an existing storage backend.
    pub fn with_storage(
        config: &Config,
        registry: Arc<SchemaRegistry>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let metrics = Arc::new(Metrics::new());
        let lists = ListService::new(
            registry.clone(),
            storage.clone(),
            ListLimits::from(config),
            metrics.clone(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                registry,
                storage,
                lists,
                metrics,
                tokens: TokenService::new(config.jwt_secret.as_bytes()),
            }),
        }
    }

    /// Get the schema registry.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.inner.registry
    }

    /// Get the storage backend.
    pub fn storage(&self) -> &dyn Storage {
        self.inner.storage.as_ref()
    }

    /// Get the list service.
    pub fn lists(&self) -> &ListService {
        &self.inner.lists
    }

    /// Get the metrics registry.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    /// Get the token service.
    pub fn tokens(&self) -> &TokenService {
        &self.inner.tokens
    }
}
