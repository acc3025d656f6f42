//! Process-wide response cache for list queries.
//!
//! Keys are `"{entity}:{epoch}:{sha256(canonical descriptor)}"`, so the
//! window (`skip`/`take`) is part of the identity. Concurrent identical
//! fetches are coalesced into one transport call.
//!
//! Invalidation bumps the entity's epoch. A fetch that was already in
//! flight stores its page under the old epoch, where no later lookup will
//! find it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use talentdesk_query::{PaginatedResponse, QueryDescriptor};
use tracing::{debug, warn};

use crate::error::ClientError;

/// Default time-to-live for cached pages (30 seconds).
pub const DEFAULT_TTL_SECS: u64 = 30;

/// Default maximum number of cached pages.
pub const DEFAULT_MAX_CAPACITY: u64 = 1_000;

pub type CachedPage = Arc<PaginatedResponse<Value>>;

#[derive(Clone)]
pub struct QueryCache {
    pages: Cache<String, CachedPage>,
    epochs: Arc<Mutex<Epochs>>,
}

#[derive(Default)]
struct Epochs {
    last: u64,
    /// Epoch every entity is at least at, raised by `invalidate_all`.
    floor: u64,
    entities: HashMap<String, u64>,
}

impl Epochs {
    fn current(&self, entity: &str) -> u64 {
        self.entities
            .get(entity)
            .copied()
            .unwrap_or_default()
            .max(self.floor)
    }

    fn bump(&mut self) -> u64 {
        self.last += 1;
        self.last
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TTL_SECS), DEFAULT_MAX_CAPACITY)
    }
}

impl QueryCache {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let pages = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();
        Self {
            pages,
            epochs: Arc::new(Mutex::new(Epochs::default())),
        }
    }

    /// Cache key for a resolved descriptor at the entity's current epoch.
    pub fn key(&self, entity: &str, query: &QueryDescriptor) -> String {
        let epoch = self.epochs.lock().current(entity);
        let digest = Sha256::digest(query.canonical_json().as_bytes());
        format!("{entity}:{epoch}:{}", hex::encode(digest))
    }

    /// Return the cached page or run `fetch`, sharing one in-flight fetch
    /// between concurrent callers with the same key. Errors are not cached.
    pub async fn get_or_fetch<F>(
        &self,
        entity: &str,
        query: &QueryDescriptor,
        fetch: F,
    ) -> Result<CachedPage, ClientError>
    where
        F: Future<Output = Result<PaginatedResponse<Value>, ClientError>> + Send,
    {
        let key = self.key(entity, query);
        self.pages
            .try_get_with(key, async move { fetch.await.map(Arc::new) })
            .await
            .map_err(ClientError::from_shared)
    }

    pub async fn get(&self, entity: &str, query: &QueryDescriptor) -> Option<CachedPage> {
        self.pages.get(&self.key(entity, query)).await
    }

    /// Drop every cached page of `entity`, including pages still being
    /// fetched.
    pub fn invalidate_entity(&self, entity: &str) {
        {
            let mut epochs = self.epochs.lock();
            let epoch = epochs.bump();
            epochs.entities.insert(entity.to_string(), epoch);
        }
        let prefix = format!("{entity}:");
        match self
            .pages
            .invalidate_entries_if(move |key, _| key.starts_with(&prefix))
        {
            Ok(_) => debug!(entity = %entity, "list cache invalidated"),
            Err(e) => warn!(entity = %entity, error = %e, "failed to invalidate list cache"),
        }
    }

    pub fn invalidate_all(&self) {
        {
            let mut epochs = self.epochs.lock();
            epochs.floor = epochs.bump();
            epochs.entities.clear();
        }
        self.pages.invalidate_all();
    }
}
