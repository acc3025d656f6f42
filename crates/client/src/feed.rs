//! Accumulating "load more" feed.
//!
//! A [`Feed`] grows a result list across sequential windows of one
//! configuration (filter descriptor + page size). Adopting a structurally
//! different configuration resets it. Each fetch records the configuration
//! generation it was issued under; a response arriving after the
//! generation moved on is discarded.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use talentdesk_query::QueryDescriptor;
use tracing::{debug, warn};

use crate::api::Collection;
use crate::error::ClientError;

/// Where loaded pages go relative to what is already accumulated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadDirection {
    /// New pages go after existing rows.
    #[default]
    Append,
    /// New pages go before existing rows (older items above, e.g. chat history).
    Prepend,
}

/// What a feed is showing.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    pub descriptor: QueryDescriptor,
    pub page_size: u64,
}

impl FeedConfig {
    pub fn new(descriptor: QueryDescriptor, page_size: u64) -> Self {
        Self {
            descriptor,
            page_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    Idle,
    InitialLoad,
    LoadingMore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The page was applied.
    Loaded { rows: usize },
    /// Nothing was fetched: a fetch was in flight, nothing was left to load,
    /// or the configuration was unchanged.
    Skipped,
    /// The response belonged to a superseded configuration and was dropped.
    Discarded,
}

/// Rows accumulated so far and the paging facts derived from the last response.
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatedPageState<T> {
    pub all_data: Vec<T>,
    pub skip: u64,
    pub total_items: u64,
    pub total_pages: u64,
    pub is_loading_more: bool,
}

impl<T> Default for AccumulatedPageState<T> {
    fn default() -> Self {
        Self {
            all_data: Vec::new(),
            skip: 0,
            total_items: 0,
            total_pages: 0,
            is_loading_more: false,
        }
    }
}

struct FeedInner<T> {
    config: Option<FeedConfig>,
    generation: u64,
    mode: FeedMode,
    state: AccumulatedPageState<T>,
}

impl<T> FeedInner<T> {
    fn can_load_more(&self) -> bool {
        let Some(config) = &self.config else {
            return false;
        };
        self.mode == FeedMode::Idle
            && !self.state.is_loading_more
            && self.state.skip / config.page_size + 1 < self.state.total_pages
    }

    fn window(&self, skip: u64) -> Option<QueryDescriptor> {
        self.config.as_ref().map(|config| QueryDescriptor {
            skip: Some(skip),
            take: Some(config.page_size),
            ..config.descriptor.clone()
        })
    }
}

enum Phase {
    Initial,
    More { skip: u64 },
}

pub struct Feed<T = Value> {
    collection: Collection,
    direction: LoadDirection,
    inner: Mutex<FeedInner<T>>,
}

impl<T: DeserializeOwned + Clone> Feed<T> {
    pub fn new(collection: Collection, direction: LoadDirection) -> Self {
        Self {
            collection,
            direction,
            inner: Mutex::new(FeedInner {
                config: None,
                generation: 0,
                mode: FeedMode::Idle,
                state: AccumulatedPageState::default(),
            }),
        }
    }

    /// Adopt `config`. An unchanged configuration is a no-op; anything else
    /// resets the accumulated state and loads the first page.
    pub async fn configure(&self, config: FeedConfig) -> Result<LoadOutcome, ClientError> {
        if config.page_size == 0 {
            return Err(ClientError::InvalidPageSize);
        }
        let (generation, request) = {
            let mut inner = self.inner.lock();
            if inner.config.as_ref() == Some(&config) {
                return Ok(LoadOutcome::Skipped);
            }
            inner.config = Some(config);
            Self::restart(&mut inner)
        };
        self.run(generation, request, Phase::Initial).await
    }

    /// Drop everything and load the first page of the current configuration again.
    pub async fn reload(&self) -> Result<LoadOutcome, ClientError> {
        let (generation, request) = {
            let mut inner = self.inner.lock();
            if inner.config.is_none() {
                return Ok(LoadOutcome::Skipped);
            }
            Self::restart(&mut inner)
        };
        self.run(generation, request, Phase::Initial).await
    }

    /// Fetch the next window. A no-op while another fetch is in flight or
    /// when the last page is already loaded.
    pub async fn load_more(&self) -> Result<LoadOutcome, ClientError> {
        let (generation, request, skip) = {
            let mut inner = self.inner.lock();
            if !inner.can_load_more() {
                debug!(mode = ?inner.mode, "load more skipped");
                return Ok(LoadOutcome::Skipped);
            }
            let page_size = inner.config.as_ref().map_or(0, |c| c.page_size);
            let skip = inner.state.skip + page_size;
            let Some(request) = inner.window(skip) else {
                return Ok(LoadOutcome::Skipped);
            };
            inner.mode = FeedMode::LoadingMore;
            inner.state.is_loading_more = true;
            (inner.generation, request, skip)
        };
        self.run(generation, request, Phase::More { skip }).await
    }

    /// Forget the configuration and everything loaded. In-flight responses
    /// will be discarded.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.config = None;
        inner.mode = FeedMode::Idle;
        inner.state = AccumulatedPageState::default();
    }

    pub fn snapshot(&self) -> AccumulatedPageState<T> {
        self.inner.lock().state.clone()
    }

    pub fn mode(&self) -> FeedMode {
        self.inner.lock().mode
    }

    pub fn can_load_more(&self) -> bool {
        self.inner.lock().can_load_more()
    }

    /// One-based page of the last loaded window.
    pub fn current_page(&self) -> u64 {
        let inner = self.inner.lock();
        inner
            .config
            .as_ref()
            .map_or(0, |config| inner.state.skip / config.page_size + 1)
    }

    fn restart(inner: &mut FeedInner<T>) -> (u64, QueryDescriptor) {
        inner.generation += 1;
        inner.state = AccumulatedPageState::default();
        inner.mode = FeedMode::InitialLoad;
        let request = inner.window(0).unwrap_or_default();
        (inner.generation, request)
    }

    async fn run(
        &self,
        generation: u64,
        request: QueryDescriptor,
        phase: Phase,
    ) -> Result<LoadOutcome, ClientError> {
        let result = self.collection.fetch::<T>(&request).await;

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            debug!(
                entity = %self.collection.entity(),
                issued = generation,
                current = inner.generation,
                "discarding stale page"
            );
            return Ok(LoadOutcome::Discarded);
        }

        inner.mode = FeedMode::Idle;
        inner.state.is_loading_more = false;

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!(entity = %self.collection.entity(), error = %e, "feed fetch failed");
                return Err(e);
            }
        };

        let rows = page.data.len();
        let page_size = inner.config.as_ref().map_or(1, |c| c.page_size);
        let state = &mut inner.state;
        match phase {
            Phase::Initial => {
                state.all_data = page.data;
                state.skip = 0;
            }
            Phase::More { skip } => {
                match self.direction {
                    LoadDirection::Append => state.all_data.extend(page.data),
                    LoadDirection::Prepend => {
                        let mut merged = page.data;
                        merged.append(&mut state.all_data);
                        state.all_data = merged;
                    }
                }
                state.skip = skip;
            }
        }
        state.total_items = page.count;
        state.total_pages = page.count.div_ceil(page_size);

        Ok(LoadOutcome::Loaded { rows })
    }
}
