//! Entry point for list reads and cache-invalidating mutations.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use talentdesk_query::{PaginatedResponse, QueryDescriptor};
use tracing::debug;

use crate::cache::{CachedPage, QueryCache};
use crate::error::ClientError;
use crate::transport::Transport;

#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    cache: Option<QueryCache>,
}

impl ApiClient {
    /// Client without response caching.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: QueryCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&QueryCache> {
        self.cache.as_ref()
    }

    /// Fetch one page, through the cache when one is configured.
    pub async fn list(
        &self,
        entity: &str,
        query: &QueryDescriptor,
    ) -> Result<CachedPage, ClientError> {
        match &self.cache {
            Some(cache) => {
                let transport = Arc::clone(&self.transport);
                cache
                    .get_or_fetch(entity, query, async move { transport.list(entity, query).await })
                    .await
            }
            None => Ok(Arc::new(self.transport.list(entity, query).await?)),
        }
    }

    /// Run a mutation against `entity` and drop its cached pages on success.
    pub async fn mutate<T, F>(&self, entity: &str, mutation: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        let output = mutation.await?;
        self.invalidate(entity);
        Ok(output)
    }

    pub fn invalidate(&self, entity: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate_entity(entity);
        }
    }

    /// Handle on one entity collection.
    pub fn collection(&self, entity: impl Into<String>) -> Collection {
        Collection {
            client: self.clone(),
            entity: entity.into(),
        }
    }
}

/// An [`ApiClient`] bound to one entity.
#[derive(Clone)]
pub struct Collection {
    client: ApiClient,
    entity: String,
}

impl Collection {
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Fetch a page and decode its rows into `T`.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        query: &QueryDescriptor,
    ) -> Result<PaginatedResponse<T>, ClientError> {
        let page = self.client.list(&self.entity, query).await?;
        let data = page
            .data
            .iter()
            .cloned()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()?;
        debug!(entity = %self.entity, rows = data.len(), count = page.count, "page fetched");
        Ok(PaginatedResponse {
            data,
            count: page.count,
            query: page.query.clone(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::testing::StubTransport;
    use serde_json::json;

    #[tokio::test]
    async fn cached_client_hits_transport_once_per_query() {
        let transport = Arc::new(StubTransport::with_rows(vec![json!({"id": "j1"})]));
        let client = ApiClient::new(transport.clone()).with_cache(QueryCache::default());
        let q = QueryDescriptor::new().with_take(10);

        client.list("jobs", &q).await.unwrap();
        client.list("jobs", &q).await.unwrap();
        assert_eq!(transport.calls(), 1);

        client.list("jobs", &q.clone().with_skip(10)).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn mutation_invalidates_entity_pages() {
        let transport = Arc::new(StubTransport::with_rows(vec![json!({"id": "j1"})]));
        let client = ApiClient::new(transport.clone()).with_cache(QueryCache::default());
        let q = QueryDescriptor::new();

        client.list("jobs", &q).await.unwrap();
        let created = client
            .mutate("jobs", async { Ok::<_, ClientError>("j2") })
            .await
            .unwrap();
        assert_eq!(created, "j2");

        client.list("jobs", &q).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn failed_mutation_keeps_cache() {
        let transport = Arc::new(StubTransport::with_rows(Vec::new()));
        let client = ApiClient::new(transport.clone()).with_cache(QueryCache::default());
        let q = QueryDescriptor::new();

        client.list("jobs", &q).await.unwrap();
        let result = client
            .mutate("jobs", async {
                Err::<(), _>(ClientError::Status {
                    status: 409,
                    body: "conflict".to_string(),
                })
            })
            .await;
        assert!(result.is_err());

        client.list("jobs", &q).await.unwrap();
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn collection_decodes_rows() {
        #[derive(serde::Deserialize)]
        struct Job {
            id: String,
        }

        let transport = Arc::new(StubTransport::with_rows(vec![json!({"id": "j1"})]));
        let jobs = ApiClient::new(transport).collection("jobs");
        let page = jobs.fetch::<Job>(&QueryDescriptor::new()).await.unwrap();
        assert_eq!(page.data[0].id, "j1");
        assert_eq!(page.count, 1);
    }
}
