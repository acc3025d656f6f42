//! Wire transport for list queries.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use talentdesk_query::{PaginatedResponse, QueryDescriptor};
use tracing::debug;

use crate::error::ClientError;

/// Sends a list query for one entity collection.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn list(
        &self,
        entity: &str,
        query: &QueryDescriptor,
    ) -> Result<PaginatedResponse<Value>, ClientError>;
}

/// JSON-over-HTTP transport: `POST {base_url}/api/{entity}/list`.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn list_url(&self, entity: &str) -> String {
        format!("{}/api/{entity}/list", self.base_url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn list(
        &self,
        entity: &str,
        query: &QueryDescriptor,
    ) -> Result<PaginatedResponse<Value>, ClientError> {
        let url = self.list_url(entity);
        debug!(url = %url, skip = ?query.skip, take = ?query.take, "sending list query");

        let mut request = self.client.post(&url).json(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
