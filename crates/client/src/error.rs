//! Client error type.

use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server responded {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("page size must be at least 1")]
    InvalidPageSize,

    /// Error of a fetch shared by several coalesced callers.
    #[error(transparent)]
    Shared(Arc<ClientError>),
}

impl ClientError {
    /// Status code for server-side rejections.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Shared(inner) => inner.status(),
            _ => None,
        }
    }

    pub(crate) fn from_shared(shared: Arc<ClientError>) -> Self {
        match Arc::try_unwrap(shared) {
            Ok(owned) => owned,
            Err(shared) => ClientError::Shared(shared),
        }
    }
}
