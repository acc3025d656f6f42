//! In-process transport for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use talentdesk_query::{PaginatedResponse, QueryDescriptor};

use crate::error::ClientError;
use crate::transport::Transport;

/// Serves a fixed row set, applying `where`, `skip` and `take`.
///
/// Every call yields once before answering so concurrent callers interleave.
pub struct StubTransport {
    rows: Vec<Value>,
    calls: AtomicUsize,
    fail_next: AtomicBool,
}

impl StubTransport {
    pub fn with_rows(rows: Vec<Value>) -> Self {
        Self {
            rows,
            calls: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Rows `{"id": "r{n}", "n": n}` for `n` in `0..count`.
    pub fn numbered(count: usize) -> Self {
        Self::with_rows(
            (0..count)
                .map(|n| serde_json::json!({"id": format!("r{n}"), "n": n}))
                .collect(),
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn list(
        &self,
        _entity: &str,
        query: &QueryDescriptor,
    ) -> Result<PaginatedResponse<Value>, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ClientError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        let matching: Vec<&Value> = self
            .rows
            .iter()
            .filter(|row| query.filter.as_ref().is_none_or(|p| p.matches(row)))
            .collect();
        let skip = usize::try_from(query.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let take = usize::try_from(query.take.unwrap_or(u64::MAX)).unwrap_or(usize::MAX);

        Ok(PaginatedResponse {
            data: matching.iter().skip(skip).take(take).map(|v| (*v).clone()).collect(),
            count: matching.len() as u64,
            query: query.clone(),
        })
    }
}
