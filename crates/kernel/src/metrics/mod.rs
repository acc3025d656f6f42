//! Prometheus metrics collection.
//!
//! Provides application metrics in Prometheus format. Counters are
//! registered without the `_total` suffix; the encoder appends it.

use prometheus_client::encoding::{EncodeLabelSet, text::encode};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

/// HTTP request labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabels {
    pub method: String,
    pub path: String,
    pub status: u16,
}

/// Per-entity labels for list pipeline events.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EntityLabels {
    pub entity: String,
}

/// Labels for denied role-scoped requests.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ScopeLabels {
    pub entity: String,
    pub role: String,
}

/// Application metrics.
pub struct Metrics {
    registry: Registry,

    /// HTTP request counter by method/path/status.
    pub http_requests: Family<HttpLabels, Counter>,

    /// HTTP request duration histogram.
    pub http_duration_seconds: Family<HttpLabels, Histogram>,

    /// List requests whose `take` was narrowed.
    pub take_clamped: Family<EntityLabels, Counter>,

    /// Include nodes collapsed for exceeding the depth limit.
    pub include_collapsed: Family<EntityLabels, Counter>,

    /// Requests refused by the role rewriter.
    pub scope_denied: Family<ScopeLabels, Counter>,

    /// Storage round-trip duration for list queries.
    pub list_query_duration_seconds: Histogram,
}

impl Metrics {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_requests = Family::<HttpLabels, Counter>::default();
        registry.register(
            "http_requests",
            "Total HTTP requests",
            http_requests.clone(),
        );

        let http_duration_seconds = Family::<HttpLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.001, 2.0, 12))
        });
        registry.register(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_duration_seconds.clone(),
        );

        let take_clamped = Family::<EntityLabels, Counter>::default();
        registry.register(
            "query_take_clamped",
            "List requests whose take exceeded the maximum",
            take_clamped.clone(),
        );

        let include_collapsed = Family::<EntityLabels, Counter>::default();
        registry.register(
            "query_include_collapsed",
            "Include nodes collapsed beyond the maximum depth",
            include_collapsed.clone(),
        );

        let scope_denied = Family::<ScopeLabels, Counter>::default();
        registry.register(
            "query_scope_denied",
            "List requests refused by role constraints",
            scope_denied.clone(),
        );

        let list_query_duration_seconds = Histogram::new(exponential_buckets(0.0001, 2.0, 14));
        registry.register(
            "list_query_duration_seconds",
            "Storage time per list query in seconds",
            list_query_duration_seconds.clone(),
        );

        Self {
            registry,
            http_requests,
            http_duration_seconds,
            take_clamped,
            include_collapsed,
            scope_denied,
            list_query_duration_seconds,
        }
    }

    /// Record an HTTP request.
    pub fn record_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let labels = HttpLabels {
            method: method.to_string(),
            path: normalize_path(path),
            status,
        };

        self.http_requests.get_or_create(&labels).inc();
        self.http_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    pub fn record_take_clamped(&self, entity: &str) {
        self.take_clamped
            .get_or_create(&EntityLabels {
                entity: entity.to_string(),
            })
            .inc();
    }

    pub fn record_include_collapsed(&self, entity: &str, nodes: u64) {
        self.include_collapsed
            .get_or_create(&EntityLabels {
                entity: entity.to_string(),
            })
            .inc_by(nodes);
    }

    pub fn record_scope_denied(&self, entity: &str, role: &str) {
        self.scope_denied
            .get_or_create(&ScopeLabels {
                entity: entity.to_string(),
                role: role.to_string(),
            })
            .inc();
    }

    pub fn record_list_query(&self, duration_secs: f64) {
        self.list_query_duration_seconds.observe(duration_secs);
    }

    /// Encode metrics in Prometheus text format.
    ///
    /// # Panics
    ///
    /// Panics if Prometheus metric encoding to a `String` buffer fails.
    /// The `fmt::Write` impl for `String` is infallible.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        #[allow(clippy::expect_used)]
        encode(&mut buffer, &self.registry).expect("encoding metrics");
        buffer
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish()
    }
}

/// Normalize a path for metrics labels.
///
/// Replaces dynamic segments (UUIDs, IDs) with placeholders to limit cardinality.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|s| {
            if uuid::Uuid::parse_str(s).is_ok()
                || (!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
            {
                "{id}"
            } else {
                s
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/api/jobs/123"), "/api/jobs/{id}");
        assert_eq!(
            normalize_path("/api/candidates/550e8400-e29b-41d4-a716-446655440000"),
            "/api/candidates/{id}"
        );
        assert_eq!(normalize_path("/api/jobs/list"), "/api/jobs/list");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_pipeline_counters_are_exported() {
        let metrics = Metrics::new();
        metrics.record_take_clamped("jobs");
        metrics.record_include_collapsed("jobs", 2);
        metrics.record_scope_denied("users", "candidate");

        let output = metrics.encode();
        assert!(output.contains("query_take_clamped_total{entity=\"jobs\"} 1"));
        assert!(output.contains("query_include_collapsed_total{entity=\"jobs\"} 2"));
        assert!(output.contains("query_scope_denied_total"));
    }

    #[test]
    fn test_record_request() {
        let metrics = Metrics::new();
        metrics.record_request("POST", "/api/jobs/list", 200, 0.05);

        let output = metrics.encode();
        assert!(output.contains("http_requests_total"));
        assert!(output.contains("path=\"/api/jobs/list\""));
    }
}
