use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// Ironic API usage counters, shared by every client in the process.
#[derive(Debug, Default)]
pub struct ApiMetrics {
    pub total_requests: AtomicU64,
    pub busy_responses: AtomicU64,
    pub errors: AtomicU64,
    pub transitions_requested: AtomicU64,
}

impl ApiMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_busy(&self) {
        self.busy_responses.fetch_add(1, Ordering::Relaxed);
        warn!("Ironic reported busy (HTTP 409)");
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transition(&self) {
        self.transitions_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> ApiStats {
        ApiStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            busy_responses: self.busy_responses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            transitions_requested: self.transitions_requested.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Ironic API metrics: requests={}, busy={}, errors={}, transitions={}",
            stats.total_requests, stats.busy_responses, stats.errors, stats.transitions_requested
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiStats {
    pub total_requests: u64,
    pub busy_responses: u64,
    pub errors: u64,
    pub transitions_requested: u64,
}

static API_METRICS: std::sync::LazyLock<ApiMetrics> = std::sync::LazyLock::new(ApiMetrics::new);

pub fn api_metrics() -> &'static ApiMetrics {
    &API_METRICS
}

/// Span wrapping one workflow run against one node.
pub fn create_workflow_span(node_id: &str, target: &str, correlation_id: &str) -> tracing::Span {
    tracing::info_span!(
        "provision_workflow",
        node.id = node_id,
        workflow.target = target,
        correlation.id = correlation_id,
        otel.kind = "internal"
    )
}

/// Time an operation and log how long it took.
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
