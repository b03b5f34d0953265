//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the Sublarr server:
//! - HTTP request metrics (counts, errors)
//! - WebSocket connection metrics
//! - Provider search/download counters
//! - Translation job counters

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("sublarr_http_requests_total", "Total HTTP requests"),
        &["method", "status"],
    )
    .unwrap()
});

/// Authentication failures.
pub static AUTH_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "sublarr_auth_failures_total",
        "Total authentication failures",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "sublarr_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections accepted.
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "sublarr_ws_connections_total",
        "Total WebSocket connections accepted",
    )
    .unwrap()
});

/// WebSocket messages sent, by message type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("sublarr_ws_messages_sent_total", "WebSocket messages sent"),
        &["type"],
    )
    .unwrap()
});

// =============================================================================
// Domain Metrics
// =============================================================================

/// Provider searches triggered through the API.
pub static PROVIDER_SEARCHES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "sublarr_provider_searches_total",
        "Provider searches triggered via the API",
    )
    .unwrap()
});

/// Subtitle downloads triggered through the API.
pub static SUBTITLE_DOWNLOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sublarr_subtitle_downloads_total",
            "Subtitle downloads by result",
        ),
        &["result"],
    )
    .unwrap()
});

/// Translation jobs by terminal status.
pub static TRANSLATION_JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sublarr_translation_jobs_total",
            "Translation jobs by terminal status",
        ),
        &["status"],
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();
    registry
        .register(Box::new(PROVIDER_SEARCHES_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(SUBTITLE_DOWNLOADS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(TRANSLATION_JOBS_TOTAL.clone()))
        .unwrap();
}

/// Render the registry in Prometheus text format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_gathers() {
        HTTP_REQUESTS_TOTAL.with_label_values(&["GET", "200"]).inc();
        let output = gather();
        assert!(output.contains("sublarr_http_requests_total"));
    }
}
