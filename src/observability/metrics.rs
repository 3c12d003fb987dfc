// ============================================================================
// PROMETHEUS METRICS - query cache, mutations and HTTP transport
// ============================================================================

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, Encoder,
    HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};

lazy_static! {
    // ========================================================================
    // QUERY CACHE METRICS
    // ========================================================================

    /// Reads served from a fresh cache entry
    pub static ref QUERY_CACHE_HITS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "query_cache_hits_total",
        "Total number of query cache hits",
        &["resource"]
    )
    .unwrap();

    /// Reads that had to go to the network
    pub static ref QUERY_CACHE_MISSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "query_cache_misses_total",
        "Total number of query cache misses",
        &["resource"]
    )
    .unwrap();

    /// Entries marked stale through prefix invalidation
    pub static ref QUERY_INVALIDATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "query_invalidations_total",
        "Total number of invalidated query cache entries",
        &["resource"]
    )
    .unwrap();

    /// Current number of entries per resource
    pub static ref QUERY_CACHE_SIZE: IntGaugeVec = register_int_gauge_vec!(
        "query_cache_size",
        "Current query cache size (number of entries) per resource",
        &["resource"]
    )
    .unwrap();

    // ========================================================================
    // MUTATION METRICS
    // ========================================================================

    pub static ref MUTATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "mutations_total",
        "Total number of mutations by outcome",
        &["resource", "status"]
    )
    .unwrap();

    pub static ref OPTIMISTIC_ROLLBACKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "optimistic_rollbacks_total",
        "Total number of optimistic updates rolled back",
        &["resource"]
    )
    .unwrap();

    // ========================================================================
    // HTTP CLIENT METRICS
    // ========================================================================

    /// Requests sent through the API client, by verb and outcome
    pub static ref HTTP_CLIENT_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_client_requests_total",
        "Total number of API requests by method and status",
        &["method", "status"]
    )
    .unwrap();

    pub static ref FETCH_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "query_fetch_duration_seconds",
        "Duration of query fetches including retries",
        &["resource"],
        vec![0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    pub static ref FETCH_RETRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "query_fetch_retries_total",
        "Total number of query fetch retries",
        &["resource"]
    )
    .unwrap();
}

pub fn record_cache_access(resource: &str, hit: bool) {
    if hit {
        QUERY_CACHE_HITS_TOTAL.with_label_values(&[resource]).inc();
    } else {
        QUERY_CACHE_MISSES_TOTAL.with_label_values(&[resource]).inc();
    }
}

pub fn record_invalidations(resource: &str, count: usize) {
    QUERY_INVALIDATIONS_TOTAL
        .with_label_values(&[resource])
        .inc_by(count as u64);
}

pub fn update_cache_size(resource: &str, size: i64) {
    QUERY_CACHE_SIZE.with_label_values(&[resource]).set(size);
}

/// `status` is the HTTP status on server errors, `success` on 2xx, and the
/// error code when no response arrived.
pub fn record_http_request(method: &str, status: &str) {
    HTTP_CLIENT_REQUESTS_TOTAL
        .with_label_values(&[method, status])
        .inc();
}

pub fn record_mutation(resource: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    MUTATIONS_TOTAL.with_label_values(&[resource, status]).inc();
}

pub fn record_rollback(resource: &str) {
    OPTIMISTIC_ROLLBACKS_TOTAL.with_label_values(&[resource]).inc();
}

pub fn record_fetch(resource: &str, duration_secs: f64, retries: u32) {
    FETCH_DURATION_SECONDS
        .with_label_values(&[resource])
        .observe(duration_secs);
    if retries > 0 {
        FETCH_RETRIES_TOTAL
            .with_label_values(&[resource])
            .inc_by(retries as u64);
    }
}

/// Render every registered metric in the Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => String::from_utf8(buffer).unwrap_or_default(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            String::new()
        }
    }
}
