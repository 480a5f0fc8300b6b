//! Prometheus metrics for the query pipeline
//!
//! Metrics are created lazily and registered into [`REGISTRY`] on the first
//! call to [`init`]. Recording into an unregistered metric is harmless, so
//! library code records unconditionally.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Registry holding every query pipeline metric
    pub static ref REGISTRY: Registry = Registry::new();

    /// Queries planned, by dialect and query kind
    pub static ref QUERIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tracehouse_query_total", "Total queries executed"),
        &["dialect", "kind"]
    ).expect("metric can be created");

    /// Failed queries, by error kind (build, data, execution, cancelled)
    pub static ref QUERY_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tracehouse_query_errors_total", "Total failed queries"),
        &["kind"]
    ).expect("metric can be created");

    /// Rows decoded from backend cursors
    pub static ref ROWS_READ_TOTAL: IntCounter = IntCounter::new(
        "tracehouse_query_rows_read_total",
        "Total rows read from the backend"
    ).expect("metric can be created");

    /// End-to-end query latency
    pub static ref QUERY_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("tracehouse_query_latency_seconds", "Query latency in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["kind"]
    ).expect("metric can be created");

    /// Successful optimizer rewrites, by rule
    pub static ref OPTIMIZER_REWRITES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tracehouse_optimizer_rewrites_total", "Total expression rewrites"),
        &["rule"]
    ).expect("metric can be created");

    /// Rewrites abandoned in favour of the original expression
    pub static ref OPTIMIZER_FALLBACKS_TOTAL: IntCounter = IntCounter::new(
        "tracehouse_optimizer_fallbacks_total",
        "Total optimizer rule failures that fell back to the original expression"
    ).expect("metric can be created");
}

/// Register all metrics with [`REGISTRY`]. Safe to call more than once.
pub fn init() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(QUERIES_TOTAL.clone()))
            .expect("queries_total can be registered");
        REGISTRY
            .register(Box::new(QUERY_ERRORS_TOTAL.clone()))
            .expect("query_errors_total can be registered");
        REGISTRY
            .register(Box::new(ROWS_READ_TOTAL.clone()))
            .expect("rows_read_total can be registered");
        REGISTRY
            .register(Box::new(QUERY_LATENCY.clone()))
            .expect("query_latency can be registered");
        REGISTRY
            .register(Box::new(OPTIMIZER_REWRITES_TOTAL.clone()))
            .expect("optimizer_rewrites_total can be registered");
        REGISTRY
            .register(Box::new(OPTIMIZER_FALLBACKS_TOTAL.clone()))
            .expect("optimizer_fallbacks_total can be registered");
    });
}
