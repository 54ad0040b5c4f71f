//! Metrics collection and exposition.
//!
//! # Metrics
//! - `config_proxy_rpc_requests_total` (counter): calls by method and outcome
//! - `config_proxy_rpc_duration_seconds` (histogram): handler latency by method
//! - `config_proxy_rpc_errors_total` (counter): error responses by code
//! - `config_proxy_open_connections` (gauge): client connections
//! - `config_proxy_cache_entries` (gauge): cached configs
//! - `config_proxy_delayed_responses` (gauge): parked long-polls
//! - `config_proxy_source_failures_total` (counter): failed upstream fetches by source
//! - `config_proxy_failovers_total` (counter): active source changes
//!
//! # Design Decisions
//! - The `metrics` facade is a no-op until the Prometheus recorder is installed

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder with its own scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_rpc_request(method: &str, outcome: &'static str, start: Instant) {
    counter!(
        "config_proxy_rpc_requests_total",
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("config_proxy_rpc_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rpc_error(code: i32) {
    counter!("config_proxy_rpc_errors_total", "code" => code.to_string()).increment(1);
}

pub fn record_open_connections(open: u64) {
    gauge!("config_proxy_open_connections").set(open as f64);
}

pub fn record_cache_entries(entries: usize) {
    gauge!("config_proxy_cache_entries").set(entries as f64);
}

pub fn record_delayed_responses(pending: usize) {
    gauge!("config_proxy_delayed_responses").set(pending as f64);
}

pub fn record_source_failure(source: &str) {
    counter!("config_proxy_source_failures_total", "source" => source.to_string()).increment(1);
}

pub fn record_failover(to: &str) {
    counter!("config_proxy_failovers_total", "to" => to.to_string()).increment(1);
}
