//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, cache outcome
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_cache_events_total` (counter): hit, miss, store, store_error, read_error
//! - `proxy_plugin_failures_total` (counter): pipeline failures by plugin
//! - `proxy_config_reloads_total` (counter): reload outcomes
//! - `proxy_oversize_bypass_total` (counter): bodies over the size ceiling
//!
//! Recording is a no-op until a recorder is installed with [`init_metrics`].

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, cache: &str, start_time: Instant) {
    let method = method.to_string();
    let status = status.to_string();
    let cache = cache.to_string();
    counter!(
        "proxy_requests_total",
        "method" => method.clone(),
        "status" => status.clone(),
        "cache" => cache.clone()
    )
    .increment(1);
    histogram!(
        "proxy_request_duration_seconds",
        "method" => method,
        "status" => status,
        "cache" => cache
    )
    .record(start_time.elapsed().as_secs_f64());
}

pub fn record_cache_event(event: &'static str) {
    counter!("proxy_cache_events_total", "event" => event).increment(1);
}

pub fn record_plugin_failure(plugin: &str) {
    counter!("proxy_plugin_failures_total", "plugin" => plugin.to_string()).increment(1);
}

pub fn record_config_reload(outcome: &'static str) {
    counter!("proxy_config_reloads_total", "outcome" => outcome).increment(1);
}

pub fn record_oversize_bypass() {
    counter!("proxy_oversize_bypass_total").increment(1);
}
