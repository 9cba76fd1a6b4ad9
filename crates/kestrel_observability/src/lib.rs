//! Observability setup: structured logging, metrics (Prometheus).
//!
//! The kernel only records through the `metrics` and `tracing` facades.
//! Whoever embeds it installs the subscriber and exporter once at startup
//! with [`init_tracing`] and [`init_metrics`]; the `kestrel` CLI installs
//! tracing only, since it exits before anything could scrape it.

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber, writing to stderr. `RUST_LOG`
/// overrides `default_filter`.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(filter_or(default_filter))
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn filter_or(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install the Prometheus recorder and serve `/metrics` on `listen_addr`.
pub fn init_metrics(listen_addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let addr: std::net::SocketAddr = listen_addr.parse()?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!(%addr, "Prometheus metrics endpoint on /metrics");
    Ok(())
}

/// Record one routing decision. `route_type` is the engine that produced it
/// (`standard`, `complex`, `broadcast`, `unicast`, `ignore`).
pub fn record_route(route_type: &str, units: usize) {
    metrics::counter!("kestrel_route_total", "type" => route_type.to_string()).increment(1);
    metrics::histogram!("kestrel_route_units", "type" => route_type.to_string())
        .record(units as f64);
}

/// Record one rewrite pass and the number of SQL tokens it applied.
pub fn record_rewrite(units: usize, tokens: usize) {
    metrics::counter!("kestrel_rewrite_total").increment(1);
    metrics::histogram!("kestrel_rewrite_units").record(units as f64);
    metrics::histogram!("kestrel_rewrite_tokens").record(tokens as f64);
}

/// Record the merger chosen for a query (`transparent`, `iterator`,
/// `order_by_stream`, `group_by_stream`, `group_by_memory`).
pub fn record_merge(merger: &str, streams: usize) {
    metrics::counter!("kestrel_merge_total", "merger" => merger.to_string()).increment(1);
    metrics::histogram!("kestrel_merge_streams").record(streams as f64);
}

/// Record the outcome of dispatching execution units.
pub fn record_execution(units: usize, failed: usize) {
    metrics::counter!(
        "kestrel_execution_total",
        "success" => (failed == 0).to_string()
    )
    .increment(1);
    metrics::histogram!("kestrel_execution_units").record(units as f64);
    if failed > 0 {
        metrics::counter!("kestrel_execution_failed_units_total").increment(failed as u64);
    }
}

/// A read was sent to the write data source because every replica of the
/// group is disabled.
pub fn record_replica_fallback(group: &str) {
    metrics::counter!("kestrel_replica_fallback_total", "group" => group.to_string())
        .increment(1);
}

/// Record the number of disabled data sources after a state change.
pub fn record_disabled_data_sources(count: usize) {
    metrics::gauge!("kestrel_disabled_data_sources").set(count as f64);
}

/// Record end-to-end statement latency (route + rewrite + execute + merge).
pub fn record_statement_duration_us(duration_us: u64, kind: &str, success: bool) {
    metrics::counter!(
        "kestrel_statements_total",
        "kind" => kind.to_string(),
        "success" => success.to_string()
    )
    .increment(1);
    metrics::histogram!("kestrel_statement_duration_us", "kind" => kind.to_string())
        .record(duration_us as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_without_installed_exporter() {
        // With no recorder installed the macros are no-ops; they must not panic.
        record_route("standard", 2);
        record_rewrite(2, 5);
        record_merge("order_by", 4);
        record_execution(4, 1);
        record_replica_fallback("ds_0");
        record_disabled_data_sources(1);
        record_statement_duration_us(120, "select", true);
    }

    #[test]
    fn test_init_metrics_rejects_bad_address() {
        assert!(init_metrics("not-an-address").is_err());
    }
}
