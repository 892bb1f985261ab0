//! Interception metrics.
//!
//! # Metrics
//! - `update_requests_intercepted_total` (counter): matched requests by category
//! - `update_items_removed_total` (counter): items stripped by category
//! - `update_responses_total` (counter): finalized rows by outcome class
//! - `update_correlation_misses_total` (counter): responses with no pending row
//! - `update_store_errors_total` (counter): store failures by operation
//! - `update_logs_cleared_total` (counter): bulk clears by trigger
//! - `update_config_reloads_total` (counter): reload attempts by outcome
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade
//! - `run` serves them for Prometheus when `observability.metrics_listen` is
//!   set; an embedding host installs its own recorder instead

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::observability::events::ClearTrigger;
use crate::routing::Category;
use crate::store::ResponseStatus;

/// Install the global recorder and serve `/metrics` on `listen`.
///
/// Must be called from inside a tokio runtime.
pub fn install_exporter(listen: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(listen).install()?;
    tracing::info!(listen = %listen, "Prometheus metrics exporter listening");
    Ok(())
}

pub fn record_intercepted(category: Category) {
    metrics::counter!("update_requests_intercepted_total", "category" => category.as_str()).increment(1);
}

pub fn record_item_removed(category: Category) {
    metrics::counter!("update_items_removed_total", "category" => category.as_str()).increment(1);
}

pub fn record_response(status: &ResponseStatus) {
    let outcome = match status {
        ResponseStatus::Code(code) if (200..300).contains(code) => "success",
        ResponseStatus::Code(_) => "http_error",
        ResponseStatus::Error(_) => "transport_error",
        ResponseStatus::Unknown | ResponseStatus::Pending => "unknown",
    };
    metrics::counter!("update_responses_total", "outcome" => outcome).increment(1);
}

pub fn record_correlation_miss() {
    metrics::counter!("update_correlation_misses_total").increment(1);
}

pub fn record_store_error(operation: &'static str) {
    metrics::counter!("update_store_errors_total", "operation" => operation).increment(1);
}

pub fn record_logs_cleared(trigger: ClearTrigger) {
    metrics::counter!("update_logs_cleared_total", "trigger" => trigger.as_str()).increment(1);
}

pub fn record_config_reload(outcome: &'static str) {
    metrics::counter!("update_config_reloads_total", "outcome" => outcome).increment(1);
}
