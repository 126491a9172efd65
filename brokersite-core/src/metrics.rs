// ABOUTME: Prometheus recorder setup and the gate's counters
// ABOUTME: Counters go through the `metrics` facade; rendering uses the exporter handle

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder. Call once per process.
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

/// A handle that renders its own registry without touching the global recorder
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// How a gate check ended: `session`, `whitelist`, `password`, `challenge` or `rejected`
pub fn record_gate_decision(kind: &'static str) {
    metrics::counter!("gate_decisions_total", "kind" => kind).increment(1);
}

/// A lookup the gate depends on failed: `address` or `whitelist`
pub fn record_lookup_failure(stage: &'static str) {
    metrics::counter!("gate_lookup_failures_total", "stage" => stage).increment(1);
}
