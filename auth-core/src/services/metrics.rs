//! Metrics collection and Prometheus export.
//!
//! Counters are recorded through the `metrics` facade; the binary installs the
//! Prometheus recorder and serves `/metrics`.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

pub const AUDIT_EVENTS_DROPPED: &str = "audit_events_dropped_total";
pub const AUDIT_PERSIST_FAILURES: &str = "audit_persist_failures_total";
pub const AUDIT_ENTRIES_PURGED: &str = "audit_entries_purged_total";
pub const AUTH_LOGIN_FAILURES: &str = "auth_login_failures_total";
pub const AUTH_LOCKOUTS: &str = "auth_lockouts_total";

/// Global handle to the Prometheus recorder.
pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Later calls are no-ops.
pub fn init_metrics() -> Result<(), anyhow::Error> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

/// Current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}
