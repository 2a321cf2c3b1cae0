//! Prometheus metrics of the last run
//!
//! All values are gauges describing the most recent run. They are served
//! over HTTP in daemon mode and written to a textfile (node_exporter
//! textfile collector format) after a one-shot run.

use crate::error::{Error, Result};
use crate::subid::SyncOutcome;
use prometheus::{Encoder, Gauge, IntGauge, Opts, Registry, TextEncoder};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info};

const NAMESPACE: &str = "subid_sync";

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace(NAMESPACE)
}

lazy_static::lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    pub static ref BUILD_INFO: IntGauge = IntGauge::with_opts(
        opts("build_info", "Build information").const_label("version", crate::VERSION)
    ).unwrap();

    pub static ref ERROR: IntGauge = IntGauge::with_opts(
        opts("error", "Indicates an error was encountered")
    ).unwrap();

    pub static ref RUN_DURATION: Gauge = Gauge::with_opts(
        opts("run_duration_seconds", "Last runtime duration in seconds")
    ).unwrap();

    pub static ref LAST_RUN: Gauge = Gauge::with_opts(
        opts("last_run_timestamp_seconds", "Last timestamp of execution")
    ).unwrap();

    pub static ref SUBID_TOTAL: IntGauge = IntGauge::with_opts(
        opts("subid_total", "Total number of subid entries")
    ).unwrap();

    pub static ref SUBID_ADDED: IntGauge = IntGauge::with_opts(
        opts("subid_added", "Number of subid entries added")
    ).unwrap();

    pub static ref SUBID_REMOVED: IntGauge = IntGauge::with_opts(
        opts("subid_removed", "Number of subid entries removed")
    ).unwrap();

    pub static ref SUBID_UNASSIGNED: IntGauge = IntGauge::with_opts(
        opts("subid_unassigned", "Number of users left without a subid range")
    ).unwrap();

    pub static ref SKIPPED_LINES: IntGauge = IntGauge::with_opts(
        opts("subid_skipped_lines", "Number of unparsable lines in the subuid file")
    ).unwrap();
}

/// Initialize metrics registry
pub fn init_metrics() {
    debug!("Initializing Prometheus metrics");

    METRICS_REGISTRY.register(Box::new(BUILD_INFO.clone())).ok();
    METRICS_REGISTRY.register(Box::new(ERROR.clone())).ok();
    METRICS_REGISTRY.register(Box::new(RUN_DURATION.clone())).ok();
    METRICS_REGISTRY.register(Box::new(LAST_RUN.clone())).ok();
    METRICS_REGISTRY.register(Box::new(SUBID_TOTAL.clone())).ok();
    METRICS_REGISTRY.register(Box::new(SUBID_ADDED.clone())).ok();
    METRICS_REGISTRY.register(Box::new(SUBID_REMOVED.clone())).ok();
    METRICS_REGISTRY.register(Box::new(SUBID_UNASSIGNED.clone())).ok();
    METRICS_REGISTRY.register(Box::new(SKIPPED_LINES.clone())).ok();

    BUILD_INFO.set(1);
}

/// Zero the per-run gauges before a new run
pub fn reset() {
    ERROR.set(0);
    SUBID_TOTAL.set(0);
    SUBID_ADDED.set(0);
    SUBID_REMOVED.set(0);
    SUBID_UNASSIGNED.set(0);
    SKIPPED_LINES.set(0);
}

/// Record the counters of a finished pass
pub fn record_outcome(outcome: &SyncOutcome) {
    let report = &outcome.report;
    SUBID_TOTAL.set(report.total as i64);
    SUBID_ADDED.set(report.added as i64);
    SUBID_REMOVED.set(report.removed as i64);
    SUBID_UNASSIGNED.set(report.unassigned.len() as i64);
    SKIPPED_LINES.set(outcome.skipped_lines as i64);
    if report.capacity_exhausted() {
        ERROR.set(1);
    }
}

/// Flag the last run as failed
pub fn record_failure() {
    ERROR.set(1);
}

/// Times a run; stamps the start on creation and the duration on drop
pub struct RunTimer {
    started: Instant,
}

impl RunTimer {
    pub fn start() -> Self {
        LAST_RUN.set(chrono::Utc::now().timestamp() as f64);
        Self {
            started: Instant::now(),
        }
    }
}

impl Drop for RunTimer {
    fn drop(&mut self) {
        RUN_DURATION.set(self.started.elapsed().as_secs_f64());
    }
}

/// Export all metrics in Prometheus text format
pub fn export_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| Error::Metrics(e.to_string()))?;

    String::from_utf8(buffer).map_err(|e| Error::Metrics(format!("UTF-8 conversion error: {}", e)))
}

/// Write the metrics to `path`, replacing it in one rename
pub fn write_textfile(path: &Path) -> Result<()> {
    let body = export_metrics()?;
    let tmp = path.with_extension(format!("{}.tmp", std::process::id()));

    std::fs::write(&tmp, body).map_err(|e| Error::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        error!(path = %path.display(), error = %e, "Failed to write metrics file");
        std::fs::remove_file(&tmp).ok();
        Error::io(path, e)
    })?;

    info!(path = %path.display(), "Metrics written");
    Ok(())
}
