use crate::{CaptureError, CaptureReport, CaptureTrigger};
use ::metrics::{register_counter, register_histogram, Counter, Histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::Path;
use tracing::info;

/// Counters and histograms for captures.
///
/// Handles are no-ops until a recorder is installed, e.g. with
/// [`PrometheusExporter::install`].
pub struct CaptureMetrics {
    pub captures_completed: Counter,
    pub captures_failed: Counter,
    pub navigation_failures: Counter,
    pub settled_triggers: Counter,
    pub max_wait_triggers: Counter,
    pub load_finished_triggers: Counter,
    pub capture_duration: Histogram,
    pub wait_duration: Histogram,
    pub requests_observed: Histogram,
}

impl CaptureMetrics {
    pub fn new() -> Self {
        Self {
            captures_completed: register_counter!("page_capture_completed_total"),
            captures_failed: register_counter!("page_capture_failed_total"),
            navigation_failures: register_counter!("page_capture_navigation_failures_total"),
            settled_triggers: register_counter!(
                "page_capture_triggers_total",
                "trigger" => CaptureTrigger::NetworkSettled.as_str()
            ),
            max_wait_triggers: register_counter!(
                "page_capture_triggers_total",
                "trigger" => CaptureTrigger::MaxWaitElapsed.as_str()
            ),
            load_finished_triggers: register_counter!(
                "page_capture_triggers_total",
                "trigger" => CaptureTrigger::LoadFinished.as_str()
            ),
            capture_duration: register_histogram!("page_capture_duration_seconds"),
            wait_duration: register_histogram!("page_capture_wait_seconds"),
            requests_observed: register_histogram!("page_capture_requests_observed"),
        }
    }

    pub fn record_capture(&self, report: &CaptureReport) {
        self.captures_completed.increment(1);

        match report.stats.trigger {
            CaptureTrigger::NetworkSettled => self.settled_triggers.increment(1),
            CaptureTrigger::MaxWaitElapsed => self.max_wait_triggers.increment(1),
            CaptureTrigger::LoadFinished => self.load_finished_triggers.increment(1),
        }

        self.capture_duration.record(report.elapsed.as_secs_f64());
        self.wait_duration.record(report.stats.waited.as_secs_f64());
        self.requests_observed
            .record(report.stats.settle.requests_observed as f64);
    }

    pub fn record_failure(&self, error: &CaptureError) {
        self.captures_failed.increment(1);

        if error.is_navigation_failure() {
            self.navigation_failures.increment(1);
        }
    }
}

impl Default for CaptureMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Prometheus text exposition of the capture metrics.
///
/// A capture is a short-lived process, so instead of serving `/metrics` the
/// rendered text is written to a file for a textfile collector to pick up.
pub struct PrometheusExporter {
    handle: PrometheusHandle,
}

impl PrometheusExporter {
    /// Install the Prometheus recorder globally. Call before creating any `CaptureMetrics`.
    pub fn install() -> Result<Self, CaptureError> {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        ::metrics::set_boxed_recorder(Box::new(recorder))
            .map_err(|e| CaptureError::MetricsError(e.to_string()))?;

        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    pub async fn write_to(&self, path: &Path) -> Result<(), CaptureError> {
        tokio::fs::write(path, self.render()).await?;
        info!("Wrote capture metrics to {}", path.display());
        Ok(())
    }
}
