use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe();
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    metrics::describe_counter!("sessions_started_total", "Exam sessions that reached Active");
    metrics::describe_counter!(
        "sessions_submitted_total",
        "Sessions terminated by the candidate's manual submission"
    );
    metrics::describe_counter!("sessions_expired_total", "Sessions terminated by clock expiry");
    metrics::describe_counter!("results_recorded_total", "Results durably appended");
    metrics::describe_counter!(
        "result_append_failures_total",
        "Individual failed result append attempts"
    );
    metrics::describe_counter!(
        "result_persistence_exhausted_total",
        "Sessions whose result could not be saved within the retry budget"
    );
    metrics::describe_counter!("http_requests_total", "HTTP responses by status code");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        metrics::Unit::Seconds,
        "HTTP request latency by status code"
    );
    metrics::describe_gauge!("exam_sessions_live", "Sessions not yet terminated");
    metrics::describe_counter!(
        "question_count_clamped_total",
        "Sessions started with more requested questions than the bank holds"
    );
}
