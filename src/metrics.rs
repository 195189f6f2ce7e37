//! Prometheus metrics for sync runs and registry exchanges.
//!
//! Metrics live in a registry owned by [`SyncMetrics`] so that several
//! instances (one per test, say) never collide on registration.

use prometheus::{
    histogram_opts, opts, CounterVec, Encoder, HistogramVec, Registry, TextEncoder,
};

use crate::models::outcome::{SendMethod, SyncReport};

pub struct SyncMetrics {
    registry: Registry,
    runs_total: CounterVec,
    requests_total: CounterVec,
    request_duration_seconds: HistogramVec,
}

impl SyncMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let runs_total = CounterVec::new(
            opts!("orcid_sync_runs_total", "Sync invocations by result"),
            &["result"],
        )
        .expect("failed to create orcid_sync_runs_total");

        let requests_total = CounterVec::new(
            opts!("orcid_sync_requests_total", "Work record requests sent to the registry"),
            &["method", "status"],
        )
        .expect("failed to create orcid_sync_requests_total");

        let request_duration_seconds = HistogramVec::new(
            histogram_opts!(
                "orcid_sync_request_duration_seconds",
                "Registry request latency in seconds",
                vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
            ),
            &["method"],
        )
        .expect("failed to create orcid_sync_request_duration_seconds");

        registry
            .register(Box::new(runs_total.clone()))
            .expect("failed to register orcid_sync_runs_total");
        registry
            .register(Box::new(requests_total.clone()))
            .expect("failed to register orcid_sync_requests_total");
        registry
            .register(Box::new(request_duration_seconds.clone()))
            .expect("failed to register orcid_sync_request_duration_seconds");

        Self {
            registry,
            runs_total,
            requests_total,
            request_duration_seconds,
        }
    }

    pub fn record_run(&self, report: &SyncReport) {
        self.runs_total.with_label_values(&[report.label()]).inc();
    }

    /// A run aborted by a transport or store failure.
    pub fn record_failed_run(&self) {
        self.runs_total.with_label_values(&["error"]).inc();
    }

    /// `status` is `None` when no response arrived.
    pub fn record_request(&self, method: SendMethod, status: Option<u16>, elapsed_secs: f64) {
        let status = status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "transport_error".to_string());
        self.requests_total
            .with_label_values(&[method.as_str(), &status])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[method.as_str()])
            .observe(elapsed_secs);
    }

    /// Prometheus text exposition, served at `/metrics`.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .unwrap_or_default();
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::outcome::SkipReason;

    #[test]
    fn test_counters_render() {
        let metrics = SyncMetrics::new();
        metrics.record_run(&SyncReport::skipped(SkipReason::NotPublished));
        metrics.record_request(SendMethod::Put, Some(404), 0.2);
        metrics.record_request(SendMethod::Post, None, 5.0);

        let text = metrics.encode();
        assert!(text.contains(r#"orcid_sync_runs_total{result="skipped"} 1"#));
        assert!(text.contains(r#"orcid_sync_requests_total{method="PUT",status="404"} 1"#));
        assert!(text.contains(r#"status="transport_error""#));
    }

    #[test]
    fn test_instances_are_independent() {
        let a = SyncMetrics::new();
        let b = SyncMetrics::new();
        a.record_failed_run();
        assert!(!b.encode().contains("result=\"error\""));
    }
}
