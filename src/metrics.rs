//! Prometheus metrics for the media responder

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::time::Duration;

/// Terminal states a media request can reach
pub const OUTCOMES: &[&str] = &[
    "completed",
    "aborted",
    "timed_out",
    "stream_error",
    "not_found",
    "range_invalid",
    "setup_timeout",
    "internal_error",
];

/// Metrics for media serving, registered in a server-owned registry
#[derive(Clone)]
pub struct MediaMetrics {
    registry: Registry,

    /// Media requests by terminal outcome
    pub requests_total: IntCounterVec,

    /// Requests handed on to the next handler
    pub passthrough_total: IntCounter,

    /// Body bytes delivered to clients
    pub bytes_sent_total: IntCounter,

    /// File streams currently open
    pub open_streams: IntGauge,

    /// Time from request arrival to the response head
    pub response_head_seconds: Histogram,
}

impl MediaMetrics {
    /// Create metrics in a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Create metrics with custom registry
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let requests_total = IntCounterVec::new(
            Opts::new(
                "media_range_requests_total",
                "Media requests by terminal outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let passthrough_total = IntCounter::new(
            "media_range_passthrough_total",
            "Requests passed on to the next handler",
        )?;
        registry.register(Box::new(passthrough_total.clone()))?;

        let bytes_sent_total = IntCounter::new(
            "media_range_bytes_sent_total",
            "Media body bytes handed to clients",
        )?;
        registry.register(Box::new(bytes_sent_total.clone()))?;

        let open_streams = IntGauge::new(
            "media_range_open_streams",
            "Media file streams currently open",
        )?;
        registry.register(Box::new(open_streams.clone()))?;

        let response_head_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "media_range_response_head_seconds",
                "Time to produce the media response head in seconds",
            )
            .buckets(vec![
                0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
        )?;
        registry.register(Box::new(response_head_seconds.clone()))?;

        // Pre-create every outcome series so they export as zero
        for outcome in OUTCOMES {
            requests_total.with_label_values(&[*outcome]);
        }

        Ok(Self {
            registry,
            requests_total,
            passthrough_total,
            bytes_sent_total,
            open_streams,
            response_head_seconds,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a terminal outcome
    pub fn record_outcome(&self, outcome: &str) {
        self.requests_total.with_label_values(&[outcome]).inc();
    }

    pub fn outcome_count(&self, outcome: &str) -> u64 {
        self.requests_total.with_label_values(&[outcome]).get()
    }

    pub fn record_passthrough(&self) {
        self.passthrough_total.inc();
    }

    pub fn record_bytes_sent(&self, bytes: u64) {
        self.bytes_sent_total.inc_by(bytes);
    }

    pub fn record_response_head(&self, elapsed: Duration) {
        self.response_head_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn stream_opened(&self) {
        self.open_streams.inc();
    }

    pub fn stream_closed(&self) {
        self.open_streams.dec();
    }

    pub fn open_stream_count(&self) -> i64 {
        self.open_streams.get()
    }
}

impl Default for MediaMetrics {
    fn default() -> Self {
        Self::new().expect("Failed to create media metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outcomes() {
        let metrics = MediaMetrics::new().unwrap();
        metrics.record_outcome("completed");
        metrics.record_outcome("completed");
        metrics.record_outcome("not_found");
        assert_eq!(metrics.outcome_count("completed"), 2);
        assert_eq!(metrics.outcome_count("not_found"), 1);
        assert_eq!(metrics.outcome_count("aborted"), 0);
    }

    #[test]
    fn test_open_stream_gauge() {
        let metrics = MediaMetrics::new().unwrap();
        metrics.stream_opened();
        metrics.stream_opened();
        metrics.stream_closed();
        assert_eq!(metrics.open_stream_count(), 1);
    }

    #[test]
    fn test_independent_registries() {
        let a = MediaMetrics::new().unwrap();
        let b = MediaMetrics::new().unwrap();
        a.record_bytes_sent(10);
        assert_eq!(a.bytes_sent_total.get(), 10);
        assert_eq!(b.bytes_sent_total.get(), 0);
    }

    #[test]
    fn test_all_outcomes_exported() {
        let metrics = MediaMetrics::new().unwrap();
        let families = metrics.registry().gather();
        let requests = families
            .iter()
            .find(|f| f.get_name() == "media_range_requests_total")
            .unwrap();
        assert_eq!(requests.get_metric().len(), OUTCOMES.len());
    }
}
