use prometheus::proto::MetricFamily;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::warn;

/// Counters for request authentication outcomes.
#[derive(Clone)]
pub struct AuthMetrics {
    pub registry: Registry,
    /// Labelled by outcome: `verified`, `unverified` or `rejected`.
    pub requests_total: IntCounterVec,
    /// Labelled by error kind, counted whether or not the request was halted.
    pub failures_total: IntCounterVec,
}

impl AuthMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let requests_total = IntCounterVec::new(
            Opts::new("auth_requests_total", "Requests seen by JWT authentication"),
            &["outcome"],
        )?;
        let failures_total = IntCounterVec::new(
            Opts::new(
                "auth_failures_total",
                "Token verification failures and missing tokens by kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(failures_total.clone()))?;
        Ok(AuthMetrics { registry, requests_total, failures_total })
    }

    pub fn record_outcome(&self, outcome: &str) {
        self.requests_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_failure(&self, kind: &str) {
        self.failures_total.with_label_values(&[kind]).inc();
    }

    /// Prometheus text exposition of every registered metric. Encoding
    /// failures are logged and render an empty body.
    pub fn render(&self) -> String {
        encode_text(&self.registry.gather())
    }
}

fn encode_text(families: &[MetricFamily]) -> String {
    let mut buffer = Vec::new();
    if let Err(err) = TextEncoder::new().encode(families, &mut buffer) {
        warn!(error = %err, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_else(|err| {
        warn!(error = %err, "metrics exposition is not valid UTF-8");
        String::new()
    })
}
