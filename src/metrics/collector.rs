//! Metrics Collector

use anyhow::Context;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::error;

/// Collects and exports metrics
pub struct Metrics {
    registry: Registry,

    login_attempts_total: IntCounter,
    login_failures_total: IntCounter,
    registrations_total: IntCounter,
    token_rejections_total: IntCounterVec,
    rate_limited_requests_total: IntCounter,
    rate_limit_tracked_clients: IntGauge,
}

impl Metrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let login_attempts_total = IntCounter::new(
            "blog_login_attempts_total",
            "Total login attempts",
        )
        .context("Failed to create login_attempts_total counter")?;

        let login_failures_total = IntCounter::new(
            "blog_login_failures_total",
            "Login attempts rejected for bad credentials or a banned account",
        )
        .context("Failed to create login_failures_total counter")?;

        let registrations_total = IntCounter::new(
            "blog_registrations_total",
            "Accounts successfully registered",
        )
        .context("Failed to create registrations_total counter")?;

        let token_rejections_total = IntCounterVec::new(
            Opts::new(
                "blog_token_rejections_total",
                "Bearer tokens rejected, by reason",
            ),
            &["reason"],
        )
        .context("Failed to create token_rejections_total counter")?;

        let rate_limited_requests_total = IntCounter::new(
            "blog_rate_limited_requests_total",
            "Requests rejected by the rate limiter",
        )
        .context("Failed to create rate_limited_requests_total counter")?;

        let rate_limit_tracked_clients = IntGauge::new(
            "blog_rate_limit_tracked_clients",
            "Client addresses currently held in the rate limit table",
        )
        .context("Failed to create rate_limit_tracked_clients gauge")?;

        registry.register(Box::new(login_attempts_total.clone()))?;
        registry.register(Box::new(login_failures_total.clone()))?;
        registry.register(Box::new(registrations_total.clone()))?;
        registry.register(Box::new(token_rejections_total.clone()))?;
        registry.register(Box::new(rate_limited_requests_total.clone()))?;
        registry.register(Box::new(rate_limit_tracked_clients.clone()))?;

        Ok(Self {
            registry,
            login_attempts_total,
            login_failures_total,
            registrations_total,
            token_rejections_total,
            rate_limited_requests_total,
            rate_limit_tracked_clients,
        })
    }

    /// Record a login attempt and its outcome
    pub fn record_login(&self, success: bool) {
        self.login_attempts_total.inc();
        if !success {
            self.login_failures_total.inc();
        }
    }

    pub fn record_registration(&self) {
        self.registrations_total.inc();
    }

    /// Record a rejected bearer token
    pub fn record_token_rejection(&self, reason: &str) {
        self.token_rejections_total.with_label_values(&[reason]).inc();
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited_requests_total.inc();
    }

    pub fn set_tracked_clients(&self, count: usize) {
        self.rate_limit_tracked_clients.set(count as i64);
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        match encoder.encode_to_string(&metric_families) {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "Failed to encode Prometheus metrics");
                String::new()
            }
        }
    }

    pub fn login_attempts(&self) -> u64 {
        self.login_attempts_total.get()
    }

    pub fn login_failures(&self) -> u64 {
        self.login_failures_total.get()
    }

    pub fn registrations(&self) -> u64 {
        self.registrations_total.get()
    }

    pub fn token_rejections(&self, reason: &str) -> u64 {
        self.token_rejections_total.with_label_values(&[reason]).get()
    }

    pub fn rate_limited_requests(&self) -> u64 {
        self.rate_limited_requests_total.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.record_login(true);
        metrics.record_login(false);
        metrics.record_login(false);

        assert_eq!(metrics.login_attempts(), 3);
        assert_eq!(metrics.login_failures(), 2);
    }

    #[test]
    fn test_token_rejections_by_reason() {
        let metrics = Metrics::new().unwrap();
        metrics.record_token_rejection("expired");
        metrics.record_token_rejection("expired");
        metrics.record_token_rejection("invalid_signature");

        assert_eq!(metrics.token_rejections("expired"), 2);
        assert_eq!(metrics.token_rejections("invalid_signature"), 1);
        assert_eq!(metrics.token_rejections("malformed"), 0);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new().unwrap();
        metrics.record_registration();
        metrics.record_rate_limited();
        metrics.set_tracked_clients(7);

        let output = metrics.export_prometheus();
        assert!(output.contains("blog_registrations_total 1"));
        assert!(output.contains("blog_rate_limited_requests_total 1"));
        assert!(output.contains("blog_rate_limit_tracked_clients 7"));
        assert!(output.contains("# TYPE blog_login_attempts_total counter"));
    }
}
