//! Prometheus metrics for audit runs
//!
//! - `infra_check_results_total` (counter) - results by severity and category
//! - `infra_check_attempts_total` (counter) - channel invocations by outcome
//! - `infra_check_invocation_seconds` (histogram) - channel invocation latency
//! - `infra_check_in_flight` (gauge) - channel invocations in progress
//! - `infra_check_runs_total` (counter) - completed runs by exit status

use crate::contracts::{CheckResult, ExitStatus};
use crate::error::{EngineError, Result};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

const NAMESPACE: &str = "infra_check";

pub struct AuditMetrics {
    registry: Registry,
    results_total: IntCounterVec,
    attempts_total: IntCounterVec,
    invocation_seconds: HistogramVec,
    in_flight: IntGauge,
    runs_total: IntCounterVec,
}

impl AuditMetrics {
    /// Metrics on a fresh registry
    pub fn new() -> Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Register on an existing registry
    pub fn with_registry(registry: Registry) -> Result<Self> {
        let results_total = IntCounterVec::new(
            Opts::new("results_total", "Check results by severity and category")
                .namespace(NAMESPACE),
            &["severity", "category"],
        )?;

        let attempts_total = IntCounterVec::new(
            Opts::new("attempts_total", "Channel invocations by outcome").namespace(NAMESPACE),
            &["channel", "outcome"],
        )?;

        let invocation_seconds = HistogramVec::new(
            HistogramOpts::new("invocation_seconds", "Channel invocation duration in seconds")
                .namespace(NAMESPACE)
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["channel"],
        )?;

        let in_flight = IntGauge::with_opts(
            Opts::new("in_flight", "Channel invocations in progress").namespace(NAMESPACE),
        )?;

        let runs_total = IntCounterVec::new(
            Opts::new("runs_total", "Completed audit runs by exit status").namespace(NAMESPACE),
            &["exit"],
        )?;

        registry.register(Box::new(results_total.clone()))?;
        registry.register(Box::new(attempts_total.clone()))?;
        registry.register(Box::new(invocation_seconds.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;
        registry.register(Box::new(runs_total.clone()))?;

        Ok(Self {
            registry,
            results_total,
            attempts_total,
            invocation_seconds,
            in_flight,
            runs_total,
        })
    }

    pub fn record_result(&self, result: &CheckResult) {
        self.results_total
            .with_label_values(&[result.severity.as_str(), result.category.label()])
            .inc();
    }

    /// `outcome` is one of succeeded, failed, timed_out
    pub fn record_attempt(&self, channel: &str, outcome: &str, duration_secs: f64) {
        self.attempts_total
            .with_label_values(&[channel, outcome])
            .inc();
        self.invocation_seconds
            .with_label_values(&[channel])
            .observe(duration_secs);
    }

    pub fn record_run(&self, exit: ExitStatus) {
        self.runs_total
            .with_label_values(&[&exit.code().to_string()])
            .inc();
    }

    /// Count an invocation as in flight until the guard drops
    pub fn track_in_flight(&self) -> InFlightGuard<'_> {
        self.in_flight.inc();
        InFlightGuard { metrics: self }
    }

    pub fn in_flight(&self) -> i64 {
        self.in_flight.get()
    }

    pub fn results_count(&self, severity: &str, category: &str) -> u64 {
        self.results_total
            .with_label_values(&[severity, category])
            .get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| EngineError::Metrics(prometheus::Error::Msg(e.to_string())))
    }
}

/// Decrements the in-flight gauge on drop
pub struct InFlightGuard<'a> {
    metrics: &'a AuditMetrics,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.metrics.in_flight.dec();
    }
}
