//! Prometheus metrics for the bootstrap flow
//!
//! Metrics live in an owned [`Registry`] so every operator instance (and
//! every test) gets an isolated set.

use crate::error::{Error, Result};
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Bootstrap stages reported on `windows_bootstrap_failures_total`
pub mod stages {
    pub const MACHINE: &str = "machine";
    pub const USER_DATA: &str = "user_data";
    pub const REMOTE_CONFIGURATION: &str = "remote_configuration";
    pub const CSR: &str = "csr";
    pub const NODE: &str = "node";
    pub const NETWORK: &str = "network";
}

/// Reconcile outcomes reported on `windows_bootstrap_reconciles_total`
pub mod outcomes {
    pub const CONFIGURED: &str = "configured";
    pub const SKIPPED: &str = "skipped";
    pub const NOT_FOUND: &str = "not_found";
    pub const FAILED: &str = "failed";
}

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    reconciles: IntCounterVec,
    csr_approvals: IntCounter,
    failures: IntCounterVec,
    duration: Histogram,
}

fn metric_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let reconciles = IntCounterVec::new(
            Opts::new(
                "windows_bootstrap_reconciles_total",
                "Machine reconciliations by outcome",
            ),
            &["outcome"],
        )
        .map_err(metric_error)?;
        let csr_approvals = IntCounter::new(
            "windows_bootstrap_csr_approvals_total",
            "Certificate signing requests approved",
        )
        .map_err(metric_error)?;
        let failures = IntCounterVec::new(
            Opts::new(
                "windows_bootstrap_failures_total",
                "Bootstrap failures by stage",
            ),
            &["stage"],
        )
        .map_err(metric_error)?;
        let duration = Histogram::with_opts(
            HistogramOpts::new(
                "windows_bootstrap_duration_seconds",
                "Time spent bootstrapping one machine",
            )
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0]),
        )
        .map_err(metric_error)?;

        registry
            .register(Box::new(reconciles.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(csr_approvals.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(failures.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(duration.clone()))
            .map_err(metric_error)?;

        Ok(Self {
            registry,
            reconciles,
            csr_approvals,
            failures,
            duration,
        })
    }

    pub fn record_reconcile(&self, outcome: &str) {
        self.reconciles.with_label_values(&[outcome]).inc();
    }

    pub fn record_csr_approval(&self) {
        self.csr_approvals.inc();
    }

    pub fn record_failure(&self, stage: &str) {
        self.failures.with_label_values(&[stage]).inc();
    }

    pub fn observe_duration(&self, seconds: f64) {
        self.duration.observe(seconds);
    }

    pub fn reconciles(&self, outcome: &str) -> u64 {
        self.reconciles.with_label_values(&[outcome]).get()
    }

    pub fn failures(&self, stage: &str) -> u64 {
        self.failures.with_label_values(&[stage]).get()
    }

    pub fn csr_approvals(&self) -> u64 {
        self.csr_approvals.get()
    }

    /// Render all metrics in the Prometheus text format
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metric_error)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}
