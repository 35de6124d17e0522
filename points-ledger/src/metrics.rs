//! Metrics collection for observability
//!
//! Prometheus metrics for the transfer path, registered on a private
//! registry so several ledgers can live in one process.
//!
//! # Metrics
//!
//! - `points_transfers_total` - Transfers committed
//! - `points_transfers_failed_total` - Transfers aborted after validation
//! - `points_transfers_rejected_total` - Transfers rejected for malformed fields
//! - `points_transfers_invalid_recorded_total` - Transfers recorded with status 0
//! - `points_transfer_duration_seconds` - Histogram of transfer latencies
//! - `points_last_reference_number` - Last reference number allocated

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Transfers committed
    pub transfers_total: IntCounter,

    /// Transfers aborted after a reference number was drawn
    pub transfers_failed: IntCounter,

    /// Transfers rejected before touching state
    pub transfers_rejected: IntCounter,

    /// Transfers recorded with an invalid numeric field
    pub invalid_recorded: IntCounter,

    /// Transfer duration histogram
    pub transfer_duration: Histogram,

    /// Last allocated reference number
    pub last_reference: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transfers_total =
            IntCounter::new("points_transfers_total", "Transfers committed")?;
        registry.register(Box::new(transfers_total.clone()))?;

        let transfers_failed = IntCounter::new(
            "points_transfers_failed_total",
            "Transfers aborted after a reference number was drawn",
        )?;
        registry.register(Box::new(transfers_failed.clone()))?;

        let transfers_rejected = IntCounter::new(
            "points_transfers_rejected_total",
            "Transfers rejected for malformed numeric fields",
        )?;
        registry.register(Box::new(transfers_rejected.clone()))?;

        let invalid_recorded = IntCounter::new(
            "points_transfers_invalid_recorded_total",
            "Transfers recorded with status code 0",
        )?;
        registry.register(Box::new(invalid_recorded.clone()))?;

        let transfer_duration = Histogram::with_opts(
            HistogramOpts::new(
                "points_transfer_duration_seconds",
                "Histogram of transfer latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
        )?;
        registry.register(Box::new(transfer_duration.clone()))?;

        let last_reference = IntGauge::new(
            "points_last_reference_number",
            "Last reference number allocated",
        )?;
        registry.register(Box::new(last_reference.clone()))?;

        Ok(Self {
            transfers_total,
            transfers_failed,
            transfers_rejected,
            invalid_recorded,
            transfer_duration,
            last_reference,
            registry,
        })
    }

    /// Record a committed transfer
    pub fn record_transfer(&self, duration_seconds: f64) {
        self.transfers_total.inc();
        self.transfer_duration.observe(duration_seconds);
    }

    /// Record a transfer aborted after allocation
    pub fn record_failure(&self) {
        self.transfers_failed.inc();
    }

    /// Record a transfer rejected before allocation
    pub fn record_rejection(&self) {
        self.transfers_rejected.inc();
    }

    /// Record a transfer committed with status 0
    pub fn record_invalid_recorded(&self) {
        self.invalid_recorded.inc();
    }

    /// Update the reference gauge
    pub fn record_reference(&self, reference: u64) {
        self.last_reference.set(reference as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("transfers_total", &self.transfers_total.get())
            .field("transfers_failed", &self.transfers_failed.get())
            .field("transfers_rejected", &self.transfers_rejected.get())
            .finish()
    }
}
