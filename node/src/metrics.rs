//! # Prometheus Metrics
//!
//! Operational metrics for the node, scraped at `/metrics` on the metrics
//! port. Everything lives in a dedicated registry with the `termvault`
//! namespace.
//!
//! The gauges are refreshed from the bank after every mutation, so they
//! always match what a restart would compute from the snapshot.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Successful mints.
    pub mints_total: IntCounter,
    /// Operator grants set.
    pub operator_grants_total: IntCounter,
    /// Deposits created.
    pub deposits_total: IntCounter,
    /// Deposits settled.
    pub withdrawals_total: IntCounter,
    /// Calls rejected by the core, by error kind.
    pub rejected_total: IntCounterVec,
    /// Deposits not yet withdrawn.
    pub open_deposits: IntGauge,
    /// Sum of open principals, in micro-units.
    pub locked_principal: IntGauge,
    /// Handler latency in seconds.
    pub request_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("termvault".into()), None)?;

        let mints_total = IntCounter::new("mints_total", "Total number of successful mints")?;
        registry.register(Box::new(mints_total.clone()))?;

        let operator_grants_total =
            IntCounter::new("operator_grants_total", "Total number of operator grants set")?;
        registry.register(Box::new(operator_grants_total.clone()))?;

        let deposits_total = IntCounter::new("deposits_total", "Total number of deposits created")?;
        registry.register(Box::new(deposits_total.clone()))?;

        let withdrawals_total =
            IntCounter::new("withdrawals_total", "Total number of deposits withdrawn")?;
        registry.register(Box::new(withdrawals_total.clone()))?;

        let rejected_total = IntCounterVec::new(
            Opts::new("rejected_total", "Calls rejected by the ledger or the bank"),
            &["kind"],
        )?;
        registry.register(Box::new(rejected_total.clone()))?;

        let open_deposits = IntGauge::new("open_deposits", "Deposits not yet withdrawn")?;
        registry.register(Box::new(open_deposits.clone()))?;

        let locked_principal = IntGauge::new(
            "locked_principal",
            "Sum of open deposit principals in micro-units",
        )?;
        registry.register(Box::new(locked_principal.clone()))?;

        let request_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "request_latency_seconds",
                "API handler latency in seconds",
            )
            .buckets(vec![
                0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
        )?;
        registry.register(Box::new(request_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            mints_total,
            operator_grants_total,
            deposits_total,
            withdrawals_total,
            rejected_total,
            open_deposits,
            locked_principal,
            request_latency_seconds,
        })
    }

    /// Record a rejected call under `kind`.
    pub fn reject(&self, kind: &str) {
        self.rejected_total.with_label_values(&[kind]).inc();
    }

    /// Set the bank gauges.
    pub fn set_bank_gauges(&self, open_deposits: usize, locked_principal: u64) {
        self.open_deposits.set(open_deposits as i64);
        self.locked_principal
            .set(i64::try_from(locked_principal).unwrap_or(i64::MAX));
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
