//! # Prometheus Metrics
//!
//! Operational metrics for the node, scraped at `/metrics` on the metrics
//! port. All metrics live in a dedicated [`prometheus::Registry`] under the
//! `warden` prefix.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use warden_contracts::ProtocolStats;

/// Every metric handle the node records into.
///
/// Prometheus handles are `Arc`s internally, so clones share state.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Contract calls by RPC method and outcome (`ok` / `error`).
    pub contract_calls_total: IntCounterVec,
    /// Blocks produced by the devnet height loop.
    pub blocks_produced_total: IntCounter,
    /// Current host block height.
    pub block_height: IntGauge,
    /// Withdrawal requests waiting to execute.
    pub queued_withdrawals: IntGauge,
    /// Passkeys ever registered.
    pub passkeys_registered: IntGauge,
    /// Successful signature verifications.
    pub verifications: IntGauge,
    /// Wall-clock latency of contract calls, lock wait included.
    pub call_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("warden".into()), None)?;

        let contract_calls_total = IntCounterVec::new(
            Opts::new("contract_calls_total", "Contract calls by method and outcome"),
            &["method", "outcome"],
        )?;
        registry.register(Box::new(contract_calls_total.clone()))?;

        let blocks_produced_total =
            IntCounter::new("blocks_produced_total", "Blocks produced by the height loop")?;
        registry.register(Box::new(blocks_produced_total.clone()))?;

        let block_height = IntGauge::new("block_height", "Current host block height")?;
        registry.register(Box::new(block_height.clone()))?;

        let queued_withdrawals = IntGauge::new(
            "queued_withdrawals",
            "Withdrawal requests waiting out their time-lock",
        )?;
        registry.register(Box::new(queued_withdrawals.clone()))?;

        let passkeys_registered =
            IntGauge::new("passkeys_registered", "Passkeys registered across all wallets")?;
        registry.register(Box::new(passkeys_registered.clone()))?;

        let verifications =
            IntGauge::new("verifications", "Successful passkey signature verifications")?;
        registry.register(Box::new(verifications.clone()))?;

        let call_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "call_latency_seconds",
                "Contract call latency in seconds, lock wait included",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
            ]),
        )?;
        registry.register(Box::new(call_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            contract_calls_total,
            blocks_produced_total,
            block_height,
            queued_withdrawals,
            passkeys_registered,
            verifications,
            call_latency_seconds,
        })
    }

    pub fn record_call(&self, method: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        self.contract_calls_total
            .with_label_values(&[method, outcome])
            .inc();
    }

    /// Mirrors the contract's counters into gauges.
    pub fn observe_stats(&self, stats: &ProtocolStats, height: u64) {
        self.block_height.set(clamp(height));
        self.queued_withdrawals.set(clamp(stats.queued_withdrawals as u64));
        self.passkeys_registered.set(clamp(stats.total_passkeys_registered));
        self.verifications.set(clamp(stats.total_verifications));
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
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
