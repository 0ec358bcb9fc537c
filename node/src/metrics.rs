//! # Prometheus Metrics
//!
//! Devnet metrics, scraped at `/metrics` on the metrics port. Message
//! counters mirror the router's statistics; gauges mirror the vault.
//!
//! Everything is registered in a dedicated [`prometheus::Registry`] under
//! the `stake_across` prefix.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

use stake_across_protocol::config::ONE_TOKEN;
use stake_across_protocol::Amount;

use crate::devnet::Devnet;

#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Messages the router accepted.
    pub messages_sent_total: IntCounter,
    /// First-time deliveries applied by a receiver.
    pub messages_delivered_total: IntCounter,
    /// Deliveries discarded as already processed.
    pub duplicates_discarded_total: IntCounter,
    /// Messages the router gave up on.
    pub deliveries_failed_total: IntCounter,
    /// Messages queued and not yet delivered.
    pub messages_in_flight: IntGauge,
    /// Redemptions burned whose release never left.
    pub stranded_releases: IntGauge,
    /// Vault total assets, in whole tokens.
    pub vault_total_assets: Gauge,
    /// Vault share supply, in whole shares.
    pub vault_total_shares: Gauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let metric = IntCounter::new(name, help)?;
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

fn int_gauge(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntGauge> {
    let metric = IntGauge::new(name, help)?;
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> prometheus::Result<Gauge> {
    let metric = Gauge::new(name, help)?;
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

/// Raises `counter` to `value`. Counters never go down.
fn advance(counter: &IntCounter, value: u64) {
    let current = counter.get();
    if value > current {
        counter.inc_by(value - current);
    }
}

fn whole_tokens(amount: Amount) -> f64 {
    amount as f64 / ONE_TOKEN as f64
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("stake_across".into()), None)?;

        Ok(Self {
            messages_sent_total: counter(
                &registry,
                "messages_sent_total",
                "Cross-chain messages accepted by the router",
            )?,
            messages_delivered_total: counter(
                &registry,
                "messages_delivered_total",
                "Messages applied by their destination endpoint",
            )?,
            duplicates_discarded_total: counter(
                &registry,
                "duplicates_discarded_total",
                "Deliveries discarded because the message was already processed",
            )?,
            deliveries_failed_total: counter(
                &registry,
                "deliveries_failed_total",
                "Messages permanently failed by the router",
            )?,
            messages_in_flight: int_gauge(
                &registry,
                "messages_in_flight",
                "Messages queued in the router",
            )?,
            stranded_releases: int_gauge(
                &registry,
                "stranded_releases",
                "Redemptions burned whose release message was rejected",
            )?,
            vault_total_assets: gauge(
                &registry,
                "vault_total_assets",
                "Assets held by the vault, in whole tokens",
            )?,
            vault_total_shares: gauge(
                &registry,
                "vault_total_shares",
                "Outstanding vault shares, in whole shares",
            )?,
            registry,
        })
    }

    /// Brings every metric up to date with `devnet`.
    pub fn observe(&self, devnet: &Devnet) {
        let stats = devnet.router().stats();
        advance(&self.messages_sent_total, stats.sent);
        advance(&self.messages_delivered_total, stats.applied);
        advance(&self.duplicates_discarded_total, stats.duplicates);
        advance(&self.deliveries_failed_total, stats.failed);
        self.messages_in_flight.set(stats.in_flight as i64);

        let status = devnet.status();
        self.stranded_releases.set(status.stranded_releases as i64);
        self.vault_total_assets
            .set(whole_tokens(status.vault.total_assets));
        self.vault_total_shares
            .set(whole_tokens(status.vault.total_shares));
    }

    /// Encodes all registered metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// `GET /metrics`.
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
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devnet::DevnetConfig;

    #[test]
    fn observe_tracks_router_and_vault() {
        let devnet = Devnet::open(DevnetConfig::default(), None).unwrap();
        devnet.setup().unwrap();
        devnet.run_transfer_flow().unwrap();

        let metrics = NodeMetrics::new().unwrap();
        metrics.observe(&devnet);
        assert_eq!(metrics.messages_sent_total.get(), 2);
        assert_eq!(metrics.messages_in_flight.get(), 2);
        assert_eq!(metrics.messages_delivered_total.get(), 0);

        devnet.deliver();
        metrics.observe(&devnet);
        metrics.observe(&devnet);
        assert_eq!(metrics.messages_delivered_total.get(), 2);
        assert_eq!(metrics.messages_in_flight.get(), 0);
        assert!((metrics.vault_total_assets.get() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn encode_uses_prefix() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.messages_sent_total.inc();
        let body = metrics.encode().unwrap();
        assert!(body.contains("stake_across_messages_sent_total 1"));
        assert!(body.contains("stake_across_vault_total_shares"));
    }
}
