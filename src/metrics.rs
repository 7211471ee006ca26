//! Prometheus metrics for the bonder node

use prometheus::{GaugeVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

/// Prometheus metrics
pub struct Metrics {
    /// Bridge events handled, by chain and event name
    pub events_synced_total: IntCounterVec,
    /// Highest block fully synced, per chain
    pub last_synced_block: IntGaugeVec,
    /// Transactions by chain, action and status (sent, reverted, dry_run, already_handled)
    pub transactions_total: IntCounterVec,
    /// Handler failures by chain, watcher and error kind
    pub handler_errors_total: IntCounterVec,
    /// Available bonder credit per chain (token base units, lossy)
    pub available_credit: GaugeVec,
    /// Records still missing derived fields, per chain
    pub incomplete_items: IntGaugeVec,
    /// Set to 1 once every chain finished its initial sync
    pub up: IntGauge,
    pub registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let events_synced_total = IntCounterVec::new(
            Opts::new("bonder_events_synced_total", "Total bridge events handled"),
            &["chain", "event"],
        )
        .expect("constant metric name is valid");

        let last_synced_block = IntGaugeVec::new(
            Opts::new("bonder_last_synced_block", "Last block synced per chain"),
            &["chain"],
        )
        .expect("constant metric name is valid");

        let transactions_total = IntCounterVec::new(
            Opts::new("bonder_transactions_total", "Bonder transactions by outcome"),
            &["chain", "action", "status"],
        )
        .expect("constant metric name is valid");

        let handler_errors_total = IntCounterVec::new(
            Opts::new("bonder_handler_errors_total", "Watcher handler failures"),
            &["chain", "watcher", "kind"],
        )
        .expect("constant metric name is valid");

        let available_credit = GaugeVec::new(
            Opts::new("bonder_available_credit", "Available bonder credit per chain"),
            &["chain"],
        )
        .expect("constant metric name is valid");

        let incomplete_items = IntGaugeVec::new(
            Opts::new(
                "bonder_incomplete_items",
                "Ledger records still missing derived fields",
            ),
            &["chain"],
        )
        .expect("constant metric name is valid");

        let up = IntGauge::new("bonder_up", "1 once the initial sync has completed")
            .expect("constant metric name is valid");

        registry
            .register(Box::new(events_synced_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(last_synced_block.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(transactions_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(handler_errors_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(available_credit.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(incomplete_items.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(up.clone()))
            .expect("metric registration must not be called twice");

        Self {
            events_synced_total,
            last_synced_block,
            transactions_total,
            handler_errors_total,
            available_credit,
            incomplete_items,
            up,
            registry,
        }
    }

    pub fn record_tx(&self, chain: &str, action: &str, status: &str) {
        self.transactions_total
            .with_label_values(&[chain, action, status])
            .inc();
    }

    pub fn record_error(&self, chain: &str, watcher: &str, kind: &str) {
        self.handler_errors_total
            .with_label_values(&[chain, watcher, kind])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_and_gather() {
        let metrics = Metrics::new();
        metrics.record_tx("optimism", "bond_withdrawal", "sent");
        metrics.record_error("ethereum", "challenge", "transient");
        metrics.up.set(1);

        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"bonder_transactions_total".to_string()));
        assert!(names.contains(&"bonder_handler_errors_total".to_string()));
        assert!(names.contains(&"bonder_up".to_string()));
        assert_eq!(
            metrics
                .transactions_total
                .with_label_values(&["optimism", "bond_withdrawal", "sent"])
                .get(),
            1
        );
    }
}
