//! Commits pending transfers on an L2 source once a route's threshold is met

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{report, Watcher};
use crate::error::{BonderError, HandlerResult, Outcome};
use crate::state::{AppState, ChainContext, SentAtGuard};

pub struct CommitTransfersWatcher {
    state: AppState,
    chain: Arc<ChainContext>,
    /// In-flight commit per destination chain id
    sent_at: Mutex<SentAtGuard<u64>>,
}

impl CommitTransfersWatcher {
    pub fn new(state: AppState, chain: Arc<ChainContext>) -> Self {
        let ttl = state.timing.tx_retry_delay();
        Self {
            state,
            chain,
            sent_at: Mutex::new(SentAtGuard::new(ttl)),
        }
    }

    pub async fn handle(&self, destination: u64) -> HandlerResult {
        if self.sent_at.lock().await.is_pending(&destination) {
            info!(
                chain = %self.chain.slug,
                destination,
                "Commit transaction already in mempool"
            );
            return Ok(Outcome::Skipped);
        }

        let pending = self
            .chain
            .client
            .pending_amount_for_chain_id(destination)
            .await?;
        let threshold = self.chain.commit_threshold(destination);
        if pending.is_zero() || pending <= threshold {
            debug!(
                chain = %self.chain.slug,
                destination,
                pending = %pending,
                threshold = %threshold,
                "Pending amount below commit threshold"
            );
            return Ok(Outcome::Skipped);
        }

        if self.state.is_dry() {
            info!(chain = %self.chain.slug, destination, pending = %pending, "Would commit transfers");
            return Ok(Outcome::DryRun);
        }

        if !self.sent_at.lock().await.try_acquire(destination) {
            return Ok(Outcome::Skipped);
        }

        let result = self.chain.client.commit_transfers(destination).await;
        self.sent_at.lock().await.release(&destination);
        let tx_hash = result?;

        self.state
            .notifier
            .info(&format!(
                "commitTransfers {} -> {} pending {} tx {}",
                self.chain.chain_id, destination, pending, tx_hash
            ))
            .await;
        Ok(Outcome::Sent { tx_hash })
    }
}

#[async_trait]
impl Watcher for CommitTransfersWatcher {
    fn name(&self) -> &'static str {
        "commit_transfers"
    }

    fn chain(&self) -> &ChainContext {
        &self.chain
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.state.timing.commit_poll_interval_ms)
    }

    async fn poll(&self) -> Result<(), BonderError> {
        let destinations: BTreeSet<u64> = self
            .state
            .store
            .get_uncommitted_transfers(self.chain.chain_id, None)
            .await?
            .into_iter()
            .filter_map(|t| t.destination_chain_id)
            .collect();

        for destination in destinations {
            let result = self.handle(destination).await;
            let item = format!("route {}->{}", self.chain.chain_id, destination);
            report(&self.state, &self.chain, self.name(), &item, result).await?;
        }
        Ok(())
    }
}
