//! Lifecycle watchers
//!
//! Each watcher is a polling loop over one status-scoped ledger query. A
//! cycle handles items one by one; per-item errors are classified and only
//! an unexpected error ends the loop, which in turn ends the process.

use async_trait::async_trait;
use eyre::{eyre, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{BonderError, ErrorKind, HandlerResult, Outcome};
use crate::state::{AppState, ChainContext};
use crate::sync::SyncWatcher;

pub mod bond_transfer_root;
pub mod bond_withdrawal;
pub mod challenge;
pub mod commit;
pub mod confirm_roots;
pub mod settle;

pub use bond_transfer_root::BondTransferRootWatcher;
pub use bond_withdrawal::BondWithdrawalWatcher;
pub use challenge::ChallengeWatcher;
pub use commit::CommitTransfersWatcher;
pub use confirm_roots::ConfirmRootsWatcher;
pub use settle::SettleBondedWithdrawalWatcher;

/// How often a watcher rechecks the sync registry before its first cycle
const SYNC_WAIT_POLL: Duration = Duration::from_secs(5);

/// Used when the L1 bridge does not expose its challenge period
pub const CHALLENGE_PERIOD_FALLBACK_SECS: u64 = 24 * 60 * 60;

/// Used when the L1 bridge does not expose its challenge resolution period
pub const CHALLENGE_RESOLUTION_PERIOD_FALLBACK_SECS: u64 = 10 * 24 * 60 * 60;

#[async_trait]
pub trait Watcher: Send + Sync {
    /// Short label used in logs and metrics
    fn name(&self) -> &'static str;

    fn chain(&self) -> &ChainContext;

    fn poll_interval(&self) -> Duration;

    /// One reconciliation cycle. Only unexpected errors are returned.
    async fn poll(&self) -> Result<(), BonderError>;
}

/// Run a watcher until it fails
pub async fn run_watcher(state: AppState, watcher: Arc<dyn Watcher>) -> Result<()> {
    let chain = watcher.chain().slug;
    let name = watcher.name();

    while !state.sync_status.all_synced().await {
        debug!(watcher = name, chain = %chain, "Waiting for initial sync");
        tokio::time::sleep(SYNC_WAIT_POLL).await;
    }
    info!(watcher = name, chain = %chain, "Starting watcher");

    loop {
        if let Err(e) = watcher.poll().await {
            match e.kind() {
                ErrorKind::Unexpected => {
                    error!(watcher = name, chain = %chain, error = %e, "Watcher failed");
                    state
                        .notifier
                        .error(&format!("{} watcher on {} failed: {}", name, chain, e))
                        .await;
                    return Err(eyre!("{} watcher on {} failed: {}", name, chain, e));
                }
                kind => {
                    state
                        .metrics
                        .record_error(chain.as_str(), name, kind.as_str());
                    warn!(watcher = name, chain = %chain, error = %e, "Watcher cycle failed");
                }
            }
        }
        tokio::time::sleep(watcher.poll_interval()).await;
    }
}

/// Log and count one item's result; returns `Err` only for unexpected errors
pub async fn report(
    state: &AppState,
    chain: &ChainContext,
    action: &'static str,
    item: &str,
    result: HandlerResult,
) -> Result<(), BonderError> {
    let slug = chain.slug.as_str();
    match result {
        Ok(Outcome::Sent { tx_hash }) => {
            info!(chain = slug, action, item, tx_hash = %tx_hash, "Action sent");
            state.metrics.record_tx(slug, action, "sent");
        }
        Ok(Outcome::AlreadyHandled) => {
            info!(chain = slug, action, item, "Already handled");
            state.metrics.record_tx(slug, action, "already_handled");
        }
        Ok(Outcome::DryRun) => {
            info!(chain = slug, action, item, "Dry mode: action not sent");
            state.metrics.record_tx(slug, action, "dry_run");
        }
        Ok(Outcome::Skipped) => {
            debug!(chain = slug, action, item, "Skipped");
        }
        Err(e) => {
            let kind = e.kind();
            state.metrics.record_error(slug, action, kind.as_str());
            match kind {
                ErrorKind::Transient => {
                    warn!(chain = slug, action, item, error = %e, "Transient failure")
                }
                ErrorKind::NotFound => warn!(chain = slug, action, item, error = %e, "Not found"),
                ErrorKind::Deferred => info!(chain = slug, action, item, error = %e, "Deferred"),
                ErrorKind::Reverted => {
                    error!(chain = slug, action, item, error = %e, "Transaction reverted");
                    state.metrics.record_tx(slug, action, "reverted");
                    state
                        .notifier
                        .error(&format!("{} on {} reverted for {}: {}", action, slug, item, e))
                        .await;
                }
                ErrorKind::Unexpected => {
                    error!(chain = slug, action, item, error = %e, "Unexpected failure");
                    return Err(e);
                }
            }
        }
    }
    Ok(())
}

/// Wait `rank × rank_delay`, polling `already_done`; `true` when another
/// bonder handled the item in the meantime. Rank 0 never waits.
pub async fn wait_for_rank<F, Fut>(state: &AppState, mut already_done: F) -> Result<bool, BonderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, BonderError>>,
{
    let rank = state.policy.rank;
    if rank == 0 {
        return Ok(false);
    }

    let deadline = Instant::now() + state.timing.rank_delay() * rank;
    let poll = state.timing.rank_poll();
    debug!(rank, "Waiting for higher-ranked bonders");

    loop {
        if already_done().await? {
            return Ok(true);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(poll.min(deadline - now)).await;
    }
}

/// Challenge period of the L1 bridge in seconds
pub async fn challenge_period(state: &AppState) -> u64 {
    match state.chains.l1().client.challenge_period().await {
        Ok(period) => period,
        Err(e) => {
            warn!(error = %e, "Using fallback challenge period");
            CHALLENGE_PERIOD_FALLBACK_SECS
        }
    }
}

/// Challenge resolution period of the L1 bridge in seconds
pub async fn challenge_resolution_period(state: &AppState) -> u64 {
    match state.chains.l1().client.challenge_resolution_period().await {
        Ok(period) => period,
        Err(e) => {
            warn!(error = %e, "Using fallback challenge resolution period");
            CHALLENGE_RESOLUTION_PERIOD_FALLBACK_SECS
        }
    }
}

/// Spawns sync and lifecycle watchers and fails fast on the first exit
pub struct WatcherManager {
    state: AppState,
}

impl WatcherManager {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Lifecycle watchers for every configured chain
    pub fn lifecycle_watchers(state: &AppState) -> Vec<Arc<dyn Watcher>> {
        let mut watchers: Vec<Arc<dyn Watcher>> = Vec::new();

        for chain in state.chains.iter() {
            watchers.push(Arc::new(SettleBondedWithdrawalWatcher::new(
                state.clone(),
                chain.clone(),
            )));

            if chain.is_l1() {
                watchers.push(Arc::new(ChallengeWatcher::new(state.clone(), chain.clone())));
                continue;
            }

            watchers.push(Arc::new(BondWithdrawalWatcher::new(
                state.clone(),
                chain.clone(),
            )));
            watchers.push(Arc::new(CommitTransfersWatcher::new(
                state.clone(),
                chain.clone(),
            )));
            watchers.push(Arc::new(ConfirmRootsWatcher::new(state.clone(), chain.clone())));
            if chain.is_oru() {
                watchers.push(Arc::new(BondTransferRootWatcher::new(
                    state.clone(),
                    chain.clone(),
                )));
            }
        }
        watchers
    }

    /// Run all watchers concurrently
    /// Returns when any watcher fails or shutdown signal received
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        let mut join_set = tokio::task::JoinSet::new();

        for chain in self.state.chains.iter() {
            let sync = SyncWatcher::new(self.state.clone(), chain.clone());
            join_set.spawn(async move { sync.run().await });
        }

        let watchers = Self::lifecycle_watchers(&self.state);
        info!(
            chains = self.state.chains.iter().count(),
            watchers = watchers.len(),
            dry_mode = self.state.is_dry(),
            rank = self.state.policy.rank,
            "Watcher manager started"
        );
        for watcher in watchers {
            let state = self.state.clone();
            join_set.spawn(async move { run_watcher(state, watcher).await });
        }

        tokio::select! {
            _ = shutdown.recv() => {
                info!("Shutdown signal received, stopping watchers");
                join_set.abort_all();
                Ok(())
            }
            maybe_done = join_set.join_next() => {
                match maybe_done {
                    Some(Ok(Ok(()))) => {
                        error!("A watcher exited unexpectedly without error");
                        Err(eyre!("watcher exited unexpectedly"))
                    }
                    Some(Ok(Err(e))) => {
                        error!("A watcher stopped with error: {:?}", e);
                        Err(e)
                    }
                    Some(Err(e)) => {
                        error!("A watcher task panicked: {:?}", e);
                        Err(eyre!("watcher task panicked: {}", e))
                    }
                    None => {
                        error!("All watcher tasks exited unexpectedly");
                        Err(eyre!("all watcher tasks exited unexpectedly"))
                    }
                }
            }
        }
    }
}
