//! Drives committed roots of one L2 source toward confirmation on L1
//!
//! Exitable roots go through the chain's relay strategy. Bonded roots past
//! the challenge period are confirmed in one batched `confirmRoots` call on
//! the L1 messenger wrapper, and only after the batch passes validation.

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{challenge_period, report, Watcher};
use crate::chain::{ConfirmBatch, ValidatedConfirmBatch};
use crate::db::{TransferRoot, TransferRootUpdate};
use crate::error::{BonderError, ChainError, HandlerResult, Outcome};
use crate::hash::transfer_root_id;
use crate::state::{AppState, ChainContext};

pub struct ConfirmRootsWatcher {
    state: AppState,
    chain: Arc<ChainContext>,
}

impl ConfirmRootsWatcher {
    pub fn new(state: AppState, chain: Arc<ChainContext>) -> Self {
        Self { state, chain }
    }

    async fn update(&self, id: B256, update: TransferRootUpdate) -> Result<(), BonderError> {
        self.state.store.update_transfer_root(id, update).await?;
        Ok(())
    }

    async fn set_sent_at(&self, id: B256, sent: bool) -> Result<(), BonderError> {
        self.update(
            id,
            TransferRootUpdate {
                sent_confirm_tx_at: Some(sent.then(Utc::now)),
                ..Default::default()
            },
        )
        .await
    }

    /// `true` when L1 already knows the root, which is then marked confirmed
    async fn confirmed_on_l1(&self, id: B256, destination: u64) -> Result<bool, BonderError> {
        let at = self
            .state
            .chains
            .l1()
            .client
            .transfer_root_committed_at(destination, id)
            .await?;
        if at == 0 {
            return Ok(false);
        }
        self.update(
            id,
            TransferRootUpdate {
                committed: Some(true),
                confirmed: Some(true),
                confirmed_at: Some(at),
                ..Default::default()
            },
        )
        .await?;
        Ok(true)
    }

    pub async fn handle_exitable(&self, root: &TransferRoot) -> HandlerResult {
        let id = root.transfer_root_id;
        let (Some(commit_tx_hash), Some(destination)) =
            (root.commit_tx_hash, root.destination_chain_id)
        else {
            return Err(BonderError::NotFound(format!("commit fields of root {id}")));
        };

        if self.confirmed_on_l1(id, destination).await? {
            return Ok(Outcome::AlreadyHandled);
        }

        let Some(relay) = self.chain.relay.clone() else {
            warn!(chain = %self.chain.slug, transfer_root_id = %id, "No relay strategy for chain");
            return Ok(Outcome::Skipped);
        };

        if self.state.is_dry() {
            info!(
                transfer_root_id = %id,
                commit_tx_hash = %commit_tx_hash,
                strategy = relay.name(),
                "Would relay commit message"
            );
            return Ok(Outcome::DryRun);
        }

        self.set_sent_at(id, true).await?;
        let result = relay.handle_commit_tx_hash(commit_tx_hash, id).await;
        if matches!(result, Err(_) | Ok(Outcome::Skipped)) {
            self.set_sent_at(id, false).await?;
        }
        result
    }

    /// Batch of bonded roots not yet confirmed on L1
    async fn build_batch(&self, roots: &[TransferRoot]) -> Result<(ConfirmBatch, Vec<B256>), BonderError> {
        let mut batch = ConfirmBatch::default();
        let mut ids = Vec::new();
        for root in roots {
            let (Some(hash), Some(destination), Some(total), Some(committed_at)) = (
                root.transfer_root_hash,
                root.destination_chain_id,
                root.total_amount,
                root.committed_at,
            ) else {
                continue;
            };
            if self.confirmed_on_l1(root.transfer_root_id, destination).await? {
                info!(transfer_root_id = %root.transfer_root_id, "Root already confirmed");
                continue;
            }
            batch.push(hash, destination, total, committed_at);
            ids.push(root.transfer_root_id);
        }
        Ok((batch, ids))
    }

    pub async fn handle_confirmable(&self, roots: &[TransferRoot], period: u64) -> HandlerResult {
        let (batch, ids) = self.build_batch(roots).await?;
        if batch.is_empty() {
            return Ok(Outcome::AlreadyHandled);
        }

        let Some(wrapper) = self.chain.wrapper_address else {
            warn!(chain = %self.chain.slug, roots = batch.len(), "No messenger wrapper configured");
            return Ok(Outcome::Skipped);
        };

        if self.state.is_dry() {
            info!(chain = %self.chain.slug, roots = batch.len(), "Would confirm roots");
            return Ok(Outcome::DryRun);
        }

        if let Some(reason) = self.validate(&batch, wrapper, period).await? {
            self.state.disable_writes(&reason);
            self.state
                .notifier
                .error(&format!(
                    "confirmRoots validation failed on {}: {}",
                    self.chain.slug, reason
                ))
                .await;
            return Ok(Outcome::Skipped);
        }

        let Some(batch) = ValidatedConfirmBatch::new(batch) else {
            return Ok(Outcome::Skipped);
        };

        for id in &ids {
            self.set_sent_at(*id, true).await?;
        }

        info!(chain = %self.chain.slug, roots = batch.batch().len(), "Confirming roots");
        let l1 = self.state.chains.l1();
        match l1.client.confirm_roots(wrapper, &batch).await {
            Ok(tx_hash) => Ok(Outcome::Sent { tx_hash }),
            Err(e) => {
                if matches!(e, ChainError::Reverted { .. } | ChainError::NonceTooLow(_)) {
                    for id in &ids {
                        self.set_sent_at(*id, false).await?;
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Cross-array and on-chain consistency of a batch; `Some(reason)` on failure
    async fn validate(
        &self,
        batch: &ConfirmBatch,
        wrapper: Address,
        period: u64,
    ) -> Result<Option<String>, BonderError> {
        if !batch.lengths_match() {
            return Ok(Some("confirm batch arrays differ in length".to_string()));
        }

        let state = &self.state;
        let l1 = state.chains.l1();
        let source = self.chain.chain_id;

        let wrapper_chain = l1.client.wrapper_l2_chain_id(wrapper).await?;
        if wrapper_chain != source {
            return Ok(Some(format!(
                "wrapper {wrapper} serves chain {wrapper_chain}, not {source}"
            )));
        }

        let now = state.clock().unix();
        for i in 0..batch.len() {
            let hash = batch.root_hashes[i];
            let destination = batch.destination_chain_ids[i];
            let total = batch.total_amounts[i];
            let committed_at = batch.root_committed_ats[i];
            let id = transfer_root_id(hash, total);

            let Some(stored) = state.store.get_by_transfer_root_id(id).await? else {
                return Ok(Some(format!("no ledger record for root {id}")));
            };
            if stored.transfer_root_hash != Some(hash)
                || stored.destination_chain_id != Some(destination)
                || stored.total_amount != Some(total)
                || stored.committed_at != Some(committed_at)
            {
                return Ok(Some(format!("ledger fields of root {id} do not match batch")));
            }
            if stored.source_chain_id != Some(source) {
                return Ok(Some(format!("root {id} does not originate on {source}")));
            }
            if destination == source {
                return Ok(Some(format!("root {id} has destination equal to source")));
            }

            for chain_id in state.chains.chain_ids() {
                if l1.client.transfer_root_committed_at(chain_id, id).await? > 0 {
                    return Ok(Some(format!("root {id} already confirmed for {chain_id}")));
                }
            }

            if stored.bonded {
                let bond = l1.client.transfer_bond(id).await?;
                if !bond.exists() {
                    return Ok(Some(format!("root {id} has no bond on L1")));
                }
                if bond.challenge_start_time > 0 {
                    return Ok(Some(format!("root {id} bond is challenged")));
                }
                if now.saturating_sub(bond.created_at) <= period {
                    return Ok(Some(format!("root {id} still in challenge period")));
                }
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Watcher for ConfirmRootsWatcher {
    fn name(&self) -> &'static str {
        "confirm_roots"
    }

    fn chain(&self) -> &ChainContext {
        &self.chain
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.state.timing.confirm_poll_interval_ms)
    }

    async fn poll(&self) -> Result<(), BonderError> {
        let clock = self.state.clock();
        let exitable = self
            .state
            .store
            .get_exitable_transfer_roots(self.chain.chain_id, self.chain.is_oru(), &clock)
            .await?;
        for root in &exitable {
            let item = format!("transfer root {}", root.transfer_root_id);
            let result = self.handle_exitable(root).await;
            report(&self.state, &self.chain, "relay_commit", &item, result).await?;
        }

        let period = challenge_period(&self.state).await;
        let confirmable = self
            .state
            .store
            .get_confirmable_transfer_roots(self.chain.chain_id, period, &clock)
            .await?;
        if confirmable.is_empty() {
            return Ok(());
        }
        let item = format!("{} bonded roots", confirmable.len());
        let result = self.handle_confirmable(&confirmable, period).await;
        report(&self.state, &self.chain, self.name(), &item, result).await
    }
}
