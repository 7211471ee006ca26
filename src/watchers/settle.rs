//! Reclaims bonded withdrawals once their root is set on the destination

use alloy::primitives::{B256, U256};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{report, Watcher};
use crate::db::{TransferRoot, TransferRootUpdate, TransferUpdate};
use crate::error::{BonderError, ChainError, HandlerResult, Outcome};
use crate::merkle;
use crate::state::{AppState, ChainContext};
use crate::sync::handlers::refresh_all_settled;

pub struct SettleBondedWithdrawalWatcher {
    state: AppState,
    chain: Arc<ChainContext>,
}

impl SettleBondedWithdrawalWatcher {
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
                withdrawal_bond_settle_tx_sent_at: Some(sent.then(Utc::now)),
                ..Default::default()
            },
        )
        .await
    }

    /// Ids of this root that the bonder fronted and has not reclaimed yet
    async fn bonded_ids(&self, ids: &[B256]) -> Result<Vec<B256>, BonderError> {
        let client = &self.chain.client;
        let bonder = client.bonder_address();
        let mut bonded = Vec::new();
        for id in ids {
            if client.bonded_withdrawal_amount(bonder, *id).await? > U256::ZERO {
                bonded.push(*id);
            }
        }
        Ok(bonded)
    }

    pub async fn handle(&self, root: &TransferRoot) -> HandlerResult {
        let id = root.transfer_root_id;
        let (Some(root_hash), Some(total), Some(ids)) =
            (root.transfer_root_hash, root.total_amount, root.transfer_ids.as_ref())
        else {
            return Err(BonderError::NotFound(format!("settle fields of root {id}")));
        };

        if !merkle::verify_root(ids, &root_hash) {
            error!(transfer_root_id = %id, "Stored transfer ids do not match root hash, clearing");
            self.update(
                id,
                TransferRootUpdate {
                    transfer_ids: Some(None),
                    ..Default::default()
                },
            )
            .await?;
            return Ok(Outcome::Skipped);
        }

        let on_chain = self.chain.client.transfer_root(root_hash, total).await?;
        if on_chain.total.is_zero() {
            debug!(transfer_root_id = %id, "Root not set on destination yet");
            return Ok(Outcome::Skipped);
        }
        if on_chain.amount_withdrawn == on_chain.total {
            self.update(
                id,
                TransferRootUpdate {
                    all_settled: Some(true),
                    ..Default::default()
                },
            )
            .await?;
            return Ok(Outcome::AlreadyHandled);
        }

        let bonded = self.bonded_ids(ids).await?;
        if bonded.is_empty() {
            refresh_all_settled(&self.state, root_hash, None).await?;
            return Ok(Outcome::Skipped);
        }

        if self.state.is_dry() {
            info!(transfer_root_id = %id, transfers = bonded.len(), "Would settle bonded withdrawals");
            return Ok(Outcome::DryRun);
        }

        self.set_sent_at(id, true).await?;
        let bonder = self.chain.client.bonder_address();
        info!(
            transfer_root_id = %id,
            root_hash = %root_hash,
            transfers = bonded.len(),
            "Settling bonded withdrawals"
        );
        // The contract recomputes the root from the full id list
        let tx_hash = match self
            .chain
            .client
            .settle_bonded_withdrawals(bonder, ids, total)
            .await
        {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                if matches!(e, ChainError::Reverted { .. } | ChainError::NonceTooLow(_)) {
                    self.set_sent_at(id, false).await?;
                }
                return Err(e.into());
            }
        };

        for transfer_id in &bonded {
            self.state
                .store
                .update_transfer(
                    *transfer_id,
                    TransferUpdate {
                        withdrawal_bond_settled: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
        }
        refresh_all_settled(&self.state, root_hash, None).await?;
        Ok(Outcome::Sent { tx_hash })
    }
}

#[async_trait]
impl Watcher for SettleBondedWithdrawalWatcher {
    fn name(&self) -> &'static str {
        "settle_bonded_withdrawals"
    }

    fn chain(&self) -> &ChainContext {
        &self.chain
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.state.timing.settle_poll_interval_ms)
    }

    async fn poll(&self) -> Result<(), BonderError> {
        let clock = self.state.clock();
        let roots = self
            .state
            .store
            .get_unsettled_transfer_roots(self.chain.chain_id, &clock)
            .await?;
        for root in &roots {
            let item = format!("transfer root {}", root.transfer_root_id);
            let result = self.handle(root).await;
            report(&self.state, &self.chain, self.name(), &item, result).await?;
        }
        Ok(())
    }
}
