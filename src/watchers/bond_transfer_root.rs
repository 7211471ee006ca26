//! Bonds ORU-originated transfer roots on L1

use alloy::primitives::{B256, U256};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::{report, wait_for_rank, Watcher};
use crate::db::{TransferRoot, TransferRootUpdate};
use crate::error::{BonderError, ChainError, HandlerResult, Outcome};
use crate::hash::transfer_root_id;
use crate::merkle;
use crate::state::{AppState, ChainContext};

/// Used when the L1 bridge does not expose its minimum bond delay
pub const MIN_TRANSFER_ROOT_BOND_DELAY_FALLBACK_SECS: u64 = 15 * 60;

pub struct BondTransferRootWatcher {
    state: AppState,
    chain: Arc<ChainContext>,
}

impl BondTransferRootWatcher {
    pub fn new(state: AppState, chain: Arc<ChainContext>) -> Self {
        Self { state, chain }
    }

    async fn update(&self, id: B256, update: TransferRootUpdate) -> Result<(), BonderError> {
        self.state.store.update_transfer_root(id, update).await?;
        Ok(())
    }

    async fn min_bond_delay(&self) -> u64 {
        match self.state.chains.l1().client.min_transfer_root_bond_delay().await {
            Ok(delay) => delay,
            Err(e) => {
                warn!(error = %e, "Using fallback minimum root bond delay");
                MIN_TRANSFER_ROOT_BOND_DELAY_FALLBACK_SECS
            }
        }
    }

    pub async fn handle(&self, root: &TransferRoot, min_delay: u64) -> HandlerResult {
        let state = &self.state;
        let l1 = state.chains.l1().clone();
        let id = root.transfer_root_id;
        let (Some(root_hash), Some(total), Some(destination), Some(committed_at)) = (
            root.transfer_root_hash,
            root.total_amount,
            root.destination_chain_id,
            root.committed_at,
        ) else {
            return Err(BonderError::NotFound(format!("commit fields of root {id}")));
        };

        if committed_at + min_delay >= state.clock().unix() {
            return Ok(Outcome::Skipped);
        }

        if l1.client.transfer_bond(id).await?.exists() {
            self.update(
                id,
                TransferRootUpdate {
                    bonded: Some(true),
                    ..Default::default()
                },
            )
            .await?;
            return Ok(Outcome::AlreadyHandled);
        }

        if let Some(ids) = &root.transfer_ids {
            if !merkle::verify_root(ids, &root_hash) {
                error!(transfer_root_id = %id, "Stored transfer ids do not match root hash");
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
        }

        let credit = state
            .liquidity
            .base_available_credit_including_vault(l1.chain_id)
            .await;
        let bond_amount = l1.client.bond_for_transfer_amount(total).await?;
        if bond_amount > credit {
            let msg = format!(
                "cannot bond root {}: bond {} exceeds L1 credit {}",
                id, bond_amount, credit
            );
            state.notifier.error(&msg).await;
            return Err(BonderError::Bond(msg));
        }

        if state.is_dry() {
            info!(transfer_root_id = %id, total = %total, "Would bond transfer root");
            return Ok(Outcome::DryRun);
        }

        if let Some(reason) = self.validate(root, root_hash, total, destination).await? {
            state.disable_writes(&reason);
            state
                .notifier
                .error(&format!("bondTransferRoot validation failed for {}: {}", id, reason))
                .await;
            return Ok(Outcome::Skipped);
        }

        self.withdraw_from_vault_if_needed(&l1, bond_amount).await?;

        self.update(
            id,
            TransferRootUpdate {
                sent_bond_tx_at: Some(Some(Utc::now())),
                ..Default::default()
            },
        )
        .await?;

        let client = l1.client.clone();
        let handled_elsewhere = wait_for_rank(state, || {
            let client = client.clone();
            async move { Ok(client.transfer_bond(id).await?.exists()) }
        })
        .await?;
        if handled_elsewhere {
            self.update(
                id,
                TransferRootUpdate {
                    bonded: Some(true),
                    ..Default::default()
                },
            )
            .await?;
            return Ok(Outcome::AlreadyHandled);
        }

        info!(
            transfer_root_id = %id,
            root_hash = %root_hash,
            destination,
            total = %total,
            "Bonding transfer root"
        );
        match l1.client.bond_transfer_root(root_hash, destination, total).await {
            Ok(tx_hash) => Ok(Outcome::Sent { tx_hash }),
            Err(e) => {
                if matches!(e, ChainError::Reverted { .. } | ChainError::NonceTooLow(_)) {
                    self.update(
                        id,
                        TransferRootUpdate {
                            sent_bond_tx_at: Some(None),
                            ..Default::default()
                        },
                    )
                    .await?;
                }
                Err(e.into())
            }
        }
    }

    /// Stake idle vault funds when staked credit alone cannot cover the bond.
    /// The vault only counts as bond credit on chains with auto-withdraw.
    async fn withdraw_from_vault_if_needed(
        &self,
        l1: &ChainContext,
        bond_amount: U256,
    ) -> Result<(), BonderError> {
        let liquidity = &self.state.liquidity;
        let staked = liquidity.base_available_credit(l1.chain_id).await;
        if staked >= bond_amount {
            return Ok(());
        }
        if !l1.vault_auto_withdraw {
            return Err(BonderError::Bond(format!(
                "bond {} exceeds staked credit {} and vault auto-withdraw is off on {}",
                bond_amount, staked, l1.slug
            )));
        }

        let vault_balance = liquidity.vault_balance(l1.chain_id).await;
        let msg = format!("attempting withdrawFromVaultAndStake. amount: {vault_balance}");
        info!(chain = %l1.slug, staked = %staked, bond = %bond_amount, "{}", msg);
        self.state.notifier.info(&msg).await;

        match l1.client.withdraw_from_vault_and_stake(vault_balance).await {
            Ok(tx_hash) => {
                info!(chain = %l1.slug, tx_hash = %tx_hash, "Vault funds staked");
                Ok(())
            }
            Err(e) => {
                let msg = format!("withdrawFromVaultAndStake error: {e}");
                error!(chain = %l1.slug, "{}", msg);
                self.state.notifier.error(&msg).await;
                Err(e.into())
            }
        }
    }

    /// Ledger consistency checks before committing L1 funds; `Some(reason)`
    /// on failure
    async fn validate(
        &self,
        root: &TransferRoot,
        root_hash: B256,
        total: U256,
        destination: u64,
    ) -> Result<Option<String>, BonderError> {
        let expected_id = transfer_root_id(root_hash, total);
        if expected_id != root.transfer_root_id {
            return Ok(Some(format!(
                "root id {} does not match computed id {}",
                root.transfer_root_id, expected_id
            )));
        }

        let Some(stored) = self.state.store.get_by_transfer_root_id(expected_id).await? else {
            return Ok(Some(format!("no ledger record for root {expected_id}")));
        };
        if stored.destination_chain_id != Some(destination) {
            return Ok(Some(format!(
                "destination {:?} does not match {}",
                stored.destination_chain_id, destination
            )));
        }
        if !stored.committed || stored.source_chain_id != Some(self.chain.chain_id) {
            return Ok(Some(format!("root {expected_id} not committed on this source")));
        }

        if let Some(ids) = &stored.transfer_ids {
            for transfer_id in ids {
                let Some(transfer) = self.state.store.get_by_transfer_id(*transfer_id).await? else {
                    continue;
                };
                if transfer
                    .transfer_root_id
                    .is_some_and(|other| other != expected_id)
                {
                    return Ok(Some(format!(
                        "transfer {} already belongs to root {:?}",
                        transfer_id, transfer.transfer_root_id
                    )));
                }
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Watcher for BondTransferRootWatcher {
    fn name(&self) -> &'static str {
        "bond_transfer_root"
    }

    fn chain(&self) -> &ChainContext {
        &self.chain
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.state.timing.bond_poll_interval_ms)
    }

    async fn poll(&self) -> Result<(), BonderError> {
        let clock = self.state.clock();
        let roots = self
            .state
            .store
            .get_unbonded_transfer_roots(self.chain.chain_id, None, &clock)
            .await?;
        if roots.is_empty() {
            return Ok(());
        }

        let min_delay = self.min_bond_delay().await;
        for root in roots {
            let item = format!("transfer root {}", root.transfer_root_id);
            let result = self.handle(&root, min_delay).await;
            report(&self.state, &self.chain, self.name(), &item, result).await?;
        }
        Ok(())
    }
}
