//! Bonds withdrawals on the destination chain for transfers sent from an L2

use alloy::primitives::B256;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{report, wait_for_rank, Watcher};
use crate::chain::BondWithdrawalParams;
use crate::db::queries::deferred_for_liquidity;
use crate::db::{Transfer, TransferUpdate};
use crate::error::{BonderError, ChainError, HandlerResult, Outcome};
use crate::state::{AppState, ChainContext};
use crate::types::TxError;

pub struct BondWithdrawalWatcher {
    state: AppState,
    chain: Arc<ChainContext>,
}

impl BondWithdrawalWatcher {
    pub fn new(state: AppState, chain: Arc<ChainContext>) -> Self {
        Self { state, chain }
    }

    async fn update(&self, transfer_id: B256, update: TransferUpdate) -> Result<(), BonderError> {
        self.state.store.update_transfer(transfer_id, update).await?;
        Ok(())
    }

    async fn record_error(&self, transfer_id: B256, error: TxError) -> Result<(), BonderError> {
        self.update(
            transfer_id,
            TransferUpdate {
                withdrawal_bond_tx_error: Some(Some(error)),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn handle(&self, transfer_id: B256) -> HandlerResult {
        let state = &self.state;
        let transfer = state
            .store
            .get_by_transfer_id(transfer_id)
            .await?
            .ok_or_else(|| BonderError::NotFound(format!("transfer {transfer_id}")))?;
        if transfer.withdrawal_bonded {
            return Ok(Outcome::AlreadyHandled);
        }

        let params = bond_params(&transfer)
            .ok_or_else(|| BonderError::NotFound(format!("sent fields of transfer {transfer_id}")))?;
        let destination_id = transfer
            .destination_chain_id
            .ok_or_else(|| BonderError::NotFound(format!("destination of {transfer_id}")))?;
        let destination = state
            .chain(destination_id)
            .ok_or_else(|| BonderError::NotFound(format!("destination chain {destination_id}")))?
            .clone();

        if destination.client.is_transfer_id_spent(transfer_id).await? {
            warn!(transfer_id = %transfer_id, "Transfer already spent on destination");
            self.update(
                transfer_id,
                TransferUpdate {
                    is_transfer_spent: Some(true),
                    is_not_found: Some(true),
                    ..Default::default()
                },
            )
            .await?;
            return Ok(Outcome::AlreadyHandled);
        }

        if !state.policy.amount_in_range(params.amount) {
            debug!(transfer_id = %transfer_id, amount = %params.amount, "Amount outside bond bounds");
            return Ok(Outcome::Skipped);
        }

        let bonder = destination.client.bonder_address();
        if !destination.client.is_bonder(bonder).await? {
            return Err(BonderError::Bond(format!(
                "{} is not a bonder on chain {}",
                bonder, destination_id
            )));
        }

        if let Some(root_id) = transfer.transfer_root_id {
            let root = state.store.get_by_transfer_root_id(root_id).await?;
            if root.is_some_and(|r| r.confirmed) {
                warn!(transfer_id = %transfer_id, transfer_root_id = %root_id, "Root already confirmed, not bonding");
                self.update(
                    transfer_id,
                    TransferUpdate {
                        is_bondable: Some(false),
                        ..Default::default()
                    },
                )
                .await?;
                return Ok(Outcome::Skipped);
            }
        }

        let available = state
            .liquidity
            .available_credit_for_transfer(destination_id)
            .await;
        if available < params.amount {
            self.record_error(transfer_id, TxError::NotEnoughLiquidity)
                .await?;
            return Err(BonderError::Bond(format!(
                "available credit {} on chain {} below amount {}",
                available, destination_id, params.amount
            )));
        }

        if state.is_dry() {
            info!(transfer_id = %transfer_id, amount = %params.amount, "Would bond withdrawal");
            return Ok(Outcome::DryRun);
        }

        let attempt_swap = transfer.requests_swap();
        if attempt_swap && destination.is_l1() {
            warn!(transfer_id = %transfer_id, "Swap requested on L1 destination, marking unbondable");
            self.update(
                transfer_id,
                TransferUpdate {
                    is_bondable: Some(false),
                    ..Default::default()
                },
            )
            .await?;
            return Ok(Outcome::Skipped);
        }

        if !state.policy.bonder_fee_ok(params.amount, params.bonder_fee) {
            self.record_error(transfer_id, TxError::BonderFeeTooLow).await?;
            return Ok(Outcome::Skipped);
        }

        self.update(
            transfer_id,
            TransferUpdate {
                bond_withdrawal_attempted_at: Some(Some(Utc::now())),
                ..Default::default()
            },
        )
        .await?;

        let client = destination.client.clone();
        let handled_elsewhere = wait_for_rank(state, || {
            let client = client.clone();
            async move { Ok(client.is_transfer_id_spent(transfer_id).await?) }
        })
        .await?;
        if handled_elsewhere {
            return Ok(Outcome::AlreadyHandled);
        }

        info!(
            transfer_id = %transfer_id,
            destination = destination_id,
            amount = %params.amount,
            attempt_swap,
            "Bonding withdrawal"
        );
        let sent = if attempt_swap {
            destination
                .client
                .bond_withdrawal_and_attempt_swap(&params)
                .await
        } else {
            destination.client.bond_withdrawal(&params).await
        };

        match sent {
            Ok(tx_hash) => {
                self.update(
                    transfer_id,
                    TransferUpdate {
                        withdrawal_bonded: Some(true),
                        withdrawal_bonder: Some(bonder),
                        withdrawal_bonded_tx_hash: Some(tx_hash),
                        withdrawal_bond_tx_error: Some(None),
                        ..Default::default()
                    },
                )
                .await?;
                Ok(Outcome::Sent { tx_hash })
            }
            Err(e) => {
                match &e {
                    ChainError::Reverted { .. } | ChainError::NonceTooLow(_) => {
                        self.update(
                            transfer_id,
                            TransferUpdate {
                                bond_withdrawal_attempted_at: Some(None),
                                ..Default::default()
                            },
                        )
                        .await?;
                    }
                    ChainError::CallException(_) => {
                        self.record_error(transfer_id, TxError::CallException).await?;
                    }
                    _ => {}
                }
                Err(e.into())
            }
        }
    }
}

fn bond_params(t: &Transfer) -> Option<BondWithdrawalParams> {
    Some(BondWithdrawalParams {
        recipient: t.recipient?,
        amount: t.amount?,
        transfer_nonce: t.transfer_nonce?,
        bonder_fee: t.bonder_fee?,
        amount_out_min: t.amount_out_min.unwrap_or_default(),
        deadline: t.deadline.unwrap_or_default(),
    })
}

#[async_trait]
impl Watcher for BondWithdrawalWatcher {
    fn name(&self) -> &'static str {
        "bond_withdrawal"
    }

    fn chain(&self) -> &ChainContext {
        &self.chain
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.state.timing.bond_poll_interval_ms)
    }

    async fn poll(&self) -> Result<(), BonderError> {
        let clock = self.state.clock();
        let transfers = self
            .state
            .store
            .get_unbonded_sent_transfers(self.chain.chain_id, &clock)
            .await?;

        for transfer in transfers {
            let (Some(destination), Some(amount)) = (transfer.destination_chain_id, transfer.amount)
            else {
                continue;
            };
            if deferred_for_liquidity(&transfer)
                && self
                    .state
                    .liquidity
                    .available_credit_for_transfer(destination)
                    .await
                    < amount
            {
                continue;
            }

            let item = format!("transfer {}", transfer.transfer_id);
            let result = self.handle(transfer.transfer_id).await;
            report(&self.state, &self.chain, self.name(), &item, result).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};

    #[test]
    fn test_bond_params_requires_sent_fields() {
        let mut transfer = Transfer {
            recipient: Some(Address::repeat_byte(1)),
            amount: Some(U256::from(100u64)),
            transfer_nonce: Some(B256::repeat_byte(2)),
            ..Default::default()
        };
        assert!(bond_params(&transfer).is_none());

        transfer.bonder_fee = Some(U256::from(1u64));
        let params = bond_params(&transfer).unwrap();
        assert_eq!(params.amount_out_min, U256::ZERO);
        assert_eq!(params.deadline, U256::ZERO);
    }
}
