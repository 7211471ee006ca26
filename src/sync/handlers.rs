//! Per-event ledger handlers
//!
//! Every handler is a field-overwrite upsert, so replaying an event rewrites
//! the same values and has no further effect.

use alloy::primitives::{B256, U256};
use alloy::sol_types::SolCall;
use tracing::{debug, error, info, warn};

use super::transfer_ids;
use crate::chain::{BridgeEvent, EventMeta, TxInfo};
use crate::contracts::bridge::{Bridge, L1Bridge};
use crate::db::{Transfer, TransferRoot, TransferRootUpdate, TransferUpdate};
use crate::error::BonderError;
use crate::hash::{transfer_id as compute_transfer_id, transfer_root_id, TransferIdFields};
use crate::state::{AppState, ChainContext};

pub async fn handle_event(
    state: &AppState,
    chain: &ChainContext,
    event: BridgeEvent,
) -> Result<(), BonderError> {
    match event {
        BridgeEvent::TransferSent {
            meta,
            transfer_id,
            destination_chain_id,
            recipient,
            amount,
            transfer_nonce,
            bonder_fee,
            index: _,
            amount_out_min,
            deadline,
        } => {
            let expected = compute_transfer_id(&TransferIdFields {
                chain_id: destination_chain_id,
                recipient,
                amount,
                transfer_nonce,
                bonder_fee,
                amount_out_min,
                deadline,
            });
            if expected != transfer_id {
                error!(
                    chain = %chain.slug,
                    transfer_id = %transfer_id,
                    computed = %expected,
                    tx_hash = %meta.tx_hash,
                    "TransferSent id does not match its fields, skipping"
                );
                return Ok(());
            }

            let sender = chain
                .client
                .transaction(meta.tx_hash)
                .await?
                .map(|tx| tx.from);
            let timestamp = chain.client.block_timestamp(meta.block_number).await?;
            let requests_swap = !amount_out_min.is_zero() || !deadline.is_zero();
            let is_bondable = state.policy.is_bondable(
                amount,
                bonder_fee,
                requests_swap,
                state.chains.is_l1(destination_chain_id),
                sender,
                recipient,
            );

            debug!(
                chain = %chain.slug,
                transfer_id = %transfer_id,
                destination = destination_chain_id,
                amount = %amount,
                is_bondable,
                "TransferSent"
            );

            state
                .store
                .update_transfer(
                    transfer_id,
                    TransferUpdate {
                        source_chain_id: Some(chain.chain_id),
                        destination_chain_id: Some(destination_chain_id),
                        sender,
                        recipient: Some(recipient),
                        amount: Some(amount),
                        bonder_fee: Some(bonder_fee),
                        amount_out_min: Some(amount_out_min),
                        deadline: Some(deadline),
                        transfer_nonce: Some(transfer_nonce),
                        transfer_sent_tx_hash: Some(meta.tx_hash),
                        transfer_sent_block_number: Some(meta.block_number),
                        transfer_sent_index: Some(meta.tx_index),
                        transfer_sent_log_index: Some(meta.log_index),
                        transfer_sent_timestamp: Some(timestamp),
                        is_bondable: Some(is_bondable),
                        ..Default::default()
                    },
                )
                .await?;
        }

        BridgeEvent::TransfersCommitted {
            meta,
            destination_chain_id,
            root_hash,
            total_amount,
            root_committed_at,
        } => {
            let root_id = transfer_root_id(root_hash, total_amount);
            info!(
                chain = %chain.slug,
                root_hash = %root_hash,
                transfer_root_id = %root_id,
                destination = destination_chain_id,
                total_amount = %total_amount,
                "TransfersCommitted"
            );

            state
                .store
                .update_transfer_root(
                    root_id,
                    TransferRootUpdate {
                        transfer_root_hash: Some(root_hash),
                        source_chain_id: Some(chain.chain_id),
                        destination_chain_id: Some(destination_chain_id),
                        total_amount: Some(total_amount),
                        committed: Some(true),
                        committed_at: Some(root_committed_at),
                        commit_tx_hash: Some(meta.tx_hash),
                        commit_tx_block_number: Some(meta.block_number),
                        should_bond_transfer_root: Some(chain.is_oru()),
                        ..Default::default()
                    },
                )
                .await?;

            // Ids are backfilled by the incomplete pass if recovery fails here
            if let Err(e) = transfer_ids::populate(state, chain, root_id).await {
                warn!(
                    chain = %chain.slug,
                    transfer_root_id = %root_id,
                    error = %e,
                    "Transfer id recovery deferred"
                );
            }
        }

        BridgeEvent::TransferRootBonded {
            meta,
            root_hash,
            amount,
        } => {
            let root_id = transfer_root_id(root_hash, amount);
            let tx = require_tx(chain, &meta).await?;
            let destination = decode_bond_destination(&tx);
            let bonded_at = chain.client.block_timestamp(meta.block_number).await?;

            info!(
                root_hash = %root_hash,
                transfer_root_id = %root_id,
                bonder = %tx.from,
                "TransferRootBonded"
            );

            state
                .store
                .update_transfer_root(
                    root_id,
                    TransferRootUpdate {
                        transfer_root_hash: Some(root_hash),
                        destination_chain_id: destination,
                        bonded: Some(true),
                        bonder: Some(tx.from),
                        bonded_at: Some(bonded_at),
                        bond_tx_hash: Some(meta.tx_hash),
                        bond_block_number: Some(meta.block_number),
                        bond_total_amount: Some(amount),
                        bond_transfer_root_id: Some(root_id),
                        ..Default::default()
                    },
                )
                .await?;
        }

        BridgeEvent::TransferRootConfirmed {
            meta,
            origin_chain_id,
            destination_chain_id,
            root_hash,
            total_amount,
        } => {
            let root_id = transfer_root_id(root_hash, total_amount);
            let confirmed_at = chain.client.block_timestamp(meta.block_number).await?;

            info!(
                root_hash = %root_hash,
                transfer_root_id = %root_id,
                origin = origin_chain_id,
                destination = destination_chain_id,
                "TransferRootConfirmed"
            );

            // A confirmation on L1 proves the source committed the root
            state
                .store
                .update_transfer_root(
                    root_id,
                    TransferRootUpdate {
                        transfer_root_hash: Some(root_hash),
                        source_chain_id: Some(origin_chain_id),
                        destination_chain_id: Some(destination_chain_id),
                        total_amount: Some(total_amount),
                        committed: Some(true),
                        confirmed: Some(true),
                        confirmed_at: Some(confirmed_at),
                        confirm_tx_hash: Some(meta.tx_hash),
                        ..Default::default()
                    },
                )
                .await?;
        }

        BridgeEvent::TransferRootSet {
            meta,
            root_hash,
            total_amount,
        } => {
            let root_id = transfer_root_id(root_hash, total_amount);
            let timestamp = chain.client.block_timestamp(meta.block_number).await?;

            debug!(chain = %chain.slug, root_hash = %root_hash, "TransferRootSet");

            state
                .store
                .update_transfer_root(
                    root_id,
                    TransferRootUpdate {
                        transfer_root_hash: Some(root_hash),
                        destination_chain_id: Some(chain.chain_id),
                        total_amount: Some(total_amount),
                        root_set_tx_hash: Some(meta.tx_hash),
                        root_set_block_number: Some(meta.block_number),
                        root_set_timestamp: Some(timestamp),
                        ..Default::default()
                    },
                )
                .await?;
        }

        BridgeEvent::WithdrawalBonded {
            meta,
            transfer_id,
            amount,
        } => {
            let tx = require_tx(chain, &meta).await?;
            debug!(
                chain = %chain.slug,
                transfer_id = %transfer_id,
                bonder = %tx.from,
                amount = %amount,
                "WithdrawalBonded"
            );

            state
                .store
                .update_transfer(
                    transfer_id,
                    TransferUpdate {
                        destination_chain_id: Some(chain.chain_id),
                        withdrawal_bonded: Some(true),
                        withdrawal_bonder: Some(tx.from),
                        withdrawal_bonded_tx_hash: Some(meta.tx_hash),
                        withdrawal_bond_tx_error: Some(None),
                        ..Default::default()
                    },
                )
                .await?;
        }

        BridgeEvent::Withdrew {
            meta, transfer_id, ..
        } => {
            debug!(chain = %chain.slug, transfer_id = %transfer_id, "Withdrew");
            state
                .store
                .update_transfer(
                    transfer_id,
                    TransferUpdate {
                        destination_chain_id: Some(chain.chain_id),
                        is_transfer_spent: Some(true),
                        transfer_spent_tx_hash: Some(meta.tx_hash),
                        ..Default::default()
                    },
                )
                .await?;
        }

        BridgeEvent::WithdrawalBondSettled {
            transfer_id,
            root_hash,
            ..
        } => {
            state
                .store
                .update_transfer(
                    transfer_id,
                    TransferUpdate {
                        withdrawal_bond_settled: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
            refresh_all_settled(state, root_hash, None).await?;
        }

        BridgeEvent::MultipleWithdrawalsSettled {
            meta,
            root_hash,
            total_bonds_settled,
            ..
        } => {
            let tx = require_tx(chain, &meta).await?;
            let settled_ids = match Bridge::settleBondedWithdrawalsCall::abi_decode(&tx.input, true) {
                Ok(call) => call.transferIds,
                Err(e) => {
                    warn!(tx_hash = %meta.tx_hash, error = %e, "Could not decode settle calldata");
                    Vec::new()
                }
            };

            for transfer_id in settled_ids {
                let Some(transfer) = state.store.get_by_transfer_id(transfer_id).await? else {
                    continue;
                };
                state
                    .store
                    .update_transfer(
                        transfer_id,
                        TransferUpdate {
                            withdrawal_bond_settled: Some(transfer.withdrawal_bonded),
                            ..Default::default()
                        },
                    )
                    .await?;
            }

            debug!(
                chain = %chain.slug,
                root_hash = %root_hash,
                total_bonds_settled = %total_bonds_settled,
                "MultipleWithdrawalsSettled"
            );
            refresh_all_settled(state, root_hash, Some(total_bonds_settled)).await?;
        }

        BridgeEvent::TransferBondChallenged {
            meta,
            transfer_root_id,
            root_hash,
            original_amount,
        } => {
            let challenge_started_at = chain.client.block_timestamp(meta.block_number).await?;
            warn!(
                transfer_root_id = %transfer_root_id,
                root_hash = %root_hash,
                amount = %original_amount,
                challenge_started_at,
                "TransferBondChallenged"
            );
            state
                .store
                .update_transfer_root(
                    transfer_root_id,
                    TransferRootUpdate {
                        transfer_root_hash: Some(root_hash),
                        challenged: Some(true),
                        challenge_started_at: Some(challenge_started_at),
                        ..Default::default()
                    },
                )
                .await?;
        }

        BridgeEvent::ChallengeResolved {
            transfer_root_id,
            root_hash,
            ..
        } => {
            info!(transfer_root_id = %transfer_root_id, "ChallengeResolved");
            state
                .store
                .update_transfer_root(
                    transfer_root_id,
                    TransferRootUpdate {
                        transfer_root_hash: Some(root_hash),
                        challenge_expired: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
        }
    }

    Ok(())
}

async fn require_tx(chain: &ChainContext, meta: &EventMeta) -> Result<TxInfo, BonderError> {
    chain
        .client
        .transaction(meta.tx_hash)
        .await?
        .ok_or_else(|| BonderError::NotFound(format!("transaction {}", meta.tx_hash)))
}

fn decode_bond_destination(tx: &TxInfo) -> Option<u64> {
    L1Bridge::bondTransferRootCall::abi_decode(&tx.input, true)
        .ok()
        .map(|call| call.destinationChainId.saturating_to::<u64>())
}

/// Mark the root `allSettled` when its settled total matches, or when every
/// transfer under it is settled or never bondable.
pub async fn refresh_all_settled(
    state: &AppState,
    root_hash: B256,
    total_bonds_settled: Option<U256>,
) -> Result<(), BonderError> {
    let Some(root) = state.store.get_by_transfer_root_hash(root_hash).await? else {
        return Ok(());
    };
    if root.all_settled {
        return Ok(());
    }

    let totals_match = total_bonds_settled.is_some() && root.total_amount == total_bonds_settled;
    let all_settled = totals_match || transfers_settled(state, &root).await?;

    if all_settled {
        info!(root_hash = %root_hash, "All withdrawals settled for root");
        state
            .store
            .update_transfer_root(
                root.transfer_root_id,
                TransferRootUpdate {
                    all_settled: Some(true),
                    ..Default::default()
                },
            )
            .await?;
    }
    Ok(())
}

async fn transfers_settled(state: &AppState, root: &TransferRoot) -> Result<bool, BonderError> {
    let Some(ids) = &root.transfer_ids else {
        return Ok(false);
    };
    let mut transfers = Vec::with_capacity(ids.len());
    for id in ids {
        match state.store.get_by_transfer_id(*id).await? {
            Some(t) => transfers.push(t),
            None => return Ok(false),
        }
    }
    Ok(all_transfers_settled(&transfers))
}

/// Each transfer is either settled or was never bondable
pub fn all_transfers_settled(transfers: &[Transfer]) -> bool {
    !transfers.is_empty()
        && transfers
            .iter()
            .all(|t| t.withdrawal_bond_settled || !t.is_bondable)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(byte: u8, settled: bool, bondable: bool) -> Transfer {
        Transfer {
            transfer_id: B256::repeat_byte(byte),
            withdrawal_bond_settled: settled,
            is_bondable: bondable,
            ..Default::default()
        }
    }

    #[test]
    fn test_all_transfers_settled_counts_non_bondable() {
        let a = transfer(1, true, true);
        let b = transfer(2, true, true);
        let mut c = transfer(3, false, true);

        assert!(!all_transfers_settled(&[a.clone(), b.clone(), c.clone()]));
        c.is_bondable = false;
        assert!(all_transfers_settled(&[a, b, c]));
        assert!(!all_transfers_settled(&[]));
    }
}
