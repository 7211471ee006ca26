//! Backfill pass for ledger records with missing derived fields

use alloy::primitives::B256;
use alloy::sol_types::SolCall;
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use super::transfer_ids;
use crate::chain::TxInfo;
use crate::contracts::bridge::L1Bridge;
use crate::db::{Transfer, TransferRoot, TransferRootUpdate, TransferUpdate};
use crate::error::{BonderError, ErrorKind};
use crate::state::{AppState, ChainContext};

/// Items looked up per chunk
pub const INCOMPLETE_CHUNK_SIZE: usize = 20;

enum Item {
    Transfer(Transfer),
    Root(TransferRoot),
}

impl Item {
    fn label(&self) -> String {
        match self {
            Item::Transfer(t) => format!("transfer {}", t.transfer_id),
            Item::Root(r) => format!("transfer root {}", r.transfer_root_id),
        }
    }
}

/// Backfill every incomplete record visible from `chain`.
///
/// Errors are logged per item and never abort the pass; a record whose
/// source data cannot be found is flagged `isNotFound`.
pub async fn incomplete_poll_sync(state: &AppState, chain: &ChainContext) -> Result<(), BonderError> {
    let items = state
        .store
        .get_incomplete_items(chain.chain_id, chain.is_l1())
        .await?;
    state
        .metrics
        .incomplete_items
        .with_label_values(&[chain.slug.as_str()])
        .set(items.len() as i64);
    if items.is_empty() {
        return Ok(());
    }
    debug!(chain = %chain.slug, count = items.len(), "Backfilling incomplete items");

    let all: Vec<Item> = items
        .transfers
        .into_iter()
        .map(Item::Transfer)
        .chain(items.transfer_roots.into_iter().map(Item::Root))
        .collect();
    let concurrency = state.timing.incomplete_concurrency.max(1);

    for chunk in all.chunks(INCOMPLETE_CHUNK_SIZE) {
        let futs = chunk
            .iter()
            .map(|item| Box::pin(async move { (item, backfill(state, chain, item).await) }))
            .collect::<Vec<_>>();
        let results: Vec<_> = stream::iter(futs)
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for (item, result) in results {
            let Err(e) = result else { continue };
            let label = item.label();
            match e.kind() {
                ErrorKind::NotFound => {
                    warn!(chain = %chain.slug, item = %label, error = %e, "Marking item not found");
                    mark_not_found(state, item).await?;
                }
                ErrorKind::Transient => {
                    debug!(chain = %chain.slug, item = %label, error = %e, "Backfill retry later");
                }
                _ => {
                    warn!(chain = %chain.slug, item = %label, error = %e, "Backfill failed");
                    state
                        .notifier
                        .warn(&format!("incomplete sync on {} failed for {}: {}", chain.slug, label, e))
                        .await;
                }
            }
        }
    }
    Ok(())
}

async fn mark_not_found(state: &AppState, item: &Item) -> Result<(), BonderError> {
    match item {
        Item::Transfer(t) => {
            state
                .store
                .update_transfer(
                    t.transfer_id,
                    TransferUpdate {
                        is_not_found: Some(true),
                        ..Default::default()
                    },
                )
                .await?
        }
        Item::Root(r) => {
            state
                .store
                .update_transfer_root(
                    r.transfer_root_id,
                    TransferRootUpdate {
                        is_not_found: Some(true),
                        ..Default::default()
                    },
                )
                .await?
        }
    }
    Ok(())
}

async fn backfill(state: &AppState, chain: &ChainContext, item: &Item) -> Result<(), BonderError> {
    match item {
        Item::Transfer(t) => backfill_transfer(state, chain, t).await,
        Item::Root(r) => backfill_root(state, chain, r).await,
    }
}

async fn lookup_tx(chain: &ChainContext, tx_hash: B256) -> Result<TxInfo, BonderError> {
    chain
        .client
        .transaction(tx_hash)
        .await?
        .ok_or_else(|| BonderError::NotFound(format!("transaction {tx_hash}")))
}

async fn backfill_transfer(
    state: &AppState,
    chain: &ChainContext,
    t: &Transfer,
) -> Result<(), BonderError> {
    let mut update = TransferUpdate::default();

    if let Some(sent_tx) = t.transfer_sent_tx_hash {
        if t.source_chain_id == Some(chain.chain_id)
            && (t.transfer_sent_timestamp.is_none() || t.transfer_sent_index.is_none())
        {
            let tx = lookup_tx(chain, sent_tx).await?;
            update.transfer_sent_block_number = Some(tx.block_number);
            update.transfer_sent_index = Some(tx.tx_index);
            update.transfer_sent_timestamp = Some(chain.client.block_timestamp(tx.block_number).await?);
            if t.sender.is_none() {
                update.sender = Some(tx.from);
            }
        }
    }

    if let Some(bond_tx) = t.withdrawal_bonded_tx_hash {
        if t.destination_chain_id == Some(chain.chain_id) && t.withdrawal_bonder.is_none() {
            let tx = lookup_tx(chain, bond_tx).await?;
            update.withdrawal_bonder = Some(tx.from);
        }
    }

    if update != TransferUpdate::default() {
        state.store.update_transfer(t.transfer_id, update).await?;
    }
    Ok(())
}

async fn backfill_root(
    state: &AppState,
    chain: &ChainContext,
    r: &TransferRoot,
) -> Result<(), BonderError> {
    let mut update = TransferRootUpdate::default();
    let from_source = r.source_chain_id == Some(chain.chain_id);

    if let Some(commit_tx) = r.commit_tx_hash {
        if from_source && (r.committed_at.is_none() || r.commit_tx_block_number.is_none()) {
            let tx = lookup_tx(chain, commit_tx).await?;
            update.commit_tx_block_number = Some(tx.block_number);
            if r.committed_at.is_none() {
                update.committed_at = Some(chain.client.block_timestamp(tx.block_number).await?);
            }
        }
    }

    if let Some(bond_tx) = r.bond_tx_hash {
        if chain.is_l1()
            && (r.bonder.is_none() || r.bonded_at.is_none() || r.destination_chain_id.is_none())
        {
            let tx = lookup_tx(chain, bond_tx).await?;
            update.bonder = Some(tx.from);
            update.bond_block_number = Some(tx.block_number);
            update.bonded_at = Some(chain.client.block_timestamp(tx.block_number).await?);
            if r.destination_chain_id.is_none() {
                update.destination_chain_id = L1Bridge::bondTransferRootCall::abi_decode(&tx.input, true)
                    .ok()
                    .map(|call| call.destinationChainId.saturating_to::<u64>());
            }
        }
    }

    if let Some(root_set_tx) = r.root_set_tx_hash {
        if r.destination_chain_id == Some(chain.chain_id) && r.root_set_timestamp.is_none() {
            let tx = lookup_tx(chain, root_set_tx).await?;
            update.root_set_block_number = Some(tx.block_number);
            update.root_set_timestamp = Some(chain.client.block_timestamp(tx.block_number).await?);
        }
    }

    if update != TransferRootUpdate::default() {
        state
            .store
            .update_transfer_root(r.transfer_root_id, update)
            .await?;
    }

    if chain.is_l1() && r.challenged && r.challenge_started_at.is_none() {
        let bond = chain.client.transfer_bond(r.transfer_root_id).await?;
        if bond.challenge_start_time == 0 {
            return Err(BonderError::NotFound(format!(
                "challenge of root {}",
                r.transfer_root_id
            )));
        }
        state
            .store
            .update_transfer_root(
                r.transfer_root_id,
                TransferRootUpdate {
                    challenge_started_at: Some(bond.challenge_start_time),
                    ..Default::default()
                },
            )
            .await?;
    }

    if from_source && r.committed && r.commit_tx_hash.is_some() && r.transfer_ids.is_none() {
        transfer_ids::populate(state, chain, r.transfer_root_id).await?;
    }
    Ok(())
}
