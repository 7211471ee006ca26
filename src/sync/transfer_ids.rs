//! Transfer-id recovery for committed roots
//!
//! Ids come either from transfers already in the ledger or, failing that,
//! from re-deriving the committed set from chain events. Both paths only
//! store ids whose Merkle root matches the committed root hash.

use alloy::primitives::{B256, U256};
use tracing::{debug, error, info};

use crate::chain::{BridgeEvent, EventKind, EventMeta};
use crate::db::{Transfer, TransferRoot, TransferRootUpdate, TransferUpdate};
use crate::error::BonderError;
use crate::merkle;
use crate::state::{AppState, ChainContext};

/// Ensure the root's transfer ids are stored; returns them when known.
///
/// `Ok(None)` while the commit block is still unknown. Once it is known and
/// neither the ledger nor the chain yields ids matching the root hash, the
/// root is reported as [`BonderError::NotFound`].
pub async fn populate(
    state: &AppState,
    chain: &ChainContext,
    transfer_root_id: B256,
) -> Result<Option<Vec<B256>>, BonderError> {
    let root = state
        .store
        .get_by_transfer_root_id(transfer_root_id)
        .await?
        .ok_or_else(|| BonderError::NotFound(format!("transfer root {transfer_root_id}")))?;

    if let Some(ids) = &root.transfer_ids {
        return Ok(Some(ids.clone()));
    }
    let (Some(root_hash), Some(destination)) = (root.transfer_root_hash, root.destination_chain_id)
    else {
        return Ok(None);
    };

    let ids = match from_ledger(state, chain, &root, root_hash, destination).await? {
        Some(ids) => Some(ids),
        None => {
            let lookback = state.timing.challenge_lookback_blocks;
            from_chain(chain, &root, root_hash, destination, lookback).await?
        }
    };

    let Some(ids) = ids else {
        if root.commit_tx_block_number.is_none() {
            debug!(transfer_root_id = %transfer_root_id, "Commit block unknown, ids deferred");
            return Ok(None);
        }
        error!(
            chain = %chain.slug,
            transfer_root_id = %transfer_root_id,
            root_hash = %root_hash,
            "Could not recover transfer ids matching root hash"
        );
        return Err(BonderError::NotFound(format!(
            "transfer ids of root {transfer_root_id}"
        )));
    };

    info!(
        chain = %chain.slug,
        transfer_root_id = %transfer_root_id,
        count = ids.len(),
        "Transfer ids recovered"
    );
    store_ids(state, transfer_root_id, root_hash, &ids).await?;
    Ok(Some(ids))
}

async fn store_ids(
    state: &AppState,
    transfer_root_id: B256,
    root_hash: B256,
    ids: &[B256],
) -> Result<(), BonderError> {
    state
        .store
        .update_transfer_root(
            transfer_root_id,
            TransferRootUpdate {
                transfer_ids: Some(Some(ids.to_vec())),
                ..Default::default()
            },
        )
        .await?;
    for id in ids {
        state
            .store
            .update_transfer(
                *id,
                TransferUpdate {
                    transfer_root_hash: Some(root_hash),
                    transfer_root_id: Some(transfer_root_id),
                    ..Default::default()
                },
            )
            .await?;
    }
    Ok(())
}

async fn from_ledger(
    state: &AppState,
    chain: &ChainContext,
    root: &TransferRoot,
    root_hash: B256,
    destination: u64,
) -> Result<Option<Vec<B256>>, BonderError> {
    let mut transfers = state.store.get_transfers_by_root_hash(root_hash).await?;
    if transfers.is_empty() {
        let Some(commit_block) = root.commit_tx_block_number else {
            return Ok(None);
        };
        transfers = state
            .store
            .get_uncommitted_transfers(chain.chain_id, Some(destination))
            .await?
            .into_iter()
            .filter(|t| t.transfer_sent_block_number.is_some_and(|b| b <= commit_block))
            .collect();
    }

    let ids = ordered_ids(transfers);
    if !ids.is_empty() && merkle::verify_root(&ids, &root_hash) {
        debug!(root_hash = %root_hash, "Transfer ids matched from ledger");
        return Ok(Some(ids));
    }
    Ok(None)
}

fn ordered_ids(mut transfers: Vec<Transfer>) -> Vec<B256> {
    transfers.sort_by_key(Transfer::position);
    transfers.into_iter().map(|t| t.transfer_id).collect()
}

/// Re-derive the committed set from `TransfersCommitted` and `TransferSent`
async fn from_chain(
    chain: &ChainContext,
    root: &TransferRoot,
    root_hash: B256,
    destination: u64,
    lookback_blocks: u64,
) -> Result<Option<Vec<B256>>, BonderError> {
    let Some(commit_block) = root.commit_tx_block_number else {
        return Ok(None);
    };
    let batch = chain.batch_blocks.max(1);
    let floor = chain
        .start_block
        .max(commit_block.saturating_sub(lookback_blocks));

    let (end, start) = find_commit_bounds(chain, root_hash, destination, commit_block, floor, batch).await?;
    let Some(end) = end else {
        return Ok(None);
    };

    let mut sends = Vec::new();
    let mut from = start.map(|s| s.block_number).unwrap_or(floor);
    while from <= end.block_number {
        let to = from.saturating_add(batch - 1).min(end.block_number);
        for event in chain.client.fetch_events(EventKind::TransferSent, from, to).await? {
            if let BridgeEvent::TransferSent {
                meta,
                transfer_id,
                destination_chain_id,
                index,
                ..
            } = event
            {
                if destination_chain_id == destination && within_commit(&meta, start.as_ref(), &end) {
                    sends.push((meta.position(), index, transfer_id));
                }
            }
        }
        from = to + 1;
    }

    sends.sort_by_key(|(position, ..)| *position);
    let ids = last_run_from_zero(&sends);
    if !ids.is_empty() && merkle::verify_root(&ids, &root_hash) {
        Ok(Some(ids))
    } else {
        Ok(None)
    }
}

/// Walk commits backward from `commit_block`: the matching commit for
/// `root_hash` and the previous commit to the same destination.
async fn find_commit_bounds(
    chain: &ChainContext,
    root_hash: B256,
    destination: u64,
    commit_block: u64,
    floor: u64,
    batch: u64,
) -> Result<(Option<EventMeta>, Option<EventMeta>), BonderError> {
    let mut end: Option<EventMeta> = None;
    let mut to = commit_block;

    loop {
        let from = to.saturating_sub(batch - 1).max(floor);
        let mut events = chain
            .client
            .fetch_events(EventKind::TransfersCommitted, from, to)
            .await?;
        events.sort_by_key(|e| std::cmp::Reverse(e.meta().position()));

        for event in events {
            let BridgeEvent::TransfersCommitted {
                meta,
                destination_chain_id,
                root_hash: hash,
                ..
            } = event
            else {
                continue;
            };
            if destination_chain_id != destination {
                continue;
            }
            match end {
                None if hash == root_hash => end = Some(meta),
                Some(e) if meta.position() < e.position() => return Ok((end, Some(meta))),
                _ => {}
            }
        }

        if from <= floor {
            return Ok((end, None));
        }
        to = from - 1;
    }
}

/// Same-block rules: sends before the previous commit's transaction belong
/// to the previous root; sends at or after this commit's transaction belong
/// to the next one.
fn within_commit(meta: &EventMeta, start: Option<&EventMeta>, end: &EventMeta) -> bool {
    if let Some(start) = start {
        if meta.block_number < start.block_number
            || (meta.block_number == start.block_number && meta.tx_index < start.tx_index)
        {
            return false;
        }
    }
    !(meta.block_number > end.block_number
        || (meta.block_number == end.block_number && meta.tx_index >= end.tx_index))
}

/// Ids from the last send whose pending index is zero
fn last_run_from_zero(sends: &[((u64, u64, u64), U256, B256)]) -> Vec<B256> {
    let start = sends
        .iter()
        .rposition(|(_, index, _)| index.is_zero())
        .unwrap_or(0);
    sends[start..].iter().map(|(_, _, id)| *id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(block: u64, tx_index: u64) -> EventMeta {
        EventMeta {
            block_number: block,
            tx_index,
            ..Default::default()
        }
    }

    #[test]
    fn test_within_commit_same_block_rules() {
        let start = meta(10, 5);
        let end = meta(20, 3);

        assert!(!within_commit(&meta(10, 4), Some(&start), &end));
        assert!(within_commit(&meta(10, 6), Some(&start), &end));
        assert!(within_commit(&meta(15, 0), Some(&start), &end));
        assert!(within_commit(&meta(20, 2), Some(&start), &end));
        assert!(!within_commit(&meta(20, 3), Some(&start), &end));
        assert!(!within_commit(&meta(21, 0), Some(&start), &end));
        assert!(within_commit(&meta(1, 0), None, &end));
    }

    #[test]
    fn test_last_run_from_zero() {
        let id = |b: u8| B256::repeat_byte(b);
        let sends = vec![
            ((1, 0, 0), U256::from(3u64), id(1)),
            ((2, 0, 0), U256::ZERO, id(2)),
            ((3, 0, 0), U256::from(1u64), id(3)),
            ((4, 0, 0), U256::ZERO, id(4)),
            ((5, 0, 0), U256::from(1u64), id(5)),
        ];
        assert_eq!(last_run_from_zero(&sends), vec![id(4), id(5)]);
        assert!(last_run_from_zero(&[]).is_empty());
    }

    #[test]
    fn test_ordered_ids_sorts_by_position() {
        let t = |b: u8, block: u64, tx: u64, log: u64| Transfer {
            transfer_id: B256::repeat_byte(b),
            transfer_sent_block_number: Some(block),
            transfer_sent_index: Some(tx),
            transfer_sent_log_index: Some(log),
            ..Default::default()
        };
        let ids = ordered_ids(vec![t(3, 5, 0, 0), t(1, 4, 2, 0), t(2, 4, 2, 1)]);
        assert_eq!(
            ids,
            vec![B256::repeat_byte(1), B256::repeat_byte(2), B256::repeat_byte(3)]
        );
    }
}
