//! Event Sync Engine
//!
//! One [`SyncWatcher`] per chain ingests bridge events into the ledger in
//! bounded block ranges. The first run walks backward from head to the
//! configured start block; later runs move forward from the checkpoint. A
//! checkpoint is written only after every range of a pass was handled.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::chain::{BridgeEvent, EventKind};
use crate::db::SyncKey;
use crate::error::{BonderError, ChainError, ErrorKind};
use crate::liquidity;
use crate::state::{AppState, ChainContext};

pub mod handlers;
pub mod incomplete;
pub mod transfer_ids;

pub use incomplete::incomplete_poll_sync;

/// Decoded events buffered between the fetch task and the handler loop
const EVENT_CHANNEL_CAPACITY: usize = 256;

pub struct SyncWatcher {
    state: AppState,
    chain: Arc<ChainContext>,
}

impl SyncWatcher {
    pub fn new(state: AppState, chain: Arc<ChainContext>) -> Self {
        Self { state, chain }
    }

    /// Run the sync loop
    pub async fn run(&self) -> eyre::Result<()> {
        info!(
            chain = %self.chain.slug,
            chain_id = self.chain.chain_id,
            start_block = self.chain.start_block,
            "Starting sync watcher"
        );
        let interval = self.state.timing.sync_interval();

        loop {
            match self.sync_pass().await {
                Ok(head) => self.after_pass(head).await?,
                Err(e) if e.kind() == ErrorKind::Unexpected => {
                    error!(chain = %self.chain.slug, error = %e, "Sync pass failed");
                    self.state
                        .notifier
                        .error(&format!("sync on {} failed: {}", self.chain.slug, e))
                        .await;
                    return Err(eyre::eyre!("sync on {} failed: {}", self.chain.slug, e));
                }
                Err(e) => {
                    warn!(chain = %self.chain.slug, error = %e, "Sync pass incomplete, retrying");
                }
            }

            tokio::time::sleep(interval).await;
        }
    }

    async fn after_pass(&self, head: u64) -> eyre::Result<()> {
        let state = &self.state;

        if let Err(e) = liquidity::recalculate(
            &state.chains,
            state.store.as_ref(),
            &state.liquidity,
            &state.metrics,
        )
        .await
        {
            warn!(chain = %self.chain.slug, error = %e, "Liquidity recalculation failed");
        }

        let first = !state.sync_status.is_synced(self.chain.chain_id).await;
        state.sync_status.mark_synced(self.chain.chain_id, head).await;
        state
            .metrics
            .last_synced_block
            .with_label_values(&[self.chain.slug.as_str()])
            .set(head as i64);
        if first {
            info!(chain = %self.chain.slug, head, "Initial sync complete");
        }
        if state.sync_status.all_synced().await {
            state.metrics.up.set(1);
        }

        if let Err(e) = incomplete_poll_sync(state, &self.chain).await {
            if e.kind() == ErrorKind::Unexpected {
                return Err(eyre::eyre!("incomplete sync on {} failed: {}", self.chain.slug, e));
            }
            warn!(chain = %self.chain.slug, error = %e, "Incomplete sync pass failed");
        }
        Ok(())
    }

    /// Sync every event kind up to the current head; returns the head
    pub async fn sync_pass(&self) -> Result<u64, BonderError> {
        let head = self.chain.client.head_block().await?;
        for kind in EventKind::for_chain(self.chain.is_l1()) {
            self.sync_event(*kind, head).await?;
        }
        Ok(head)
    }

    async fn sync_event(&self, kind: EventKind, head: u64) -> Result<(), BonderError> {
        let key = SyncKey {
            chain_id: self.chain.chain_id,
            contract_address: self.chain.client.bridge_address(),
            event_name: kind.as_str(),
        };
        let checkpoint = self.state.store.get_checkpoint(&key).await?;
        let ranges = block_ranges(checkpoint, self.chain.start_block, head, self.chain.batch_blocks);
        if ranges.is_empty() {
            return Ok(());
        }

        debug!(
            chain = %self.chain.slug,
            event = %kind,
            ranges = ranges.len(),
            from = ?checkpoint,
            head,
            "Syncing event"
        );

        let (tx, mut rx) = mpsc::channel::<BridgeEvent>(EVENT_CHANNEL_CAPACITY);
        let client = self.chain.client.clone();

        let fetch = async move {
            for (from, to) in ranges {
                let events = client.fetch_events(kind, from, to).await?;
                for event in events {
                    if tx.send(event).await.is_err() {
                        // Handler stopped; its error is reported instead
                        return Ok(());
                    }
                }
            }
            Ok::<(), ChainError>(())
        };

        let handle = async {
            let mut handled = 0u64;
            while let Some(event) = rx.recv().await {
                handlers::handle_event(&self.state, &self.chain, event).await?;
                handled += 1;
            }
            Ok::<u64, BonderError>(handled)
        };

        let (fetched, handled) = tokio::join!(fetch, handle);
        fetched?;
        let handled = handled?;

        if handled > 0 {
            self.state
                .metrics
                .events_synced_total
                .with_label_values(&[self.chain.slug.as_str(), kind.as_str()])
                .inc_by(handled);
        }
        self.state.store.set_checkpoint(&key, head).await?;
        Ok(())
    }
}

/// Inclusive block ranges for one pass, at most `batch` blocks wide.
///
/// Without a checkpoint the ranges walk backward from `head` to
/// `start_block`, newest first; otherwise they move forward from the
/// checkpoint.
pub fn block_ranges(
    checkpoint: Option<u64>,
    start_block: u64,
    head: u64,
    batch: u64,
) -> Vec<(u64, u64)> {
    let batch = batch.max(1);
    let mut ranges = Vec::new();

    match checkpoint {
        Some(last) => {
            let mut from = last.saturating_add(1).max(start_block);
            while from <= head {
                let to = from.saturating_add(batch - 1).min(head);
                ranges.push((from, to));
                from = to + 1;
            }
        }
        None => {
            if head < start_block {
                return ranges;
            }
            let mut to = head;
            loop {
                let from = to.saturating_sub(batch - 1).max(start_block);
                ranges.push((from, to));
                if from == start_block {
                    break;
                }
                to = from - 1;
            }
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_run_walks_backward() {
        assert_eq!(
            block_ranges(None, 100, 350, 100),
            vec![(251, 350), (151, 250), (100, 150)]
        );
    }

    #[test]
    fn test_forward_from_checkpoint() {
        assert_eq!(
            block_ranges(Some(350), 100, 520, 100),
            vec![(351, 450), (451, 520)]
        );
        assert!(block_ranges(Some(520), 100, 520, 100).is_empty());
    }

    #[test]
    fn test_ranges_cover_single_block() {
        assert_eq!(block_ranges(None, 7, 7, 2_000), vec![(7, 7)]);
        assert!(block_ranges(None, 10, 5, 2_000).is_empty());
    }
}
