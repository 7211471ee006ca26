//! In-process Ledger Store
//!
//! Backs tests and dry runs; applies the same query predicates as Postgres.

use alloy::primitives::B256;
use async_trait::async_trait;
use eyre::Result;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::models::*;
use super::queries;
use super::{LedgerStore, QueryClock};

#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    transfers: RwLock<HashMap<B256, Transfer>>,
    roots: RwLock<HashMap<B256, TransferRoot>>,
    checkpoints: RwLock<HashMap<SyncKey, u64>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn filter_transfers(&self, pred: impl Fn(&Transfer) -> bool) -> Vec<Transfer> {
        let mut out: Vec<Transfer> = self
            .transfers
            .read()
            .await
            .values()
            .filter(|t| pred(t))
            .cloned()
            .collect();
        out.sort_by_key(|t| t.position());
        out
    }

    async fn filter_roots(&self, pred: impl Fn(&TransferRoot) -> bool) -> Vec<TransferRoot> {
        let mut out: Vec<TransferRoot> = self
            .roots
            .read()
            .await
            .values()
            .filter(|r| pred(r))
            .cloned()
            .collect();
        out.sort_by_key(|r| (r.committed_at.unwrap_or(0), r.transfer_root_id));
        out
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn get_by_transfer_id(&self, transfer_id: B256) -> Result<Option<Transfer>> {
        Ok(self.transfers.read().await.get(&transfer_id).cloned())
    }

    async fn update_transfer(&self, transfer_id: B256, update: TransferUpdate) -> Result<()> {
        let mut transfers = self.transfers.write().await;
        transfers
            .entry(transfer_id)
            .or_insert_with(|| Transfer {
                transfer_id,
                ..Default::default()
            })
            .apply(&update);
        Ok(())
    }

    async fn get_by_transfer_root_id(
        &self,
        transfer_root_id: B256,
    ) -> Result<Option<TransferRoot>> {
        Ok(self.roots.read().await.get(&transfer_root_id).cloned())
    }

    async fn get_by_transfer_root_hash(&self, root_hash: B256) -> Result<Option<TransferRoot>> {
        let roots = self.roots.read().await;
        let mut matches: Vec<&TransferRoot> = roots
            .values()
            .filter(|r| r.transfer_root_hash == Some(root_hash))
            .collect();
        matches.sort_by_key(|r| !r.committed);
        Ok(matches.first().map(|r| (*r).clone()))
    }

    async fn update_transfer_root(
        &self,
        transfer_root_id: B256,
        update: TransferRootUpdate,
    ) -> Result<()> {
        let mut roots = self.roots.write().await;
        roots
            .entry(transfer_root_id)
            .or_insert_with(|| TransferRoot {
                transfer_root_id,
                ..Default::default()
            })
            .apply(&update);
        Ok(())
    }

    async fn get_transfers_by_root_hash(&self, root_hash: B256) -> Result<Vec<Transfer>> {
        Ok(self
            .filter_transfers(|t| t.transfer_root_hash == Some(root_hash))
            .await)
    }

    async fn get_uncommitted_transfers(
        &self,
        source_chain_id: u64,
        destination_chain_id: Option<u64>,
    ) -> Result<Vec<Transfer>> {
        Ok(self
            .filter_transfers(|t| {
                queries::uncommitted_transfer(t, source_chain_id, destination_chain_id)
            })
            .await)
    }

    async fn get_unbonded_sent_transfers(
        &self,
        source_chain_id: u64,
        clock: &QueryClock,
    ) -> Result<Vec<Transfer>> {
        Ok(self
            .filter_transfers(|t| queries::unbonded_sent_transfer(t, source_chain_id, clock))
            .await)
    }

    async fn get_unbonded_transfer_roots(
        &self,
        source_chain_id: u64,
        destination_chain_id: Option<u64>,
        clock: &QueryClock,
    ) -> Result<Vec<TransferRoot>> {
        Ok(self
            .filter_roots(|r| {
                queries::unbonded_root(r, source_chain_id, destination_chain_id, clock)
            })
            .await)
    }

    async fn get_exitable_transfer_roots(
        &self,
        source_chain_id: u64,
        source_is_oru: bool,
        clock: &QueryClock,
    ) -> Result<Vec<TransferRoot>> {
        Ok(self
            .filter_roots(|r| queries::exitable_root(r, source_chain_id, source_is_oru, clock))
            .await)
    }

    async fn get_confirmable_transfer_roots(
        &self,
        source_chain_id: u64,
        challenge_period_secs: u64,
        clock: &QueryClock,
    ) -> Result<Vec<TransferRoot>> {
        Ok(self
            .filter_roots(|r| {
                queries::confirmable_root(r, source_chain_id, challenge_period_secs, clock)
            })
            .await)
    }

    async fn get_unsettled_transfer_roots(
        &self,
        destination_chain_id: u64,
        clock: &QueryClock,
    ) -> Result<Vec<TransferRoot>> {
        Ok(self
            .filter_roots(|r| queries::unsettled_root(r, destination_chain_id, clock))
            .await)
    }

    async fn get_challengeable_transfer_roots(
        &self,
        clock: &QueryClock,
    ) -> Result<Vec<TransferRoot>> {
        Ok(self
            .filter_roots(|r| queries::challengeable_root(r, clock))
            .await)
    }

    async fn get_resolvable_transfer_roots(
        &self,
        resolution_period_secs: u64,
        clock: &QueryClock,
    ) -> Result<Vec<TransferRoot>> {
        Ok(self
            .filter_roots(|r| queries::resolvable_root(r, resolution_period_secs, clock))
            .await)
    }

    async fn get_incomplete_items(&self, chain_id: u64, is_l1: bool) -> Result<IncompleteItems> {
        Ok(IncompleteItems {
            transfers: self
                .filter_transfers(|t| queries::incomplete_transfer(t, chain_id))
                .await,
            transfer_roots: self
                .filter_roots(|r| queries::incomplete_root(r, chain_id, is_l1))
                .await,
        })
    }

    async fn get_checkpoint(&self, key: &SyncKey) -> Result<Option<u64>> {
        Ok(self.checkpoints.read().await.get(key).copied())
    }

    async fn set_checkpoint(&self, key: &SyncKey, block: u64) -> Result<()> {
        self.checkpoints.write().await.insert(key.clone(), block);
        Ok(())
    }
}
