//! Chain access capabilities
//!
//! Watchers and the sync engine depend on these small traits rather than on
//! a concrete client, so each capability can be scripted in tests. The alloy
//! implementation lives in [`evm`].

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;

use crate::error::ChainError;

pub mod events;
pub mod evm;

pub use events::{BridgeEvent, EventKind, EventMeta};
pub use evm::EvmChainClient;

/// Transaction details used to backfill ledger records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInfo {
    pub hash: B256,
    pub from: Address,
    pub block_number: u64,
    pub tx_index: u64,
    pub input: Bytes,
}

/// A transfer root as recorded on a destination bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferRootInfo {
    pub total: U256,
    pub amount_withdrawn: U256,
    pub created_at: u64,
}

/// `transferBonds(transferRootId)` on the L1 bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferBond {
    pub bonder: Address,
    pub created_at: u64,
    pub total_amount: U256,
    pub challenge_start_time: u64,
    pub challenger: Address,
    pub challenge_resolved: bool,
}

impl TransferBond {
    pub fn exists(&self) -> bool {
        self.created_at > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondWithdrawalParams {
    pub recipient: Address,
    pub amount: U256,
    pub transfer_nonce: B256,
    pub bonder_fee: U256,
    pub amount_out_min: U256,
    pub deadline: U256,
}

/// Arguments of one batched `confirmRoots` call; all vectors have equal length
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfirmBatch {
    pub root_hashes: Vec<B256>,
    pub destination_chain_ids: Vec<u64>,
    pub total_amounts: Vec<U256>,
    pub root_committed_ats: Vec<u64>,
}

impl ConfirmBatch {
    pub fn len(&self) -> usize {
        self.root_hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root_hashes.is_empty()
    }

    pub fn push(&mut self, root_hash: B256, destination: u64, total: U256, committed_at: u64) {
        self.root_hashes.push(root_hash);
        self.destination_chain_ids.push(destination);
        self.total_amounts.push(total);
        self.root_committed_ats.push(committed_at);
    }

    pub fn lengths_match(&self) -> bool {
        let n = self.root_hashes.len();
        self.destination_chain_ids.len() == n
            && self.total_amounts.len() == n
            && self.root_committed_ats.len() == n
    }
}

/// A [`ConfirmBatch`] that passed the confirm watcher's ledger and on-chain
/// checks. Only this crate can build one, so `confirmRoots` is never sent
/// for an unchecked batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedConfirmBatch(ConfirmBatch);

impl ValidatedConfirmBatch {
    /// Call only after the batch passed validation. Rejects empty or
    /// ragged batches.
    pub(crate) fn new(batch: ConfirmBatch) -> Option<Self> {
        (!batch.is_empty() && batch.lengths_match()).then_some(Self(batch))
    }

    pub fn batch(&self) -> &ConfirmBatch {
        &self.0
    }
}

/// Log and block reads
#[async_trait]
pub trait EventSource: Send + Sync {
    fn chain_id(&self) -> u64;

    fn bridge_address(&self) -> Address;

    async fn head_block(&self) -> Result<u64, ChainError>;

    /// Decoded bridge events of `kind` in `[from_block, to_block]`, in log order
    async fn fetch_events(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<BridgeEvent>, ChainError>;

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, ChainError>;

    /// `Ok(None)` when the node does not know the transaction
    async fn transaction(&self, tx_hash: B256) -> Result<Option<TxInfo>, ChainError>;
}

/// Read-only bridge state
#[async_trait]
pub trait BridgeReader: Send + Sync {
    /// The bonder address this client signs with
    fn bonder_address(&self) -> Address;

    async fn credit(&self, bonder: Address) -> Result<U256, ChainError>;

    async fn debit_and_additional_debit(&self, bonder: Address) -> Result<U256, ChainError>;

    /// Idle liquidity in the configured ERC-4626 vault, zero without one
    async fn vault_balance(&self, bonder: Address) -> Result<U256, ChainError>;

    async fn is_bonder(&self, address: Address) -> Result<bool, ChainError>;

    async fn is_transfer_id_spent(&self, transfer_id: B256) -> Result<bool, ChainError>;

    async fn transfer_root(
        &self,
        root_hash: B256,
        total_amount: U256,
    ) -> Result<TransferRootInfo, ChainError>;

    async fn bonded_withdrawal_amount(
        &self,
        bonder: Address,
        transfer_id: B256,
    ) -> Result<U256, ChainError>;
}

/// Withdrawal bonding on a destination bridge
#[async_trait]
pub trait Bondable: Send + Sync {
    async fn bond_withdrawal(&self, params: &BondWithdrawalParams) -> Result<B256, ChainError>;

    /// Bond and swap through the destination AMM (L2 destinations only)
    async fn bond_withdrawal_and_attempt_swap(
        &self,
        params: &BondWithdrawalParams,
    ) -> Result<B256, ChainError>;

    /// Withdraw `amount` from the vault and stake it as bridge credit
    async fn withdraw_from_vault_and_stake(&self, amount: U256) -> Result<B256, ChainError>;
}

#[async_trait]
pub trait Settleable: Send + Sync {
    async fn settle_bonded_withdrawals(
        &self,
        bonder: Address,
        transfer_ids: &[B256],
        total_amount: U256,
    ) -> Result<B256, ChainError>;
}

/// Commits on an L2 source bridge
#[async_trait]
pub trait Committable: Send + Sync {
    async fn pending_amount_for_chain_id(&self, destination: u64) -> Result<U256, ChainError>;

    async fn commit_transfers(&self, destination: u64) -> Result<B256, ChainError>;
}

/// Root bonding, confirmation and challenges on the L1 bridge
#[async_trait]
pub trait L1Actions: Send + Sync {
    async fn bond_transfer_root(
        &self,
        root_hash: B256,
        destination: u64,
        total_amount: U256,
    ) -> Result<B256, ChainError>;

    async fn transfer_bond(&self, transfer_root_id: B256) -> Result<TransferBond, ChainError>;

    /// Zero when the root was never confirmed for `destination`
    async fn transfer_root_committed_at(
        &self,
        destination: u64,
        transfer_root_id: B256,
    ) -> Result<u64, ChainError>;

    async fn bond_for_transfer_amount(&self, amount: U256) -> Result<U256, ChainError>;

    async fn challenge_amount_for_transfer_amount(&self, amount: U256)
        -> Result<U256, ChainError>;

    async fn min_transfer_root_bond_delay(&self) -> Result<u64, ChainError>;

    async fn challenge_period(&self) -> Result<u64, ChainError>;

    async fn challenge_resolution_period(&self) -> Result<u64, ChainError>;

    async fn challenge_transfer_bond(
        &self,
        root_hash: B256,
        original_amount: U256,
        destination: u64,
        stake: U256,
    ) -> Result<B256, ChainError>;

    async fn resolve_challenge(
        &self,
        root_hash: B256,
        original_amount: U256,
        destination: u64,
    ) -> Result<B256, ChainError>;

    async fn confirm_roots(
        &self,
        wrapper: Address,
        batch: &ValidatedConfirmBatch,
    ) -> Result<B256, ChainError>;

    async fn wrapper_l2_chain_id(&self, wrapper: Address) -> Result<u64, ChainError>;
}

/// Every capability of one chain's bridge client
pub trait ChainBridge:
    EventSource + BridgeReader + Bondable + Settleable + Committable + L1Actions
{
}

impl<T> ChainBridge for T where
    T: EventSource + BridgeReader + Bondable + Settleable + Committable + L1Actions
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirm_batch_push_keeps_lengths() {
        let mut batch = ConfirmBatch::default();
        assert!(batch.is_empty());
        batch.push(B256::repeat_byte(1), 1, U256::from(10u64), 100);
        batch.push(B256::repeat_byte(2), 42161, U256::from(20u64), 200);
        assert_eq!(batch.len(), 2);
        assert!(batch.lengths_match());

        assert!(ValidatedConfirmBatch::new(batch.clone()).is_some());

        batch.total_amounts.pop();
        assert!(!batch.lengths_match());
        assert!(ValidatedConfirmBatch::new(batch).is_none());
        assert!(ValidatedConfirmBatch::new(ConfirmBatch::default()).is_none());
    }

    #[test]
    fn test_transfer_bond_exists() {
        assert!(!TransferBond::default().exists());
        let bond = TransferBond {
            created_at: 1,
            ..Default::default()
        };
        assert!(bond.exists());
    }
}
