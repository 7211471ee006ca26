use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TxError;

// Ledger records keep chain values in their alloy types; the Postgres store maps
// amounts to NUMERIC(78,0) and hashes/addresses to lowercase 0x hex text.
//
// Chain timestamps (sent, committed, bonded, root set) are unix seconds as
// reported by the chain. Local guard timestamps (`*_at` set before sending a
// transaction) are wall-clock `DateTime<Utc>`.

/// One user-initiated cross-chain send
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub transfer_id: B256,
    pub source_chain_id: Option<u64>,
    pub destination_chain_id: Option<u64>,
    pub sender: Option<Address>,
    pub recipient: Option<Address>,
    pub amount: Option<U256>,
    pub bonder_fee: Option<U256>,
    pub amount_out_min: Option<U256>,
    pub deadline: Option<U256>,
    pub transfer_nonce: Option<B256>,
    pub transfer_sent_tx_hash: Option<B256>,
    pub transfer_sent_block_number: Option<u64>,
    /// Transaction index of the send within its block
    pub transfer_sent_index: Option<u64>,
    pub transfer_sent_log_index: Option<u64>,
    pub transfer_sent_timestamp: Option<u64>,
    pub is_bondable: bool,
    pub withdrawal_bonded: bool,
    pub withdrawal_bonder: Option<Address>,
    pub withdrawal_bonded_tx_hash: Option<B256>,
    pub withdrawal_bond_settled: bool,
    pub withdrawal_bond_tx_error: Option<TxError>,
    pub bond_withdrawal_attempted_at: Option<DateTime<Utc>>,
    pub transfer_root_hash: Option<B256>,
    pub transfer_root_id: Option<B256>,
    pub is_transfer_spent: bool,
    pub transfer_spent_tx_hash: Option<B256>,
    pub is_not_found: bool,
}

impl Transfer {
    /// A swap on the destination was requested
    pub fn requests_swap(&self) -> bool {
        self.amount_out_min.is_some_and(|v| !v.is_zero())
            || self.deadline.is_some_and(|v| !v.is_zero())
    }

    /// Ordering key within a source chain
    pub fn position(&self) -> (u64, u64, u64) {
        (
            self.transfer_sent_block_number.unwrap_or(0),
            self.transfer_sent_index.unwrap_or(0),
            self.transfer_sent_log_index.unwrap_or(0),
        )
    }
}

/// A merkle-committed batch of transfers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRoot {
    pub transfer_root_id: B256,
    pub transfer_root_hash: Option<B256>,
    pub source_chain_id: Option<u64>,
    pub destination_chain_id: Option<u64>,
    pub total_amount: Option<U256>,
    pub transfer_ids: Option<Vec<B256>>,
    pub committed: bool,
    pub committed_at: Option<u64>,
    pub commit_tx_hash: Option<B256>,
    pub commit_tx_block_number: Option<u64>,
    pub should_bond_transfer_root: bool,
    pub bonded: bool,
    pub bonder: Option<Address>,
    pub bonded_at: Option<u64>,
    pub bond_tx_hash: Option<B256>,
    pub bond_block_number: Option<u64>,
    pub bond_total_amount: Option<U256>,
    pub bond_transfer_root_id: Option<B256>,
    pub sent_bond_tx_at: Option<DateTime<Utc>>,
    pub confirmed: bool,
    pub confirmed_at: Option<u64>,
    pub confirm_tx_hash: Option<B256>,
    pub sent_confirm_tx_at: Option<DateTime<Utc>>,
    pub challenged: bool,
    /// L1 block time of the `TransferBondChallenged` event
    pub challenge_started_at: Option<u64>,
    pub challenge_expired: bool,
    pub sent_challenge_tx_at: Option<DateTime<Utc>>,
    pub root_set_tx_hash: Option<B256>,
    pub root_set_block_number: Option<u64>,
    pub root_set_timestamp: Option<u64>,
    pub all_settled: bool,
    pub withdrawal_bond_settle_tx_sent_at: Option<DateTime<Utc>>,
    pub is_not_found: bool,
}

/// Partial update of a transfer. `None` leaves the field unchanged; the
/// nested `Option` on clearable fields allows writing NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferUpdate {
    pub source_chain_id: Option<u64>,
    pub destination_chain_id: Option<u64>,
    pub sender: Option<Address>,
    pub recipient: Option<Address>,
    pub amount: Option<U256>,
    pub bonder_fee: Option<U256>,
    pub amount_out_min: Option<U256>,
    pub deadline: Option<U256>,
    pub transfer_nonce: Option<B256>,
    pub transfer_sent_tx_hash: Option<B256>,
    pub transfer_sent_block_number: Option<u64>,
    pub transfer_sent_index: Option<u64>,
    pub transfer_sent_log_index: Option<u64>,
    pub transfer_sent_timestamp: Option<u64>,
    pub is_bondable: Option<bool>,
    pub withdrawal_bonded: Option<bool>,
    pub withdrawal_bonder: Option<Address>,
    pub withdrawal_bonded_tx_hash: Option<B256>,
    pub withdrawal_bond_settled: Option<bool>,
    pub withdrawal_bond_tx_error: Option<Option<TxError>>,
    pub bond_withdrawal_attempted_at: Option<Option<DateTime<Utc>>>,
    pub transfer_root_hash: Option<B256>,
    pub transfer_root_id: Option<B256>,
    pub is_transfer_spent: Option<bool>,
    pub transfer_spent_tx_hash: Option<B256>,
    pub is_not_found: Option<bool>,
}

/// Partial update of a transfer root; same conventions as [`TransferUpdate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferRootUpdate {
    pub transfer_root_hash: Option<B256>,
    pub source_chain_id: Option<u64>,
    pub destination_chain_id: Option<u64>,
    pub total_amount: Option<U256>,
    pub transfer_ids: Option<Option<Vec<B256>>>,
    pub committed: Option<bool>,
    pub committed_at: Option<u64>,
    pub commit_tx_hash: Option<B256>,
    pub commit_tx_block_number: Option<u64>,
    pub should_bond_transfer_root: Option<bool>,
    pub bonded: Option<bool>,
    pub bonder: Option<Address>,
    pub bonded_at: Option<u64>,
    pub bond_tx_hash: Option<B256>,
    pub bond_block_number: Option<u64>,
    pub bond_total_amount: Option<U256>,
    pub bond_transfer_root_id: Option<B256>,
    pub sent_bond_tx_at: Option<Option<DateTime<Utc>>>,
    pub confirmed: Option<bool>,
    pub confirmed_at: Option<u64>,
    pub confirm_tx_hash: Option<B256>,
    pub sent_confirm_tx_at: Option<Option<DateTime<Utc>>>,
    pub challenged: Option<bool>,
    pub challenge_started_at: Option<u64>,
    pub challenge_expired: Option<bool>,
    pub sent_challenge_tx_at: Option<Option<DateTime<Utc>>>,
    pub root_set_tx_hash: Option<B256>,
    pub root_set_block_number: Option<u64>,
    pub root_set_timestamp: Option<u64>,
    pub all_settled: Option<bool>,
    pub withdrawal_bond_settle_tx_sent_at: Option<Option<DateTime<Utc>>>,
    pub is_not_found: Option<bool>,
}

macro_rules! apply_fields {
    ($target:expr, $update:expr, opt: [$($opt:ident),* $(,)?], val: [$($val:ident),* $(,)?], set: [$($set:ident),* $(,)?]) => {
        $(if let Some(v) = &$update.$opt { $target.$opt = Some(v.clone()); })*
        $(if let Some(v) = &$update.$val { $target.$val = *v; })*
        $(if let Some(v) = &$update.$set { $target.$set = v.clone(); })*
    };
}

impl Transfer {
    /// Overwrite the fields named by `update`
    pub fn apply(&mut self, update: &TransferUpdate) {
        apply_fields!(self, update,
            opt: [
                source_chain_id, destination_chain_id, sender, recipient, amount, bonder_fee,
                amount_out_min, deadline, transfer_nonce, transfer_sent_tx_hash,
                transfer_sent_block_number, transfer_sent_index, transfer_sent_log_index,
                transfer_sent_timestamp, withdrawal_bonder, withdrawal_bonded_tx_hash,
                transfer_root_hash, transfer_root_id, transfer_spent_tx_hash,
            ],
            val: [
                is_bondable, withdrawal_bonded, withdrawal_bond_settled, is_transfer_spent,
                is_not_found,
            ],
            set: [withdrawal_bond_tx_error, bond_withdrawal_attempted_at]
        );
    }
}

impl TransferRoot {
    /// Overwrite the fields named by `update`
    pub fn apply(&mut self, update: &TransferRootUpdate) {
        apply_fields!(self, update,
            opt: [
                transfer_root_hash, source_chain_id, destination_chain_id, total_amount,
                committed_at, commit_tx_hash, commit_tx_block_number, bonder, bonded_at,
                bond_tx_hash, bond_block_number, bond_total_amount, bond_transfer_root_id,
                confirmed_at, confirm_tx_hash, challenge_started_at, root_set_tx_hash,
                root_set_block_number, root_set_timestamp,
            ],
            val: [
                committed, should_bond_transfer_root, bonded, confirmed, challenged,
                challenge_expired, all_settled, is_not_found,
            ],
            set: [
                transfer_ids, sent_bond_tx_at, sent_confirm_tx_at, sent_challenge_tx_at,
                withdrawal_bond_settle_tx_sent_at,
            ]
        );
    }
}

/// Checkpoint key for the event sync engine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncKey {
    pub chain_id: u64,
    pub contract_address: Address,
    pub event_name: &'static str,
}

/// Records whose derived fields are still missing
#[derive(Debug, Clone, Default)]
pub struct IncompleteItems {
    pub transfers: Vec<Transfer>,
    pub transfer_roots: Vec<TransferRoot>,
}

impl IncompleteItems {
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty() && self.transfer_roots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.transfers.len() + self.transfer_roots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_apply_partial() {
        let mut transfer = Transfer {
            transfer_id: B256::repeat_byte(1),
            amount: Some(U256::from(5u64)),
            is_bondable: true,
            ..Default::default()
        };

        transfer.apply(&TransferUpdate {
            withdrawal_bonded: Some(true),
            bond_withdrawal_attempted_at: Some(Some(Utc::now())),
            ..Default::default()
        });

        assert!(transfer.withdrawal_bonded);
        assert!(transfer.is_bondable);
        assert_eq!(transfer.amount, Some(U256::from(5u64)));
        assert!(transfer.bond_withdrawal_attempted_at.is_some());

        transfer.apply(&TransferUpdate {
            bond_withdrawal_attempted_at: Some(None),
            ..Default::default()
        });
        assert!(transfer.bond_withdrawal_attempted_at.is_none());
    }

    #[test]
    fn test_root_apply_clears_transfer_ids() {
        let mut root = TransferRoot {
            transfer_ids: Some(vec![B256::repeat_byte(2)]),
            ..Default::default()
        };

        root.apply(&TransferRootUpdate {
            transfer_ids: Some(None),
            confirmed: Some(true),
            ..Default::default()
        });

        assert!(root.transfer_ids.is_none());
        assert!(root.confirmed);
    }

    #[test]
    fn test_requests_swap() {
        let mut transfer = Transfer::default();
        assert!(!transfer.requests_swap());
        transfer.amount_out_min = Some(U256::ZERO);
        transfer.deadline = Some(U256::from(1u64));
        assert!(transfer.requests_swap());
    }
}
