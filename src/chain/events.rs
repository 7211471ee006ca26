//! Decoded bridge events as they flow from a chain client to the sync engine

use alloy::primitives::{Address, B256, U256};

/// Where a log sits on chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventMeta {
    pub tx_hash: B256,
    pub block_number: u64,
    pub tx_index: u64,
    pub log_index: u64,
}

impl EventMeta {
    pub fn position(&self) -> (u64, u64, u64) {
        (self.block_number, self.tx_index, self.log_index)
    }
}

/// Event types the sync engine subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TransferSent,
    TransfersCommitted,
    TransferRootBonded,
    TransferRootConfirmed,
    TransferRootSet,
    WithdrawalBonded,
    Withdrew,
    WithdrawalBondSettled,
    MultipleWithdrawalsSettled,
    TransferBondChallenged,
    ChallengeResolved,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TransferSent => "TransferSent",
            EventKind::TransfersCommitted => "TransfersCommitted",
            EventKind::TransferRootBonded => "TransferRootBonded",
            EventKind::TransferRootConfirmed => "TransferRootConfirmed",
            EventKind::TransferRootSet => "TransferRootSet",
            EventKind::WithdrawalBonded => "WithdrawalBonded",
            EventKind::Withdrew => "Withdrew",
            EventKind::WithdrawalBondSettled => "WithdrawalBondSettled",
            EventKind::MultipleWithdrawalsSettled => "MultipleWithdrawalsSettled",
            EventKind::TransferBondChallenged => "TransferBondChallenged",
            EventKind::ChallengeResolved => "ChallengeResolved",
        }
    }

    /// Events synced on an L2 bridge, in handling order
    pub const L2: &'static [EventKind] = &[
        EventKind::TransferSent,
        EventKind::TransfersCommitted,
        EventKind::WithdrawalBonded,
        EventKind::Withdrew,
        EventKind::WithdrawalBondSettled,
        EventKind::MultipleWithdrawalsSettled,
        EventKind::TransferRootSet,
    ];

    /// Events synced on the L1 bridge, in handling order
    pub const L1: &'static [EventKind] = &[
        EventKind::TransferRootBonded,
        EventKind::TransferRootConfirmed,
        EventKind::TransferBondChallenged,
        EventKind::ChallengeResolved,
        EventKind::WithdrawalBonded,
        EventKind::Withdrew,
        EventKind::WithdrawalBondSettled,
        EventKind::MultipleWithdrawalsSettled,
        EventKind::TransferRootSet,
    ];

    pub fn for_chain(is_l1: bool) -> &'static [EventKind] {
        if is_l1 {
            Self::L1
        } else {
            Self::L2
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    TransferSent {
        meta: EventMeta,
        transfer_id: B256,
        destination_chain_id: u64,
        recipient: Address,
        amount: U256,
        transfer_nonce: B256,
        bonder_fee: U256,
        index: U256,
        amount_out_min: U256,
        deadline: U256,
    },
    TransfersCommitted {
        meta: EventMeta,
        destination_chain_id: u64,
        root_hash: B256,
        total_amount: U256,
        root_committed_at: u64,
    },
    TransferRootBonded {
        meta: EventMeta,
        root_hash: B256,
        amount: U256,
    },
    TransferRootConfirmed {
        meta: EventMeta,
        origin_chain_id: u64,
        destination_chain_id: u64,
        root_hash: B256,
        total_amount: U256,
    },
    TransferRootSet {
        meta: EventMeta,
        root_hash: B256,
        total_amount: U256,
    },
    WithdrawalBonded {
        meta: EventMeta,
        transfer_id: B256,
        amount: U256,
    },
    Withdrew {
        meta: EventMeta,
        transfer_id: B256,
        recipient: Address,
        amount: U256,
        transfer_nonce: B256,
    },
    WithdrawalBondSettled {
        meta: EventMeta,
        bonder: Address,
        transfer_id: B256,
        root_hash: B256,
    },
    MultipleWithdrawalsSettled {
        meta: EventMeta,
        bonder: Address,
        root_hash: B256,
        total_bonds_settled: U256,
    },
    TransferBondChallenged {
        meta: EventMeta,
        transfer_root_id: B256,
        root_hash: B256,
        original_amount: U256,
    },
    ChallengeResolved {
        meta: EventMeta,
        transfer_root_id: B256,
        root_hash: B256,
        original_amount: U256,
    },
}

impl BridgeEvent {
    pub fn meta(&self) -> &EventMeta {
        match self {
            BridgeEvent::TransferSent { meta, .. }
            | BridgeEvent::TransfersCommitted { meta, .. }
            | BridgeEvent::TransferRootBonded { meta, .. }
            | BridgeEvent::TransferRootConfirmed { meta, .. }
            | BridgeEvent::TransferRootSet { meta, .. }
            | BridgeEvent::WithdrawalBonded { meta, .. }
            | BridgeEvent::Withdrew { meta, .. }
            | BridgeEvent::WithdrawalBondSettled { meta, .. }
            | BridgeEvent::MultipleWithdrawalsSettled { meta, .. }
            | BridgeEvent::TransferBondChallenged { meta, .. }
            | BridgeEvent::ChallengeResolved { meta, .. } => meta,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            BridgeEvent::TransferSent { .. } => EventKind::TransferSent,
            BridgeEvent::TransfersCommitted { .. } => EventKind::TransfersCommitted,
            BridgeEvent::TransferRootBonded { .. } => EventKind::TransferRootBonded,
            BridgeEvent::TransferRootConfirmed { .. } => EventKind::TransferRootConfirmed,
            BridgeEvent::TransferRootSet { .. } => EventKind::TransferRootSet,
            BridgeEvent::WithdrawalBonded { .. } => EventKind::WithdrawalBonded,
            BridgeEvent::Withdrew { .. } => EventKind::Withdrew,
            BridgeEvent::WithdrawalBondSettled { .. } => EventKind::WithdrawalBondSettled,
            BridgeEvent::MultipleWithdrawalsSettled { .. } => {
                EventKind::MultipleWithdrawalsSettled
            }
            BridgeEvent::TransferBondChallenged { .. } => EventKind::TransferBondChallenged,
            BridgeEvent::ChallengeResolved { .. } => EventKind::ChallengeResolved,
        }
    }
}
