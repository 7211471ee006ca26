//! Status-scoped ledger queries
//!
//! Each query is a predicate over one record so that every store applies the
//! same rules; stores may narrow candidates first (by chain id) for speed.

use chrono::{DateTime, Duration, Utc};

use super::models::{Transfer, TransferRoot};
use crate::types::TxError;

/// Roots from an optimistic rollup can only exit natively after a week.
pub const ORU_EXIT_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

/// Wait after `TransferRootSet` before settling.
pub const ROOT_SET_SETTLE_DELAY_SECS: u64 = 5 * 60;

/// Current time plus the soft-guard window used by every query.
#[derive(Debug, Clone, Copy)]
pub struct QueryClock {
    pub now: DateTime<Utc>,
    pub tx_retry_delay: Duration,
}

impl QueryClock {
    pub fn new(now: DateTime<Utc>, tx_retry_delay: std::time::Duration) -> Self {
        Self {
            now,
            tx_retry_delay: Duration::from_std(tx_retry_delay).unwrap_or(Duration::hours(1)),
        }
    }

    pub fn unix(&self) -> u64 {
        self.now.timestamp().max(0) as u64
    }

    /// A sent-at guard is free when it was never set or has expired.
    pub fn guard_elapsed(&self, sent_at: Option<DateTime<Utc>>) -> bool {
        sent_at.is_none_or(|at| at + self.tx_retry_delay < self.now)
    }
}

pub fn uncommitted_transfer(t: &Transfer, source_chain_id: u64, destination: Option<u64>) -> bool {
    t.source_chain_id == Some(source_chain_id)
        && destination.is_none_or(|d| t.destination_chain_id == Some(d))
        && t.transfer_sent_tx_hash.is_some()
        && t.transfer_root_hash.is_none()
        && !t.is_not_found
}

pub fn unbonded_sent_transfer(t: &Transfer, source_chain_id: u64, clock: &QueryClock) -> bool {
    t.source_chain_id == Some(source_chain_id)
        && t.destination_chain_id.is_some()
        && t.is_bondable
        && !t.withdrawal_bonded
        && !t.is_transfer_spent
        && !t.is_not_found
        && t.transfer_sent_timestamp.is_some()
        && t.amount.is_some()
        && clock.guard_elapsed(t.bond_withdrawal_attempted_at)
}

/// Deferred for liquidity; only worth retrying once credit covers the amount.
pub fn deferred_for_liquidity(t: &Transfer) -> bool {
    t.withdrawal_bond_tx_error == Some(TxError::NotEnoughLiquidity)
}

pub fn unbonded_root(
    r: &TransferRoot,
    source_chain_id: u64,
    destination: Option<u64>,
    clock: &QueryClock,
) -> bool {
    r.source_chain_id == Some(source_chain_id)
        && destination.is_none_or(|d| r.destination_chain_id == Some(d))
        && r.committed
        && r.transfer_root_hash.is_some()
        && r.commit_tx_hash.is_some()
        && r.commit_tx_block_number.is_some()
        && r.committed_at.is_some()
        && r.total_amount.is_some()
        && r.should_bond_transfer_root
        && !r.bonded
        && !r.confirmed
        && !r.is_not_found
        && clock.guard_elapsed(r.sent_bond_tx_at)
}

pub fn exitable_root(
    r: &TransferRoot,
    source_chain_id: u64,
    source_is_oru: bool,
    clock: &QueryClock,
) -> bool {
    let past_exit_window = !source_is_oru
        || r.committed_at
            .is_some_and(|at| at + ORU_EXIT_WINDOW_SECS < clock.unix());

    r.source_chain_id == Some(source_chain_id)
        && r.committed
        && r.commit_tx_hash.is_some()
        && r.committed_at.is_some()
        && !r.confirmed
        && !r.is_not_found
        && past_exit_window
        && clock.guard_elapsed(r.sent_confirm_tx_at)
}

pub fn confirmable_root(
    r: &TransferRoot,
    source_chain_id: u64,
    challenge_period_secs: u64,
    clock: &QueryClock,
) -> bool {
    r.source_chain_id == Some(source_chain_id)
        && r.committed
        && r.bonded
        && !r.confirmed
        && !r.challenged
        && !r.is_not_found
        && r.destination_chain_id.is_some()
        && r.total_amount.is_some()
        && r.committed_at.is_some()
        && r.bonded_at
            .is_some_and(|at| at + challenge_period_secs < clock.unix())
        && clock.guard_elapsed(r.sent_confirm_tx_at)
}

pub fn unsettled_root(r: &TransferRoot, destination_chain_id: u64, clock: &QueryClock) -> bool {
    r.destination_chain_id == Some(destination_chain_id)
        && r.committed
        && r.root_set_tx_hash.is_some()
        && r.root_set_timestamp
            .is_some_and(|at| at + ROOT_SET_SETTLE_DELAY_SECS < clock.unix())
        && r.transfer_ids.as_ref().is_some_and(|ids| !ids.is_empty())
        && r.total_amount.is_some()
        && !r.all_settled
        && !r.is_not_found
        && clock.guard_elapsed(r.withdrawal_bond_settle_tx_sent_at)
}

/// A bond on L1 with no matching commit observed on any source chain.
pub fn challengeable_root(r: &TransferRoot, clock: &QueryClock) -> bool {
    r.bonded
        && !r.committed
        && r.bonded_at.is_some()
        && r.transfer_root_hash.is_some()
        && r.bond_total_amount.is_some()
        && !r.challenged
        && !r.challenge_expired
        && !r.is_not_found
        && clock.guard_elapsed(r.sent_challenge_tx_at)
}

/// A challenge whose resolution period has run out since it started
pub fn resolvable_root(r: &TransferRoot, resolution_period_secs: u64, clock: &QueryClock) -> bool {
    r.challenged
        && !r.challenge_expired
        && !r.is_not_found
        && r.transfer_root_hash.is_some()
        && r.challenge_started_at
            .is_some_and(|at| at + resolution_period_secs < clock.unix())
        && clock.guard_elapsed(r.sent_challenge_tx_at)
}

pub fn incomplete_transfer(t: &Transfer, chain_id: u64) -> bool {
    if t.is_not_found {
        return false;
    }
    let missing_sent = t.transfer_sent_tx_hash.is_some()
        && t.source_chain_id == Some(chain_id)
        && (t.transfer_sent_timestamp.is_none() || t.transfer_sent_index.is_none());
    let missing_bonder = t.withdrawal_bonded_tx_hash.is_some()
        && t.destination_chain_id == Some(chain_id)
        && t.withdrawal_bonder.is_none();
    missing_sent || missing_bonder
}

pub fn incomplete_root(r: &TransferRoot, chain_id: u64, is_l1: bool) -> bool {
    if r.is_not_found {
        return false;
    }
    let from_source = r.source_chain_id == Some(chain_id);
    let missing_commit = from_source
        && r.commit_tx_hash.is_some()
        && (r.committed_at.is_none() || r.commit_tx_block_number.is_none());
    let missing_ids =
        from_source && r.committed && r.commit_tx_hash.is_some() && r.transfer_ids.is_none();
    let missing_bond = is_l1
        && r.bond_tx_hash.is_some()
        && (r.bonder.is_none() || r.bonded_at.is_none() || r.destination_chain_id.is_none());
    let missing_challenge_start = is_l1 && r.challenged && r.challenge_started_at.is_none();
    let missing_root_set = r.destination_chain_id == Some(chain_id)
        && r.root_set_tx_hash.is_some()
        && r.root_set_timestamp.is_none();
    missing_commit || missing_ids || missing_bond || missing_challenge_start || missing_root_set
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{B256, U256};

    fn clock() -> QueryClock {
        QueryClock::new(Utc::now(), std::time::Duration::from_secs(3600))
    }

    fn committed_root() -> TransferRoot {
        TransferRoot {
            transfer_root_id: B256::repeat_byte(1),
            transfer_root_hash: Some(B256::repeat_byte(2)),
            source_chain_id: Some(10),
            destination_chain_id: Some(1),
            total_amount: Some(U256::from(1000u64)),
            committed: true,
            committed_at: Some(1_000),
            commit_tx_hash: Some(B256::repeat_byte(3)),
            commit_tx_block_number: Some(50),
            should_bond_transfer_root: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_guard_elapsed() {
        let c = clock();
        assert!(c.guard_elapsed(None));
        assert!(!c.guard_elapsed(Some(c.now - Duration::minutes(5))));
        assert!(c.guard_elapsed(Some(c.now - Duration::hours(2))));
    }

    #[test]
    fn test_unbonded_root_respects_guard() {
        let c = clock();
        let mut root = committed_root();
        assert!(unbonded_root(&root, 10, None, &c));
        assert!(unbonded_root(&root, 10, Some(1), &c));
        assert!(!unbonded_root(&root, 10, Some(42161), &c));

        root.sent_bond_tx_at = Some(c.now);
        assert!(!unbonded_root(&root, 10, None, &c));

        root.sent_bond_tx_at = None;
        root.bonded = true;
        assert!(!unbonded_root(&root, 10, None, &c));
    }

    #[test]
    fn test_exitable_oru_gating() {
        let c = clock();
        let mut root = committed_root();
        root.committed_at = Some(c.unix() - 60);

        assert!(!exitable_root(&root, 10, true, &c));
        assert!(exitable_root(&root, 10, false, &c));

        root.committed_at = Some(c.unix() - ORU_EXIT_WINDOW_SECS - 1);
        assert!(exitable_root(&root, 10, true, &c));
    }

    #[test]
    fn test_unsettled_requires_cooldown_and_ids() {
        let c = clock();
        let mut root = committed_root();
        root.root_set_tx_hash = Some(B256::repeat_byte(9));
        root.root_set_timestamp = Some(c.unix());
        root.transfer_ids = Some(vec![B256::repeat_byte(4)]);

        assert!(!unsettled_root(&root, 1, &c));

        root.root_set_timestamp = Some(c.unix() - ROOT_SET_SETTLE_DELAY_SECS - 1);
        assert!(unsettled_root(&root, 1, &c));

        root.transfer_ids = Some(vec![]);
        assert!(!unsettled_root(&root, 1, &c));
    }

    #[test]
    fn test_challengeable_only_without_commit() {
        let c = clock();
        let mut root = TransferRoot {
            transfer_root_id: B256::repeat_byte(1),
            transfer_root_hash: Some(B256::repeat_byte(2)),
            bonded: true,
            bonded_at: Some(10),
            bond_total_amount: Some(U256::from(1u64)),
            ..Default::default()
        };
        assert!(challengeable_root(&root, &c));

        root.committed = true;
        assert!(!challengeable_root(&root, &c));
    }

    #[test]
    fn test_resolvable_waits_for_resolution_period_from_challenge_start() {
        let c = clock();
        let period = 10 * 24 * 60 * 60;
        let mut root = TransferRoot {
            transfer_root_id: B256::repeat_byte(1),
            transfer_root_hash: Some(B256::repeat_byte(2)),
            bonded: true,
            bonded_at: Some(c.unix() - 86_410),
            challenged: true,
            challenge_started_at: Some(c.unix() - 60),
            ..Default::default()
        };
        assert!(!resolvable_root(&root, period, &c));

        root.challenge_started_at = None;
        assert!(!resolvable_root(&root, period, &c));
        assert!(incomplete_root(&root, 1, true));

        root.challenge_started_at = Some(c.unix() - period - 1);
        assert!(resolvable_root(&root, period, &c));
        assert!(!incomplete_root(&root, 1, true));

        root.challenge_expired = true;
        assert!(!resolvable_root(&root, period, &c));
    }

    #[test]
    fn test_incomplete_skips_not_found() {
        let mut t = Transfer {
            transfer_id: B256::repeat_byte(1),
            source_chain_id: Some(10),
            transfer_sent_tx_hash: Some(B256::repeat_byte(2)),
            ..Default::default()
        };
        assert!(incomplete_transfer(&t, 10));
        assert!(!incomplete_transfer(&t, 1));

        t.is_not_found = true;
        assert!(!incomplete_transfer(&t, 10));
    }
}
