//! Liquidity Credit Manager
//!
//! Per destination chain, keeps the last observed credit inputs and answers
//! how much the bonder may safely commit right now. It never writes ledger
//! records; it is recomputed by the sync engine after every pass.
//!
//! ```text
//! base         = max(0, credit - debit)
//! available    = max(0, base + vault - pending - unbonded)
//! ```
//!
//! `pending` and `unbonded` only ever apply to the L1 destination: they are
//! the ORU-originated value that L1 will have to front via root bonds.

use alloy::primitives::U256;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::db::{LedgerStore, QueryClock};
use crate::error::BonderError;
use crate::metrics::Metrics;
use crate::state::ChainRegistry;

/// Unbonded root amounts older than this are excluded from the subtraction
pub const UNBONDED_STALE_SECS: i64 = 10 * 60;

/// Last observed inputs for one destination chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditSnapshot {
    pub credit: U256,
    pub debit: U256,
    pub vault_balance: U256,
    pub pending_amount: U256,
    pub unbonded_transfer_root_amount: U256,
    pub unbonded_calculated_at: DateTime<Utc>,
    pub is_l1: bool,
}

impl CreditSnapshot {
    pub fn base_available_credit(&self) -> U256 {
        self.credit.saturating_sub(self.debit)
    }

    pub fn base_available_credit_including_vault(&self) -> U256 {
        self.base_available_credit()
            .saturating_add(self.vault_balance)
    }

    /// Unbonded ORU root amounts, or zero when stale or not an L1 destination
    pub fn effective_unbonded(&self, now: DateTime<Utc>) -> U256 {
        let fresh = now - self.unbonded_calculated_at <= Duration::seconds(UNBONDED_STALE_SECS);
        if self.is_l1 && fresh {
            self.unbonded_transfer_root_amount
        } else {
            U256::ZERO
        }
    }

    pub fn available_credit(&self, now: DateTime<Utc>) -> U256 {
        let pending = if self.is_l1 {
            self.pending_amount
        } else {
            U256::ZERO
        };
        self.base_available_credit_including_vault()
            .saturating_sub(pending)
            .saturating_sub(self.effective_unbonded(now))
    }
}

/// Process-scoped liquidity cache
#[derive(Debug, Default)]
pub struct LiquidityState {
    snapshots: RwLock<HashMap<u64, CreditSnapshot>>,
}

impl LiquidityState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, chain_id: u64, snapshot: CreditSnapshot) {
        self.snapshots.write().await.insert(chain_id, snapshot);
    }

    pub async fn snapshot(&self, chain_id: u64) -> Option<CreditSnapshot> {
        self.snapshots.read().await.get(&chain_id).copied()
    }

    async fn read<F: Fn(&CreditSnapshot) -> U256>(&self, chain_id: u64, f: F) -> U256 {
        self.snapshots
            .read()
            .await
            .get(&chain_id)
            .map(f)
            .unwrap_or(U256::ZERO)
    }

    pub async fn base_available_credit(&self, chain_id: u64) -> U256 {
        self.read(chain_id, |s| s.base_available_credit()).await
    }

    pub async fn base_available_credit_including_vault(&self, chain_id: u64) -> U256 {
        self.read(chain_id, |s| s.base_available_credit_including_vault())
            .await
    }

    pub async fn vault_balance(&self, chain_id: u64) -> U256 {
        self.read(chain_id, |s| s.vault_balance).await
    }

    pub async fn pending_amount(&self, chain_id: u64) -> U256 {
        self.read(chain_id, |s| if s.is_l1 { s.pending_amount } else { U256::ZERO })
            .await
    }

    pub async fn unbonded_transfer_root_amount(&self, chain_id: u64) -> U256 {
        let now = Utc::now();
        self.read(chain_id, |s| s.effective_unbonded(now)).await
    }

    /// Floored at zero; zero for a chain never computed
    pub async fn available_credit(&self, chain_id: u64) -> U256 {
        let now = Utc::now();
        self.read(chain_id, |s| s.available_credit(now)).await
    }

    pub async fn available_credit_for_transfer(&self, destination_chain_id: u64) -> U256 {
        self.available_credit(destination_chain_id).await
    }
}

/// Recompute every destination's snapshot from chain reads and the ledger
pub async fn recalculate(
    chains: &ChainRegistry,
    store: &dyn LedgerStore,
    liquidity: &LiquidityState,
    metrics: &Metrics,
) -> Result<(), BonderError> {
    let l1_chain_id = chains.l1_chain_id();
    let (pending_l1, unbonded_l1) = oru_exposure(chains, store).await?;
    let now = Utc::now();

    for ctx in chains.iter() {
        let client = &ctx.client;
        let bonder = client.bonder_address();
        let credit = client.credit(bonder).await?;
        let debit = client.debit_and_additional_debit(bonder).await?;
        let vault_balance = client.vault_balance(bonder).await?;
        let is_l1 = ctx.chain_id == l1_chain_id;

        let snapshot = CreditSnapshot {
            credit,
            debit,
            vault_balance,
            pending_amount: if is_l1 { pending_l1 } else { U256::ZERO },
            unbonded_transfer_root_amount: if is_l1 { unbonded_l1 } else { U256::ZERO },
            unbonded_calculated_at: now,
            is_l1,
        };

        let available = snapshot.available_credit(now);
        debug!(
            chain = %ctx.slug,
            credit = %credit,
            debit = %debit,
            vault = %vault_balance,
            pending = %snapshot.pending_amount,
            unbonded = %snapshot.unbonded_transfer_root_amount,
            available = %available,
            "Liquidity recalculated"
        );
        metrics
            .available_credit
            .with_label_values(&[ctx.slug.as_str()])
            .set(available.saturating_to::<u128>() as f64);

        liquidity.set(ctx.chain_id, snapshot).await;
    }

    Ok(())
}

/// Pending and unbonded value from ORU sources that L1 will have to front
async fn oru_exposure(
    chains: &ChainRegistry,
    store: &dyn LedgerStore,
) -> Result<(U256, U256), BonderError> {
    let l1 = chains.l1();
    // Roots with a bond transaction in flight still count as exposure
    let clock = QueryClock::new(Utc::now(), std::time::Duration::ZERO);
    let mut pending = U256::ZERO;
    let mut unbonded = U256::ZERO;

    for oru in chains.oru_chains() {
        pending = pending.saturating_add(
            oru.client
                .pending_amount_for_chain_id(l1.chain_id)
                .await?,
        );

        let roots = store
            .get_unbonded_transfer_roots(oru.chain_id, None, &clock)
            .await?;
        for root in roots {
            let Some(total) = root.total_amount else {
                continue;
            };
            let bond = l1.client.transfer_bond(root.transfer_root_id).await?;
            if bond.exists() {
                continue;
            }
            unbonded = unbonded.saturating_add(total);
        }
    }

    if unbonded > U256::ZERO {
        warn!(pending = %pending, unbonded = %unbonded, "ORU exposure awaiting root bonds");
    }
    Ok((pending, unbonded))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(is_l1: bool) -> CreditSnapshot {
        CreditSnapshot {
            credit: U256::from(1_000u64),
            debit: U256::from(200u64),
            vault_balance: U256::from(50u64),
            pending_amount: U256::from(100u64),
            unbonded_transfer_root_amount: U256::from(300u64),
            unbonded_calculated_at: Utc::now(),
            is_l1,
        }
    }

    #[test]
    fn test_l1_subtracts_pending_and_unbonded() {
        let s = snapshot(true);
        assert_eq!(s.base_available_credit(), U256::from(800u64));
        assert_eq!(s.base_available_credit_including_vault(), U256::from(850u64));
        assert_eq!(s.available_credit(Utc::now()), U256::from(450u64));
    }

    #[test]
    fn test_l2_ignores_pending_and_unbonded() {
        let s = snapshot(false);
        assert_eq!(s.available_credit(Utc::now()), U256::from(850u64));
    }

    #[test]
    fn test_stale_unbonded_is_excluded() {
        let mut s = snapshot(true);
        s.unbonded_calculated_at = Utc::now() - Duration::seconds(UNBONDED_STALE_SECS + 1);
        assert_eq!(s.available_credit(Utc::now()), U256::from(750u64));
    }

    #[test]
    fn test_available_credit_never_negative() {
        let cases = [
            (0u64, 0u64, 0u64, 0u64, 0u64),
            (100, 500, 0, 0, 0),
            (100, 0, 0, 500, 0),
            (100, 0, 10, 50, 500),
            (0, 0, 0, u64::MAX, u64::MAX),
        ];
        for (credit, debit, vault, pending, unbonded) in cases {
            let s = CreditSnapshot {
                credit: U256::from(credit),
                debit: U256::from(debit),
                vault_balance: U256::from(vault),
                pending_amount: U256::from(pending),
                unbonded_transfer_root_amount: U256::from(unbonded),
                unbonded_calculated_at: Utc::now(),
                is_l1: true,
            };
            let available = s.available_credit(Utc::now());
            assert!(available <= s.base_available_credit_including_vault());
        }
        let drained = CreditSnapshot {
            credit: U256::from(10u64),
            debit: U256::from(5u64),
            vault_balance: U256::ZERO,
            pending_amount: U256::from(100u64),
            unbonded_transfer_root_amount: U256::ZERO,
            unbonded_calculated_at: Utc::now(),
            is_l1: true,
        };
        assert_eq!(drained.available_credit(Utc::now()), U256::ZERO);
    }

    #[tokio::test]
    async fn test_unknown_chain_has_no_credit() {
        let state = LiquidityState::new();
        assert_eq!(state.available_credit(5).await, U256::ZERO);

        state.set(1, snapshot(true)).await;
        assert_eq!(state.pending_amount(1).await, U256::from(100u64));
        assert_eq!(state.available_credit_for_transfer(1).await, U256::from(450u64));
        assert_eq!(state.vault_balance(1).await, U256::from(50u64));
    }
}
