//! Process-scoped shared state
//!
//! Everything watchers share lives here and is handed out by `Arc`; there is
//! no ambient global state.

use alloy::primitives::{Address, U256};
use chrono::Utc;
use eyre::{eyre, Result, WrapErr};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::error;

use crate::chain::ChainBridge;
use crate::config::{BonderConfig, ChainConfig, WatcherConfig};
use crate::db::{LedgerStore, QueryClock};
use crate::liquidity::LiquidityState;
use crate::metrics::Metrics;
use crate::notifier::Notifier;
use crate::relay::RelayStrategy;
use crate::types::ChainSlug;

/// Soft per-key "transaction in flight" marker with a TTL.
///
/// A key stays pending until released or until the TTL passes, so a slow
/// transaction is not resubmitted but a lost one is retried eventually.
#[derive(Debug)]
pub struct SentAtGuard<K> {
    sent_at: HashMap<K, Instant>,
    ttl: Duration,
}

impl<K: Eq + Hash + Copy> SentAtGuard<K> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sent_at: HashMap::new(),
            ttl,
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.sent_at.get(key).is_some_and(|t| t.elapsed() < self.ttl)
    }

    /// Mark `key` as sent unless it is already pending
    pub fn try_acquire(&mut self, key: K) -> bool {
        let ttl = self.ttl;
        self.sent_at.retain(|_, t| t.elapsed() < ttl);
        if self.sent_at.contains_key(&key) {
            return false;
        }
        self.sent_at.insert(key, Instant::now());
        true
    }

    pub fn release(&mut self, key: &K) {
        self.sent_at.remove(key);
    }

    pub fn len(&self) -> usize {
        self.sent_at.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent_at.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ChainSyncState {
    initial_sync_complete: bool,
    last_synced_block: u64,
}

/// Per-chain sync progress shared between the sync engine and watchers
#[derive(Debug, Default)]
pub struct SyncStatus {
    chains: RwLock<HashMap<u64, ChainSyncState>>,
}

impl SyncStatus {
    pub fn new(chain_ids: impl IntoIterator<Item = u64>) -> Self {
        let chains = chain_ids
            .into_iter()
            .map(|id| (id, ChainSyncState::default()))
            .collect();
        Self {
            chains: RwLock::new(chains),
        }
    }

    pub async fn mark_synced(&self, chain_id: u64, block: u64) {
        let mut chains = self.chains.write().await;
        let entry = chains.entry(chain_id).or_default();
        entry.initial_sync_complete = true;
        entry.last_synced_block = entry.last_synced_block.max(block);
    }

    pub async fn is_synced(&self, chain_id: u64) -> bool {
        self.chains
            .read()
            .await
            .get(&chain_id)
            .is_some_and(|s| s.initial_sync_complete)
    }

    /// Every registered chain finished its first pass
    pub async fn all_synced(&self) -> bool {
        let chains = self.chains.read().await;
        !chains.is_empty() && chains.values().all(|s| s.initial_sync_complete)
    }

    pub async fn last_synced_block(&self, chain_id: u64) -> Option<u64> {
        self.chains
            .read()
            .await
            .get(&chain_id)
            .map(|s| s.last_synced_block)
    }

    pub async fn snapshot(&self) -> BTreeMap<u64, u64> {
        self.chains
            .read()
            .await
            .iter()
            .map(|(id, s)| (*id, s.last_synced_block))
            .collect()
    }
}

/// One configured chain: its client, its relay strategy and its routes
pub struct ChainContext {
    pub chain_id: u64,
    pub slug: ChainSlug,
    pub client: Arc<dyn ChainBridge>,
    pub relay: Option<Arc<dyn RelayStrategy>>,
    /// L1 messenger wrapper used to confirm this chain's roots
    pub wrapper_address: Option<Address>,
    pub vault_auto_withdraw: bool,
    pub start_block: u64,
    pub batch_blocks: u64,
    commit_thresholds: HashMap<u64, U256>,
    default_commit_threshold: U256,
}

impl ChainContext {
    pub fn new(
        config: &ChainConfig,
        client: Arc<dyn ChainBridge>,
        relay: Option<Arc<dyn RelayStrategy>>,
    ) -> Result<Self> {
        let wrapper_address = config
            .wrapper_address
            .as_deref()
            .map(Address::from_str)
            .transpose()
            .wrap_err("Invalid wrapper address")?;
        let commit_thresholds = config
            .commit_thresholds
            .iter()
            .map(|(dest, amount)| Ok((*dest, parse_amount(amount)?)))
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self {
            chain_id: config.chain_id,
            slug: config.slug,
            client,
            relay,
            wrapper_address,
            vault_auto_withdraw: config.vault_auto_withdraw,
            start_block: config.start_block,
            batch_blocks: config.batch_blocks,
            commit_thresholds,
            default_commit_threshold: parse_amount(&config.default_commit_threshold)?,
        })
    }

    pub fn is_l1(&self) -> bool {
        self.slug.is_l1()
    }

    pub fn is_oru(&self) -> bool {
        self.slug.is_oru()
    }

    pub fn commit_threshold(&self, destination_chain_id: u64) -> U256 {
        self.commit_thresholds
            .get(&destination_chain_id)
            .copied()
            .unwrap_or(self.default_commit_threshold)
    }
}

/// Sibling lookup: every chain context by chain id
pub struct ChainRegistry {
    chains: BTreeMap<u64, Arc<ChainContext>>,
    l1_chain_id: u64,
}

impl ChainRegistry {
    pub fn new(contexts: Vec<ChainContext>) -> Result<Self> {
        let l1_chain_id = contexts
            .iter()
            .find(|c| c.is_l1())
            .map(|c| c.chain_id)
            .ok_or_else(|| eyre!("No L1 chain configured"))?;
        let chains = contexts
            .into_iter()
            .map(|c| (c.chain_id, Arc::new(c)))
            .collect();
        Ok(Self {
            chains,
            l1_chain_id,
        })
    }

    pub fn get(&self, chain_id: u64) -> Option<&Arc<ChainContext>> {
        self.chains.get(&chain_id)
    }

    pub fn l1(&self) -> &Arc<ChainContext> {
        // Constructor guarantees the L1 entry exists
        &self.chains[&self.l1_chain_id]
    }

    pub fn l1_chain_id(&self) -> u64 {
        self.l1_chain_id
    }

    pub fn is_l1(&self, chain_id: u64) -> bool {
        chain_id == self.l1_chain_id
    }

    pub fn is_oru(&self, chain_id: u64) -> bool {
        self.get(chain_id).is_some_and(|c| c.is_oru())
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.chains.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ChainContext>> {
        self.chains.values()
    }

    pub fn oru_chains(&self) -> impl Iterator<Item = &Arc<ChainContext>> {
        self.chains.values().filter(|c| c.is_oru())
    }
}

/// Bonding rules derived from [`BonderConfig`]
#[derive(Debug, Clone, Default)]
pub struct BondPolicy {
    pub rank: u32,
    pub dry_mode: bool,
    pub min_bonder_fee_bps: u32,
    pub min_bonder_fee_absolute: U256,
    pub min_bond_amount: Option<U256>,
    pub max_bond_amount: Option<U256>,
    pub blocklist: HashSet<Address>,
}

impl BondPolicy {
    pub fn from_config(config: &BonderConfig) -> Result<Self> {
        let blocklist = config
            .blocklist
            .iter()
            .map(|a| Address::from_str(a).wrap_err_with(|| format!("Invalid blocklist address {a}")))
            .collect::<Result<HashSet<_>>>()?;

        Ok(Self {
            rank: config.rank,
            dry_mode: config.dry_mode,
            min_bonder_fee_bps: config.min_bonder_fee_bps,
            min_bonder_fee_absolute: parse_amount(&config.min_bonder_fee_absolute)?,
            min_bond_amount: config.min_bond_amount.as_deref().map(parse_amount).transpose()?,
            max_bond_amount: config.max_bond_amount.as_deref().map(parse_amount).transpose()?,
            blocklist,
        })
    }

    pub fn bonder_fee_ok(&self, amount: U256, bonder_fee: U256) -> bool {
        let min_bps_fee =
            amount.saturating_mul(U256::from(self.min_bonder_fee_bps)) / U256::from(10_000u64);
        bonder_fee >= min_bps_fee && bonder_fee >= self.min_bonder_fee_absolute
    }

    pub fn is_blocked(&self, address: Option<Address>) -> bool {
        address.is_some_and(|a| self.blocklist.contains(&a))
    }

    pub fn amount_in_range(&self, amount: U256) -> bool {
        self.min_bond_amount.is_none_or(|min| amount >= min)
            && self.max_bond_amount.is_none_or(|max| amount <= max)
    }

    /// Whether a freshly sent transfer may ever be bonded
    pub fn is_bondable(
        &self,
        amount: U256,
        bonder_fee: U256,
        requests_swap: bool,
        destination_is_l1: bool,
        sender: Option<Address>,
        recipient: Address,
    ) -> bool {
        if requests_swap && destination_is_l1 {
            return false;
        }
        if !self.bonder_fee_ok(amount, bonder_fee) {
            return false;
        }
        !self.is_blocked(sender) && !self.is_blocked(Some(recipient))
    }
}

/// Parse a decimal or 0x-prefixed token amount
pub fn parse_amount(value: &str) -> Result<U256> {
    U256::from_str(value.trim()).map_err(|e| eyre!("Invalid amount {value:?}: {e}"))
}

/// Shared handles passed to every watcher and the sync engine
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub chains: Arc<ChainRegistry>,
    pub liquidity: Arc<LiquidityState>,
    pub sync_status: Arc<SyncStatus>,
    pub metrics: Arc<Metrics>,
    pub notifier: Arc<Notifier>,
    pub policy: Arc<BondPolicy>,
    pub timing: WatcherConfig,
    writes_disabled: Arc<AtomicBool>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        chains: Arc<ChainRegistry>,
        liquidity: Arc<LiquidityState>,
        sync_status: Arc<SyncStatus>,
        metrics: Arc<Metrics>,
        notifier: Arc<Notifier>,
        policy: BondPolicy,
        timing: WatcherConfig,
    ) -> Self {
        Self {
            store,
            chains,
            liquidity,
            sync_status,
            metrics,
            notifier,
            policy: Arc::new(policy),
            timing,
            writes_disabled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn clock(&self) -> QueryClock {
        QueryClock::new(Utc::now(), self.timing.tx_retry_delay())
    }

    /// Dry mode, configured or forced by a failed pre-transaction validation
    pub fn is_dry(&self) -> bool {
        self.policy.dry_mode || self.writes_disabled.load(Ordering::Relaxed)
    }

    /// Stop sending transactions for the rest of the process lifetime
    pub fn disable_writes(&self, reason: &str) {
        if !self.writes_disabled.swap(true, Ordering::Relaxed) {
            error!(reason, "Pre-transaction validation failed, turning off writes");
        }
    }

    pub fn chain(&self, chain_id: u64) -> Option<&Arc<ChainContext>> {
        self.chains.get(chain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sent_at_guard_blocks_until_released() {
        let mut guard = SentAtGuard::new(Duration::from_secs(60));
        assert!(guard.try_acquire((10u64, 1u64)));
        assert!(guard.is_pending(&(10, 1)));
        assert!(!guard.try_acquire((10, 1)));
        assert!(guard.try_acquire((10, 42161)));

        guard.release(&(10, 1));
        assert!(!guard.is_pending(&(10, 1)));
        assert!(guard.try_acquire((10, 1)));
        assert_eq!(guard.len(), 2);
    }

    #[test]
    fn test_sent_at_guard_expires() {
        let mut guard = SentAtGuard::new(Duration::ZERO);
        assert!(guard.try_acquire(1u64));
        assert!(!guard.is_pending(&1));
        assert!(guard.try_acquire(1));
    }

    #[tokio::test]
    async fn test_sync_status() {
        let status = SyncStatus::new([1, 10]);
        assert!(!status.all_synced().await);

        status.mark_synced(1, 100).await;
        assert!(status.is_synced(1).await);
        assert!(!status.all_synced().await);

        status.mark_synced(10, 50).await;
        status.mark_synced(10, 40).await;
        assert!(status.all_synced().await);
        assert_eq!(status.last_synced_block(10).await, Some(50));
    }

    #[test]
    fn test_bonder_fee_ok() {
        let policy = BondPolicy {
            min_bonder_fee_bps: 18,
            min_bonder_fee_absolute: U256::from(100u64),
            ..Default::default()
        };
        // 0.18% of 1_000_000 = 1_800
        assert!(policy.bonder_fee_ok(U256::from(1_000_000u64), U256::from(1_800u64)));
        assert!(!policy.bonder_fee_ok(U256::from(1_000_000u64), U256::from(1_799u64)));
        // absolute floor dominates for small amounts
        assert!(!policy.bonder_fee_ok(U256::from(1_000u64), U256::from(99u64)));
    }

    #[test]
    fn test_is_bondable_rules() {
        let blocked = Address::repeat_byte(0xbb);
        let policy = BondPolicy {
            blocklist: [blocked].into_iter().collect(),
            ..Default::default()
        };
        let amount = U256::from(1_000u64);
        let fee = U256::from(10u64);
        let recipient = Address::repeat_byte(1);

        assert!(policy.is_bondable(amount, fee, false, true, None, recipient));
        assert!(policy.is_bondable(amount, fee, true, false, None, recipient));
        assert!(!policy.is_bondable(amount, fee, true, true, None, recipient));
        assert!(!policy.is_bondable(amount, fee, false, false, Some(blocked), recipient));
        assert!(!policy.is_bondable(amount, fee, false, false, None, blocked));
    }

    #[test]
    fn test_amount_in_range() {
        let policy = BondPolicy {
            min_bond_amount: Some(U256::from(10u64)),
            max_bond_amount: Some(U256::from(100u64)),
            ..Default::default()
        };
        assert!(!policy.amount_in_range(U256::from(9u64)));
        assert!(policy.amount_in_range(U256::from(10u64)));
        assert!(policy.amount_in_range(U256::from(100u64)));
        assert!(!policy.amount_in_range(U256::from(101u64)));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1000").unwrap(), U256::from(1000u64));
        assert_eq!(parse_amount("0x10").unwrap(), U256::from(16u64));
        assert!(parse_amount("ten").is_err());
    }
}
