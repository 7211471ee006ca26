use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::types::ChainSlug;

/// Main configuration for the bonder node
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub bonder: BonderConfig,
    pub chains: Vec<ChainConfig>,
    pub watchers: WatcherConfig,
    pub api: ApiConfig,
    pub notifier: NotifierConfig,
}

/// Database configuration
#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Custom Debug that redacts the database URL (may contain credentials).
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"<redacted>")
            .finish()
    }
}

/// Bonder identity and bonding policy
#[derive(Clone, Deserialize)]
pub struct BonderConfig {
    pub private_key: String,
    /// Position among redundant bonder processes; 0 acts first
    #[serde(default)]
    pub rank: u32,
    /// Log actions instead of sending transactions
    #[serde(default)]
    pub dry_mode: bool,
    /// Minimum bonder fee as basis points of the amount
    #[serde(default = "default_min_bonder_fee_bps")]
    pub min_bonder_fee_bps: u32,
    /// Minimum absolute bonder fee (token base units, decimal string)
    #[serde(default = "default_min_bonder_fee_absolute")]
    pub min_bonder_fee_absolute: String,
    /// Inclusive bounds on bondable amounts (token base units, decimal strings)
    #[serde(default)]
    pub min_bond_amount: Option<String>,
    #[serde(default)]
    pub max_bond_amount: Option<String>,
    /// Lowercase 0x addresses never bonded for, as sender or recipient
    #[serde(default)]
    pub blocklist: Vec<String>,
}

/// Custom Debug that redacts private_key to prevent accidental log leakage.
impl fmt::Debug for BonderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BonderConfig")
            .field("private_key", &"<redacted>")
            .field("rank", &self.rank)
            .field("dry_mode", &self.dry_mode)
            .field("min_bonder_fee_bps", &self.min_bonder_fee_bps)
            .field("min_bonder_fee_absolute", &self.min_bonder_fee_absolute)
            .field("min_bond_amount", &self.min_bond_amount)
            .field("max_bond_amount", &self.max_bond_amount)
            .field("blocklist", &self.blocklist.len())
            .finish()
    }
}

/// One bridge deployment
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub slug: ChainSlug,
    pub chain_id: u64,
    pub rpc_url: String,
    pub bridge_address: String,
    /// First block to sync from on an empty checkpoint
    #[serde(default)]
    pub start_block: u64,
    #[serde(default = "default_batch_blocks")]
    pub batch_blocks: u64,
    /// L1 messenger wrapper for roots originating on this chain
    #[serde(default)]
    pub wrapper_address: Option<String>,
    /// ERC-4626 vault holding idle bonder liquidity on this chain
    #[serde(default)]
    pub vault_address: Option<String>,
    /// Withdraw from the vault and stake when bond credit falls short
    #[serde(default)]
    pub vault_auto_withdraw: bool,
    /// Minimum pending amount before committing, per destination chain id
    #[serde(default)]
    pub commit_thresholds: HashMap<u64, String>,
    #[serde(default = "default_commit_threshold")]
    pub default_commit_threshold: String,
    #[serde(default)]
    pub relay: RelayConfig,
}

impl ChainConfig {
    pub fn commit_threshold_for(&self, destination_chain_id: u64) -> &str {
        self.commit_thresholds
            .get(&destination_chain_id)
            .map(String::as_str)
            .unwrap_or(&self.default_commit_threshold)
    }
}

/// Addresses used by relay strategies (all on L1 unless noted)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    /// OptimismPortal
    pub portal_address: Option<String>,
    /// L2OutputOracle
    pub output_oracle_address: Option<String>,
    /// Arbitrum Outbox
    pub outbox_address: Option<String>,
    /// Foreign AMB on L1
    pub amb_l1_address: Option<String>,
    /// Home AMB on the L2
    pub amb_l2_address: Option<String>,
    /// Polygon proof generator base URL
    pub proof_api_url: Option<String>,
}

/// Watcher timing
#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_tx_retry_delay")]
    pub tx_retry_delay_ms: u64,
    #[serde(default = "default_sync_interval")]
    pub sync_interval_ms: u64,
    #[serde(default = "default_bond_poll_interval")]
    pub bond_poll_interval_ms: u64,
    #[serde(default = "default_commit_poll_interval")]
    pub commit_poll_interval_ms: u64,
    #[serde(default = "default_slow_poll_interval")]
    pub confirm_poll_interval_ms: u64,
    #[serde(default = "default_slow_poll_interval")]
    pub settle_poll_interval_ms: u64,
    #[serde(default = "default_slow_poll_interval")]
    pub challenge_poll_interval_ms: u64,
    /// Wait per rank step before a lower-ranked bonder acts
    #[serde(default = "default_rank_delay")]
    pub rank_delay_ms: u64,
    #[serde(default = "default_rank_poll")]
    pub rank_poll_ms: u64,
    /// Blocks scanned backward when checking a bonded root for fraud
    #[serde(default = "default_challenge_lookback_blocks")]
    pub challenge_lookback_blocks: u64,
    #[serde(default = "default_incomplete_concurrency")]
    pub incomplete_concurrency: usize,
}

impl WatcherConfig {
    pub fn tx_retry_delay(&self) -> Duration {
        Duration::from_millis(self.tx_retry_delay_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn rank_delay(&self) -> Duration {
        Duration::from_millis(self.rank_delay_ms)
    }

    pub fn rank_poll(&self) -> Duration {
        Duration::from_millis(self.rank_poll_ms)
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            tx_retry_delay_ms: default_tx_retry_delay(),
            sync_interval_ms: default_sync_interval(),
            bond_poll_interval_ms: default_bond_poll_interval(),
            commit_poll_interval_ms: default_commit_poll_interval(),
            confirm_poll_interval_ms: default_slow_poll_interval(),
            settle_poll_interval_ms: default_slow_poll_interval(),
            challenge_poll_interval_ms: default_slow_poll_interval(),
            rank_delay_ms: default_rank_delay(),
            rank_poll_ms: default_rank_poll(),
            challenge_lookback_blocks: default_challenge_lookback_blocks(),
            incomplete_concurrency: default_incomplete_concurrency(),
        }
    }
}

/// Health/metrics server
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

/// Operator notification channel
#[derive(Clone, Default, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Custom Debug that redacts the webhook URL (usually embeds a token).
impl fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierConfig")
            .field("webhook_url", &self.webhook_url.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Default functions
fn default_min_bonder_fee_bps() -> u32 {
    18
}

fn default_min_bonder_fee_absolute() -> String {
    "0".to_string()
}

fn default_batch_blocks() -> u64 {
    2_000
}

fn default_commit_threshold() -> String {
    "0".to_string()
}

fn default_tx_retry_delay() -> u64 {
    60 * 60 * 1000
}

fn default_sync_interval() -> u64 {
    60_000
}

fn default_bond_poll_interval() -> u64 {
    10_000
}

fn default_commit_poll_interval() -> u64 {
    60_000
}

fn default_slow_poll_interval() -> u64 {
    10 * 60 * 1000
}

fn default_rank_delay() -> u64 {
    60_000
}

fn default_rank_poll() -> u64 {
    2_000
}

fn default_challenge_lookback_blocks() -> u64 {
    100_000
}

fn default_incomplete_concurrency() -> usize {
    5
}

fn default_api_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    9090
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env").or_else(|_| Self::load_from_env())
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Self> {
        let database = DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| eyre!("DATABASE_URL environment variable is required"))?,
        };

        let bonder = BonderConfig {
            private_key: env::var("BONDER_PRIVATE_KEY")
                .map_err(|_| eyre!("BONDER_PRIVATE_KEY environment variable is required"))?,
            rank: env_or("BONDER_RANK", 0),
            dry_mode: env_or("DRY_MODE", false),
            min_bonder_fee_bps: env_or("MIN_BONDER_FEE_BPS", default_min_bonder_fee_bps()),
            min_bonder_fee_absolute: env::var("MIN_BONDER_FEE_ABSOLUTE")
                .unwrap_or_else(|_| default_min_bonder_fee_absolute()),
            min_bond_amount: env::var("MIN_BOND_AMOUNT").ok(),
            max_bond_amount: env::var("MAX_BOND_AMOUNT").ok(),
            blocklist: env::var("BLOCKLIST")
                .map(|v| parse_blocklist(&v))
                .unwrap_or_default(),
        };

        let chains = load_chains_from_env()?;

        let watchers = WatcherConfig {
            tx_retry_delay_ms: env_or("TX_RETRY_DELAY_MS", default_tx_retry_delay()),
            sync_interval_ms: env_or("SYNC_INTERVAL_MS", default_sync_interval()),
            bond_poll_interval_ms: env_or("BOND_POLL_INTERVAL_MS", default_bond_poll_interval()),
            commit_poll_interval_ms: env_or(
                "COMMIT_POLL_INTERVAL_MS",
                default_commit_poll_interval(),
            ),
            confirm_poll_interval_ms: env_or(
                "CONFIRM_POLL_INTERVAL_MS",
                default_slow_poll_interval(),
            ),
            settle_poll_interval_ms: env_or(
                "SETTLE_POLL_INTERVAL_MS",
                default_slow_poll_interval(),
            ),
            challenge_poll_interval_ms: env_or(
                "CHALLENGE_POLL_INTERVAL_MS",
                default_slow_poll_interval(),
            ),
            rank_delay_ms: env_or("BONDER_RANK_DELAY_MS", default_rank_delay()),
            rank_poll_ms: env_or("BONDER_RANK_POLL_MS", default_rank_poll()),
            challenge_lookback_blocks: env_or(
                "CHALLENGE_LOOKBACK_BLOCKS",
                default_challenge_lookback_blocks(),
            ),
            incomplete_concurrency: env_or(
                "INCOMPLETE_SYNC_CONCURRENCY",
                default_incomplete_concurrency(),
            ),
        };

        let api = ApiConfig {
            bind_address: env::var("API_BIND_ADDRESS")
                .unwrap_or_else(|_| default_api_bind_address()),
            port: env_or("API_PORT", default_api_port()),
        };

        let notifier = NotifierConfig {
            webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
        };

        let config = Config {
            database,
            bonder,
            chains,
            watchers,
            api,
            notifier,
        };

        config.validate()?;
        Ok(config)
    }

    /// The L1 chain config
    pub fn l1_chain(&self) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.slug.is_l1())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(eyre!("database.url cannot be empty"));
        }

        if self.bonder.private_key.len() != 66 || !self.bonder.private_key.starts_with("0x") {
            return Err(eyre!(
                "bonder.private_key must be 66 chars (0x + 64 hex chars)"
            ));
        }

        if self.bonder.min_bonder_fee_bps > 10_000 {
            return Err(eyre!("bonder.min_bonder_fee_bps cannot exceed 10000"));
        }

        if self.chains.is_empty() {
            return Err(eyre!("At least one chain must be configured"));
        }

        let l1_count = self.chains.iter().filter(|c| c.slug.is_l1()).count();
        if l1_count != 1 {
            return Err(eyre!(
                "Exactly one L1 chain must be configured, found {}",
                l1_count
            ));
        }

        let mut seen_ids = std::collections::HashSet::new();
        for chain in &self.chains {
            if !seen_ids.insert(chain.chain_id) {
                return Err(eyre!("Duplicate chain ID: {}", chain.chain_id));
            }

            if chain.rpc_url.is_empty() {
                return Err(eyre!("rpc_url for chain {} cannot be empty", chain.slug));
            }

            if !is_hex_address(&chain.bridge_address) {
                return Err(eyre!(
                    "Invalid bridge address for chain {}: {}",
                    chain.slug,
                    chain.bridge_address
                ));
            }

            for (name, value) in [
                ("wrapper_address", &chain.wrapper_address),
                ("vault_address", &chain.vault_address),
                ("portal_address", &chain.relay.portal_address),
                ("output_oracle_address", &chain.relay.output_oracle_address),
                ("outbox_address", &chain.relay.outbox_address),
                ("amb_l1_address", &chain.relay.amb_l1_address),
                ("amb_l2_address", &chain.relay.amb_l2_address),
            ] {
                if let Some(addr) = value {
                    if !is_hex_address(addr) {
                        return Err(eyre!(
                            "Invalid {} for chain {}: {}",
                            name,
                            chain.slug,
                            addr
                        ));
                    }
                }
            }

            if chain.batch_blocks == 0 {
                return Err(eyre!("batch_blocks for chain {} must be > 0", chain.slug));
            }
        }

        for addr in &self.bonder.blocklist {
            if !is_hex_address(addr) {
                return Err(eyre!("Invalid blocklist address: {}", addr));
            }
        }

        Ok(())
    }
}

fn is_hex_address(addr: &str) -> bool {
    addr.len() == 42 && addr.starts_with("0x") && hex::decode(&addr[2..]).is_ok()
}

fn parse_blocklist(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Load chain configs from `CHAINS_COUNT` and `CHAIN_{i}_*` variables
pub fn load_chains_from_env() -> Result<Vec<ChainConfig>> {
    let count: usize = env::var("CHAINS_COUNT")
        .map_err(|_| eyre!("CHAINS_COUNT environment variable is required"))?
        .parse()
        .wrap_err("CHAINS_COUNT must be a valid number")?;

    let mut chains = Vec::with_capacity(count);

    for i in 1..=count {
        let prefix = format!("CHAIN_{}", i);
        let var = |suffix: &str| env::var(format!("{}_{}", prefix, suffix)).ok();

        let slug: ChainSlug = var("SLUG")
            .ok_or_else(|| eyre!("Missing {}_SLUG", prefix))?
            .parse()?;

        let chain_id: u64 = var("CHAIN_ID")
            .ok_or_else(|| eyre!("Missing {}_CHAIN_ID", prefix))?
            .parse()
            .map_err(|_| eyre!("Invalid {}_CHAIN_ID", prefix))?;

        let rpc_url = var("RPC_URL").ok_or_else(|| eyre!("Missing {}_RPC_URL", prefix))?;

        let bridge_address = var("BRIDGE_ADDRESS")
            .ok_or_else(|| eyre!("Missing {}_BRIDGE_ADDRESS", prefix))?;

        let start_block = var("START_BLOCK")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        let batch_blocks = var("BATCH_BLOCKS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(default_batch_blocks());

        // CHAIN_{i}_COMMIT_THRESHOLD_{destinationChainId} overrides the default
        let threshold_prefix = format!("{}_COMMIT_THRESHOLD_", prefix);
        let commit_thresholds = env::vars()
            .filter_map(|(k, v)| {
                let dest: u64 = k.strip_prefix(&threshold_prefix)?.parse().ok()?;
                Some((dest, v))
            })
            .collect();

        chains.push(ChainConfig {
            slug,
            chain_id,
            rpc_url,
            bridge_address,
            start_block,
            batch_blocks,
            wrapper_address: var("WRAPPER_ADDRESS"),
            vault_address: var("VAULT_ADDRESS"),
            vault_auto_withdraw: var("VAULT_AUTO_WITHDRAW")
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),
            commit_thresholds,
            default_commit_threshold: var("COMMIT_THRESHOLD")
                .unwrap_or_else(default_commit_threshold),
            relay: RelayConfig {
                portal_address: var("PORTAL_ADDRESS"),
                output_oracle_address: var("OUTPUT_ORACLE_ADDRESS"),
                outbox_address: var("OUTBOX_ADDRESS"),
                amb_l1_address: var("AMB_L1_ADDRESS"),
                amb_l2_address: var("AMB_L2_ADDRESS"),
                proof_api_url: var("PROOF_API_URL"),
            },
        });
    }

    Ok(chains)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEY: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";

    fn chain(slug: ChainSlug, chain_id: u64) -> ChainConfig {
        ChainConfig {
            slug,
            chain_id,
            rpc_url: "http://localhost:8545".to_string(),
            bridge_address: "0x0000000000000000000000000000000000000001".to_string(),
            start_block: 0,
            batch_blocks: default_batch_blocks(),
            wrapper_address: None,
            vault_address: None,
            vault_auto_withdraw: false,
            commit_thresholds: HashMap::new(),
            default_commit_threshold: default_commit_threshold(),
            relay: RelayConfig::default(),
        }
    }

    fn config() -> Config {
        Config {
            database: DatabaseConfig {
                url: "postgres://localhost/test".to_string(),
            },
            bonder: BonderConfig {
                private_key: KEY.to_string(),
                rank: 0,
                dry_mode: false,
                min_bonder_fee_bps: default_min_bonder_fee_bps(),
                min_bonder_fee_absolute: default_min_bonder_fee_absolute(),
                min_bond_amount: None,
                max_bond_amount: None,
                blocklist: vec![],
            },
            chains: vec![chain(ChainSlug::Ethereum, 1), chain(ChainSlug::Optimism, 10)],
            watchers: WatcherConfig::default(),
            api: ApiConfig {
                bind_address: default_api_bind_address(),
                port: default_api_port(),
            },
            notifier: NotifierConfig::default(),
        }
    }

    #[test]
    fn test_default_tx_retry_delay() {
        assert_eq!(default_tx_retry_delay(), 3_600_000);
    }

    #[test]
    fn test_default_batch_blocks() {
        assert_eq!(default_batch_blocks(), 2_000);
    }

    #[test]
    fn test_default_rank_timing() {
        assert_eq!(default_rank_delay(), 60_000);
        assert_eq!(default_rank_poll(), 2_000);
    }

    #[test]
    fn test_validate() {
        let mut config = config();
        assert!(config.validate().is_ok());

        // Invalid private key length
        config.bonder.private_key = "0x123".to_string();
        assert!(config.validate().is_err());
        config.bonder.private_key = KEY.to_string();

        // Invalid bridge address
        config.chains[1].bridge_address = "invalid".to_string();
        assert!(config.validate().is_err());
        config.chains[1].bridge_address =
            "0x0000000000000000000000000000000000000002".to_string();

        // Invalid optional address
        config.chains[1].wrapper_address = Some("0x12".to_string());
        assert!(config.validate().is_err());
        config.chains[1].wrapper_address = None;

        // Fee bps out of range
        config.bonder.min_bonder_fee_bps = 10_001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_exactly_one_l1() {
        let mut config = config();
        config.chains.remove(0);
        assert!(config.validate().is_err());

        let mut config = self::config();
        config.chains.push(chain(ChainSlug::Ethereum, 5));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_chain_id_rejected() {
        let mut config = config();
        config.chains.push(chain(ChainSlug::Arbitrum, 10));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("10"), "unexpected error: {}", err);
    }

    #[test]
    fn test_commit_threshold_override() {
        let mut c = chain(ChainSlug::Optimism, 10);
        c.default_commit_threshold = "100".to_string();
        c.commit_thresholds.insert(1, "5000".to_string());

        assert_eq!(c.commit_threshold_for(1), "5000");
        assert_eq!(c.commit_threshold_for(42161), "100");
    }

    #[test]
    fn test_parse_blocklist() {
        let list = parse_blocklist(" 0xAbC0000000000000000000000000000000000001 ,, 0x0000000000000000000000000000000000000002");
        assert_eq!(
            list,
            vec![
                "0xabc0000000000000000000000000000000000001".to_string(),
                "0x0000000000000000000000000000000000000002".to_string()
            ]
        );
    }

    #[test]
    #[serial]
    fn test_load_chains_from_env() {
        env::set_var("CHAINS_COUNT", "2");
        env::set_var("CHAIN_1_SLUG", "ethereum");
        env::set_var("CHAIN_1_CHAIN_ID", "1");
        env::set_var("CHAIN_1_RPC_URL", "http://l1:8545");
        env::set_var(
            "CHAIN_1_BRIDGE_ADDRESS",
            "0x0000000000000000000000000000000000000001",
        );
        env::set_var("CHAIN_2_SLUG", "arbitrum");
        env::set_var("CHAIN_2_CHAIN_ID", "42161");
        env::set_var("CHAIN_2_RPC_URL", "http://arb:8545");
        env::set_var(
            "CHAIN_2_BRIDGE_ADDRESS",
            "0x0000000000000000000000000000000000000002",
        );
        env::set_var("CHAIN_2_BATCH_BLOCKS", "500");
        env::set_var("CHAIN_2_COMMIT_THRESHOLD_1", "1000");

        let chains = load_chains_from_env().unwrap();

        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].slug, ChainSlug::Ethereum);
        assert_eq!(chains[0].batch_blocks, 2_000);
        assert_eq!(chains[1].chain_id, 42161);
        assert_eq!(chains[1].batch_blocks, 500);
        assert_eq!(chains[1].commit_threshold_for(1), "1000");

        env::remove_var("CHAIN_2_RPC_URL");
        let err = load_chains_from_env().unwrap_err();
        assert!(err.to_string().contains("CHAIN_2_RPC_URL"));

        for key in [
            "CHAINS_COUNT",
            "CHAIN_1_SLUG",
            "CHAIN_1_CHAIN_ID",
            "CHAIN_1_RPC_URL",
            "CHAIN_1_BRIDGE_ADDRESS",
            "CHAIN_2_SLUG",
            "CHAIN_2_CHAIN_ID",
            "CHAIN_2_BRIDGE_ADDRESS",
            "CHAIN_2_BATCH_BLOCKS",
            "CHAIN_2_COMMIT_THRESHOLD_1",
        ] {
            env::remove_var(key);
        }
    }
}
