//! Relay strategies: proving an L2 commit to L1
//!
//! Each L2 family exits to L1 differently. The confirm watcher only knows
//! [`RelayStrategy::handle_commit_tx_hash`]; the strategy decides whether the
//! message is still in flight, already relayed, or ready to be sent.

use alloy::primitives::B256;
use alloy::providers::Provider;
use alloy::rpc::types::TransactionReceipt;
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::chain::EvmChainClient;
use crate::config::ChainConfig;
use crate::error::{BonderError, ChainError, HandlerResult, Outcome};
use crate::retry::with_retry;
use crate::types::ChainSlug;

pub mod amb;
pub mod arbitrum;
pub mod native;
pub mod optimism;
pub mod pos;

pub use amb::AmbRelay;
pub use arbitrum::ArbitrumRelay;
pub use native::NativeRelay;
pub use optimism::OptimismRelay;
pub use pos::PosRelay;

/// Where an L2→L1 message stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    /// Not provable or executable yet
    InFlight,
    Relayed,
    Relayable,
    Unknown,
}

#[async_trait]
pub trait RelayStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Relay the L2→L1 message emitted by a commit transaction, if ready
    async fn handle_commit_tx_hash(
        &self,
        commit_tx_hash: B256,
        transfer_root_id: B256,
    ) -> HandlerResult;
}

/// Outcome for a status that needs no transaction; `None` means relay now
pub fn gate(status: MessageStatus, commit_tx_hash: B256) -> Option<HandlerResult> {
    match status {
        MessageStatus::InFlight => {
            debug!(commit_tx_hash = %commit_tx_hash, "Message in flight");
            Some(Ok(Outcome::Skipped))
        }
        MessageStatus::Relayed => {
            info!(commit_tx_hash = %commit_tx_hash, "Message already relayed");
            Some(Ok(Outcome::AlreadyHandled))
        }
        MessageStatus::Relayable => None,
        MessageStatus::Unknown => Some(Err(BonderError::NotFound(format!(
            "message status for commit tx {commit_tx_hash}"
        )))),
    }
}

/// Receipt of a mined transaction; `NotFound` when the node has none
pub async fn receipt(client: &EvmChainClient, tx_hash: B256) -> Result<TransactionReceipt, ChainError> {
    let provider = client.provider();
    with_retry(client.retry_config(), "eth_getTransactionReceipt", move || async move {
        provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(ChainError::from_rpc)
    })
    .await?
    .ok_or_else(|| ChainError::NotFound(format!("receipt {tx_hash}")))
}

fn address(value: &Option<String>, name: &str, slug: ChainSlug) -> Result<alloy::primitives::Address> {
    let raw = value
        .as_deref()
        .ok_or_else(|| eyre!("{} requires relay {}", slug, name))?;
    alloy::primitives::Address::from_str(raw).wrap_err_with(|| format!("Invalid {name}"))
}

/// Strategy for an L2 chain; `None` for chains without one
pub fn build_strategy(
    config: &ChainConfig,
    l1: Arc<EvmChainClient>,
    l2: Arc<EvmChainClient>,
) -> Result<Option<Arc<dyn RelayStrategy>>> {
    let relay = &config.relay;
    let strategy: Arc<dyn RelayStrategy> = match config.slug {
        ChainSlug::Optimism | ChainSlug::Base => Arc::new(OptimismRelay::new(
            l1,
            l2,
            address(&relay.portal_address, "portal_address", config.slug)?,
            address(&relay.output_oracle_address, "output_oracle_address", config.slug)?,
        )),
        ChainSlug::Arbitrum | ChainSlug::Nova => Arc::new(ArbitrumRelay::new(
            l1,
            l2,
            address(&relay.outbox_address, "outbox_address", config.slug)?,
        )),
        ChainSlug::Gnosis => Arc::new(AmbRelay::new(
            l1,
            l2,
            address(&relay.amb_l1_address, "amb_l1_address", config.slug)?,
            address(&relay.amb_l2_address, "amb_l2_address", config.slug)?,
        )),
        ChainSlug::Polygon => Arc::new(PosRelay::new(
            l1,
            l2,
            relay
                .proof_api_url
                .clone()
                .ok_or_else(|| eyre!("polygon requires relay proof_api_url"))?,
        )),
        ChainSlug::Linea | ChainSlug::ZkSync | ChainSlug::Scroll => {
            Arc::new(NativeRelay::new(config.slug))
        }
        ChainSlug::Ethereum | ChainSlug::PolygonZk => return Ok(None),
    };
    info!(chain = %config.slug, strategy = strategy.name(), "Relay strategy configured");
    Ok(Some(strategy))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate() {
        let hash = B256::repeat_byte(1);
        assert_eq!(
            gate(MessageStatus::InFlight, hash).unwrap().unwrap(),
            Outcome::Skipped
        );
        assert_eq!(
            gate(MessageStatus::Relayed, hash).unwrap().unwrap(),
            Outcome::AlreadyHandled
        );
        assert!(gate(MessageStatus::Relayable, hash).is_none());
        assert!(gate(MessageStatus::Unknown, hash).unwrap().is_err());
    }
}
