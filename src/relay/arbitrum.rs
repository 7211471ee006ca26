//! Arbitrum outbox execution (Arbitrum One, Nova)

use alloy::primitives::{address, Address, B256, U256};
use alloy::providers::Provider;
use alloy::rpc::types::{BlockTransactionsKind, TransactionReceipt};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::{gate, receipt, MessageStatus, RelayStrategy};
use crate::chain::evm::send_tx;
use crate::chain::{EventSource, EvmChainClient};
use crate::contracts::relay::{ArbOutbox, ArbSys, NodeInterface};
use crate::error::{BonderError, ChainError, HandlerResult, Outcome};
use crate::retry::with_retry;

pub const ARB_SYS: Address = address!("0000000000000000000000000000000000000064");
pub const NODE_INTERFACE: Address = address!("00000000000000000000000000000000000000C8");

/// How far back on L1 to look for the latest `SendRootUpdated`
const SEND_ROOT_LOOKBACK_BLOCKS: u64 = 20_000;
const SEND_ROOT_CHUNK_BLOCKS: u64 = 2_000;

pub struct ArbitrumRelay {
    l1: Arc<EvmChainClient>,
    l2: Arc<EvmChainClient>,
    outbox: Address,
}

impl ArbitrumRelay {
    pub fn new(l1: Arc<EvmChainClient>, l2: Arc<EvmChainClient>, outbox: Address) -> Self {
        Self { l1, l2, outbox }
    }

    /// L2 block hash of the newest send root posted to the outbox
    async fn latest_send_root_block(&self) -> Result<Option<B256>, ChainError> {
        let head = self.l1.head_block().await?;
        let floor = head.saturating_sub(SEND_ROOT_LOOKBACK_BLOCKS);
        let mut to = head;
        while to > floor {
            let from = to.saturating_sub(SEND_ROOT_CHUNK_BLOCKS - 1).max(floor);
            let logs = self
                .l1
                .logs::<ArbOutbox::SendRootUpdated>(self.outbox, from, to)
                .await?;
            if let Some((_, event)) = logs.last() {
                return Ok(Some(event.l2BlockHash));
            }
            if from == 0 {
                break;
            }
            to = from - 1;
        }
        Ok(None)
    }

    /// Number of L2→L1 sends covered by the confirmed outbox root
    async fn confirmed_send_count(&self) -> Result<Option<u64>, ChainError> {
        let Some(l2_block_hash) = self.latest_send_root_block().await? else {
            return Ok(None);
        };
        let provider = self.l2.provider();
        let block = with_retry(self.l2.retry_config(), "eth_getBlockByHash", move || async move {
            provider
                .get_block_by_hash(l2_block_hash, BlockTransactionsKind::Hashes)
                .await
                .map_err(ChainError::from_rpc)
        })
        .await?;
        Ok(block.map(|b| send_count_from_mix_hash(b.header.mix_hash)))
    }

    async fn status(&self, position: U256) -> Result<(MessageStatus, u64), ChainError> {
        let (provider, outbox) = (self.l1.provider(), self.outbox);
        let spent = self
            .l1
            .view("isSpent", move || async move {
                Ok(ArbOutbox::new(outbox, provider).isSpent(position).call().await?._0)
            })
            .await?;
        if spent {
            return Ok((MessageStatus::Relayed, 0));
        }

        let Some(send_count) = self.confirmed_send_count().await? else {
            return Ok((MessageStatus::InFlight, 0));
        };
        if U256::from(send_count) <= position {
            debug!(send_count, position = %position, "Outbox root does not cover message yet");
            return Ok((MessageStatus::InFlight, send_count));
        }
        Ok((MessageStatus::Relayable, send_count))
    }

    async fn execute(&self, message: ArbSys::L2ToL1Tx, send_count: u64) -> Result<B256, ChainError> {
        let provider = self.l2.provider();
        let leaf = message.position.saturating_to::<u64>();
        let proof = self
            .l2
            .view("constructOutboxProof", move || async move {
                Ok(NodeInterface::new(NODE_INTERFACE, provider)
                    .constructOutboxProof(send_count, leaf)
                    .call()
                    .await?
                    .proof)
            })
            .await?;

        let wallet = self.l1.wallet_provider()?;
        let outbox = ArbOutbox::new(self.outbox, &wallet);
        let tx_hash = send_tx!(
            self.l1,
            outbox.executeTransaction(
                proof,
                message.position,
                message.caller,
                message.destination,
                message.arbBlockNum,
                message.ethBlockNum,
                message.timestamp,
                message.callvalue,
                message.data,
            ),
            "executeTransaction"
        );
        Ok(tx_hash)
    }
}

/// Nitro stores the send count in the first 8 bytes of `mixHash`
pub fn send_count_from_mix_hash(mix_hash: B256) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&mix_hash[..8]);
    u64::from_be_bytes(bytes)
}

fn l2_to_l1_tx(receipt: &TransactionReceipt) -> Option<ArbSys::L2ToL1Tx> {
    receipt.inner.logs().iter().find_map(|log| {
        if log.inner.address != ARB_SYS {
            return None;
        }
        log.log_decode::<ArbSys::L2ToL1Tx>()
            .ok()
            .map(|decoded| decoded.inner.data)
    })
}

#[async_trait]
impl RelayStrategy for ArbitrumRelay {
    fn name(&self) -> &'static str {
        "arbitrum_outbox"
    }

    async fn handle_commit_tx_hash(
        &self,
        commit_tx_hash: B256,
        transfer_root_id: B256,
    ) -> HandlerResult {
        let receipt = receipt(&self.l2, commit_tx_hash).await?;
        let message = l2_to_l1_tx(&receipt).ok_or_else(|| {
            BonderError::NotFound(format!("L2ToL1Tx in commit {commit_tx_hash}"))
        })?;

        let (status, send_count) = self.status(message.position).await?;
        if let Some(result) = gate(status, commit_tx_hash) {
            return result;
        }

        info!(
            chain_id = self.l2.chain_id(),
            transfer_root_id = %transfer_root_id,
            position = %message.position,
            "Executing outbox message"
        );
        let tx_hash = self.execute(message, send_count).await?;
        Ok(Outcome::Sent { tx_hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_count_from_mix_hash() {
        let mut raw = [0u8; 32];
        raw[..8].copy_from_slice(&1234u64.to_be_bytes());
        raw[8..16].copy_from_slice(&u64::MAX.to_be_bytes());
        assert_eq!(send_count_from_mix_hash(B256::from(raw)), 1234);
        assert_eq!(send_count_from_mix_hash(B256::ZERO), 0);
    }
}
