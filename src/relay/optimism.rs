//! OP stack withdrawals through the OptimismPortal (Optimism, Base)
//!
//! A commit emits `MessagePassed` on L2. Once an L2 output covering the
//! commit block is proposed, the withdrawal is proven on L1; after the
//! finalization period it is finalized, which delivers the root.

use alloy::eips::BlockId;
use alloy::primitives::{address, Address, B256, U256};
use alloy::providers::Provider;
use alloy::rpc::types::{BlockNumberOrTag, BlockTransactionsKind, TransactionReceipt};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::{gate, receipt, MessageStatus, RelayStrategy};
use crate::chain::evm::send_tx;
use crate::chain::{EventSource, EvmChainClient};
use crate::contracts::relay::{
    L2OutputOracle, L2ToL1MessagePasser, OptimismPortal, OutputRootProof, WithdrawalTransaction,
};
use crate::error::{BonderError, ChainError, HandlerResult, Outcome};
use crate::hash::keccak256;
use crate::retry::with_retry;

/// Predeploy that records L2→L1 withdrawals
pub const MESSAGE_PASSER: Address = address!("4200000000000000000000000000000000000016");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Prove,
    Finalize,
}

pub struct OptimismRelay {
    l1: Arc<EvmChainClient>,
    l2: Arc<EvmChainClient>,
    portal: Address,
    oracle: Address,
}

impl OptimismRelay {
    pub fn new(
        l1: Arc<EvmChainClient>,
        l2: Arc<EvmChainClient>,
        portal: Address,
        oracle: Address,
    ) -> Self {
        Self {
            l1,
            l2,
            portal,
            oracle,
        }
    }

    async fn status(
        &self,
        withdrawal_hash: B256,
        l2_block: u64,
    ) -> Result<(MessageStatus, Step), ChainError> {
        let (provider, portal, oracle) = (self.l1.provider(), self.portal, self.oracle);

        let finalized = self
            .l1
            .view("finalizedWithdrawals", move || async move {
                Ok(OptimismPortal::new(portal, provider)
                    .finalizedWithdrawals(withdrawal_hash)
                    .call()
                    .await?
                    ._0)
            })
            .await?;
        if finalized {
            return Ok((MessageStatus::Relayed, Step::Finalize));
        }

        let proven_at = self
            .l1
            .view("provenWithdrawals", move || async move {
                Ok(OptimismPortal::new(portal, provider)
                    .provenWithdrawals(withdrawal_hash)
                    .call()
                    .await?
                    .timestamp)
            })
            .await?;

        if proven_at == 0 {
            let latest = self
                .l1
                .view("latestBlockNumber", move || async move {
                    Ok(L2OutputOracle::new(oracle, provider)
                        .latestBlockNumber()
                        .call()
                        .await?
                        ._0)
                })
                .await?;
            let status = if latest < U256::from(l2_block) {
                MessageStatus::InFlight
            } else {
                MessageStatus::Relayable
            };
            return Ok((status, Step::Prove));
        }

        let period = self
            .l1
            .view("FINALIZATION_PERIOD_SECONDS", move || async move {
                Ok(L2OutputOracle::new(oracle, provider)
                    .FINALIZATION_PERIOD_SECONDS()
                    .call()
                    .await?
                    ._0)
            })
            .await?;
        let now = Utc::now().timestamp().max(0) as u64;
        let ready_at = (proven_at as u64).saturating_add(period.saturating_to::<u64>());
        let status = if ready_at < now {
            MessageStatus::Relayable
        } else {
            MessageStatus::InFlight
        };
        Ok((status, Step::Finalize))
    }

    async fn prove(
        &self,
        withdrawal: WithdrawalTransaction,
        withdrawal_hash: B256,
        l2_block: u64,
    ) -> Result<B256, ChainError> {
        let (provider, oracle) = (self.l1.provider(), self.oracle);

        let output_index = self
            .l1
            .view("getL2OutputIndexAfter", move || async move {
                Ok(L2OutputOracle::new(oracle, provider)
                    .getL2OutputIndexAfter(U256::from(l2_block))
                    .call()
                    .await?
                    ._0)
            })
            .await?;
        let output = self
            .l1
            .view("getL2Output", move || async move {
                Ok(L2OutputOracle::new(oracle, provider)
                    .getL2Output(output_index)
                    .call()
                    .await?
                    ._0)
            })
            .await?;
        let output_block = output.l2BlockNumber as u64;

        let l2_provider = self.l2.provider();
        let block = with_retry(self.l2.retry_config(), "eth_getBlockByNumber", move || async move {
            l2_provider
                .get_block_by_number(
                    BlockNumberOrTag::Number(output_block),
                    BlockTransactionsKind::Hashes,
                )
                .await
                .map_err(ChainError::from_rpc)
        })
        .await?
        .ok_or_else(|| ChainError::NotFound(format!("l2 block {output_block}")))?;

        let slot = withdrawal_storage_slot(withdrawal_hash);
        let proof = with_retry(self.l2.retry_config(), "eth_getProof", move || async move {
            l2_provider
                .get_proof(MESSAGE_PASSER, vec![slot])
                .block_id(BlockId::number(output_block))
                .await
                .map_err(ChainError::from_rpc)
        })
        .await?;

        let output_root_proof = OutputRootProof {
            version: B256::ZERO,
            stateRoot: block.header.state_root,
            messagePasserStorageRoot: proof.storage_hash,
            latestBlockhash: block.header.hash,
        };
        let withdrawal_proof = proof
            .storage_proof
            .into_iter()
            .next()
            .map(|p| p.proof)
            .unwrap_or_default();

        let wallet = self.l1.wallet_provider()?;
        let portal = OptimismPortal::new(self.portal, &wallet);
        let tx_hash = send_tx!(
            self.l1,
            portal.proveWithdrawalTransaction(
                withdrawal,
                output_index,
                output_root_proof,
                withdrawal_proof
            ),
            "proveWithdrawalTransaction"
        );
        Ok(tx_hash)
    }

    async fn finalize(&self, withdrawal: WithdrawalTransaction) -> Result<B256, ChainError> {
        let wallet = self.l1.wallet_provider()?;
        let portal = OptimismPortal::new(self.portal, &wallet);
        let tx_hash = send_tx!(
            self.l1,
            portal.finalizeWithdrawalTransaction(withdrawal),
            "finalizeWithdrawalTransaction"
        );
        Ok(tx_hash)
    }
}

/// `keccak256(abi.encode(withdrawalHash, uint256(0)))`, the `sentMessages` slot
pub fn withdrawal_storage_slot(withdrawal_hash: B256) -> B256 {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(withdrawal_hash.as_slice());
    B256::from(keccak256(&preimage))
}

fn message_passed(receipt: &TransactionReceipt) -> Option<(WithdrawalTransaction, B256)> {
    receipt.inner.logs().iter().find_map(|log| {
        if log.inner.address != MESSAGE_PASSER {
            return None;
        }
        let e = log
            .log_decode::<L2ToL1MessagePasser::MessagePassed>()
            .ok()?
            .inner
            .data;
        Some((
            WithdrawalTransaction {
                nonce: e.nonce,
                sender: e.sender,
                target: e.target,
                value: e.value,
                gasLimit: e.gasLimit,
                data: e.data,
            },
            e.withdrawalHash,
        ))
    })
}

#[async_trait]
impl RelayStrategy for OptimismRelay {
    fn name(&self) -> &'static str {
        "optimism_portal"
    }

    async fn handle_commit_tx_hash(
        &self,
        commit_tx_hash: B256,
        transfer_root_id: B256,
    ) -> HandlerResult {
        let receipt = receipt(&self.l2, commit_tx_hash).await?;
        let l2_block = receipt
            .block_number
            .ok_or_else(|| BonderError::NotFound(format!("block of commit {commit_tx_hash}")))?;
        let (withdrawal, withdrawal_hash) = message_passed(&receipt).ok_or_else(|| {
            BonderError::NotFound(format!("MessagePassed in commit {commit_tx_hash}"))
        })?;

        let (status, step) = self.status(withdrawal_hash, l2_block).await?;
        if let Some(result) = gate(status, commit_tx_hash) {
            return result;
        }

        info!(
            chain_id = self.l2.chain_id(),
            transfer_root_id = %transfer_root_id,
            withdrawal_hash = %withdrawal_hash,
            step = ?step,
            "Relaying OP stack withdrawal"
        );
        let tx_hash = match step {
            Step::Prove => self.prove(withdrawal, withdrawal_hash, l2_block).await?,
            Step::Finalize => self.finalize(withdrawal).await?,
        };
        Ok(Outcome::Sent { tx_hash })
    }
}
