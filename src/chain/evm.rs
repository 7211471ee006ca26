//! Alloy-backed bridge client
//!
//! Reads go through a plain HTTP provider and are retried on transient RPC
//! errors. Writes build a signing provider per transaction with
//! `with_recommended_fillers()` (nonce, gas, fees), wait for the receipt and
//! report `status = 0` as [`ChainError::Reverted`]. Sends are serialized per
//! client so concurrent watchers on one chain never race for a nonce.

use alloy::consensus::Transaction as _;
use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{BlockNumberOrTag, BlockTransactionsKind, Filter, Log};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolEvent;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use eyre::{Result, WrapErr};
use std::future::Future;
use std::str::FromStr;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::{
    Bondable, BridgeEvent, BridgeReader, Committable, EventKind, EventMeta, EventSource,
    L1Actions, Settleable, TransferBond, TransferRootInfo, TxInfo, ValidatedConfirmBatch,
};
use crate::config::ChainConfig;
use crate::contracts::{Bridge, Erc4626Vault, L1Bridge, L2Bridge, MessengerWrapper};
use crate::error::ChainError;
use crate::retry::{with_retry, RetryConfig};
use crate::types::ChainSlug;

pub type HttpProvider = RootProvider<Http<Client>>;

/// Send a prepared contract call under the client's nonce lock and wait for
/// a successful receipt. Evaluates to the transaction hash.
macro_rules! send_tx {
    ($client:expr, $call:expr, $label:expr) => {{
        let _nonce_guard = $client.lock_sends().await;
        let pending = $call
            .send()
            .await
            .map_err($crate::error::ChainError::from_rpc)?;
        let tx_hash = *pending.tx_hash();
        tracing::info!(
            chain_id = $client.chain_id(),
            call = $label,
            tx_hash = %tx_hash,
            "Transaction sent"
        );
        let receipt = pending
            .get_receipt()
            .await
            .map_err($crate::error::ChainError::from_rpc)?;
        if !receipt.status() {
            return Err($crate::error::ChainError::Reverted { tx_hash });
        }
        tracing::info!(
            chain_id = $client.chain_id(),
            call = $label,
            tx_hash = %tx_hash,
            "Transaction confirmed"
        );
        tx_hash
    }};
}

pub(crate) use send_tx;

/// Bridge client for one EVM chain
pub struct EvmChainClient {
    chain_id: u64,
    slug: ChainSlug,
    rpc_url: String,
    provider: HttpProvider,
    bridge: Address,
    vault: Option<Address>,
    signer: PrivateKeySigner,
    retry: RetryConfig,
    send_lock: Mutex<()>,
}

impl EvmChainClient {
    pub fn new(chain: &ChainConfig, private_key: &str) -> Result<Self> {
        let bridge =
            Address::from_str(&chain.bridge_address).wrap_err("Invalid bridge address")?;
        let vault = chain
            .vault_address
            .as_deref()
            .map(Address::from_str)
            .transpose()
            .wrap_err("Invalid vault address")?;
        let signer: PrivateKeySigner = private_key.parse().wrap_err("Invalid private key")?;
        let provider = ProviderBuilder::new().on_http(chain.rpc_url.parse().wrap_err("Invalid RPC URL")?);

        info!(
            chain = %chain.slug,
            chain_id = chain.chain_id,
            bonder = %signer.address(),
            bridge = %bridge,
            "EVM client initialized"
        );

        Ok(Self {
            chain_id: chain.chain_id,
            slug: chain.slug,
            rpc_url: chain.rpc_url.clone(),
            provider,
            bridge,
            vault,
            signer,
            retry: RetryConfig::default(),
            send_lock: Mutex::new(()),
        })
    }

    pub fn slug(&self) -> ChainSlug {
        self.slug
    }

    /// Read-only provider, for relay strategies that inspect receipts and proofs
    pub fn provider(&self) -> &HttpProvider {
        &self.provider
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Provider that fills and signs transactions with the bonder key
    pub fn wallet_provider(&self) -> Result<impl Provider<Http<Client>> + Clone, ChainError> {
        let wallet = EthereumWallet::from(self.signer.clone());
        let url = self
            .rpc_url
            .parse()
            .map_err(|e| ChainError::Other(format!("Invalid RPC URL: {e}")))?;
        Ok(ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(url))
    }

    /// Held for the duration of one send-and-confirm
    pub async fn lock_sends(&self) -> MutexGuard<'_, ()> {
        self.send_lock.lock().await
    }

    /// Run a view call with retries
    pub async fn view<T, F, Fut>(&self, label: &'static str, call: F) -> Result<T, ChainError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, alloy::contract::Error>>,
    {
        with_retry(&self.retry, label, || {
            let fut = call();
            async move { fut.await.map_err(ChainError::from_rpc) }
        })
        .await
    }

    /// Decoded logs of `E` emitted by `address` in `[from_block, to_block]`
    pub async fn logs<E: SolEvent>(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<(EventMeta, E)>, ChainError> {
        let filter = Filter::new()
            .address(address)
            .event_signature(E::SIGNATURE_HASH)
            .from_block(from_block)
            .to_block(to_block);
        let provider = &self.provider;

        let logs = with_retry(&self.retry, E::SIGNATURE, move || {
            let filter = filter.clone();
            async move { provider.get_logs(&filter).await.map_err(ChainError::from_rpc) }
        })
        .await?;

        let mut decoded = Vec::with_capacity(logs.len());
        for log in &logs {
            let meta = event_meta(log)?;
            let event = log
                .log_decode::<E>()
                .map_err(|e| ChainError::Other(format!("Failed to decode {}: {e}", E::SIGNATURE)))?;
            decoded.push((meta, event.inner.data));
        }

        debug!(
            chain_id = self.chain_id,
            event = E::SIGNATURE,
            from_block,
            to_block,
            count = decoded.len(),
            "Fetched logs"
        );
        Ok(decoded)
    }
}

/// Log position; pending logs carry no position and are rejected
pub fn event_meta(log: &Log) -> Result<EventMeta, ChainError> {
    let missing = |field: &str| ChainError::Other(format!("Log missing {field}"));
    Ok(EventMeta {
        tx_hash: log.transaction_hash.ok_or_else(|| missing("transaction hash"))?,
        block_number: log.block_number.ok_or_else(|| missing("block number"))?,
        tx_index: log.transaction_index.ok_or_else(|| missing("transaction index"))?,
        log_index: log.log_index.ok_or_else(|| missing("log index"))?,
    })
}

fn to_u64(value: U256) -> u64 {
    value.saturating_to::<u64>()
}

#[async_trait]
impl EventSource for EvmChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn bridge_address(&self) -> Address {
        self.bridge
    }

    async fn head_block(&self) -> Result<u64, ChainError> {
        let provider = &self.provider;
        with_retry(&self.retry, "eth_blockNumber", move || async move {
            provider.get_block_number().await.map_err(ChainError::from_rpc)
        })
        .await
    }

    async fn fetch_events(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<BridgeEvent>, ChainError> {
        let (from, to, at) = (from_block, to_block, self.bridge);
        let events = match kind {
            EventKind::TransferSent => self
                .logs::<L2Bridge::TransferSent>(at, from, to)
                .await?
                .into_iter()
                .map(|(meta, e)| BridgeEvent::TransferSent {
                    meta,
                    transfer_id: e.transferId,
                    destination_chain_id: to_u64(e.chainId),
                    recipient: e.recipient,
                    amount: e.amount,
                    transfer_nonce: e.transferNonce,
                    bonder_fee: e.bonderFee,
                    index: e.index,
                    amount_out_min: e.amountOutMin,
                    deadline: e.deadline,
                })
                .collect(),
            EventKind::TransfersCommitted => self
                .logs::<L2Bridge::TransfersCommitted>(at, from, to)
                .await?
                .into_iter()
                .map(|(meta, e)| BridgeEvent::TransfersCommitted {
                    meta,
                    destination_chain_id: to_u64(e.destinationChainId),
                    root_hash: e.rootHash,
                    total_amount: e.totalAmount,
                    root_committed_at: to_u64(e.rootCommittedAt),
                })
                .collect(),
            EventKind::TransferRootBonded => self
                .logs::<L1Bridge::TransferRootBonded>(at, from, to)
                .await?
                .into_iter()
                .map(|(meta, e)| BridgeEvent::TransferRootBonded {
                    meta,
                    root_hash: e.root,
                    amount: e.amount,
                })
                .collect(),
            EventKind::TransferRootConfirmed => self
                .logs::<L1Bridge::TransferRootConfirmed>(at, from, to)
                .await?
                .into_iter()
                .map(|(meta, e)| BridgeEvent::TransferRootConfirmed {
                    meta,
                    origin_chain_id: to_u64(e.originChainId),
                    destination_chain_id: to_u64(e.destinationChainId),
                    root_hash: e.rootHash,
                    total_amount: e.totalAmount,
                })
                .collect(),
            EventKind::TransferRootSet => self
                .logs::<Bridge::TransferRootSet>(at, from, to)
                .await?
                .into_iter()
                .map(|(meta, e)| BridgeEvent::TransferRootSet {
                    meta,
                    root_hash: e.rootHash,
                    total_amount: e.totalAmount,
                })
                .collect(),
            EventKind::WithdrawalBonded => self
                .logs::<Bridge::WithdrawalBonded>(at, from, to)
                .await?
                .into_iter()
                .map(|(meta, e)| BridgeEvent::WithdrawalBonded {
                    meta,
                    transfer_id: e.transferId,
                    amount: e.amount,
                })
                .collect(),
            EventKind::Withdrew => self
                .logs::<Bridge::Withdrew>(at, from, to)
                .await?
                .into_iter()
                .map(|(meta, e)| BridgeEvent::Withdrew {
                    meta,
                    transfer_id: e.transferId,
                    recipient: e.recipient,
                    amount: e.amount,
                    transfer_nonce: e.transferNonce,
                })
                .collect(),
            EventKind::WithdrawalBondSettled => self
                .logs::<Bridge::WithdrawalBondSettled>(at, from, to)
                .await?
                .into_iter()
                .map(|(meta, e)| BridgeEvent::WithdrawalBondSettled {
                    meta,
                    bonder: e.bonder,
                    transfer_id: e.transferId,
                    root_hash: e.rootHash,
                })
                .collect(),
            EventKind::MultipleWithdrawalsSettled => self
                .logs::<Bridge::MultipleWithdrawalsSettled>(at, from, to)
                .await?
                .into_iter()
                .map(|(meta, e)| BridgeEvent::MultipleWithdrawalsSettled {
                    meta,
                    bonder: e.bonder,
                    root_hash: e.rootHash,
                    total_bonds_settled: e.totalBondsSettled,
                })
                .collect(),
            EventKind::TransferBondChallenged => self
                .logs::<L1Bridge::TransferBondChallenged>(at, from, to)
                .await?
                .into_iter()
                .map(|(meta, e)| BridgeEvent::TransferBondChallenged {
                    meta,
                    transfer_root_id: e.transferRootId,
                    root_hash: e.rootHash,
                    original_amount: e.originalAmount,
                })
                .collect(),
            EventKind::ChallengeResolved => self
                .logs::<L1Bridge::ChallengeResolved>(at, from, to)
                .await?
                .into_iter()
                .map(|(meta, e)| BridgeEvent::ChallengeResolved {
                    meta,
                    transfer_root_id: e.transferRootId,
                    root_hash: e.rootHash,
                    original_amount: e.originalAmount,
                })
                .collect(),
        };
        Ok(events)
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, ChainError> {
        let provider = &self.provider;
        let block = with_retry(&self.retry, "eth_getBlockByNumber", move || async move {
            provider
                .get_block_by_number(
                    BlockNumberOrTag::Number(block_number),
                    BlockTransactionsKind::Hashes,
                )
                .await
                .map_err(ChainError::from_rpc)
        })
        .await?;

        block
            .map(|b| b.header.timestamp)
            .ok_or_else(|| ChainError::NotFound(format!("block {block_number}")))
    }

    async fn transaction(&self, tx_hash: B256) -> Result<Option<TxInfo>, ChainError> {
        let provider = &self.provider;
        let tx = with_retry(&self.retry, "eth_getTransactionByHash", move || async move {
            provider
                .get_transaction_by_hash(tx_hash)
                .await
                .map_err(ChainError::from_rpc)
        })
        .await?;

        Ok(tx.and_then(|tx| {
            Some(TxInfo {
                hash: tx_hash,
                from: tx.from,
                block_number: tx.block_number?,
                tx_index: tx.transaction_index?,
                input: tx.input().clone(),
            })
        }))
    }
}

#[async_trait]
impl BridgeReader for EvmChainClient {
    fn bonder_address(&self) -> Address {
        self.signer.address()
    }

    async fn credit(&self, bonder: Address) -> Result<U256, ChainError> {
        let (provider, bridge) = (&self.provider, self.bridge);
        self.view("getCredit", move || async move {
            Ok(Bridge::new(bridge, provider).getCredit(bonder).call().await?._0)
        })
        .await
    }

    async fn debit_and_additional_debit(&self, bonder: Address) -> Result<U256, ChainError> {
        let (provider, bridge) = (&self.provider, self.bridge);
        self.view("getDebitAndAdditionalDebit", move || async move {
            Ok(Bridge::new(bridge, provider)
                .getDebitAndAdditionalDebit(bonder)
                .call()
                .await?
                ._0)
        })
        .await
    }

    async fn vault_balance(&self, bonder: Address) -> Result<U256, ChainError> {
        let Some(vault) = self.vault else {
            return Ok(U256::ZERO);
        };
        let provider = &self.provider;
        self.view("vaultBalance", move || async move {
            let vault = Erc4626Vault::new(vault, provider);
            let shares = vault.balanceOf(bonder).call().await?._0;
            Ok(vault.convertToAssets(shares).call().await?._0)
        })
        .await
    }

    async fn is_bonder(&self, address: Address) -> Result<bool, ChainError> {
        let (provider, bridge) = (&self.provider, self.bridge);
        self.view("getIsBonder", move || async move {
            Ok(Bridge::new(bridge, provider).getIsBonder(address).call().await?._0)
        })
        .await
    }

    async fn is_transfer_id_spent(&self, transfer_id: B256) -> Result<bool, ChainError> {
        let (provider, bridge) = (&self.provider, self.bridge);
        self.view("isTransferIdSpent", move || async move {
            Ok(Bridge::new(bridge, provider)
                .isTransferIdSpent(transfer_id)
                .call()
                .await?
                ._0)
        })
        .await
    }

    async fn transfer_root(
        &self,
        root_hash: B256,
        total_amount: U256,
    ) -> Result<TransferRootInfo, ChainError> {
        let (provider, bridge) = (&self.provider, self.bridge);
        self.view("getTransferRoot", move || async move {
            let r = Bridge::new(bridge, provider)
                .getTransferRoot(root_hash, total_amount)
                .call()
                .await?;
            Ok(TransferRootInfo {
                total: r.total,
                amount_withdrawn: r.amountWithdrawn,
                created_at: to_u64(r.createdAt),
            })
        })
        .await
    }

    async fn bonded_withdrawal_amount(
        &self,
        bonder: Address,
        transfer_id: B256,
    ) -> Result<U256, ChainError> {
        let (provider, bridge) = (&self.provider, self.bridge);
        self.view("getBondedWithdrawalAmount", move || async move {
            Ok(Bridge::new(bridge, provider)
                .getBondedWithdrawalAmount(bonder, transfer_id)
                .call()
                .await?
                ._0)
        })
        .await
    }
}

#[async_trait]
impl Bondable for EvmChainClient {
    async fn bond_withdrawal(
        &self,
        params: &super::BondWithdrawalParams,
    ) -> Result<B256, ChainError> {
        let provider = self.wallet_provider()?;
        let bridge = Bridge::new(self.bridge, &provider);
        let tx_hash = send_tx!(
            self,
            bridge.bondWithdrawal(
                params.recipient,
                params.amount,
                params.transfer_nonce,
                params.bonder_fee
            ),
            "bondWithdrawal"
        );
        Ok(tx_hash)
    }

    async fn bond_withdrawal_and_attempt_swap(
        &self,
        params: &super::BondWithdrawalParams,
    ) -> Result<B256, ChainError> {
        let provider = self.wallet_provider()?;
        let bridge = L2Bridge::new(self.bridge, &provider);
        let tx_hash = send_tx!(
            self,
            bridge.bondWithdrawalAndDistribute(
                params.recipient,
                params.amount,
                params.transfer_nonce,
                params.bonder_fee,
                params.amount_out_min,
                params.deadline
            ),
            "bondWithdrawalAndDistribute"
        );
        Ok(tx_hash)
    }

    async fn withdraw_from_vault_and_stake(&self, amount: U256) -> Result<B256, ChainError> {
        let vault = self
            .vault
            .ok_or_else(|| ChainError::Other(format!("no vault configured on {}", self.slug)))?;
        let bonder = self.signer.address();
        let provider = self.wallet_provider()?;

        let vault = Erc4626Vault::new(vault, &provider);
        send_tx!(self, vault.withdraw(amount, bonder, bonder), "vaultWithdraw");

        // ERC-20 bridges pull the stake through the bonder's standing allowance
        let bridge = Bridge::new(self.bridge, &provider);
        let tx_hash = send_tx!(self, bridge.stake(bonder, amount), "stake");
        Ok(tx_hash)
    }
}

#[async_trait]
impl Settleable for EvmChainClient {
    async fn settle_bonded_withdrawals(
        &self,
        bonder: Address,
        transfer_ids: &[B256],
        total_amount: U256,
    ) -> Result<B256, ChainError> {
        let provider = self.wallet_provider()?;
        let bridge = Bridge::new(self.bridge, &provider);
        let tx_hash = send_tx!(
            self,
            bridge.settleBondedWithdrawals(bonder, transfer_ids.to_vec(), total_amount),
            "settleBondedWithdrawals"
        );
        Ok(tx_hash)
    }
}

#[async_trait]
impl Committable for EvmChainClient {
    async fn pending_amount_for_chain_id(&self, destination: u64) -> Result<U256, ChainError> {
        let (provider, bridge) = (&self.provider, self.bridge);
        self.view("pendingAmountForChainId", move || async move {
            Ok(L2Bridge::new(bridge, provider)
                .pendingAmountForChainId(U256::from(destination))
                .call()
                .await?
                ._0)
        })
        .await
    }

    async fn commit_transfers(&self, destination: u64) -> Result<B256, ChainError> {
        let provider = self.wallet_provider()?;
        let bridge = L2Bridge::new(self.bridge, &provider);
        let tx_hash = send_tx!(
            self,
            bridge.commitTransfers(U256::from(destination)),
            "commitTransfers"
        );
        Ok(tx_hash)
    }
}

#[async_trait]
impl L1Actions for EvmChainClient {
    async fn bond_transfer_root(
        &self,
        root_hash: B256,
        destination: u64,
        total_amount: U256,
    ) -> Result<B256, ChainError> {
        let provider = self.wallet_provider()?;
        let bridge = L1Bridge::new(self.bridge, &provider);
        let tx_hash = send_tx!(
            self,
            bridge.bondTransferRoot(root_hash, U256::from(destination), total_amount),
            "bondTransferRoot"
        );
        Ok(tx_hash)
    }

    async fn transfer_bond(&self, transfer_root_id: B256) -> Result<TransferBond, ChainError> {
        let (provider, bridge) = (&self.provider, self.bridge);
        self.view("transferBonds", move || async move {
            let b = L1Bridge::new(bridge, provider)
                .transferBonds(transfer_root_id)
                .call()
                .await?;
            Ok(TransferBond {
                bonder: b.bonder,
                created_at: to_u64(b.createdAt),
                total_amount: b.totalAmount,
                challenge_start_time: to_u64(b.challengeStartTime),
                challenger: b.challenger,
                challenge_resolved: b.challengeResolved,
            })
        })
        .await
    }

    async fn transfer_root_committed_at(
        &self,
        destination: u64,
        transfer_root_id: B256,
    ) -> Result<u64, ChainError> {
        let (provider, bridge) = (&self.provider, self.bridge);
        self.view("transferRootCommittedAt", move || async move {
            let at = L1Bridge::new(bridge, provider)
                .transferRootCommittedAt(U256::from(destination), transfer_root_id)
                .call()
                .await?
                ._0;
            Ok(to_u64(at))
        })
        .await
    }

    async fn bond_for_transfer_amount(&self, amount: U256) -> Result<U256, ChainError> {
        let (provider, bridge) = (&self.provider, self.bridge);
        self.view("getBondForTransferAmount", move || async move {
            Ok(L1Bridge::new(bridge, provider)
                .getBondForTransferAmount(amount)
                .call()
                .await?
                ._0)
        })
        .await
    }

    async fn challenge_amount_for_transfer_amount(
        &self,
        amount: U256,
    ) -> Result<U256, ChainError> {
        let (provider, bridge) = (&self.provider, self.bridge);
        self.view("getChallengeAmountForTransferAmount", move || async move {
            Ok(L1Bridge::new(bridge, provider)
                .getChallengeAmountForTransferAmount(amount)
                .call()
                .await?
                ._0)
        })
        .await
    }

    async fn min_transfer_root_bond_delay(&self) -> Result<u64, ChainError> {
        let (provider, bridge) = (&self.provider, self.bridge);
        self.view("MIN_TRANSFER_ROOT_BOND_DELAY", move || async move {
            let delay = L1Bridge::new(bridge, provider)
                .MIN_TRANSFER_ROOT_BOND_DELAY()
                .call()
                .await?
                ._0;
            Ok(to_u64(delay))
        })
        .await
    }

    async fn challenge_period(&self) -> Result<u64, ChainError> {
        let (provider, bridge) = (&self.provider, self.bridge);
        self.view("challengePeriod", move || async move {
            let period = L1Bridge::new(bridge, provider)
                .challengePeriod()
                .call()
                .await?
                ._0;
            Ok(to_u64(period))
        })
        .await
    }

    async fn challenge_resolution_period(&self) -> Result<u64, ChainError> {
        let (provider, bridge) = (&self.provider, self.bridge);
        self.view("challengeResolutionPeriod", move || async move {
            let period = L1Bridge::new(bridge, provider)
                .challengeResolutionPeriod()
                .call()
                .await?
                ._0;
            Ok(to_u64(period))
        })
        .await
    }

    async fn challenge_transfer_bond(
        &self,
        root_hash: B256,
        original_amount: U256,
        destination: u64,
        stake: U256,
    ) -> Result<B256, ChainError> {
        let provider = self.wallet_provider()?;
        let bridge = L1Bridge::new(self.bridge, &provider);
        let tx_hash = send_tx!(
            self,
            bridge
                .challengeTransferBond(root_hash, original_amount, U256::from(destination))
                .value(stake),
            "challengeTransferBond"
        );
        Ok(tx_hash)
    }

    async fn resolve_challenge(
        &self,
        root_hash: B256,
        original_amount: U256,
        destination: u64,
    ) -> Result<B256, ChainError> {
        let provider = self.wallet_provider()?;
        let bridge = L1Bridge::new(self.bridge, &provider);
        let tx_hash = send_tx!(
            self,
            bridge.resolveChallenge(root_hash, original_amount, U256::from(destination)),
            "resolveChallenge"
        );
        Ok(tx_hash)
    }

    async fn confirm_roots(
        &self,
        wrapper: Address,
        batch: &ValidatedConfirmBatch,
    ) -> Result<B256, ChainError> {
        let batch = batch.batch();
        let provider = self.wallet_provider()?;
        let messenger = MessengerWrapper::new(wrapper, &provider);
        let to_words = |values: &[u64]| values.iter().map(|v| U256::from(*v)).collect::<Vec<_>>();
        let tx_hash = send_tx!(
            self,
            messenger.confirmRoots(
                batch.root_hashes.clone(),
                to_words(&batch.destination_chain_ids),
                batch.total_amounts.clone(),
                to_words(&batch.root_committed_ats)
            ),
            "confirmRoots"
        );
        Ok(tx_hash)
    }

    async fn wrapper_l2_chain_id(&self, wrapper: Address) -> Result<u64, ChainError> {
        let provider = &self.provider;
        self.view("l2ChainId", move || async move {
            let id = MessengerWrapper::new(wrapper, provider)
                .l2ChainId()
                .call()
                .await?
                ._0;
            Ok(to_u64(id))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_config() -> ChainConfig {
        ChainConfig {
            slug: ChainSlug::Optimism,
            chain_id: 10,
            rpc_url: "http://localhost:8545".to_string(),
            bridge_address: "0x1111111111111111111111111111111111111111".to_string(),
            start_block: 0,
            batch_blocks: 2000,
            wrapper_address: None,
            vault_address: None,
            vault_auto_withdraw: false,
            commit_thresholds: Default::default(),
            default_commit_threshold: "0".to_string(),
            relay: Default::default(),
        }
    }

    const TEST_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    #[test]
    fn test_new_parses_addresses() {
        let client = EvmChainClient::new(&chain_config(), TEST_KEY).unwrap();
        assert_eq!(client.chain_id(), 10);
        assert_eq!(
            client.bridge_address(),
            Address::from_str("0x1111111111111111111111111111111111111111").unwrap()
        );
        assert_eq!(client.slug(), ChainSlug::Optimism);
    }

    #[test]
    fn test_new_rejects_bad_bridge() {
        let mut chain = chain_config();
        chain.bridge_address = "not-an-address".to_string();
        assert!(EvmChainClient::new(&chain, TEST_KEY).is_err());
    }

    #[tokio::test]
    async fn test_vault_balance_zero_without_vault() {
        let client = EvmChainClient::new(&chain_config(), TEST_KEY).unwrap();
        let balance = client.vault_balance(Address::ZERO).await.unwrap();
        assert_eq!(balance, U256::ZERO);
    }

    #[test]
    fn test_to_u64_saturates() {
        assert_eq!(to_u64(U256::from(42u64)), 42);
        assert_eq!(to_u64(U256::MAX), u64::MAX);
    }
}
