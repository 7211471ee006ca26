//! Polygon PoS exits through the FxPortal root tunnel
//!
//! Checkpoint inclusion and the exit payload come from the proof generator
//! HTTP API; the payload is then submitted to the root tunnel on L1.

use alloy::primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{gate, receipt, MessageStatus, RelayStrategy};
use crate::chain::evm::send_tx;
use crate::chain::{BridgeReader, EventSource, EvmChainClient};
use crate::contracts::relay::{FxChildTunnel, FxRootTunnel};
use crate::contracts::L2Bridge;
use crate::error::{BonderError, ChainError, HandlerResult, Outcome};

/// `MessageSent(bytes)` emitted by the child tunnel
pub const MESSAGE_SENT_EVENT_SIG: &str =
    "0x8c5261668696ce22758910d05bab8f186d6eb247ceac2af2e82c7dc17669b036";

const PROOF_API_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct BlockIncludedResponse {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExitPayloadResponse {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    message: Option<String>,
    result: Option<Bytes>,
}

pub struct PosRelay {
    l1: Arc<EvmChainClient>,
    l2: Arc<EvmChainClient>,
    proof_api_url: String,
    http: reqwest::Client,
}

impl PosRelay {
    pub fn new(l1: Arc<EvmChainClient>, l2: Arc<EvmChainClient>, proof_api_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(PROOF_API_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            l1,
            l2,
            proof_api_url: proof_api_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, ChainError> {
        let url = format!("{}/{}", self.proof_api_url, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ChainError::Transient(format!("proof api {url}: {e}")))?;
        response
            .json::<T>()
            .await
            .map_err(|e| ChainError::Other(format!("proof api {url}: {e}")))
    }

    async fn is_checkpointed(&self, l2_block: u64) -> Result<bool, ChainError> {
        let body: BlockIncludedResponse = self.get(&format!("block-included/{l2_block}")).await?;
        if body.error {
            debug!(
                l2_block,
                message = body.message.as_deref().unwrap_or_default(),
                "Block not checkpointed yet"
            );
        }
        Ok(!body.error)
    }

    async fn exit_payload(&self, commit_tx_hash: B256) -> Result<Bytes, ChainError> {
        let body: ExitPayloadResponse = self
            .get(&format!(
                "exit-payload/{commit_tx_hash}?eventSignature={MESSAGE_SENT_EVENT_SIG}"
            ))
            .await?;
        match body.result {
            Some(payload) if !body.error => Ok(payload),
            _ => Err(ChainError::NotFound(format!(
                "exit payload for {commit_tx_hash}: {}",
                body.message.unwrap_or_default()
            ))),
        }
    }

    /// Root tunnel paired with the L2 bridge's child tunnel
    async fn root_tunnel(&self) -> Result<Address, ChainError> {
        let (provider, bridge) = (self.l2.provider(), self.l2.bridge_address());
        let child = self
            .l2
            .view("messengerProxy", move || async move {
                Ok(L2Bridge::new(bridge, provider).messengerProxy().call().await?._0)
            })
            .await?;
        self.l2
            .view("fxRootTunnel", move || async move {
                Ok(FxChildTunnel::new(child, provider).fxRootTunnel().call().await?._0)
            })
            .await
    }

    async fn receive_message(&self, root_tunnel: Address, payload: Bytes) -> Result<B256, ChainError> {
        let wallet = self.l1.wallet_provider()?;
        let tunnel = FxRootTunnel::new(root_tunnel, &wallet);
        let tx_hash = send_tx!(self.l1, tunnel.receiveMessage(payload), "receiveMessage");
        Ok(tx_hash)
    }
}

fn is_already_processed(err: &alloy::contract::Error) -> bool {
    err.to_string().contains("EXIT_ALREADY_PROCESSED")
}

#[async_trait]
impl RelayStrategy for PosRelay {
    fn name(&self) -> &'static str {
        "polygon_pos"
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

        let status = if self.is_checkpointed(l2_block).await? {
            MessageStatus::Relayable
        } else {
            MessageStatus::InFlight
        };
        if let Some(result) = gate(status, commit_tx_hash) {
            return result;
        }

        let payload = self.exit_payload(commit_tx_hash).await?;
        let root_tunnel = self.root_tunnel().await?;

        let simulated = FxRootTunnel::new(root_tunnel, self.l1.provider())
            .receiveMessage(payload.clone())
            .from(self.l1.bonder_address())
            .call()
            .await;
        if let Err(e) = simulated {
            if is_already_processed(&e) {
                return gate(MessageStatus::Relayed, commit_tx_hash)
                    .unwrap_or(Ok(Outcome::AlreadyHandled));
            }
            return Err(ChainError::from_rpc(e).into());
        }

        info!(
            chain_id = self.l2.chain_id(),
            transfer_root_id = %transfer_root_id,
            root_tunnel = %root_tunnel,
            "Submitting PoS exit"
        );
        let tx_hash = self.receive_message(root_tunnel, payload).await?;
        Ok(Outcome::Sent { tx_hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_included_response() {
        let pending: BlockIncludedResponse =
            serde_json::from_str(r#"{"error":true,"message":"No block found"}"#).unwrap();
        assert!(pending.error);

        let included: BlockIncludedResponse = serde_json::from_str(
            r#"{"headerBlockNumber":"0x1","blockNumber":"5","message":"success"}"#,
        )
        .unwrap();
        assert!(!included.error);
    }

    #[test]
    fn test_exit_payload_response() {
        let body: ExitPayloadResponse =
            serde_json::from_str(r#"{"message":"Payload generation success","result":"0xf9"}"#)
                .unwrap();
        assert_eq!(body.result.unwrap().to_vec(), vec![0xf9u8]);
    }
}
