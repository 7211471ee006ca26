//! Arbitrary Message Bridge relay (Gnosis)
//!
//! Validators sign each outgoing message on the home chain. Once the
//! required number of signatures is collected, anyone may submit them to
//! the foreign AMB on L1.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::rpc::types::TransactionReceipt;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::{gate, receipt, MessageStatus, RelayStrategy};
use crate::chain::evm::send_tx;
use crate::chain::{EventSource, EvmChainClient};
use crate::contracts::relay::{ForeignAmb, HomeAmb};
use crate::error::{BonderError, ChainError, HandlerResult, Outcome};
use crate::hash::keccak256;

const SIGNATURE_LEN: usize = 65;

pub struct AmbRelay {
    l1: Arc<EvmChainClient>,
    l2: Arc<EvmChainClient>,
    foreign_amb: Address,
    home_amb: Address,
}

impl AmbRelay {
    pub fn new(
        l1: Arc<EvmChainClient>,
        l2: Arc<EvmChainClient>,
        foreign_amb: Address,
        home_amb: Address,
    ) -> Self {
        Self {
            l1,
            l2,
            foreign_amb,
            home_amb,
        }
    }

    async fn status(&self, message_id: B256, message_hash: B256) -> Result<MessageStatus, ChainError> {
        let (l1_provider, foreign) = (self.l1.provider(), self.foreign_amb);
        let relayed = self
            .l1
            .view("relayedMessages", move || async move {
                Ok(ForeignAmb::new(foreign, l1_provider)
                    .relayedMessages(message_id)
                    .call()
                    .await?
                    ._0)
            })
            .await?;
        if relayed {
            return Ok(MessageStatus::Relayed);
        }

        let (l2_provider, home) = (self.l2.provider(), self.home_amb);
        let signed = self
            .l2
            .view("numMessagesSigned", move || async move {
                Ok(HomeAmb::new(home, l2_provider)
                    .numMessagesSigned(message_hash)
                    .call()
                    .await?
                    ._0)
            })
            .await?;
        let processed = self
            .l2
            .view("isAlreadyProcessed", move || async move {
                Ok(HomeAmb::new(home, l2_provider)
                    .isAlreadyProcessed(signed)
                    .call()
                    .await?
                    ._0)
            })
            .await?;
        Ok(if processed {
            MessageStatus::Relayable
        } else {
            MessageStatus::InFlight
        })
    }

    async fn signatures(&self, message_hash: B256) -> Result<Vec<Bytes>, ChainError> {
        let (provider, home) = (self.l2.provider(), self.home_amb);
        let required = self
            .l2
            .view("requiredSignatures", move || async move {
                Ok(HomeAmb::new(home, provider).requiredSignatures().call().await?._0)
            })
            .await?;

        let mut signatures = Vec::new();
        for index in 0..required.saturating_to::<u64>() {
            let index = U256::from(index);
            let sig = self
                .l2
                .view("signature", move || async move {
                    Ok(HomeAmb::new(home, provider)
                        .signature(message_hash, index)
                        .call()
                        .await?
                        ._0)
                })
                .await?;
            signatures.push(sig);
        }
        Ok(signatures)
    }

    async fn execute(&self, data: Bytes, signatures: Bytes) -> Result<B256, ChainError> {
        let wallet = self.l1.wallet_provider()?;
        let foreign = ForeignAmb::new(self.foreign_amb, &wallet);
        let tx_hash = send_tx!(
            self.l1,
            foreign.executeSignatures(data, signatures),
            "executeSignatures"
        );
        Ok(tx_hash)
    }
}

/// Pack `r ‖ s ‖ v` signatures into the layout `executeSignatures` expects:
/// a count byte, then every `v`, then every `r`, then every `s`
pub fn pack_signatures(signatures: &[Bytes]) -> Result<Bytes, ChainError> {
    if signatures.len() > u8::MAX as usize {
        return Err(ChainError::Other(format!(
            "too many signatures: {}",
            signatures.len()
        )));
    }
    let mut v = Vec::with_capacity(signatures.len());
    let mut r = Vec::with_capacity(signatures.len() * 32);
    let mut s = Vec::with_capacity(signatures.len() * 32);
    for sig in signatures {
        if sig.len() != SIGNATURE_LEN {
            return Err(ChainError::Other(format!(
                "signature has {} bytes, expected {SIGNATURE_LEN}",
                sig.len()
            )));
        }
        r.extend_from_slice(&sig[..32]);
        s.extend_from_slice(&sig[32..64]);
        v.push(sig[64]);
    }

    let mut packed = Vec::with_capacity(1 + v.len() + r.len() + s.len());
    packed.push(signatures.len() as u8);
    packed.extend(v);
    packed.extend(r);
    packed.extend(s);
    Ok(packed.into())
}

fn user_request(receipt: &TransactionReceipt, home_amb: Address) -> Option<(B256, Bytes)> {
    receipt.inner.logs().iter().find_map(|log| {
        if log.inner.address != home_amb {
            return None;
        }
        let event = log
            .log_decode::<HomeAmb::UserRequestForSignature>()
            .ok()?
            .inner
            .data;
        Some((event.messageId, event.encodedData))
    })
}

#[async_trait]
impl RelayStrategy for AmbRelay {
    fn name(&self) -> &'static str {
        "amb"
    }

    async fn handle_commit_tx_hash(
        &self,
        commit_tx_hash: B256,
        transfer_root_id: B256,
    ) -> HandlerResult {
        let receipt = receipt(&self.l2, commit_tx_hash).await?;
        let (message_id, data) = user_request(&receipt, self.home_amb).ok_or_else(|| {
            BonderError::NotFound(format!("UserRequestForSignature in commit {commit_tx_hash}"))
        })?;
        let message_hash = B256::from(keccak256(&data));

        let status = self.status(message_id, message_hash).await?;
        if let Some(result) = gate(status, commit_tx_hash) {
            return result;
        }

        let signatures = pack_signatures(&self.signatures(message_hash).await?)?;
        info!(
            chain_id = self.l2.chain_id(),
            transfer_root_id = %transfer_root_id,
            message_id = %message_id,
            "Executing AMB signatures"
        );
        let tx_hash = self.execute(data, signatures).await?;
        Ok(Outcome::Sent { tx_hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(r: u8, s: u8, v: u8) -> Bytes {
        let mut raw = vec![r; 32];
        raw.extend(vec![s; 32]);
        raw.push(v);
        raw.into()
    }

    #[test]
    fn test_pack_signatures_groups_v_r_s() {
        let packed = pack_signatures(&[sig(0xa1, 0xb1, 27), sig(0xa2, 0xb2, 28)]).unwrap();
        assert_eq!(packed.len(), 1 + 2 + 64 + 64);
        assert_eq!(packed[0], 2);
        assert_eq!(&packed[1..3], &[27, 28]);
        assert!(packed[3..35].iter().all(|b| *b == 0xa1));
        assert!(packed[35..67].iter().all(|b| *b == 0xa2));
        assert!(packed[67..99].iter().all(|b| *b == 0xb1));
        assert!(packed[99..131].iter().all(|b| *b == 0xb2));
    }

    #[test]
    fn test_pack_signatures_rejects_bad_length() {
        let short: Bytes = vec![0u8; 64].into();
        assert!(pack_signatures(&[short]).is_err());
    }
}
