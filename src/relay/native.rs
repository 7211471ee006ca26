//! Chains whose messages are relayed by the chain operator itself
//!
//! Linea, zkSync and Scroll finalize L2→L1 messages through their own
//! postman or prover services. The bonder only waits for the root to appear
//! on L1, which the confirm watcher detects through `transferRootCommittedAt`.

use alloy::primitives::B256;
use async_trait::async_trait;
use tracing::debug;

use super::RelayStrategy;
use crate::error::{HandlerResult, Outcome};
use crate::types::ChainSlug;

pub struct NativeRelay {
    slug: ChainSlug,
}

impl NativeRelay {
    pub fn new(slug: ChainSlug) -> Self {
        Self { slug }
    }
}

#[async_trait]
impl RelayStrategy for NativeRelay {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn handle_commit_tx_hash(
        &self,
        commit_tx_hash: B256,
        transfer_root_id: B256,
    ) -> HandlerResult {
        debug!(
            chain = %self.slug,
            commit_tx_hash = %commit_tx_hash,
            transfer_root_id = %transfer_root_id,
            "Message relayed by chain operator, waiting"
        );
        Ok(Outcome::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_relay_waits() {
        let relay = NativeRelay::new(ChainSlug::Linea);
        let result = tokio_test::block_on(
            relay.handle_commit_tx_hash(B256::repeat_byte(1), B256::repeat_byte(2)),
        );
        assert_eq!(result.unwrap(), Outcome::Skipped);
    }
}
