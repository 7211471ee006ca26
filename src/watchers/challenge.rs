//! Challenges root bonds that no source chain ever committed, and resolves
//! challenges once their resolution period is over

use alloy::primitives::{B256, U256};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{challenge_resolution_period, report, Watcher};
use crate::chain::{BridgeEvent, EventKind};
use crate::db::{TransferRoot, TransferRootUpdate};
use crate::error::{BonderError, ChainError, HandlerResult, Outcome};
use crate::hash::transfer_root_id;
use crate::state::{AppState, ChainContext};

/// A `TransfersCommitted` event matching a bonded root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundCommit {
    pub source_chain_id: u64,
    pub destination_chain_id: u64,
    pub commit_tx_hash: B256,
    pub block_number: u64,
    pub committed_at: u64,
}

pub struct ChallengeWatcher {
    state: AppState,
    chain: Arc<ChainContext>,
}

impl ChallengeWatcher {
    pub fn new(state: AppState, chain: Arc<ChainContext>) -> Self {
        Self { state, chain }
    }

    async fn update(&self, id: B256, update: TransferRootUpdate) -> Result<(), BonderError> {
        self.state.store.update_transfer_root(id, update).await?;
        Ok(())
    }

    async fn set_sent_at(&self, id: B256, sent: bool) -> Result<(), BonderError> {
        self.update(
            id,
            TransferRootUpdate {
                sent_challenge_tx_at: Some(sent.then(Utc::now)),
                ..Default::default()
            },
        )
        .await
    }

    /// Scan recent commits on every L2 for `root_hash` with `total`
    pub async fn find_commit(
        &self,
        root_hash: B256,
        total: U256,
    ) -> Result<Option<FoundCommit>, BonderError> {
        let lookback = self.state.timing.challenge_lookback_blocks;
        for chain in self.state.chains.iter().filter(|c| !c.is_l1()) {
            let head = chain.client.head_block().await?;
            let floor = head.saturating_sub(lookback).max(chain.start_block);
            let batch = chain.batch_blocks.max(1);
            if floor > head {
                continue;
            }

            let mut to = head;
            loop {
                let from = to.saturating_sub(batch - 1).max(floor);
                let events = chain
                    .client
                    .fetch_events(EventKind::TransfersCommitted, from, to)
                    .await?;
                for event in events {
                    if let BridgeEvent::TransfersCommitted {
                        meta,
                        destination_chain_id,
                        root_hash: hash,
                        total_amount,
                        root_committed_at,
                    } = event
                    {
                        if hash == root_hash && total_amount == total {
                            return Ok(Some(FoundCommit {
                                source_chain_id: chain.chain_id,
                                destination_chain_id,
                                commit_tx_hash: meta.tx_hash,
                                block_number: meta.block_number,
                                committed_at: root_committed_at,
                            }));
                        }
                    }
                }
                if from <= floor {
                    break;
                }
                to = from - 1;
            }
        }
        Ok(None)
    }

    pub async fn handle_challengeable(&self, root: &TransferRoot) -> HandlerResult {
        let (Some(root_hash), Some(amount)) = (root.transfer_root_hash, root.bond_total_amount)
        else {
            return Err(BonderError::NotFound(format!(
                "bond fields of root {}",
                root.transfer_root_id
            )));
        };
        let id = transfer_root_id(root_hash, amount);
        let client = &self.chain.client;

        if let Some(destination) = root.destination_chain_id {
            let confirmed_at = client.transfer_root_committed_at(destination, id).await?;
            if confirmed_at > 0 {
                self.update(
                    id,
                    TransferRootUpdate {
                        committed: Some(true),
                        confirmed: Some(true),
                        confirmed_at: Some(confirmed_at),
                        ..Default::default()
                    },
                )
                .await?;
                return Ok(Outcome::AlreadyHandled);
            }
        }

        let bond = client.transfer_bond(id).await?;
        if bond.challenge_start_time > 0 {
            self.update(
                id,
                TransferRootUpdate {
                    challenged: Some(true),
                    challenge_started_at: Some(bond.challenge_start_time),
                    ..Default::default()
                },
            )
            .await?;
            return Ok(Outcome::AlreadyHandled);
        }

        if let Some(commit) = self.find_commit(root_hash, amount).await? {
            debug!(transfer_root_id = %id, source = commit.source_chain_id, "Bonded root was committed");
            self.update(
                id,
                TransferRootUpdate {
                    transfer_root_hash: Some(root_hash),
                    total_amount: Some(amount),
                    source_chain_id: Some(commit.source_chain_id),
                    destination_chain_id: Some(commit.destination_chain_id),
                    committed: Some(true),
                    committed_at: Some(commit.committed_at),
                    commit_tx_hash: Some(commit.commit_tx_hash),
                    commit_tx_block_number: Some(commit.block_number),
                    ..Default::default()
                },
            )
            .await?;
            return Ok(Outcome::AlreadyHandled);
        }

        let destination = root
            .destination_chain_id
            .ok_or_else(|| BonderError::NotFound(format!("destination of bonded root {id}")))?;

        warn!(
            transfer_root_id = %id,
            root_hash = %root_hash,
            amount = %amount,
            "No commit found for bonded root"
        );
        if self.state.is_dry() {
            return Ok(Outcome::DryRun);
        }

        let stake = client.challenge_amount_for_transfer_amount(amount).await?;
        self.set_sent_at(id, true).await?;
        let tx_hash = match client
            .challenge_transfer_bond(root_hash, amount, destination, stake)
            .await
        {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                if matches!(e, ChainError::Reverted { .. } | ChainError::NonceTooLow(_)) {
                    self.set_sent_at(id, false).await?;
                }
                return Err(e.into());
            }
        };

        self.state
            .notifier
            .warn(&format!(
                "challenged bond of root {} (hash {}, amount {}) tx {}",
                id, root_hash, amount, tx_hash
            ))
            .await;
        Ok(Outcome::Sent { tx_hash })
    }

    pub async fn handle_resolvable(
        &self,
        root: &TransferRoot,
        resolution_period: u64,
    ) -> HandlerResult {
        let id = root.transfer_root_id;
        let (Some(root_hash), Some(amount), Some(destination)) = (
            root.transfer_root_hash,
            root.bond_total_amount.or(root.total_amount),
            root.destination_chain_id,
        ) else {
            return Err(BonderError::NotFound(format!("challenge fields of root {id}")));
        };

        let bond = self.chain.client.transfer_bond(id).await?;
        if bond.challenge_resolved {
            self.update(
                id,
                TransferRootUpdate {
                    challenge_expired: Some(true),
                    ..Default::default()
                },
            )
            .await?;
            return Ok(Outcome::AlreadyHandled);
        }
        if bond.challenge_start_time == 0 {
            warn!(transfer_root_id = %id, "Challenged root has no challenge on chain");
            return Ok(Outcome::Skipped);
        }
        if root.challenge_started_at != Some(bond.challenge_start_time) {
            self.update(
                id,
                TransferRootUpdate {
                    challenge_started_at: Some(bond.challenge_start_time),
                    ..Default::default()
                },
            )
            .await?;
        }
        if bond.challenge_start_time + resolution_period >= self.state.clock().unix() {
            debug!(
                transfer_root_id = %id,
                challenge_start_time = bond.challenge_start_time,
                "Challenge resolution period not over"
            );
            return Ok(Outcome::Skipped);
        }

        if self.state.is_dry() {
            info!(transfer_root_id = %id, "Would resolve challenge");
            return Ok(Outcome::DryRun);
        }

        self.set_sent_at(id, true).await?;
        let sent = self
            .chain
            .client
            .resolve_challenge(root_hash, amount, destination)
            .await;
        let tx_hash = match sent {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                if matches!(e, ChainError::Reverted { .. } | ChainError::NonceTooLow(_)) {
                    self.set_sent_at(id, false).await?;
                }
                return Err(e.into());
            }
        };

        self.update(
            id,
            TransferRootUpdate {
                challenge_expired: Some(true),
                ..Default::default()
            },
        )
        .await?;
        Ok(Outcome::Sent { tx_hash })
    }
}

#[async_trait]
impl Watcher for ChallengeWatcher {
    fn name(&self) -> &'static str {
        "challenge"
    }

    fn chain(&self) -> &ChainContext {
        &self.chain
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.state.timing.challenge_poll_interval_ms)
    }

    async fn poll(&self) -> Result<(), BonderError> {
        let clock = self.state.clock();
        let challengeable = self.state.store.get_challengeable_transfer_roots(&clock).await?;
        for root in &challengeable {
            let item = format!("transfer root {}", root.transfer_root_id);
            let result = self.handle_challengeable(root).await;
            report(&self.state, &self.chain, "challenge_transfer_bond", &item, result).await?;
        }

        let period = challenge_resolution_period(&self.state).await;
        let resolvable = self
            .state
            .store
            .get_resolvable_transfer_roots(period, &clock)
            .await?;
        for root in &resolvable {
            let item = format!("transfer root {}", root.transfer_root_id);
            let result = self.handle_resolvable(root, period).await;
            report(&self.state, &self.chain, "resolve_challenge", &item, result).await?;
        }
        Ok(())
    }
}
