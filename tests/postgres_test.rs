//! Ledger store tests against a live Postgres
//!
//! Run with: cargo test --test postgres_test -- --ignored
//!
//! Prerequisites:
//! - DATABASE_URL set to a scratch database (migrations are applied)

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy::primitives::{Address, B256, U256};
use bonder::db::{
    create_pool, run_migrations, LedgerStore, PgLedgerStore, QueryClock, SyncKey,
    TransferRootUpdate,
};
use bonder::hash::keccak256;
use chrono::Utc;

mod helpers {
    use super::*;

    /// Connect and migrate, or None when DATABASE_URL is unset
    pub async fn store() -> Option<PgLedgerStore> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let pool = create_pool(&url).await.expect("connect to DATABASE_URL");
        run_migrations(&pool).await.expect("run migrations");
        Some(PgLedgerStore::new(pool))
    }

    /// Ids unique per run so tests can share a database
    pub fn unique(tag: &str) -> B256 {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        B256::from(keccak256(format!("{tag}-{nanos}").as_bytes()))
    }

    pub fn unique_chain_id(id: B256) -> u64 {
        1_000_000 + u64::from_be_bytes(id.0[..8].try_into().unwrap()) % 1_000_000_000
    }

    pub fn clock() -> QueryClock {
        QueryClock::new(Utc::now(), Duration::from_secs(300))
    }
}

#[tokio::test]
#[ignore]
async fn test_root_partial_update_keeps_other_fields() {
    let Some(store) = helpers::store().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let id = helpers::unique("root");
    let hash = helpers::unique("hash");
    let total = U256::MAX - U256::from(7u64);
    let ids = vec![helpers::unique("t1"), helpers::unique("t2")];

    store
        .update_transfer_root(
            id,
            TransferRootUpdate {
                transfer_root_hash: Some(hash),
                source_chain_id: Some(10),
                destination_chain_id: Some(42161),
                total_amount: Some(total),
                transfer_ids: Some(Some(ids.clone())),
                committed: Some(true),
                committed_at: Some(1_700_000_000),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    store
        .update_transfer_root(
            id,
            TransferRootUpdate {
                challenged: Some(true),
                challenge_started_at: Some(1_700_000_500),
                bonder: Some(Address::repeat_byte(0x11)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let root = store.get_by_transfer_root_id(id).await.unwrap().unwrap();
    assert_eq!(root.transfer_root_hash, Some(hash));
    assert_eq!(root.total_amount, Some(total));
    assert_eq!(root.transfer_ids, Some(ids));
    assert!(root.committed);
    assert_eq!(root.committed_at, Some(1_700_000_000));
    assert!(root.challenged);
    assert_eq!(root.challenge_started_at, Some(1_700_000_500));
    assert_eq!(root.bonder, Some(Address::repeat_byte(0x11)));

    let by_hash = store.get_by_transfer_root_hash(hash).await.unwrap().unwrap();
    assert_eq!(by_hash.transfer_root_id, id);
}

#[tokio::test]
#[ignore]
async fn test_checkpoint_overwrites_previous_block() {
    let Some(store) = helpers::store().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let key = SyncKey {
        chain_id: helpers::unique_chain_id(helpers::unique("checkpoint")),
        contract_address: Address::repeat_byte(0x22),
        event_name: "TransferSent",
    };

    assert_eq!(store.get_checkpoint(&key).await.unwrap(), None);
    store.set_checkpoint(&key, 100).await.unwrap();
    assert_eq!(store.get_checkpoint(&key).await.unwrap(), Some(100));
    store.set_checkpoint(&key, 250).await.unwrap();
    assert_eq!(store.get_checkpoint(&key).await.unwrap(), Some(250));
}

#[tokio::test]
#[ignore]
async fn test_resolvable_counts_from_challenge_start() {
    let Some(store) = helpers::store().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let clock = helpers::clock();
    let now = clock.unix();
    let period = 10 * 86_400;
    let recent = helpers::unique("recent");
    let elapsed = helpers::unique("elapsed");

    for (id, started) in [(recent, now - 60), (elapsed, now - period - 60)] {
        store
            .update_transfer_root(
                id,
                TransferRootUpdate {
                    transfer_root_hash: Some(helpers::unique("hash")),
                    bonded: Some(true),
                    // bonded long ago; only the challenge start gates resolution
                    bonded_at: Some(now - 2 * period),
                    challenged: Some(true),
                    challenge_started_at: Some(started),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    let resolvable: Vec<B256> = store
        .get_resolvable_transfer_roots(period, &clock)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.transfer_root_id)
        .collect();
    assert!(resolvable.contains(&elapsed));
    assert!(!resolvable.contains(&recent));
}

#[tokio::test]
#[ignore]
async fn test_incomplete_items_skip_not_found_roots() {
    let Some(store) = helpers::store().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let chain_id = helpers::unique_chain_id(helpers::unique("incomplete"));
    let missing = helpers::unique("missing");
    let not_found = helpers::unique("not-found");

    for id in [missing, not_found] {
        store
            .update_transfer_root(
                id,
                TransferRootUpdate {
                    transfer_root_hash: Some(helpers::unique("hash")),
                    source_chain_id: Some(chain_id),
                    committed: Some(true),
                    commit_tx_hash: Some(helpers::unique("commit")),
                    committed_at: Some(1_700_000_000),
                    commit_tx_block_number: Some(1234),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }
    store
        .update_transfer_root(
            not_found,
            TransferRootUpdate {
                is_not_found: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let items = store.get_incomplete_items(chain_id, false).await.unwrap();
    let ids: Vec<B256> = items
        .transfer_roots
        .iter()
        .map(|r| r.transfer_root_id)
        .collect();
    assert_eq!(ids, vec![missing]);
}
