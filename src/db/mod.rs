//! Ledger Store: persisted transfers and transfer roots
//!
//! Handlers write individual fields (`update_*` takes a partial update and
//! upserts), so concurrent watchers touching different fields of the same
//! record never clobber each other.

use alloy::primitives::B256;
use async_trait::async_trait;
use eyre::{Result, WrapErr};
use sqlx::postgres::{PgPool, PgPoolOptions};

pub mod memory;
pub mod models;
pub mod postgres;
pub mod queries;

pub use memory::MemoryLedgerStore;
pub use models::*;
pub use postgres::PgLedgerStore;
pub use queries::QueryClock;

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .wrap_err("Failed to connect to database")
}

/// Run pending migrations (uses the migration files in migrations/)
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .wrap_err("Failed to run database migrations")?;
    Ok(())
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_by_transfer_id(&self, transfer_id: B256) -> Result<Option<Transfer>>;

    /// Upsert the fields named by `update`
    async fn update_transfer(&self, transfer_id: B256, update: TransferUpdate) -> Result<()>;

    async fn get_by_transfer_root_id(&self, transfer_root_id: B256)
        -> Result<Option<TransferRoot>>;

    /// Committed record first when several roots share a hash
    async fn get_by_transfer_root_hash(&self, root_hash: B256) -> Result<Option<TransferRoot>>;

    /// Upsert the fields named by `update`
    async fn update_transfer_root(
        &self,
        transfer_root_id: B256,
        update: TransferRootUpdate,
    ) -> Result<()>;

    /// Transfers already pointing at `root_hash`, in send order
    async fn get_transfers_by_root_hash(&self, root_hash: B256) -> Result<Vec<Transfer>>;

    async fn get_uncommitted_transfers(
        &self,
        source_chain_id: u64,
        destination_chain_id: Option<u64>,
    ) -> Result<Vec<Transfer>>;

    async fn get_unbonded_sent_transfers(
        &self,
        source_chain_id: u64,
        clock: &QueryClock,
    ) -> Result<Vec<Transfer>>;

    async fn get_unbonded_transfer_roots(
        &self,
        source_chain_id: u64,
        destination_chain_id: Option<u64>,
        clock: &QueryClock,
    ) -> Result<Vec<TransferRoot>>;

    async fn get_exitable_transfer_roots(
        &self,
        source_chain_id: u64,
        source_is_oru: bool,
        clock: &QueryClock,
    ) -> Result<Vec<TransferRoot>>;

    async fn get_confirmable_transfer_roots(
        &self,
        source_chain_id: u64,
        challenge_period_secs: u64,
        clock: &QueryClock,
    ) -> Result<Vec<TransferRoot>>;

    async fn get_unsettled_transfer_roots(
        &self,
        destination_chain_id: u64,
        clock: &QueryClock,
    ) -> Result<Vec<TransferRoot>>;

    async fn get_challengeable_transfer_roots(&self, clock: &QueryClock)
        -> Result<Vec<TransferRoot>>;

    /// Challenged roots whose resolution period has elapsed since the
    /// challenge started
    async fn get_resolvable_transfer_roots(
        &self,
        resolution_period_secs: u64,
        clock: &QueryClock,
    ) -> Result<Vec<TransferRoot>>;

    async fn get_incomplete_items(&self, chain_id: u64, is_l1: bool) -> Result<IncompleteItems>;

    async fn get_checkpoint(&self, key: &SyncKey) -> Result<Option<u64>>;

    async fn set_checkpoint(&self, key: &SyncKey, block: u64) -> Result<()>;
}
