//! Postgres-backed Ledger Store

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::{eyre, Result, WrapErr};
use sqlx::postgres::PgPool;
use sqlx::{FromRow, Postgres, QueryBuilder, Row};
use std::fmt::{Display, LowerHex};
use std::str::FromStr;
use tracing::error;

use super::models::*;
use super::queries;
use super::{LedgerStore, QueryClock};
use crate::types::TxError;

// Note: amounts are NUMERIC(78,0). We bind text and cast with `::NUMERIC` on
// write, and select `column::TEXT` on read so rows decode into String.

const TRANSFER_COLUMNS: &str = r#"transfer_id, source_chain_id, destination_chain_id, sender,
    recipient, amount::TEXT AS amount, bonder_fee::TEXT AS bonder_fee,
    amount_out_min::TEXT AS amount_out_min, deadline::TEXT AS deadline, transfer_nonce,
    transfer_sent_tx_hash, transfer_sent_block_number, transfer_sent_index,
    transfer_sent_log_index, transfer_sent_timestamp, is_bondable, withdrawal_bonded,
    withdrawal_bonder, withdrawal_bonded_tx_hash, withdrawal_bond_settled,
    withdrawal_bond_tx_error, bond_withdrawal_attempted_at, transfer_root_hash,
    transfer_root_id, is_transfer_spent, transfer_spent_tx_hash, is_not_found"#;

const TRANSFER_ORDER: &str =
    "ORDER BY transfer_sent_block_number, transfer_sent_index, transfer_sent_log_index";

const ROOT_COLUMNS: &str = r#"transfer_root_id, transfer_root_hash, source_chain_id,
    destination_chain_id, total_amount::TEXT AS total_amount, transfer_ids, committed,
    committed_at, commit_tx_hash, commit_tx_block_number, should_bond_transfer_root, bonded,
    bonder, bonded_at, bond_tx_hash, bond_block_number,
    bond_total_amount::TEXT AS bond_total_amount, bond_transfer_root_id, sent_bond_tx_at,
    confirmed, confirmed_at, confirm_tx_hash, sent_confirm_tx_at, challenged,
    challenge_started_at, challenge_expired, sent_challenge_tx_at, root_set_tx_hash,
    root_set_block_number, root_set_timestamp, all_settled, withdrawal_bond_settle_tx_sent_at,
    is_not_found"#;

const ROOT_ORDER: &str = "ORDER BY committed_at NULLS LAST, transfer_root_id";

#[derive(Debug, Clone, FromRow)]
struct TransferRow {
    transfer_id: String,
    source_chain_id: Option<i64>,
    destination_chain_id: Option<i64>,
    sender: Option<String>,
    recipient: Option<String>,
    amount: Option<String>,
    bonder_fee: Option<String>,
    amount_out_min: Option<String>,
    deadline: Option<String>,
    transfer_nonce: Option<String>,
    transfer_sent_tx_hash: Option<String>,
    transfer_sent_block_number: Option<i64>,
    transfer_sent_index: Option<i64>,
    transfer_sent_log_index: Option<i64>,
    transfer_sent_timestamp: Option<i64>,
    is_bondable: bool,
    withdrawal_bonded: bool,
    withdrawal_bonder: Option<String>,
    withdrawal_bonded_tx_hash: Option<String>,
    withdrawal_bond_settled: bool,
    withdrawal_bond_tx_error: Option<TxError>,
    bond_withdrawal_attempted_at: Option<DateTime<Utc>>,
    transfer_root_hash: Option<String>,
    transfer_root_id: Option<String>,
    is_transfer_spent: bool,
    transfer_spent_tx_hash: Option<String>,
    is_not_found: bool,
}

#[derive(Debug, Clone, FromRow)]
struct TransferRootRow {
    transfer_root_id: String,
    transfer_root_hash: Option<String>,
    source_chain_id: Option<i64>,
    destination_chain_id: Option<i64>,
    total_amount: Option<String>,
    transfer_ids: Option<Vec<String>>,
    committed: bool,
    committed_at: Option<i64>,
    commit_tx_hash: Option<String>,
    commit_tx_block_number: Option<i64>,
    should_bond_transfer_root: bool,
    bonded: bool,
    bonder: Option<String>,
    bonded_at: Option<i64>,
    bond_tx_hash: Option<String>,
    bond_block_number: Option<i64>,
    bond_total_amount: Option<String>,
    bond_transfer_root_id: Option<String>,
    sent_bond_tx_at: Option<DateTime<Utc>>,
    confirmed: bool,
    confirmed_at: Option<i64>,
    confirm_tx_hash: Option<String>,
    sent_confirm_tx_at: Option<DateTime<Utc>>,
    challenged: bool,
    challenge_started_at: Option<i64>,
    challenge_expired: bool,
    sent_challenge_tx_at: Option<DateTime<Utc>>,
    root_set_tx_hash: Option<String>,
    root_set_block_number: Option<i64>,
    root_set_timestamp: Option<i64>,
    all_settled: bool,
    withdrawal_bond_settle_tx_sent_at: Option<DateTime<Utc>>,
    is_not_found: bool,
}

fn parse<T>(value: &str, column: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e| eyre!("Invalid {} value {:?} in ledger: {}", column, value, e))
}

fn parse_opt<T>(value: Option<String>, column: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    value.map(|v| parse(&v, column)).transpose()
}

fn to_u64(value: Option<i64>) -> Option<u64> {
    value.map(|v| v.max(0) as u64)
}

impl TryFrom<TransferRow> for Transfer {
    type Error = eyre::Report;

    fn try_from(row: TransferRow) -> Result<Self> {
        Ok(Transfer {
            transfer_id: parse(&row.transfer_id, "transfer_id")?,
            source_chain_id: to_u64(row.source_chain_id),
            destination_chain_id: to_u64(row.destination_chain_id),
            sender: parse_opt::<Address>(row.sender, "sender")?,
            recipient: parse_opt::<Address>(row.recipient, "recipient")?,
            amount: parse_opt::<U256>(row.amount, "amount")?,
            bonder_fee: parse_opt::<U256>(row.bonder_fee, "bonder_fee")?,
            amount_out_min: parse_opt::<U256>(row.amount_out_min, "amount_out_min")?,
            deadline: parse_opt::<U256>(row.deadline, "deadline")?,
            transfer_nonce: parse_opt::<B256>(row.transfer_nonce, "transfer_nonce")?,
            transfer_sent_tx_hash: parse_opt::<B256>(
                row.transfer_sent_tx_hash,
                "transfer_sent_tx_hash",
            )?,
            transfer_sent_block_number: to_u64(row.transfer_sent_block_number),
            transfer_sent_index: to_u64(row.transfer_sent_index),
            transfer_sent_log_index: to_u64(row.transfer_sent_log_index),
            transfer_sent_timestamp: to_u64(row.transfer_sent_timestamp),
            is_bondable: row.is_bondable,
            withdrawal_bonded: row.withdrawal_bonded,
            withdrawal_bonder: parse_opt::<Address>(row.withdrawal_bonder, "withdrawal_bonder")?,
            withdrawal_bonded_tx_hash: parse_opt::<B256>(
                row.withdrawal_bonded_tx_hash,
                "withdrawal_bonded_tx_hash",
            )?,
            withdrawal_bond_settled: row.withdrawal_bond_settled,
            withdrawal_bond_tx_error: row.withdrawal_bond_tx_error,
            bond_withdrawal_attempted_at: row.bond_withdrawal_attempted_at,
            transfer_root_hash: parse_opt::<B256>(row.transfer_root_hash, "transfer_root_hash")?,
            transfer_root_id: parse_opt::<B256>(row.transfer_root_id, "transfer_root_id")?,
            is_transfer_spent: row.is_transfer_spent,
            transfer_spent_tx_hash: parse_opt::<B256>(
                row.transfer_spent_tx_hash,
                "transfer_spent_tx_hash",
            )?,
            is_not_found: row.is_not_found,
        })
    }
}

impl TryFrom<TransferRootRow> for TransferRoot {
    type Error = eyre::Report;

    fn try_from(row: TransferRootRow) -> Result<Self> {
        let transfer_ids = row
            .transfer_ids
            .map(|ids| {
                ids.iter()
                    .map(|id| parse::<B256>(id, "transfer_ids"))
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?;

        Ok(TransferRoot {
            transfer_root_id: parse(&row.transfer_root_id, "transfer_root_id")?,
            transfer_root_hash: parse_opt::<B256>(row.transfer_root_hash, "transfer_root_hash")?,
            source_chain_id: to_u64(row.source_chain_id),
            destination_chain_id: to_u64(row.destination_chain_id),
            total_amount: parse_opt::<U256>(row.total_amount, "total_amount")?,
            transfer_ids,
            committed: row.committed,
            committed_at: to_u64(row.committed_at),
            commit_tx_hash: parse_opt::<B256>(row.commit_tx_hash, "commit_tx_hash")?,
            commit_tx_block_number: to_u64(row.commit_tx_block_number),
            should_bond_transfer_root: row.should_bond_transfer_root,
            bonded: row.bonded,
            bonder: parse_opt::<Address>(row.bonder, "bonder")?,
            bonded_at: to_u64(row.bonded_at),
            bond_tx_hash: parse_opt::<B256>(row.bond_tx_hash, "bond_tx_hash")?,
            bond_block_number: to_u64(row.bond_block_number),
            bond_total_amount: parse_opt::<U256>(row.bond_total_amount, "bond_total_amount")?,
            bond_transfer_root_id: parse_opt::<B256>(
                row.bond_transfer_root_id,
                "bond_transfer_root_id",
            )?,
            sent_bond_tx_at: row.sent_bond_tx_at,
            confirmed: row.confirmed,
            confirmed_at: to_u64(row.confirmed_at),
            confirm_tx_hash: parse_opt::<B256>(row.confirm_tx_hash, "confirm_tx_hash")?,
            sent_confirm_tx_at: row.sent_confirm_tx_at,
            challenged: row.challenged,
            challenge_started_at: to_u64(row.challenge_started_at),
            challenge_expired: row.challenge_expired,
            sent_challenge_tx_at: row.sent_challenge_tx_at,
            root_set_tx_hash: parse_opt::<B256>(row.root_set_tx_hash, "root_set_tx_hash")?,
            root_set_block_number: to_u64(row.root_set_block_number),
            root_set_timestamp: to_u64(row.root_set_timestamp),
            all_settled: row.all_settled,
            withdrawal_bond_settle_tx_sent_at: row.withdrawal_bond_settle_tx_sent_at,
            is_not_found: row.is_not_found,
        })
    }
}

/// A column value in an upsert
#[derive(Debug, Clone)]
enum SqlValue {
    Text(Option<String>),
    Numeric(String),
    Int(i64),
    Bool(bool),
    Time(Option<DateTime<Utc>>),
    TextArray(Option<Vec<String>>),
    TxError(Option<TxError>),
}

fn hex<T: LowerHex>(value: &T) -> String {
    format!("{:#x}", value)
}

fn text<T: LowerHex>(value: &T) -> SqlValue {
    SqlValue::Text(Some(hex(value)))
}

fn int(value: u64) -> SqlValue {
    SqlValue::Int(value.min(i64::MAX as u64) as i64)
}

fn numeric(value: &U256) -> SqlValue {
    SqlValue::Numeric(value.to_string())
}

/// Collect `(column, value)` pairs for every field named by an update.
macro_rules! columns {
    ($update:expr, $( $field:ident => $conv:expr ),* $(,)?) => {{
        let mut cols: Vec<(&'static str, SqlValue)> = Vec::new();
        $(
            if let Some(v) = &$update.$field {
                cols.push((stringify!($field), $conv(v)));
            }
        )*
        cols
    }};
}

fn transfer_columns(u: &TransferUpdate) -> Vec<(&'static str, SqlValue)> {
    columns!(u,
        source_chain_id => |v: &u64| int(*v),
        destination_chain_id => |v: &u64| int(*v),
        sender => text,
        recipient => text,
        amount => numeric,
        bonder_fee => numeric,
        amount_out_min => numeric,
        deadline => numeric,
        transfer_nonce => text,
        transfer_sent_tx_hash => text,
        transfer_sent_block_number => |v: &u64| int(*v),
        transfer_sent_index => |v: &u64| int(*v),
        transfer_sent_log_index => |v: &u64| int(*v),
        transfer_sent_timestamp => |v: &u64| int(*v),
        is_bondable => |v: &bool| SqlValue::Bool(*v),
        withdrawal_bonded => |v: &bool| SqlValue::Bool(*v),
        withdrawal_bonder => text,
        withdrawal_bonded_tx_hash => text,
        withdrawal_bond_settled => |v: &bool| SqlValue::Bool(*v),
        withdrawal_bond_tx_error => |v: &Option<TxError>| SqlValue::TxError(*v),
        bond_withdrawal_attempted_at => |v: &Option<DateTime<Utc>>| SqlValue::Time(*v),
        transfer_root_hash => text,
        transfer_root_id => text,
        is_transfer_spent => |v: &bool| SqlValue::Bool(*v),
        transfer_spent_tx_hash => text,
        is_not_found => |v: &bool| SqlValue::Bool(*v),
    )
}

fn root_columns(u: &TransferRootUpdate) -> Vec<(&'static str, SqlValue)> {
    columns!(u,
        transfer_root_hash => text,
        source_chain_id => |v: &u64| int(*v),
        destination_chain_id => |v: &u64| int(*v),
        total_amount => numeric,
        transfer_ids => |v: &Option<Vec<B256>>| {
            SqlValue::TextArray(v.as_ref().map(|ids| ids.iter().map(hex).collect()))
        },
        committed => |v: &bool| SqlValue::Bool(*v),
        committed_at => |v: &u64| int(*v),
        commit_tx_hash => text,
        commit_tx_block_number => |v: &u64| int(*v),
        should_bond_transfer_root => |v: &bool| SqlValue::Bool(*v),
        bonded => |v: &bool| SqlValue::Bool(*v),
        bonder => text,
        bonded_at => |v: &u64| int(*v),
        bond_tx_hash => text,
        bond_block_number => |v: &u64| int(*v),
        bond_total_amount => numeric,
        bond_transfer_root_id => text,
        sent_bond_tx_at => |v: &Option<DateTime<Utc>>| SqlValue::Time(*v),
        confirmed => |v: &bool| SqlValue::Bool(*v),
        confirmed_at => |v: &u64| int(*v),
        confirm_tx_hash => text,
        sent_confirm_tx_at => |v: &Option<DateTime<Utc>>| SqlValue::Time(*v),
        challenged => |v: &bool| SqlValue::Bool(*v),
        challenge_started_at => |v: &u64| int(*v),
        challenge_expired => |v: &bool| SqlValue::Bool(*v),
        sent_challenge_tx_at => |v: &Option<DateTime<Utc>>| SqlValue::Time(*v),
        root_set_tx_hash => text,
        root_set_block_number => |v: &u64| int(*v),
        root_set_timestamp => |v: &u64| int(*v),
        all_settled => |v: &bool| SqlValue::Bool(*v),
        withdrawal_bond_settle_tx_sent_at => |v: &Option<DateTime<Utc>>| SqlValue::Time(*v),
        is_not_found => |v: &bool| SqlValue::Bool(*v),
    )
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: SqlValue) {
    match value {
        SqlValue::Text(v) => {
            qb.push_bind(v);
        }
        SqlValue::Numeric(v) => {
            qb.push_bind(v).push("::NUMERIC");
        }
        SqlValue::Int(v) => {
            qb.push_bind(v);
        }
        SqlValue::Bool(v) => {
            qb.push_bind(v);
        }
        SqlValue::Time(v) => {
            qb.push_bind(v);
        }
        SqlValue::TextArray(v) => {
            qb.push_bind(v);
        }
        SqlValue::TxError(v) => {
            qb.push_bind(v);
        }
    }
}

/// `INSERT ... ON CONFLICT DO UPDATE` touching only the named columns
fn build_upsert<'a>(
    table: &str,
    key_column: &str,
    key: String,
    cols: Vec<(&'static str, SqlValue)>,
) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(format!("INSERT INTO {} ({}", table, key_column));
    for (name, _) in &cols {
        qb.push(", ").push(*name);
    }
    qb.push(") VALUES (").push_bind(key);
    let names: Vec<&'static str> = cols.iter().map(|(name, _)| *name).collect();
    for (_, value) in cols {
        qb.push(", ");
        push_value(&mut qb, value);
    }
    qb.push(format!(") ON CONFLICT ({}) DO UPDATE SET updated_at = NOW()", key_column));
    for name in names {
        qb.push(format!(", {0} = EXCLUDED.{0}", name));
    }
    qb
}

/// Ledger Store backed by the operator database
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_transfers(
        &self,
        where_clause: &str,
        chain_id: Option<u64>,
    ) -> Result<Vec<Transfer>> {
        let sql = format!(
            "SELECT {} FROM transfers WHERE {} {}",
            TRANSFER_COLUMNS, where_clause, TRANSFER_ORDER
        );
        let mut query = sqlx::query_as::<_, TransferRow>(&sql);
        if let Some(id) = chain_id {
            query = query.bind(id as i64);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("SQL error fetching transfers: {:?}", e);
                e
            })
            .wrap_err("Failed to fetch transfers")?;

        rows.into_iter().map(Transfer::try_from).collect()
    }

    async fn fetch_roots(
        &self,
        where_clause: &str,
        chain_id: Option<u64>,
        flag: Option<bool>,
    ) -> Result<Vec<TransferRoot>> {
        let sql = format!(
            "SELECT {} FROM transfer_roots WHERE {} {}",
            ROOT_COLUMNS, where_clause, ROOT_ORDER
        );
        let mut query = sqlx::query_as::<_, TransferRootRow>(&sql);
        if let Some(id) = chain_id {
            query = query.bind(id as i64);
        }
        if let Some(flag) = flag {
            query = query.bind(flag);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("SQL error fetching transfer roots: {:?}", e);
                e
            })
            .wrap_err("Failed to fetch transfer roots")?;

        rows.into_iter().map(TransferRoot::try_from).collect()
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn get_by_transfer_id(&self, transfer_id: B256) -> Result<Option<Transfer>> {
        let sql = format!("SELECT {} FROM transfers WHERE transfer_id = $1", TRANSFER_COLUMNS);
        let row = sqlx::query_as::<_, TransferRow>(&sql)
            .bind(hex(&transfer_id))
            .fetch_optional(&self.pool)
            .await
            .wrap_err("Failed to get transfer")?;

        row.map(Transfer::try_from).transpose()
    }

    async fn update_transfer(&self, transfer_id: B256, update: TransferUpdate) -> Result<()> {
        let mut qb = build_upsert(
            "transfers",
            "transfer_id",
            hex(&transfer_id),
            transfer_columns(&update),
        );
        qb.build()
            .execute(&self.pool)
            .await
            .wrap_err("Failed to update transfer")?;
        Ok(())
    }

    async fn get_by_transfer_root_id(
        &self,
        transfer_root_id: B256,
    ) -> Result<Option<TransferRoot>> {
        let sql = format!(
            "SELECT {} FROM transfer_roots WHERE transfer_root_id = $1",
            ROOT_COLUMNS
        );
        let row = sqlx::query_as::<_, TransferRootRow>(&sql)
            .bind(hex(&transfer_root_id))
            .fetch_optional(&self.pool)
            .await
            .wrap_err("Failed to get transfer root")?;

        row.map(TransferRoot::try_from).transpose()
    }

    async fn get_by_transfer_root_hash(&self, root_hash: B256) -> Result<Option<TransferRoot>> {
        let sql = format!(
            "SELECT {} FROM transfer_roots WHERE transfer_root_hash = $1 \
             ORDER BY committed DESC LIMIT 1",
            ROOT_COLUMNS
        );
        let row = sqlx::query_as::<_, TransferRootRow>(&sql)
            .bind(hex(&root_hash))
            .fetch_optional(&self.pool)
            .await
            .wrap_err("Failed to get transfer root by hash")?;

        row.map(TransferRoot::try_from).transpose()
    }

    async fn update_transfer_root(
        &self,
        transfer_root_id: B256,
        update: TransferRootUpdate,
    ) -> Result<()> {
        let mut qb = build_upsert(
            "transfer_roots",
            "transfer_root_id",
            hex(&transfer_root_id),
            root_columns(&update),
        );
        qb.build()
            .execute(&self.pool)
            .await
            .wrap_err("Failed to update transfer root")?;
        Ok(())
    }

    async fn get_transfers_by_root_hash(&self, root_hash: B256) -> Result<Vec<Transfer>> {
        let sql = format!(
            "SELECT {} FROM transfers WHERE transfer_root_hash = $1 {}",
            TRANSFER_COLUMNS, TRANSFER_ORDER
        );
        let rows = sqlx::query_as::<_, TransferRow>(&sql)
            .bind(hex(&root_hash))
            .fetch_all(&self.pool)
            .await
            .wrap_err("Failed to get transfers by root hash")?;

        rows.into_iter().map(Transfer::try_from).collect()
    }

    async fn get_uncommitted_transfers(
        &self,
        source_chain_id: u64,
        destination_chain_id: Option<u64>,
    ) -> Result<Vec<Transfer>> {
        let rows = self
            .fetch_transfers(
                "source_chain_id = $1 AND transfer_root_hash IS NULL AND is_not_found = FALSE",
                Some(source_chain_id),
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter(|t| queries::uncommitted_transfer(t, source_chain_id, destination_chain_id))
            .collect())
    }

    async fn get_unbonded_sent_transfers(
        &self,
        source_chain_id: u64,
        clock: &QueryClock,
    ) -> Result<Vec<Transfer>> {
        let rows = self
            .fetch_transfers(
                "source_chain_id = $1 AND is_bondable = TRUE AND withdrawal_bonded = FALSE \
                 AND is_transfer_spent = FALSE AND is_not_found = FALSE",
                Some(source_chain_id),
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter(|t| queries::unbonded_sent_transfer(t, source_chain_id, clock))
            .collect())
    }

    async fn get_unbonded_transfer_roots(
        &self,
        source_chain_id: u64,
        destination_chain_id: Option<u64>,
        clock: &QueryClock,
    ) -> Result<Vec<TransferRoot>> {
        let rows = self
            .fetch_roots(
                "source_chain_id = $1 AND bonded = FALSE AND confirmed = FALSE \
                 AND is_not_found = FALSE",
                Some(source_chain_id),
                None,
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter(|r| queries::unbonded_root(r, source_chain_id, destination_chain_id, clock))
            .collect())
    }

    async fn get_exitable_transfer_roots(
        &self,
        source_chain_id: u64,
        source_is_oru: bool,
        clock: &QueryClock,
    ) -> Result<Vec<TransferRoot>> {
        let rows = self
            .fetch_roots(
                "source_chain_id = $1 AND confirmed = FALSE AND is_not_found = FALSE",
                Some(source_chain_id),
                None,
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter(|r| queries::exitable_root(r, source_chain_id, source_is_oru, clock))
            .collect())
    }

    async fn get_confirmable_transfer_roots(
        &self,
        source_chain_id: u64,
        challenge_period_secs: u64,
        clock: &QueryClock,
    ) -> Result<Vec<TransferRoot>> {
        let rows = self
            .fetch_roots(
                "source_chain_id = $1 AND bonded = TRUE AND confirmed = FALSE \
                 AND challenged = FALSE AND is_not_found = FALSE",
                Some(source_chain_id),
                None,
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter(|r| {
                queries::confirmable_root(r, source_chain_id, challenge_period_secs, clock)
            })
            .collect())
    }

    async fn get_unsettled_transfer_roots(
        &self,
        destination_chain_id: u64,
        clock: &QueryClock,
    ) -> Result<Vec<TransferRoot>> {
        let rows = self
            .fetch_roots(
                "destination_chain_id = $1 AND root_set_tx_hash IS NOT NULL \
                 AND all_settled = FALSE AND is_not_found = FALSE",
                Some(destination_chain_id),
                None,
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter(|r| queries::unsettled_root(r, destination_chain_id, clock))
            .collect())
    }

    async fn get_challengeable_transfer_roots(
        &self,
        clock: &QueryClock,
    ) -> Result<Vec<TransferRoot>> {
        let rows = self
            .fetch_roots(
                "bonded = TRUE AND committed = FALSE AND challenged = FALSE \
                 AND challenge_expired = FALSE AND is_not_found = FALSE",
                None,
                None,
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter(|r| queries::challengeable_root(r, clock))
            .collect())
    }

    async fn get_resolvable_transfer_roots(
        &self,
        resolution_period_secs: u64,
        clock: &QueryClock,
    ) -> Result<Vec<TransferRoot>> {
        let rows = self
            .fetch_roots(
                "challenged = TRUE AND challenge_expired = FALSE AND is_not_found = FALSE",
                None,
                None,
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter(|r| queries::resolvable_root(r, resolution_period_secs, clock))
            .collect())
    }

    async fn get_incomplete_items(&self, chain_id: u64, is_l1: bool) -> Result<IncompleteItems> {
        let transfers = self
            .fetch_transfers(
                "(source_chain_id = $1 OR destination_chain_id = $1) AND is_not_found = FALSE \
                 AND (transfer_sent_timestamp IS NULL OR transfer_sent_index IS NULL \
                      OR withdrawal_bonder IS NULL)",
                Some(chain_id),
            )
            .await?
            .into_iter()
            .filter(|t| queries::incomplete_transfer(t, chain_id))
            .collect();

        let transfer_roots = self
            .fetch_roots(
                "(source_chain_id = $1 OR destination_chain_id = $1 OR $2) \
                 AND is_not_found = FALSE",
                Some(chain_id),
                Some(is_l1),
            )
            .await?
            .into_iter()
            .filter(|r| queries::incomplete_root(r, chain_id, is_l1))
            .collect();

        Ok(IncompleteItems {
            transfers,
            transfer_roots,
        })
    }

    async fn get_checkpoint(&self, key: &SyncKey) -> Result<Option<u64>> {
        let row = sqlx::query(
            r#"
            SELECT last_synced_block FROM sync_state
            WHERE chain_id = $1 AND contract_address = $2 AND event_name = $3
            "#,
        )
        .bind(key.chain_id as i64)
        .bind(hex(&key.contract_address))
        .bind(key.event_name)
        .fetch_optional(&self.pool)
        .await
        .wrap_err("Failed to get sync checkpoint")?;

        Ok(row.map(|r| r.get::<i64, _>("last_synced_block").max(0) as u64))
    }

    async fn set_checkpoint(&self, key: &SyncKey, block: u64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (chain_id, contract_address, event_name, last_synced_block, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (chain_id, contract_address, event_name)
            DO UPDATE SET last_synced_block = $4, updated_at = NOW()
            "#,
        )
        .bind(key.chain_id as i64)
        .bind(hex(&key.contract_address))
        .bind(key.event_name)
        .bind(block as i64)
        .execute(&self.pool)
        .await
        .wrap_err("Failed to set sync checkpoint")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_is_lowercase_prefixed() {
        let addr: Address = "0xAbC0000000000000000000000000000000000001".parse().unwrap();
        assert_eq!(hex(&addr), "0xabc0000000000000000000000000000000000001");
        assert_eq!(hex(&B256::repeat_byte(0xAB)).len(), 66);
    }

    #[test]
    fn test_upsert_sql_only_names_updated_columns() {
        let update = TransferUpdate {
            amount: Some(U256::from(5u64)),
            withdrawal_bonded: Some(true),
            ..Default::default()
        };
        let qb = build_upsert(
            "transfers",
            "transfer_id",
            hex(&B256::ZERO),
            transfer_columns(&update),
        );
        let sql = qb.sql();

        assert!(sql.starts_with("INSERT INTO transfers (transfer_id, amount, withdrawal_bonded)"));
        assert!(sql.contains("$2::NUMERIC"));
        assert!(sql.contains("amount = EXCLUDED.amount"));
        assert!(sql.contains("withdrawal_bonded = EXCLUDED.withdrawal_bonded"));
        assert!(!sql.contains("recipient"));
    }

    #[test]
    fn test_row_conversion() {
        let row = TransferRow {
            transfer_id: hex(&B256::repeat_byte(1)),
            source_chain_id: Some(10),
            destination_chain_id: Some(1),
            sender: None,
            recipient: Some("0x1111111111111111111111111111111111111111".to_string()),
            amount: Some("1000000000000000000".to_string()),
            bonder_fee: None,
            amount_out_min: None,
            deadline: None,
            transfer_nonce: None,
            transfer_sent_tx_hash: None,
            transfer_sent_block_number: Some(5),
            transfer_sent_index: None,
            transfer_sent_log_index: None,
            transfer_sent_timestamp: None,
            is_bondable: true,
            withdrawal_bonded: false,
            withdrawal_bonder: None,
            withdrawal_bonded_tx_hash: None,
            withdrawal_bond_settled: false,
            withdrawal_bond_tx_error: Some(TxError::NotEnoughLiquidity),
            bond_withdrawal_attempted_at: None,
            transfer_root_hash: None,
            transfer_root_id: None,
            is_transfer_spent: false,
            transfer_spent_tx_hash: None,
            is_not_found: false,
        };

        let t = Transfer::try_from(row).unwrap();
        assert_eq!(t.transfer_id, B256::repeat_byte(1));
        assert_eq!(t.amount, Some(U256::from(1_000_000_000_000_000_000u128)));
        assert_eq!(t.recipient, Some(Address::repeat_byte(0x11)));
        assert_eq!(t.transfer_sent_block_number, Some(5));
        assert_eq!(t.withdrawal_bond_tx_error, Some(TxError::NotEnoughLiquidity));
    }
}
