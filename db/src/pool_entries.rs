//! Durable pool entry repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgExecutor;
use std::str::FromStr;
use uuid::Uuid;

use tradeflow_common::{Currency, Direction, PoolEntry, PoolEntryId, TraderId, TransactionId};

use crate::{DbError, Result};

#[derive(sqlx::FromRow)]
struct PoolEntryRow {
    id: Uuid,
    transaction_id: Uuid,
    trader_id: Uuid,
    direction: String,
    amount: Decimal,
    currency: String,
    priority_score: Decimal,
    is_active: bool,
    entered_pool_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<PoolEntryRow> for PoolEntry {
    type Error = DbError;

    fn try_from(row: PoolEntryRow) -> Result<PoolEntry> {
        let direction = Direction::parse(&row.direction)
            .ok_or_else(|| DbError::Decode(format!("bad direction: {}", row.direction)))?;
        let currency = Currency::from_str(&row.currency)
            .map_err(|e| DbError::Decode(e.to_string()))?;

        Ok(PoolEntry {
            id: PoolEntryId::from_uuid(row.id),
            transaction_id: TransactionId::from_uuid(row.transaction_id),
            trader_id: TraderId::from_uuid(row.trader_id),
            direction,
            amount: row.amount,
            currency,
            priority_score: row.priority_score,
            is_active: row.is_active,
            entered_pool_at: row.entered_pool_at,
            expires_at: row.expires_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, transaction_id, trader_id, direction, amount, \
     currency, priority_score, is_active, entered_pool_at, expires_at";

/// Repository for the `matching_pool` table.
pub struct PoolEntryRepo;

impl PoolEntryRepo {
    /// Insert a pool entry row.
    pub async fn insert<'e>(executor: impl PgExecutor<'e>, entry: &PoolEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO matching_pool (id, transaction_id, trader_id, direction, amount, \
             currency, priority_score, is_active, entered_pool_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(entry.id.as_uuid())
        .bind(entry.transaction_id.as_uuid())
        .bind(entry.trader_id.as_uuid())
        .bind(entry.direction.as_str())
        .bind(entry.amount)
        .bind(entry.currency.code())
        .bind(entry.priority_score)
        .bind(entry.is_active)
        .bind(entry.entered_pool_at)
        .bind(entry.expires_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// The active pool row for a transaction, if any.
    pub async fn find_active_by_transaction<'e>(
        executor: impl PgExecutor<'e>,
        transaction_id: TransactionId,
    ) -> Result<Option<PoolEntry>> {
        let row: Option<PoolEntryRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM matching_pool \
             WHERE transaction_id = $1 AND is_active"
        ))
        .bind(transaction_id.as_uuid())
        .fetch_optional(executor)
        .await?;

        row.map(PoolEntry::try_from).transpose()
    }

    /// All active pool rows, highest priority first.
    ///
    /// Used to rebuild the volatile pool on startup; the database is
    /// the system of record.
    pub async fn find_all_active<'e>(executor: impl PgExecutor<'e>) -> Result<Vec<PoolEntry>> {
        let rows: Vec<PoolEntryRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM matching_pool WHERE is_active \
             ORDER BY priority_score DESC"
        ))
        .fetch_all(executor)
        .await?;

        rows.into_iter().map(PoolEntry::try_from).collect()
    }

    /// Mark a pool row inactive once the entry leaves the pool.
    pub async fn deactivate<'e>(executor: impl PgExecutor<'e>, id: PoolEntryId) -> Result<()> {
        sqlx::query("UPDATE matching_pool SET is_active = FALSE WHERE id = $1")
            .bind(id.as_uuid())
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Reduce the matchable amount after a partial fill.
    pub async fn update_amount<'e>(
        executor: impl PgExecutor<'e>,
        id: PoolEntryId,
        new_amount: Decimal,
    ) -> Result<()> {
        sqlx::query("UPDATE matching_pool SET amount = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(new_amount)
            .execute(executor)
            .await?;
        Ok(())
    }
}
