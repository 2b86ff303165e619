//! Match record repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgExecutor;
use uuid::Uuid;

use tradeflow_common::{CycleId, MatchId, MatchRecord, MatchStatus, MatchType, TransactionId};

use crate::{DbError, Result};

#[derive(sqlx::FromRow)]
struct MatchRow {
    id: Uuid,
    cycle_id: String,
    buy_transaction_id: Uuid,
    sell_transaction_id: Uuid,
    match_type: String,
    matched_amount: Decimal,
    matched_rate: Decimal,
    status: String,
    settlement_reference: Option<String>,
    matched_at: DateTime<Utc>,
    settled_at: Option<DateTime<Utc>>,
}

impl TryFrom<MatchRow> for MatchRecord {
    type Error = DbError;

    fn try_from(row: MatchRow) -> Result<MatchRecord> {
        let match_type = MatchType::parse(&row.match_type)
            .ok_or_else(|| DbError::Decode(format!("bad match type: {}", row.match_type)))?;
        let status = MatchStatus::parse(&row.status)
            .ok_or_else(|| DbError::Decode(format!("bad match status: {}", row.status)))?;

        Ok(MatchRecord {
            id: MatchId::from_uuid(row.id),
            cycle_id: CycleId::from_string(row.cycle_id),
            buy_transaction_id: TransactionId::from_uuid(row.buy_transaction_id),
            sell_transaction_id: TransactionId::from_uuid(row.sell_transaction_id),
            match_type,
            matched_amount: row.matched_amount,
            matched_rate: row.matched_rate,
            status,
            settlement_reference: row.settlement_reference,
            matched_at: row.matched_at,
            settled_at: row.settled_at,
        })
    }
}

/// Repository for the `matches` table.
pub struct MatchRepo;

impl MatchRepo {
    /// Insert a match record.
    pub async fn insert<'e>(executor: impl PgExecutor<'e>, record: &MatchRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO matches (id, cycle_id, buy_transaction_id, sell_transaction_id, \
             match_type, matched_amount, matched_rate, status, settlement_reference, \
             matched_at, settled_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(record.id.as_uuid())
        .bind(record.cycle_id.as_str())
        .bind(record.buy_transaction_id.as_uuid())
        .bind(record.sell_transaction_id.as_uuid())
        .bind(record.match_type.as_str())
        .bind(record.matched_amount)
        .bind(record.matched_rate)
        .bind(record.status.as_str())
        .bind(record.settlement_reference.as_deref())
        .bind(record.matched_at)
        .bind(record.settled_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Every match record citing a transaction on either side.
    pub async fn find_for_transaction<'e>(
        executor: impl PgExecutor<'e>,
        transaction_id: TransactionId,
    ) -> Result<Vec<MatchRecord>> {
        let rows: Vec<MatchRow> = sqlx::query_as(
            "SELECT id, cycle_id, buy_transaction_id, sell_transaction_id, match_type, \
             matched_amount, matched_rate, status, settlement_reference, matched_at, settled_at \
             FROM matches \
             WHERE buy_transaction_id = $1 OR sell_transaction_id = $1 \
             ORDER BY matched_at",
        )
        .bind(transaction_id.as_uuid())
        .fetch_all(executor)
        .await?;

        rows.into_iter().map(MatchRecord::try_from).collect()
    }

    /// A page of recent match records, newest first.
    pub async fn recent<'e>(
        executor: impl PgExecutor<'e>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MatchRecord>> {
        let rows: Vec<MatchRow> = sqlx::query_as(
            "SELECT id, cycle_id, buy_transaction_id, sell_transaction_id, match_type, \
             matched_amount, matched_rate, status, settlement_reference, matched_at, settled_at \
             FROM matches ORDER BY matched_at DESC OFFSET $1 LIMIT $2",
        )
        .bind(offset)
        .bind(limit)
        .fetch_all(executor)
        .await?;

        rows.into_iter().map(MatchRecord::try_from).collect()
    }

    /// Count match records for a cycle.
    pub async fn count_for_cycle<'e>(
        executor: impl PgExecutor<'e>,
        cycle_id: &str,
    ) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM matches WHERE cycle_id = $1")
                .bind(cycle_id)
                .fetch_one(executor)
                .await?;
        Ok(count.0)
    }
}
