//! Transaction repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgExecutor;
use uuid::Uuid;

use tradeflow_common::{
    Direction, MatchId, Reference, SettlementMethod, TraderId, Transaction, TransactionId,
    TransactionStatus,
};

use crate::{DbError, Result};

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    reference: String,
    trader_id: Uuid,
    direction: String,
    source_amount: Decimal,
    target_amount: Option<Decimal>,
    exchange_rate: Option<Decimal>,
    fee_amount: Decimal,
    fee_percentage: Decimal,
    supplier_name: Option<String>,
    supplier_bank: Option<String>,
    supplier_account: Option<String>,
    status: String,
    match_id: Option<Uuid>,
    settlement_method: Option<String>,
    funded_at: Option<DateTime<Utc>>,
    matched_at: Option<DateTime<Utc>>,
    settled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = DbError;

    fn try_from(row: TransactionRow) -> Result<Transaction> {
        let direction = Direction::parse(&row.direction)
            .ok_or_else(|| DbError::Decode(format!("bad direction: {}", row.direction)))?;
        let status = TransactionStatus::parse(&row.status)
            .ok_or_else(|| DbError::Decode(format!("bad status: {}", row.status)))?;
        let settlement_method = match row.settlement_method.as_deref() {
            Some(raw) => Some(
                SettlementMethod::parse(raw)
                    .ok_or_else(|| DbError::Decode(format!("bad settlement method: {raw}")))?,
            ),
            None => None,
        };
        let reference = Reference::parse(&row.reference)
            .map_err(|e| DbError::Decode(e.to_string()))?;

        Ok(Transaction {
            id: TransactionId::from_uuid(row.id),
            reference,
            trader_id: TraderId::from_uuid(row.trader_id),
            direction,
            source_amount: row.source_amount,
            target_amount: row.target_amount,
            exchange_rate: row.exchange_rate,
            fee_amount: row.fee_amount,
            fee_percentage: row.fee_percentage,
            supplier_name: row.supplier_name,
            supplier_bank: row.supplier_bank,
            supplier_account: row.supplier_account,
            status,
            match_id: row.match_id.map(MatchId::from_uuid),
            settlement_method,
            funded_at: row.funded_at,
            matched_at: row.matched_at,
            settled_at: row.settled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, reference, trader_id, direction, source_amount, \
     target_amount, exchange_rate, fee_amount, fee_percentage, supplier_name, \
     supplier_bank, supplier_account, status, match_id, settlement_method, \
     funded_at, matched_at, settled_at, created_at, updated_at";

/// Repository for the `transactions` table.
pub struct TransactionRepo;

impl TransactionRepo {
    /// Insert a new transaction.
    pub async fn insert<'e>(executor: impl PgExecutor<'e>, txn: &Transaction) -> Result<()> {
        sqlx::query(
            "INSERT INTO transactions (id, reference, trader_id, direction, source_amount, \
             target_amount, exchange_rate, fee_amount, fee_percentage, supplier_name, \
             supplier_bank, supplier_account, status, match_id, settlement_method, \
             funded_at, matched_at, settled_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, \
                     $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)",
        )
        .bind(txn.id.as_uuid())
        .bind(txn.reference.as_str())
        .bind(txn.trader_id.as_uuid())
        .bind(txn.direction.as_str())
        .bind(txn.source_amount)
        .bind(txn.target_amount)
        .bind(txn.exchange_rate)
        .bind(txn.fee_amount)
        .bind(txn.fee_percentage)
        .bind(txn.supplier_name.as_deref())
        .bind(txn.supplier_bank.as_deref())
        .bind(txn.supplier_account.as_deref())
        .bind(txn.status.as_str())
        .bind(txn.match_id.map(|m| *m.as_uuid()))
        .bind(txn.settlement_method.map(|m| m.as_str()))
        .bind(txn.funded_at)
        .bind(txn.matched_at)
        .bind(txn.settled_at)
        .bind(txn.created_at)
        .bind(txn.updated_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Write back every mutable column of an existing transaction.
    pub async fn update<'e>(executor: impl PgExecutor<'e>, txn: &Transaction) -> Result<()> {
        sqlx::query(
            "UPDATE transactions SET source_amount = $2, target_amount = $3, \
             exchange_rate = $4, fee_amount = $5, fee_percentage = $6, status = $7, \
             match_id = $8, settlement_method = $9, funded_at = $10, matched_at = $11, \
             settled_at = $12, updated_at = $13 \
             WHERE id = $1",
        )
        .bind(txn.id.as_uuid())
        .bind(txn.source_amount)
        .bind(txn.target_amount)
        .bind(txn.exchange_rate)
        .bind(txn.fee_amount)
        .bind(txn.fee_percentage)
        .bind(txn.status.as_str())
        .bind(txn.match_id.map(|m| *m.as_uuid()))
        .bind(txn.settlement_method.map(|m| m.as_str()))
        .bind(txn.funded_at)
        .bind(txn.matched_at)
        .bind(txn.settled_at)
        .bind(txn.updated_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Find a transaction by its human reference.
    pub async fn find_by_reference<'e>(
        executor: impl PgExecutor<'e>,
        reference: &str,
    ) -> Result<Option<Transaction>> {
        let row: Option<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM transactions WHERE reference = $1"
        ))
        .bind(reference)
        .fetch_optional(executor)
        .await?;

        row.map(Transaction::try_from).transpose()
    }

    /// Find a transaction by ID.
    pub async fn find_by_id<'e>(
        executor: impl PgExecutor<'e>,
        id: TransactionId,
    ) -> Result<Option<Transaction>> {
        let row: Option<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(executor)
        .await?;

        row.map(Transaction::try_from).transpose()
    }

    /// One page of a trader's transactions, newest first, with the
    /// total count for pagination.
    pub async fn list_for_trader<'e, E>(
        executor: E,
        trader_id: TraderId,
        status: Option<TransactionStatus>,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Transaction>, i64)>
    where
        E: PgExecutor<'e> + Copy,
    {
        let offset = (page.max(1) - 1) * per_page;

        let total: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM transactions \
             WHERE trader_id = $1 AND ($2::text IS NULL OR status = $2)",
        )
        .bind(trader_id.as_uuid())
        .bind(status.map(|s| s.as_str()))
        .fetch_one(executor)
        .await?;

        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM transactions \
             WHERE trader_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC OFFSET $3 LIMIT $4"
        ))
        .bind(trader_id.as_uuid())
        .bind(status.map(|s| s.as_str()))
        .bind(offset)
        .bind(per_page)
        .fetch_all(executor)
        .await?;

        let items = rows
            .into_iter()
            .map(Transaction::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((items, total.0))
    }

    /// INITIATED transactions created before the cutoff, oldest first.
    ///
    /// Used by the expiry worker to time out unfunded transactions.
    pub async fn find_stale_initiated<'e>(
        executor: impl PgExecutor<'e>,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM transactions \
             WHERE status = 'initiated' AND created_at < $1 \
             ORDER BY created_at"
        ))
        .bind(cutoff)
        .fetch_all(executor)
        .await?;

        rows.into_iter().map(Transaction::try_from).collect()
    }
}
