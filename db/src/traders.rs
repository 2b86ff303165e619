//! Trader repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgExecutor;
use uuid::Uuid;

use tradeflow_common::{AccountStatus, KycTier, Trader, TraderId};

use crate::{DbError, Result};

#[derive(sqlx::FromRow)]
struct TraderRow {
    id: Uuid,
    phone: String,
    business_name: Option<String>,
    kyc_tier: i32,
    monthly_limit: Decimal,
    monthly_used: Decimal,
    pin_hash: Option<String>,
    status: String,
    bvn: Option<String>,
    nin: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TraderRow> for Trader {
    type Error = DbError;

    fn try_from(row: TraderRow) -> Result<Trader> {
        let kyc_tier = KycTier::from_level(row.kyc_tier as u8)
            .ok_or_else(|| DbError::Decode(format!("bad kyc tier: {}", row.kyc_tier)))?;
        let account_status = AccountStatus::parse(&row.status)
            .ok_or_else(|| DbError::Decode(format!("bad account status: {}", row.status)))?;

        Ok(Trader {
            id: TraderId::from_uuid(row.id),
            phone: row.phone,
            business_name: row.business_name,
            kyc_tier,
            monthly_limit_usd: row.monthly_limit,
            monthly_used_usd: row.monthly_used,
            pin_hash: row.pin_hash,
            account_status,
            bvn_encrypted: row.bvn,
            nin_encrypted: row.nin,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, phone, business_name, kyc_tier, monthly_limit, \
     monthly_used, pin_hash, status, bvn, nin, created_at, updated_at";

/// Repository for the `traders` table.
pub struct TraderRepo;

impl TraderRepo {
    /// Insert a new trader.
    pub async fn insert<'e>(executor: impl PgExecutor<'e>, trader: &Trader) -> Result<()> {
        sqlx::query(
            "INSERT INTO traders (id, phone, business_name, kyc_tier, monthly_limit, \
             monthly_used, pin_hash, status, bvn, nin, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(trader.id.as_uuid())
        .bind(&trader.phone)
        .bind(trader.business_name.as_deref())
        .bind(trader.kyc_tier.level() as i32)
        .bind(trader.monthly_limit_usd)
        .bind(trader.monthly_used_usd)
        .bind(trader.pin_hash.as_deref())
        .bind(trader.account_status.as_str())
        .bind(trader.bvn_encrypted.as_deref())
        .bind(trader.nin_encrypted.as_deref())
        .bind(trader.created_at)
        .bind(trader.updated_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Find a trader by ID.
    pub async fn find_by_id<'e>(
        executor: impl PgExecutor<'e>,
        id: TraderId,
    ) -> Result<Option<Trader>> {
        let row: Option<TraderRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM traders WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(executor)
        .await?;

        row.map(Trader::try_from).transpose()
    }

    /// Accrue monthly USD usage after a transaction is created.
    pub async fn add_monthly_used<'e>(
        executor: impl PgExecutor<'e>,
        id: TraderId,
        amount_usd: Decimal,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE traders SET monthly_used = monthly_used + $2, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(amount_usd)
        .execute(executor)
        .await?;

        Ok(())
    }
}
