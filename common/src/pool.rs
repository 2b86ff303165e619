//! Durable pool entry record.
//!
//! The database row mirrors the volatile pool state for audit and
//! recovery. The pool is never authoritative; the engine reconciles
//! from these rows on startup.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Currency, Direction, PoolEntryId, TraderId, TransactionId};

/// A funded transaction waiting in the matching pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolEntry {
    /// Unique identifier.
    pub id: PoolEntryId,
    /// Transaction this entry represents. At most one active entry
    /// exists per transaction.
    pub transaction_id: TransactionId,
    /// Owning trader.
    pub trader_id: TraderId,
    /// Matching direction.
    pub direction: Direction,
    /// Currently matchable amount. Reduced by partial matches.
    pub amount: Decimal,
    /// Currency of the amount (NGN for ngn_to_cny, CNY for cny_to_ngn).
    pub currency: Currency,
    /// Priority score in [0, 100] at insertion time.
    pub priority_score: Decimal,
    /// Whether the entry is still live in the pool.
    pub is_active: bool,
    pub entered_pool_at: DateTime<Utc>,
    /// Timeout deadline; stale entries are routed to CIPS.
    pub expires_at: DateTime<Utc>,
}

impl PoolEntry {
    /// Create a new active pool entry expiring after `timeout_hours`.
    pub fn new(
        transaction_id: TransactionId,
        trader_id: TraderId,
        direction: Direction,
        amount: Decimal,
        priority_score: Decimal,
        timeout_hours: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PoolEntryId::new(),
            transaction_id,
            trader_id,
            direction,
            amount,
            currency: direction.source_currency(),
            priority_score,
            is_active: true,
            entered_pool_at: now,
            expires_at: now + Duration::hours(timeout_hours),
        }
    }

    /// Check if the entry has passed its timeout deadline.
    pub fn is_expired(&self, at: DateTime<Utc>) -> bool {
        at > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_entry_expiry_after_entry_time() {
        let entry = PoolEntry::new(
            TransactionId::new(),
            TraderId::new(),
            Direction::NgnToCny,
            dec!(1000000),
            dec!(72.5),
            24,
        );
        assert!(entry.is_active);
        assert!(entry.expires_at > entry.entered_pool_at);
        assert_eq!(entry.currency, Currency::Ngn);
        assert_eq!(entry.expires_at - entry.entered_pool_at, Duration::hours(24));
    }

    #[test]
    fn test_expiry_check() {
        let entry = PoolEntry::new(
            TransactionId::new(),
            TraderId::new(),
            Direction::CnyToNgn,
            dec!(50000),
            dec!(30),
            24,
        );
        assert!(!entry.is_expired(Utc::now()));
        assert!(entry.is_expired(Utc::now() + Duration::hours(25)));
    }
}
