//! Match records produced by the matching engine.
//!
//! Each successful pairing creates one record per counterparty leg; a
//! multi-leg fill therefore produces N records sharing a cycle ID.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CycleId, MatchId, TransactionId};

/// Kind of match produced by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Amounts within the exact tolerance of each other.
    Exact,
    /// One large transaction filled by several smaller counterparties.
    Multi,
    /// Overlap match with a remainder carried back into the pool.
    Partial,
}

impl MatchType {
    /// Wire/database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Multi => "multi",
            MatchType::Partial => "partial",
        }
    }

    /// Parse from the wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exact" => Some(MatchType::Exact),
            "multi" => Some(MatchType::Multi),
            "partial" => Some(MatchType::Partial),
            _ => None,
        }
    }
}

/// Settlement lifecycle of a match record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    PendingSettlement,
    Settling,
    Settled,
    Failed,
}

impl MatchStatus {
    /// Wire/database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::PendingSettlement => "pending_settlement",
            MatchStatus::Settling => "settling",
            MatchStatus::Settled => "settled",
            MatchStatus::Failed => "failed",
        }
    }

    /// Parse from the wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_settlement" => Some(MatchStatus::PendingSettlement),
            "settling" => Some(MatchStatus::Settling),
            "settled" => Some(MatchStatus::Settled),
            "failed" => Some(MatchStatus::Failed),
            _ => None,
        }
    }
}

/// A recorded pairing between a buy-side and a sell-side transaction.
///
/// Transactions are cited by ID only; they continue to exist even if
/// matches are later reconciled away.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Unique identifier.
    pub id: MatchId,
    /// Cycle that produced this match.
    pub cycle_id: CycleId,
    /// NGN->CNY side transaction.
    pub buy_transaction_id: TransactionId,
    /// CNY->NGN side transaction.
    pub sell_transaction_id: TransactionId,
    /// Kind of match.
    pub match_type: MatchType,
    /// Amount paired off in this record.
    pub matched_amount: Decimal,
    /// Exchange rate recorded for the pairing (4 dp).
    pub matched_rate: Decimal,
    /// Settlement lifecycle state.
    pub status: MatchStatus,
    /// External settlement reference, once settled.
    pub settlement_reference: Option<String>,
    pub matched_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl MatchRecord {
    /// Create a new pending-settlement match record.
    pub fn new(
        cycle_id: CycleId,
        buy_transaction_id: TransactionId,
        sell_transaction_id: TransactionId,
        match_type: MatchType,
        matched_amount: Decimal,
        matched_rate: Decimal,
    ) -> Self {
        Self {
            id: MatchId::new(),
            cycle_id,
            buy_transaction_id,
            sell_transaction_id,
            match_type,
            matched_amount,
            matched_rate,
            status: MatchStatus::PendingSettlement,
            settlement_reference: None,
            matched_at: Utc::now(),
            settled_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_match_is_pending_settlement() {
        let m = MatchRecord::new(
            CycleId::for_instant(Utc::now()),
            TransactionId::new(),
            TransactionId::new(),
            MatchType::Exact,
            dec!(1000000),
            dec!(213.7931),
        );
        assert_eq!(m.status, MatchStatus::PendingSettlement);
        assert!(m.settled_at.is_none());
    }

    #[test]
    fn test_match_type_round_trip() {
        for mt in [MatchType::Exact, MatchType::Multi, MatchType::Partial] {
            assert_eq!(MatchType::parse(mt.as_str()), Some(mt));
        }
        assert_eq!(MatchType::parse("fuzzy"), None);
    }
}
