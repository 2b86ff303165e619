//! Transaction entity and lifecycle state machine.
//!
//! Every status change in the system goes through [`Transaction::transition_to`];
//! the allowed moves are exposed as data so property tests can enumerate the
//! table. Lifecycle timestamps are stamped automatically on the relevant
//! transitions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{MatchId, Reference, TraderId, TransactionId};

/// Direction of a cross-border payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    NgnToCny,
    CnyToNgn,
}

impl Direction {
    /// Wire/database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::NgnToCny => "ngn_to_cny",
            Direction::CnyToNgn => "cny_to_ngn",
        }
    }

    /// Parse from the wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ngn_to_cny" => Some(Direction::NgnToCny),
            "cny_to_ngn" => Some(Direction::CnyToNgn),
            _ => None,
        }
    }

    /// The opposite direction.
    pub fn opposite(&self) -> Self {
        match self {
            Direction::NgnToCny => Direction::CnyToNgn,
            Direction::CnyToNgn => Direction::NgnToCny,
        }
    }

    /// Currency the trader funds the transaction in.
    pub fn source_currency(&self) -> crate::Currency {
        match self {
            Direction::NgnToCny => crate::Currency::Ngn,
            Direction::CnyToNgn => crate::Currency::Cny,
        }
    }

    /// Currency the counterparty receives.
    pub fn target_currency(&self) -> crate::Currency {
        self.opposite().source_currency()
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transaction lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Created, awaiting funding.
    Initiated,
    /// Payment received, eligible for the matching pool.
    Funded,
    /// In an active matching cycle.
    Matching,
    /// Fully matched with a counterparty.
    Matched,
    /// Partially matched; remainder may re-enter the pool.
    PartialMatched,
    /// Match recorded, awaiting settlement execution.
    PendingSettlement,
    /// Settlement in progress.
    Settling,
    /// Settled and complete.
    Completed,
    /// Settlement failed.
    Failed,
    /// Funds returned to the trader.
    Refunded,
    /// Cancelled before matching.
    Cancelled,
    /// Timed out (unfunded or unmatched past the deadline).
    Expired,
}

impl TransactionStatus {
    /// All states, in declaration order.
    pub const ALL: [TransactionStatus; 12] = [
        TransactionStatus::Initiated,
        TransactionStatus::Funded,
        TransactionStatus::Matching,
        TransactionStatus::Matched,
        TransactionStatus::PartialMatched,
        TransactionStatus::PendingSettlement,
        TransactionStatus::Settling,
        TransactionStatus::Completed,
        TransactionStatus::Failed,
        TransactionStatus::Refunded,
        TransactionStatus::Cancelled,
        TransactionStatus::Expired,
    ];

    /// Wire/database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Initiated => "initiated",
            TransactionStatus::Funded => "funded",
            TransactionStatus::Matching => "matching",
            TransactionStatus::Matched => "matched",
            TransactionStatus::PartialMatched => "partial_matched",
            TransactionStatus::PendingSettlement => "pending_settlement",
            TransactionStatus::Settling => "settling",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Expired => "expired",
        }
    }

    /// Parse from the wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.as_str() == s)
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }

    /// Get valid next states from the current state.
    pub fn valid_transitions(&self) -> &'static [TransactionStatus] {
        match self {
            TransactionStatus::Initiated => &[
                TransactionStatus::Funded,
                TransactionStatus::Cancelled,
                TransactionStatus::Expired,
            ],
            TransactionStatus::Funded => &[
                TransactionStatus::Matching,
                TransactionStatus::Cancelled,
                TransactionStatus::Expired,
            ],
            TransactionStatus::Matching => &[
                TransactionStatus::Matched,
                TransactionStatus::PartialMatched,
                TransactionStatus::Expired,
            ],
            TransactionStatus::Matched => &[TransactionStatus::PendingSettlement],
            TransactionStatus::PartialMatched => &[
                TransactionStatus::PendingSettlement,
                TransactionStatus::Matching,
            ],
            TransactionStatus::PendingSettlement => {
                &[TransactionStatus::Settling, TransactionStatus::Failed]
            }
            TransactionStatus::Settling => {
                &[TransactionStatus::Completed, TransactionStatus::Failed]
            }
            TransactionStatus::Failed => &[TransactionStatus::Refunded],
            TransactionStatus::Expired => &[TransactionStatus::Refunded],
            TransactionStatus::Completed => &[],
            TransactionStatus::Cancelled => &[],
            TransactionStatus::Refunded => &[],
        }
    }

    /// Check if a transition to the given state is valid.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Check whether a status transition is allowed.
pub fn is_valid_transition(from: TransactionStatus, to: TransactionStatus) -> bool {
    from.can_transition_to(to)
}

/// How a matched transaction will ultimately settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementMethod {
    /// Settled internally against a full counterparty match.
    Matched,
    /// Settled internally against a partial match.
    PartialMatched,
    /// Routed to the CIPS corridor after a pool timeout.
    CipsSettled,
}

impl SettlementMethod {
    /// Wire/database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementMethod::Matched => "matched",
            SettlementMethod::PartialMatched => "partial_matched",
            SettlementMethod::CipsSettled => "cips_settled",
        }
    }

    /// Parse from the wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "matched" => Some(SettlementMethod::Matched),
            "partial_matched" => Some(SettlementMethod::PartialMatched),
            "cips_settled" => Some(SettlementMethod::CipsSettled),
            _ => None,
        }
    }
}

/// Error when attempting an invalid state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: TransactionStatus,
    pub to: TransactionStatus,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid transition from {} to {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

impl From<InvalidTransition> for crate::TradeFlowError {
    fn from(e: InvalidTransition) -> Self {
        crate::TradeFlowError::InvalidTransition {
            from: e.from,
            to: e.to,
        }
    }
}

/// A cross-border payment request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier.
    pub id: TransactionId,
    /// Human-readable reference (`TXN-XXXXXXXX`).
    pub reference: Reference,
    /// Owning trader.
    pub trader_id: TraderId,
    /// Payment direction.
    pub direction: Direction,
    /// Amount in the source currency (positive, 2 dp).
    pub source_amount: Decimal,
    /// Amount the counterparty receives, if a rate has been applied.
    pub target_amount: Option<Decimal>,
    /// Exchange rate applied at creation (4 dp).
    pub exchange_rate: Option<Decimal>,
    /// Fee charged on top of the source amount.
    pub fee_amount: Decimal,
    /// Fee percentage applied.
    pub fee_percentage: Decimal,
    /// Counterparty supplier name.
    pub supplier_name: Option<String>,
    /// Counterparty bank name.
    pub supplier_bank: Option<String>,
    /// Encrypted counterparty account number.
    pub supplier_account: Option<String>,
    /// Current lifecycle state.
    pub status: TransactionStatus,
    /// Match this transaction participates in, once matched.
    pub match_id: Option<MatchId>,
    /// How the transaction will settle, once decided.
    pub settlement_method: Option<SettlementMethod>,
    /// Stamped on the INITIATED -> FUNDED transition.
    pub funded_at: Option<DateTime<Utc>>,
    /// Stamped on MATCHED / PARTIAL_MATCHED.
    pub matched_at: Option<DateTime<Utc>>,
    /// Stamped on COMPLETED.
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new transaction in INITIATED with a fresh reference.
    pub fn new(trader_id: TraderId, direction: Direction, source_amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            reference: Reference::generate(),
            trader_id,
            direction,
            source_amount,
            target_amount: None,
            exchange_rate: None,
            fee_amount: Decimal::ZERO,
            fee_percentage: Decimal::ZERO,
            supplier_name: None,
            supplier_bank: None,
            supplier_account: None,
            status: TransactionStatus::Initiated,
            match_id: None,
            settlement_method: None,
            funded_at: None,
            matched_at: None,
            settled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Total amount the trader must deposit to fund this transaction.
    pub fn expected_deposit(&self) -> Decimal {
        self.source_amount + self.fee_amount
    }

    /// Transition to a new status.
    ///
    /// Stamps `funded_at`, `matched_at`, or `settled_at` on the relevant
    /// transitions and bumps `updated_at`.
    pub fn transition_to(
        &mut self,
        new_status: TransactionStatus,
    ) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(new_status) {
            return Err(InvalidTransition {
                from: self.status,
                to: new_status,
            });
        }

        self.status = new_status;

        let now = Utc::now();
        self.updated_at = now;
        match new_status {
            TransactionStatus::Funded => self.funded_at = Some(now),
            TransactionStatus::Matched | TransactionStatus::PartialMatched => {
                self.matched_at = Some(now)
            }
            TransactionStatus::Completed => self.settled_at = Some(now),
            _ => {}
        }

        Ok(())
    }
}
