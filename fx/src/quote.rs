//! Ephemeral rate quotes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tradeflow_common::{Currency, QuoteId};

/// A short-lived rate quote stored only in the key-value store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    /// Quote identifier (`QT-<12 hex>`).
    pub quote_id: QuoteId,
    pub source_currency: Currency,
    pub target_currency: Currency,
    /// Amount in the source currency.
    pub source_amount: Decimal,
    /// Mid-market NGN/CNY cross rate (4 dp).
    pub mid_market_rate: Decimal,
    /// Effective TradeFlow rate including the fee (4 dp, NGN per CNY).
    pub tradeflow_rate: Decimal,
    /// Fee tier label.
    pub fee_tier: String,
    /// Fee percentage applied.
    pub fee_percentage: Decimal,
    /// Fee amount in the source currency (2 dp).
    pub fee_amount: Decimal,
    /// Amount delivered in the target currency at mid-market (2 dp).
    pub target_amount: Decimal,
    /// Source amount plus fee (2 dp).
    pub total_cost: Decimal,
    /// Estimated savings versus a 5% bank corridor fee (2 dp).
    pub savings_vs_bank: Decimal,
    /// Expiry instant; the quote is unusable afterwards.
    pub quote_valid_until: DateTime<Utc>,
}

impl Quote {
    /// Check if the quote is still valid at the given instant.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        at < self.quote_valid_until
    }
}
