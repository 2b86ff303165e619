//! Currency and decimal rounding helpers.
//!
//! All monetary arithmetic uses [`rust_decimal::Decimal`]; floats are
//! reserved for priority scores. Monetary amounts are quantized to 2
//! decimal places and exchange rates to 4, half-up.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currencies handled by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Ngn,
    Cny,
    Usd,
}

impl Currency {
    /// Get the ISO 4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Ngn => "NGN",
            Currency::Cny => "CNY",
            Currency::Usd => "USD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Currency {
    type Err = UnsupportedCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NGN" => Ok(Currency::Ngn),
            "CNY" => Ok(Currency::Cny),
            "USD" => Ok(Currency::Usd),
            other => Err(UnsupportedCurrency(other.to_string())),
        }
    }
}

/// Error for currency codes outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedCurrency(pub String);

impl fmt::Display for UnsupportedCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unsupported currency: {}", self.0)
    }
}

impl std::error::Error for UnsupportedCurrency {}

/// Decimal places for monetary amounts.
pub const AMOUNT_DP: u32 = 2;

/// Decimal places for exchange rates.
pub const RATE_DP: u32 = 4;

/// Quantize a monetary amount to 2 decimal places, half-up.
pub fn quantize_amount(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Quantize an exchange rate to 4 decimal places, half-up.
pub fn quantize_rate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(RATE_DP, RoundingStrategy::MidpointAwayFromZero)
}
