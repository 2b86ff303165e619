//! Monthly-volume fee tiers.
//!
//! Thresholds are on the trader's rolling monthly USD volume; the first
//! matching tier wins.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A fee tier with its percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeTier {
    Platinum,
    Gold,
    Silver,
    Standard,
}

impl FeeTier {
    /// Tier label used in quotes.
    pub fn label(&self) -> &'static str {
        match self {
            FeeTier::Platinum => "platinum",
            FeeTier::Gold => "gold",
            FeeTier::Silver => "silver",
            FeeTier::Standard => "standard",
        }
    }

    /// Fee percentage for this tier.
    pub fn percentage(&self) -> Decimal {
        match self {
            FeeTier::Platinum => Decimal::new(75, 2),  // 0.75
            FeeTier::Gold => Decimal::new(100, 2),     // 1.00
            FeeTier::Silver => Decimal::new(150, 2),   // 1.50
            FeeTier::Standard => Decimal::new(200, 2), // 2.00
        }
    }

    /// Select the tier for a monthly USD volume.
    pub fn for_monthly_volume(volume_usd: Decimal) -> Self {
        if volume_usd >= Decimal::from(500_000) {
            FeeTier::Platinum
        } else if volume_usd >= Decimal::from(200_000) {
            FeeTier::Gold
        } else if volume_usd >= Decimal::from(50_000) {
            FeeTier::Silver
        } else {
            FeeTier::Standard
        }
    }
}
