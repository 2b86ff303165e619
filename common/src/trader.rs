//! Trader entity, KYC tiers, and monthly volume limits.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::TraderId;

/// KYC verification tier. The tier drives the monthly USD volume limit
/// and contributes to matching priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycTier {
    Tier1,
    Tier2,
    Tier3,
}

impl KycTier {
    /// Numeric tier value (1..=3).
    pub fn level(&self) -> u8 {
        match self {
            KycTier::Tier1 => 1,
            KycTier::Tier2 => 2,
            KycTier::Tier3 => 3,
        }
    }

    /// Build from a numeric tier value.
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(KycTier::Tier1),
            2 => Some(KycTier::Tier2),
            3 => Some(KycTier::Tier3),
            _ => None,
        }
    }

    /// Monthly USD volume limit for this tier.
    pub fn monthly_limit_usd(&self) -> Decimal {
        match self {
            KycTier::Tier1 => Decimal::from(5_000),
            KycTier::Tier2 => Decimal::from(50_000),
            KycTier::Tier3 => Decimal::from(500_000),
        }
    }
}

/// Trader account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Pending,
    Active,
    Suspended,
    Blocked,
}

impl AccountStatus {
    /// Wire/database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "pending",
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Blocked => "blocked",
        }
    }

    /// Parse from the wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AccountStatus::Pending),
            "active" => Some(AccountStatus::Active),
            "suspended" => Some(AccountStatus::Suspended),
            "blocked" => Some(AccountStatus::Blocked),
            _ => None,
        }
    }
}

/// A registered trader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trader {
    /// Unique identifier.
    pub id: TraderId,
    /// Phone number in E.164 format.
    pub phone: String,
    /// Registered business name.
    pub business_name: Option<String>,
    /// KYC verification tier.
    pub kyc_tier: KycTier,
    /// Monthly USD volume limit (tier-driven).
    pub monthly_limit_usd: Decimal,
    /// Monthly USD volume already used.
    pub monthly_used_usd: Decimal,
    /// Hashed transaction PIN.
    pub pin_hash: Option<String>,
    /// Account status.
    pub account_status: AccountStatus,
    /// Encrypted Bank Verification Number.
    pub bvn_encrypted: Option<String>,
    /// Encrypted National Identification Number.
    pub nin_encrypted: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trader {
    /// Create a new trader at tier 1 with a zeroed monthly counter.
    pub fn new(phone: impl Into<String>) -> Self {
        let now = Utc::now();
        let tier = KycTier::Tier1;
        Self {
            id: TraderId::new(),
            phone: phone.into(),
            business_name: None,
            kyc_tier: tier,
            monthly_limit_usd: tier.monthly_limit_usd(),
            monthly_used_usd: Decimal::ZERO,
            pin_hash: None,
            account_status: AccountStatus::Pending,
            bvn_encrypted: None,
            nin_encrypted: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether adding `amount_usd` would exceed the monthly limit.
    pub fn exceeds_monthly_limit(&self, amount_usd: Decimal) -> bool {
        self.monthly_used_usd + amount_usd > self.monthly_limit_usd
    }

    /// Remaining monthly USD headroom.
    pub fn monthly_remaining_usd(&self) -> Decimal {
        (self.monthly_limit_usd - self.monthly_used_usd).max(Decimal::ZERO)
    }

    /// Promote the trader to a new tier, raising the monthly limit.
    pub fn set_kyc_tier(&mut self, tier: KycTier) {
        self.kyc_tier = tier;
        self.monthly_limit_usd = tier.monthly_limit_usd();
        self.updated_at = Utc::now();
    }
}
