//! Priority score calculation.
//!
//! Pure scoring that decides matching order: longer waits, larger
//! amounts, and higher KYC tiers rank first. Scores are the one place
//! floats are permitted; all inputs are clamped so the result always
//! lands in [0, 100].

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use tradeflow_common::KycTier;

const WEIGHT_AGE: f64 = 0.40;
const WEIGHT_AMOUNT: f64 = 0.35;
const WEIGHT_TIER: f64 = 0.25;

/// Hours in pool at which the age component saturates.
const AGE_CAP_HOURS: f64 = 24.0;

/// USD amount at which the size component saturates.
const AMOUNT_CAP_USD: f64 = 100_000.0;

/// Compute the composite priority score for pool ordering.
///
/// - age: `min(hours_in_pool / 24, 1) * 100`
/// - amount: `min(amount_usd / 100_000, 1) * 100`
/// - tier: 25 / 60 / 100 for tiers 1–3, 0 when unknown
///
/// Weighted 0.40 / 0.35 / 0.25; the result is clamped to [0, 100].
pub fn priority_score(hours_in_pool: f64, amount_usd: Decimal, kyc_tier: Option<KycTier>) -> f64 {
    let age_score = (hours_in_pool.max(0.0) / AGE_CAP_HOURS).min(1.0) * 100.0;

    let amount = amount_usd.to_f64().unwrap_or(0.0).max(0.0);
    let amount_score = (amount / AMOUNT_CAP_USD).min(1.0) * 100.0;

    let tier_score = match kyc_tier {
        Some(KycTier::Tier1) => 25.0,
        Some(KycTier::Tier2) => 60.0,
        Some(KycTier::Tier3) => 100.0,
        None => 0.0,
    };

    let score = WEIGHT_AGE * age_score + WEIGHT_AMOUNT * amount_score + WEIGHT_TIER * tier_score;
    score.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fresh_small_tier1() {
        // age 0, amount 1k/100k = 1%, tier1 = 25
        let score = priority_score(0.0, dec!(1000), Some(KycTier::Tier1));
        let expected = 0.35 * 1.0 + 0.25 * 25.0;
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_maximum_score() {
        let score = priority_score(24.0, dec!(100000), Some(KycTier::Tier3));
        assert!((score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_age_clamps_at_24_hours() {
        let at_24 = priority_score(24.0, dec!(50000), Some(KycTier::Tier2));
        let at_48 = priority_score(48.0, dec!(50000), Some(KycTier::Tier2));
        assert_eq!(at_24, at_48);
    }

    #[test]
    fn test_amount_clamps_at_100k() {
        let at_100k = priority_score(1.0, dec!(100000), Some(KycTier::Tier2));
        let at_1m = priority_score(1.0, dec!(1000000), Some(KycTier::Tier2));
        assert_eq!(at_100k, at_1m);
    }

    #[test]
    fn test_tier_ordering() {
        let t1 = priority_score(1.0, dec!(1000), Some(KycTier::Tier1));
        let t2 = priority_score(1.0, dec!(1000), Some(KycTier::Tier2));
        let t3 = priority_score(1.0, dec!(1000), Some(KycTier::Tier3));
        let unknown = priority_score(1.0, dec!(1000), None);
        assert!(unknown < t1);
        assert!(t1 < t2);
        assert!(t2 < t3);
    }

    #[test]
    fn test_longer_wait_ranks_higher() {
        let recent = priority_score(0.0, dec!(1000000), Some(KycTier::Tier3));
        let old = priority_score(12.0, dec!(1000000), Some(KycTier::Tier3));
        assert!(old > recent);
    }

    #[test]
    fn test_negative_inputs_clamped() {
        let score = priority_score(-5.0, dec!(-100), Some(KycTier::Tier1));
        assert!((score - 0.25 * 25.0).abs() < 1e-9);
    }

    proptest! {
        /// The score is always within [0, 100] for any input.
        #[test]
        fn prop_score_in_range(
            hours in -100.0f64..10_000.0,
            amount in -1_000_000i64..100_000_000,
            tier in 0u8..5,
        ) {
            let score = priority_score(hours, Decimal::from(amount), KycTier::from_level(tier));
            prop_assert!((0.0..=100.0).contains(&score));
        }
    }
}
