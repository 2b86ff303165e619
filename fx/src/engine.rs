//! Rate engine: cached cross rates, quote minting, circuit breaker.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::Pool as RedisPool;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use tradeflow_common::{quantize_amount, quantize_rate, Currency, QuoteId};

use crate::error::{FxError, FxResult};
use crate::provider::RateProvider;
use crate::quote::Quote;
use crate::tiers::FeeTier;

/// Cache key for the USD-anchored rates blob.
pub const RATE_CACHE_KEY: &str = "fx_rates:USD";

/// Rolling history of NGN/CNY cross rates, scored by epoch seconds.
pub const RATE_HISTORY_KEY: &str = "rate_history:NGN_CNY";

/// Presence flag set while quoting is paused.
pub const CIRCUIT_BREAKER_KEY: &str = "circuit_breaker:rates";

/// Key prefix for stored quotes.
pub const QUOTE_KEY_PREFIX: &str = "quote:";

/// Minimum fee charged on any quote, in NGN.
pub const MIN_FEE_NGN: Decimal = Decimal::from_parts(5_000, 0, 0, false, 0);

/// Typical bank corridor fee used for the savings estimate (5%).
const BANK_FEE_PCT: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// Rate movement beyond this percentage within the window opens the breaker.
const BREAKER_THRESHOLD_PCT: Decimal = Decimal::from_parts(30, 0, 0, false, 1);

/// History window the breaker looks at.
const BREAKER_WINDOW_SECS: i64 = 3600;

/// How long the breaker stays open once tripped.
const BREAKER_COOLDOWN_SECS: u64 = 900;

/// Configuration for the rate engine.
#[derive(Debug, Clone)]
pub struct RateEngineConfig {
    /// TTL for the cached rates blob.
    pub cache_ttl_secs: u64,
    /// TTL for minted quotes.
    pub quote_ttl_secs: u64,
}

impl Default for RateEngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 60,
            quote_ttl_secs: 60,
        }
    }
}

/// Current rates served to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentRates {
    /// NGN per 1 USD.
    pub ngn_per_usd: Decimal,
    /// CNY per 1 USD.
    pub cny_per_usd: Decimal,
    /// NGN per 1 CNY cross rate (4 dp).
    pub ngn_per_cny: Decimal,
    /// When the rates were fetched.
    pub timestamp: DateTime<Utc>,
    /// Provider that produced them.
    pub source: String,
}

/// The rate engine.
///
/// All mutable state (cache, history, breaker flag, quotes) lives in the
/// key-value store with explicit TTLs so every process observes the same
/// view.
pub struct RateEngine {
    redis: RedisPool,
    provider: Arc<dyn RateProvider>,
    config: RateEngineConfig,
}

impl RateEngine {
    /// Create a new rate engine.
    pub fn new(redis: RedisPool, provider: Arc<dyn RateProvider>, config: RateEngineConfig) -> Self {
        Self {
            redis,
            provider,
            config,
        }
    }

    /// Get current rates, serving from cache when fresh.
    ///
    /// On a cache miss the provider is consulted, the NGN/CNY cross rate
    /// is computed and cached, and the new rate is appended to the
    /// rolling history (which may trip the circuit breaker).
    #[instrument(skip(self))]
    pub async fn get_rates(&self) -> FxResult<CurrentRates> {
        let mut conn = self.redis.get().await?;

        if let Some(cached) = conn.get::<_, Option<String>>(RATE_CACHE_KEY).await? {
            debug!("Serving rates from cache");
            return Ok(serde_json::from_str(&cached)?);
        }

        let fetched = self.provider.fetch_rates().await?;
        if fetched.cny_per_usd <= Decimal::ZERO {
            return Err(FxError::RateNotAvailable(
                "CNY rate must be positive".to_string(),
            ));
        }

        let cross = quantize_rate(fetched.ngn_per_usd / fetched.cny_per_usd);
        let rates = CurrentRates {
            ngn_per_usd: fetched.ngn_per_usd,
            cny_per_usd: fetched.cny_per_usd,
            ngn_per_cny: cross,
            timestamp: Utc::now(),
            source: self.provider.name().to_string(),
        };

        let blob = serde_json::to_string(&rates)?;
        conn.set_ex::<_, _, ()>(RATE_CACHE_KEY, blob, self.config.cache_ttl_secs)
            .await?;

        info!(
            ngn_per_usd = %rates.ngn_per_usd,
            cny_per_usd = %rates.cny_per_usd,
            ngn_per_cny = %rates.ngn_per_cny,
            source = %rates.source,
            "Fetched fresh rates"
        );

        self.record_rate(cross).await?;

        Ok(rates)
    }

    /// Check whether the circuit breaker is open.
    pub async fn is_circuit_breaker_open(&self) -> FxResult<bool> {
        let mut conn = self.redis.get().await?;
        let flag: Option<String> = conn.get(CIRCUIT_BREAKER_KEY).await?;
        Ok(flag.is_some())
    }

    /// Append a cross rate to the rolling history and evaluate the breaker.
    ///
    /// History older than one hour is trimmed first; if the remaining
    /// window moved more than the threshold, the breaker opens for the
    /// cooldown period.
    async fn record_rate(&self, rate: Decimal) -> FxResult<()> {
        let mut conn = self.redis.get().await?;
        let now_epoch = Utc::now().timestamp();

        conn.zadd::<_, _, _, ()>(RATE_HISTORY_KEY, rate.to_string(), now_epoch)
            .await?;

        let cutoff = now_epoch - BREAKER_WINDOW_SECS;
        deadpool_redis::redis::cmd("ZREMRANGEBYSCORE")
            .arg(RATE_HISTORY_KEY)
            .arg(0)
            .arg(cutoff)
            .query_async::<_, ()>(&mut conn)
            .await?;

        let members: Vec<String> = conn.zrange(RATE_HISTORY_KEY, 0, -1).await?;
        let rates: Vec<Decimal> = members
            .iter()
            .filter_map(|m| Decimal::from_str(m).ok())
            .collect();

        if rates.len() < 2 {
            return Ok(());
        }

        let min = rates.iter().min().copied().unwrap_or(rate);
        let max = rates.iter().max().copied().unwrap_or(rate);
        if min <= Decimal::ZERO {
            return Ok(());
        }

        let movement_pct = (max - min) / min * Decimal::ONE_HUNDRED;
        if movement_pct > BREAKER_THRESHOLD_PCT {
            warn!(
                movement_pct = %movement_pct,
                min = %min,
                max = %max,
                "Rate movement exceeded threshold; opening circuit breaker"
            );
            let reason = serde_json::json!({
                "reason": "rate_movement",
                "movement_pct": movement_pct.to_string(),
                "opened_at": Utc::now().to_rfc3339(),
            });
            conn.set_ex::<_, _, ()>(
                CIRCUIT_BREAKER_KEY,
                reason.to_string(),
                BREAKER_COOLDOWN_SECS,
            )
            .await?;
        }

        Ok(())
    }

    /// Convert an amount to USD at the current cached rates.
    pub async fn amount_to_usd(&self, amount: Decimal, currency: Currency) -> FxResult<Decimal> {
        let rates = self.get_rates().await?;
        let usd = match currency {
            Currency::Usd => amount,
            Currency::Ngn => amount / rates.ngn_per_usd,
            Currency::Cny => amount / rates.cny_per_usd,
        };
        Ok(quantize_amount(usd))
    }

    /// Generate a rate quote for a specific amount and direction.
    ///
    /// Fails with [`FxError::CircuitBreakerOpen`] while the breaker is
    /// open, before any rate lookup.
    #[instrument(skip(self), fields(source = %source, target = %target, amount = %amount))]
    pub async fn generate_quote(
        &self,
        source: Currency,
        target: Currency,
        amount: Decimal,
        monthly_volume_usd: Decimal,
    ) -> FxResult<Quote> {
        if self.is_circuit_breaker_open().await? {
            return Err(FxError::CircuitBreakerOpen);
        }

        if !matches!(
            (source, target),
            (Currency::Ngn, Currency::Cny) | (Currency::Cny, Currency::Ngn)
        ) {
            return Err(FxError::UnsupportedPair {
                from: source.code().to_string(),
                target: target.code().to_string(),
            });
        }

        if amount <= Decimal::ZERO {
            return Err(FxError::NonPositiveAmount);
        }

        let rates = self.get_rates().await?;
        let mid = rates.ngn_per_cny;

        let tier = FeeTier::for_monthly_volume(monthly_volume_usd);
        let fee_pct = tier.percentage();

        let min_fee = match source {
            Currency::Ngn => MIN_FEE_NGN,
            _ => quantize_amount(MIN_FEE_NGN / mid),
        };
        let fee_amount = quantize_amount((amount * fee_pct / Decimal::ONE_HUNDRED).max(min_fee));

        let target_amount = match source {
            Currency::Ngn => quantize_amount(amount / mid),
            _ => quantize_amount(amount * mid),
        };

        let total_cost = quantize_amount(amount + fee_amount);

        // Effective rate expressed as NGN per CNY in both directions:
        // paying NGN the fee raises it above mid, paying CNY it lands below.
        let tradeflow_rate = match source {
            Currency::Ngn => quantize_rate(total_cost / target_amount),
            _ => quantize_rate(target_amount / total_cost),
        };

        let bank_fee = amount * BANK_FEE_PCT / Decimal::ONE_HUNDRED;
        let savings_vs_bank = quantize_amount((bank_fee - fee_amount).max(Decimal::ZERO));

        let quote = Quote {
            quote_id: QuoteId::generate(),
            source_currency: source,
            target_currency: target,
            source_amount: amount,
            mid_market_rate: mid,
            tradeflow_rate,
            fee_tier: tier.label().to_string(),
            fee_percentage: fee_pct,
            fee_amount,
            target_amount,
            total_cost,
            savings_vs_bank,
            quote_valid_until: Utc::now() + Duration::seconds(self.config.quote_ttl_secs as i64),
        };

        let mut conn = self.redis.get().await?;
        let key = format!("{QUOTE_KEY_PREFIX}{}", quote.quote_id);
        conn.set_ex::<_, _, ()>(key, serde_json::to_string(&quote)?, self.config.quote_ttl_secs)
            .await?;

        info!(
            quote_id = %quote.quote_id,
            fee_tier = %quote.fee_tier,
            fee_amount = %quote.fee_amount,
            "Quote generated"
        );

        Ok(quote)
    }

    /// Look up a stored quote; `None` once it has expired.
    pub async fn get_quote(&self, quote_id: &str) -> FxResult<Option<Quote>> {
        let mut conn = self.redis.get().await?;
        let key = format!("{QUOTE_KEY_PREFIX}{quote_id}");
        let raw: Option<String> = conn.get(key).await?;
        match raw {
            Some(blob) => Ok(Some(serde_json::from_str(&blob)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MOCK_CNY_PER_USD, MOCK_NGN_PER_USD};
    use rust_decimal_macros::dec;

    #[test]
    fn test_mock_cross_rate_quantization() {
        // 1550 / 7.25 = 213.79310... -> 213.7931 at 4 dp half-up
        let cross = quantize_rate(MOCK_NGN_PER_USD / MOCK_CNY_PER_USD);
        assert_eq!(cross, dec!(213.7931));
    }

    #[test]
    fn test_breaker_threshold_arithmetic() {
        // 200.00 -> 210.00 is a 5% move: must exceed the 3% threshold
        let movement = (dec!(210.00) - dec!(200.00)) / dec!(200.00) * Decimal::ONE_HUNDRED;
        assert!(movement > BREAKER_THRESHOLD_PCT);

        // 200.00 -> 205.99 is 2.995%: must not trip it
        let movement = (dec!(205.99) - dec!(200.00)) / dec!(200.00) * Decimal::ONE_HUNDRED;
        assert!(movement <= BREAKER_THRESHOLD_PCT);
    }

    #[test]
    fn test_min_fee_constant() {
        assert_eq!(MIN_FEE_NGN, dec!(5000));
    }
}

// Quote arithmetic is exercised end-to-end (against a live Redis) in
// tests/rate_engine.rs; the pure pieces are covered above and in tiers.rs.
