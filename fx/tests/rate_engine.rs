//! Rate engine integration tests against a real Redis.
//!
//! Each test uses its own Redis logical database (9..=15) and skips
//! itself when no server is reachable.

use std::sync::Arc;

use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Config as RedisConfig, Pool as RedisPool, Runtime};
use rust_decimal_macros::dec;

use tradeflow_common::Currency;
use tradeflow_fx::engine::{CIRCUIT_BREAKER_KEY, RATE_CACHE_KEY, RATE_HISTORY_KEY};
use tradeflow_fx::{FxError, MockRateProvider, RateEngine, RateEngineConfig};

fn redis_url(db: u8) -> String {
    let base = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    format!("{base}/{db}")
}

async fn try_pool(db: u8) -> Option<RedisPool> {
    let pool = RedisConfig::from_url(redis_url(db))
        .create_pool(Some(Runtime::Tokio1))
        .ok()?;
    let mut conn = pool.get().await.ok()?;
    deadpool_redis::redis::cmd("FLUSHDB")
        .query_async::<_, ()>(&mut conn)
        .await
        .ok()?;
    Some(pool)
}

fn engine(pool: RedisPool) -> RateEngine {
    RateEngine::new(pool, Arc::new(MockRateProvider::new()), RateEngineConfig::default())
}

#[tokio::test]
async fn rates_are_fetched_and_cached() {
    let Some(pool) = try_pool(9).await else {
        eprintln!("skipping: Redis not available");
        return;
    };
    let engine = engine(pool.clone());

    let rates = engine.get_rates().await.unwrap();
    assert_eq!(rates.ngn_per_usd, dec!(1550.00));
    assert_eq!(rates.cny_per_usd, dec!(7.25));
    assert_eq!(rates.ngn_per_cny, dec!(213.7931));
    assert_eq!(rates.source, "mock");

    // Cached blob present with the fixed key
    let mut conn = pool.get().await.unwrap();
    let cached: Option<String> = conn.get(RATE_CACHE_KEY).await.unwrap();
    assert!(cached.is_some());

    // Second call serves the same cross rate from cache
    let again = engine.get_rates().await.unwrap();
    assert_eq!(again.ngn_per_cny, rates.ngn_per_cny);

    // USD normalisation uses the cached rates
    let usd = engine.amount_to_usd(dec!(1550000), Currency::Ngn).await.unwrap();
    assert_eq!(usd, dec!(1000.00));
}

#[tokio::test]
async fn quote_arithmetic_standard_tier() {
    let Some(pool) = try_pool(10).await else {
        eprintln!("skipping: Redis not available");
        return;
    };
    let engine = engine(pool);

    let quote = engine
        .generate_quote(Currency::Ngn, Currency::Cny, dec!(50000000), dec!(0))
        .await
        .unwrap();

    assert_eq!(quote.fee_tier, "standard");
    assert_eq!(quote.fee_percentage, dec!(2.00));
    assert_eq!(quote.fee_amount, dec!(1000000.00));
    assert_eq!(quote.total_cost, dec!(51000000.00));

    // 50M NGN at 213.7931 NGN/CNY
    assert!(quote.target_amount > dec!(233000));
    assert!(quote.target_amount < dec!(234000));

    // Fee on top pushes the effective rate above mid-market
    assert!(quote.tradeflow_rate > quote.mid_market_rate);

    // Bank fee 2.5M - TradeFlow fee 1M
    assert_eq!(quote.savings_vs_bank, dec!(1500000.00));

    assert!(quote.quote_id.as_str().starts_with("QT-"));
    assert!(quote.target_amount > dec!(0));
    assert!(quote.total_cost > quote.source_amount);
    assert!(quote.quote_valid_until > chrono::Utc::now());
}

#[tokio::test]
async fn quote_cny_to_ngn_and_unsupported_pair() {
    let Some(pool) = try_pool(11).await else {
        eprintln!("skipping: Redis not available");
        return;
    };
    let engine = engine(pool);

    let quote = engine
        .generate_quote(Currency::Cny, Currency::Ngn, dec!(100000), dec!(0))
        .await
        .unwrap();

    // 100K CNY at 213.7931 NGN/CNY
    assert!(quote.target_amount > dec!(21000000));
    assert!(quote.target_amount < dec!(22000000));

    // Trader receives fewer NGN per CNY than mid-market
    assert!(quote.tradeflow_rate < quote.mid_market_rate);

    let result = engine
        .generate_quote(Currency::Usd, Currency::Cny, dec!(1000), dec!(0))
        .await;
    assert!(matches!(result, Err(FxError::UnsupportedPair { .. })));

    let result = engine
        .generate_quote(Currency::Ngn, Currency::Cny, dec!(0), dec!(0))
        .await;
    assert!(matches!(result, Err(FxError::NonPositiveAmount)));
}

#[tokio::test]
async fn fee_minimum_and_platinum_tier() {
    let Some(pool) = try_pool(12).await else {
        eprintln!("skipping: Redis not available");
        return;
    };
    let engine = engine(pool);

    // 100,000 NGN * 2% = 2,000 < minimum 5,000
    let quote = engine
        .generate_quote(Currency::Ngn, Currency::Cny, dec!(100000), dec!(0))
        .await
        .unwrap();
    assert_eq!(quote.fee_amount, dec!(5000.00));

    // $600K monthly volume lands in platinum
    let quote = engine
        .generate_quote(Currency::Ngn, Currency::Cny, dec!(50000000), dec!(600000))
        .await
        .unwrap();
    assert_eq!(quote.fee_tier, "platinum");
    assert_eq!(quote.fee_amount, dec!(375000.00));
}

#[tokio::test]
async fn quote_round_trips_through_store() {
    let Some(pool) = try_pool(13).await else {
        eprintln!("skipping: Redis not available");
        return;
    };
    let engine = engine(pool);

    let quote = engine
        .generate_quote(Currency::Ngn, Currency::Cny, dec!(1000000), dec!(0))
        .await
        .unwrap();

    let loaded = engine
        .get_quote(quote.quote_id.as_str())
        .await
        .unwrap()
        .expect("quote should still be stored");
    assert_eq!(loaded.fee_amount, quote.fee_amount);
    assert_eq!(loaded.target_amount, quote.target_amount);

    assert!(engine.get_quote("QT-doesnotexist").await.unwrap().is_none());
}

#[tokio::test]
async fn circuit_breaker_opens_on_large_movement() {
    let Some(pool) = try_pool(14).await else {
        eprintln!("skipping: Redis not available");
        return;
    };
    let engine = engine(pool.clone());

    // Seed history with a 5% jump inside the window, then force a
    // cache-miss fetch so the breaker is evaluated.
    let mut conn = pool.get().await.unwrap();
    let now = chrono::Utc::now().timestamp();
    conn.zadd::<_, _, _, ()>(RATE_HISTORY_KEY, "200.00", now - 60)
        .await
        .unwrap();
    conn.zadd::<_, _, _, ()>(RATE_HISTORY_KEY, "210.00", now - 30)
        .await
        .unwrap();

    engine.get_rates().await.unwrap();

    assert!(engine.is_circuit_breaker_open().await.unwrap());
    let flag: Option<String> = conn.get(CIRCUIT_BREAKER_KEY).await.unwrap();
    assert!(flag.is_some());

    // Quoting fails fast while open
    let result = engine
        .generate_quote(Currency::Ngn, Currency::Cny, dec!(1000000), dec!(0))
        .await;
    assert!(matches!(result, Err(FxError::CircuitBreakerOpen)));
}

#[tokio::test]
async fn circuit_breaker_stays_closed_on_small_movement() {
    let Some(pool) = try_pool(15).await else {
        eprintln!("skipping: Redis not available");
        return;
    };
    let engine = engine(pool.clone());

    let mut conn = pool.get().await.unwrap();
    let now = chrono::Utc::now().timestamp();
    // 213.7931 mock cross rate lands within 3% of these
    conn.zadd::<_, _, _, ()>(RATE_HISTORY_KEY, "213.79", now - 60)
        .await
        .unwrap();
    conn.zadd::<_, _, _, ()>(RATE_HISTORY_KEY, "215.00", now - 30)
        .await
        .unwrap();

    engine.get_rates().await.unwrap();

    assert!(!engine.is_circuit_breaker_open().await.unwrap());
}
