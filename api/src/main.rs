//! TradeFlow service binary.
//!
//! Wires the database, Redis, rate engine, matching engine, and HTTP
//! surface together, reconciles the pool from the database, and starts
//! the background loops before serving.

use std::sync::Arc;

use anyhow::Context;
use deadpool_redis::{Config as RedisConfig, Runtime};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tradeflow_api::{router, AppConfig, AppState};
use tradeflow_crypto::FieldCipher;
use tradeflow_engine::{
    scheduler, EngineConfig, ExpiryWorker, LogDispatcher, MatchingEngine, NotificationDispatcher,
    PaymentIngestor, TransactionService,
};
use tradeflow_fx::{HttpRateProvider, MockRateProvider, RateEngine, RateEngineConfig, RateProvider};
use tradeflow_pool::PoolStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    config.validate().map_err(anyhow::Error::msg)?;
    let engine_config = EngineConfig::from_env();
    engine_config.validate().map_err(anyhow::Error::msg)?;

    let db = tradeflow_db::connect(&config.database_url, config.database_pool_size)
        .await
        .context("connecting to Postgres")?;
    tradeflow_db::migrate(&db).await.context("running migrations")?;

    let redis = RedisConfig::from_url(config.redis_url.clone())
        .create_pool(Some(Runtime::Tokio1))
        .context("creating Redis pool")?;

    let provider: Arc<dyn RateProvider> = if config.fx_rate_mock {
        Arc::new(MockRateProvider::new())
    } else {
        Arc::new(HttpRateProvider::new(
            config.fx_rate_api_url.clone(),
            config.fx_provider_timeout_secs,
        )?)
    };
    let rates = Arc::new(RateEngine::new(
        redis.clone(),
        provider,
        RateEngineConfig {
            cache_ttl_secs: config.fx_cache_ttl_secs,
            quote_ttl_secs: config.fx_quote_ttl_secs,
        },
    ));

    let pool = PoolStore::new(redis);
    let notifier: Arc<dyn NotificationDispatcher> = Arc::new(LogDispatcher);
    let cipher = FieldCipher::from_secret(&config.field_encryption_secret)?;

    let engine = Arc::new(MatchingEngine::new(
        db.clone(),
        pool.clone(),
        notifier.clone(),
        engine_config.clone(),
    ));
    let ingestor = Arc::new(PaymentIngestor::new(
        db.clone(),
        pool.clone(),
        rates.clone(),
        notifier.clone(),
        engine_config.clone(),
    ));
    let transactions = Arc::new(TransactionService::new(
        db.clone(),
        pool.clone(),
        rates.clone(),
        cipher,
    ));
    let expiry = Arc::new(ExpiryWorker::new(
        db.clone(),
        notifier.clone(),
        engine_config.clone(),
    ));

    // The database is the system of record; rebuild the volatile pool
    // before the first cycle.
    let restored = engine.reconcile_pool().await?;
    if restored > 0 {
        info!(restored, "Volatile pool rebuilt from database");
    }

    tokio::spawn(scheduler::run_matching_loop(
        engine.clone(),
        engine_config.cycle_interval(),
    ));
    tokio::spawn(scheduler::run_expiry_loop(
        expiry,
        engine_config.expiry_sweep_interval(),
    ));

    let state = AppState {
        db,
        pool,
        rates,
        engine,
        ingestor,
        transactions,
        dev_mode: config.is_development(),
    };

    let addr = format!("{}:{}", config.listen_addr, config.listen_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "TradeFlow server listening");

    axum::serve(listener, router(state))
        .await
        .context("serving")?;

    Ok(())
}
