//! End-to-end matching cycle tests against real Postgres and Redis.
//!
//! Requires `DATABASE_URL` to point at a disposable test database and a
//! Redis on `REDIS_URL` (or localhost); every test skips itself when
//! either service is unreachable. Tests share Redis database 0 and are
//! serialized through a mutex.

use std::sync::Arc;

use chrono::{Duration, Utc};
use deadpool_redis::{Config as RedisConfig, Pool as RedisPool, Runtime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use tradeflow_common::{
    Direction, PoolEntry, SettlementMethod, Trader, Transaction, TransactionStatus,
};
use tradeflow_db::{MatchRepo, PoolEntryRepo, TraderRepo, TransactionRepo};
use tradeflow_engine::{
    CycleOutcome, EngineConfig, ExpiryWorker, IngestOutcome, MatchingEngine, PaymentClassification,
    PaymentIngestor, RecordingDispatcher, WebhookPayment,
};
use tradeflow_fx::{MockRateProvider, RateEngine, RateEngineConfig};
use tradeflow_pool::store::EntryData;
use tradeflow_pool::PoolStore;

static SERIAL: Mutex<()> = Mutex::const_new(());

struct Harness {
    db: PgPool,
    redis: RedisPool,
    pool: PoolStore,
    notifier: Arc<RecordingDispatcher>,
    engine: MatchingEngine,
}

async fn try_harness() -> Option<Harness> {
    let database_url = std::env::var("DATABASE_URL").ok()?;
    let db = tradeflow_db::connect(&database_url, 5).await.ok()?;
    tradeflow_db::migrate(&db).await.ok()?;

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let redis = RedisConfig::from_url(format!("{redis_url}/0"))
        .create_pool(Some(Runtime::Tokio1))
        .ok()?;
    let mut conn = redis.get().await.ok()?;
    deadpool_redis::redis::cmd("FLUSHDB")
        .query_async::<_, ()>(&mut conn)
        .await
        .ok()?;

    let pool = PoolStore::new(redis.clone());
    let notifier = Arc::new(RecordingDispatcher::new());
    let engine = MatchingEngine::new(
        db.clone(),
        pool.clone(),
        notifier.clone(),
        EngineConfig::default(),
    );

    Some(Harness {
        db,
        redis,
        pool,
        notifier,
        engine,
    })
}

fn unique_phone() -> String {
    let digits = Uuid::new_v4().simple().to_string();
    format!("+234{}", &digits[..12])
}

async fn seed_trader(db: &PgPool) -> Trader {
    let trader = Trader::new(unique_phone());
    TraderRepo::insert(db, &trader).await.unwrap();
    trader
}

/// A FUNDED transaction plus its pool presence (DB row and store entry).
async fn seed_pooled_txn(
    h: &Harness,
    trader: &Trader,
    direction: Direction,
    amount: Decimal,
    score: f64,
) -> (Transaction, PoolEntry) {
    let mut txn = Transaction::new(trader.id, direction, amount);
    txn.exchange_rate = Some(dec!(213.7931));
    txn.transition_to(TransactionStatus::Funded).unwrap();
    TransactionRepo::insert(&h.db, &txn).await.unwrap();

    let entry = PoolEntry::new(
        txn.id,
        trader.id,
        direction,
        amount,
        Decimal::from_f64_retain(score).unwrap().round_dp(4),
        24,
    );
    PoolEntryRepo::insert(&h.db, &entry).await.unwrap();

    let data = EntryData {
        transaction_id: txn.id.to_string(),
        reference: txn.reference.as_str().to_string(),
        source_amount: amount,
        target_amount: None,
        direction,
        currency: direction.source_currency(),
        trader_id: trader.id.to_string(),
        entered_pool_at: entry.entered_pool_at,
        expires_at: entry.expires_at,
    };
    h.pool.add(&entry.id.to_string(), &data, score).await.unwrap();

    (txn, entry)
}

async fn run_completed_cycle(h: &Harness) -> tradeflow_engine::CycleReport {
    match h.engine.run_cycle().await.unwrap() {
        CycleOutcome::Completed(report) => report,
        CycleOutcome::Skipped => panic!("cycle unexpectedly skipped"),
    }
}

#[tokio::test]
async fn exact_pair_matches_and_clears_pool() {
    let _guard = SERIAL.lock().await;
    let Some(h) = try_harness().await else {
        eprintln!("skipping: Postgres/Redis not available");
        return;
    };

    let buyer = seed_trader(&h.db).await;
    let seller = seed_trader(&h.db).await;
    let (buy_txn, buy_entry) =
        seed_pooled_txn(&h, &buyer, Direction::NgnToCny, dec!(1000000), 90.0).await;
    let (sell_txn, sell_entry) =
        seed_pooled_txn(&h, &seller, Direction::CnyToNgn, dec!(1000000), 90.0).await;

    let report = run_completed_cycle(&h).await;
    assert_eq!(report.exact_matches, 1);
    assert_eq!(report.multi_matches, 0);
    assert_eq!(report.partial_matches, 0);
    assert_eq!(report.total_matched_volume, dec!(1000000));
    assert_eq!(report.pool_size_start.total, 2);
    assert_eq!(report.matching_efficiency, dec!(100.00));

    // Both transactions end MATCHED with the match linked
    let buy_after = TransactionRepo::find_by_id(&h.db, buy_txn.id)
        .await
        .unwrap()
        .unwrap();
    let sell_after = TransactionRepo::find_by_id(&h.db, sell_txn.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(buy_after.status, TransactionStatus::Matched);
    assert_eq!(sell_after.status, TransactionStatus::Matched);
    assert!(buy_after.matched_at.is_some());
    assert_eq!(buy_after.settlement_method, Some(SettlementMethod::Matched));
    assert_eq!(buy_after.match_id, sell_after.match_id);
    assert!(buy_after.match_id.is_some());

    // One exact record, opposite directions cited correctly
    let records = MatchRepo::find_for_transaction(&h.db, buy_txn.id)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].buy_transaction_id, buy_txn.id);
    assert_eq!(records[0].sell_transaction_id, sell_txn.id);
    assert_eq!(records[0].matched_amount, dec!(1000000));

    // Pool cleared on both layers
    assert!(h.pool.get_entry(&buy_entry.id.to_string()).await.unwrap().is_none());
    assert!(h.pool.get_entry(&sell_entry.id.to_string()).await.unwrap().is_none());
    assert!(PoolEntryRepo::find_active_by_transaction(&h.db, buy_txn.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn multi_leg_fill_produces_one_record_per_leg() {
    let _guard = SERIAL.lock().await;
    let Some(h) = try_harness().await else {
        eprintln!("skipping: Postgres/Redis not available");
        return;
    };

    let buyer = seed_trader(&h.db).await;
    let (target_txn, _) =
        seed_pooled_txn(&h, &buyer, Direction::NgnToCny, dec!(5000000), 75.0).await;

    let mut leg_txns = Vec::new();
    for (amount, score) in [(dec!(2000000), 75.0), (dec!(1500000), 70.0), (dec!(1500000), 65.0)] {
        let seller = seed_trader(&h.db).await;
        let (txn, _) = seed_pooled_txn(&h, &seller, Direction::CnyToNgn, amount, score).await;
        leg_txns.push(txn);
    }

    let report = run_completed_cycle(&h).await;
    assert_eq!(report.multi_matches, 1);
    assert_eq!(report.total_matched_volume, dec!(5000000));

    // Three records share the cycle id and sum to the assembled amount
    let records = MatchRepo::find_for_transaction(&h.db, target_txn.id)
        .await
        .unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.cycle_id == report.cycle_id));
    let total: Decimal = records.iter().map(|r| r.matched_amount).sum();
    assert_eq!(total, dec!(5000000));

    // Target and every leg end MATCHED
    let target_after = TransactionRepo::find_by_id(&h.db, target_txn.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(target_after.status, TransactionStatus::Matched);
    for leg in &leg_txns {
        let after = TransactionRepo::find_by_id(&h.db, leg.id).await.unwrap().unwrap();
        assert_eq!(after.status, TransactionStatus::Matched);
        assert!(after.match_id.is_some());
    }
}

#[tokio::test]
async fn partial_match_carries_remainder_back_to_pool() {
    let _guard = SERIAL.lock().await;
    let Some(h) = try_harness().await else {
        eprintln!("skipping: Postgres/Redis not available");
        return;
    };

    let buyer = seed_trader(&h.db).await;
    let seller = seed_trader(&h.db).await;
    let (buy_txn, buy_entry) =
        seed_pooled_txn(&h, &buyer, Direction::NgnToCny, dec!(800000), 70.0).await;
    let (sell_txn, sell_entry) =
        seed_pooled_txn(&h, &seller, Direction::CnyToNgn, dec!(500000), 60.0).await;

    let report = run_completed_cycle(&h).await;
    assert_eq!(report.partial_matches, 1);
    assert_eq!(report.total_matched_volume, dec!(500000));

    // Buy side re-enters matching with the remainder; sell side is done
    let buy_after = TransactionRepo::find_by_id(&h.db, buy_txn.id)
        .await
        .unwrap()
        .unwrap();
    let sell_after = TransactionRepo::find_by_id(&h.db, sell_txn.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(buy_after.status, TransactionStatus::Matching);
    assert_eq!(sell_after.status, TransactionStatus::PartialMatched);
    assert_eq!(
        buy_after.settlement_method,
        Some(SettlementMethod::PartialMatched)
    );

    let records = MatchRepo::find_for_transaction(&h.db, buy_txn.id)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].matched_amount, dec!(500000));

    // Pool: buy entry reduced to the remainder, sell entry gone
    let buy_pool_entry = h
        .pool
        .get_entry(&buy_entry.id.to_string())
        .await
        .unwrap()
        .expect("buy entry stays pooled");
    assert_eq!(buy_pool_entry.source_amount, dec!(300000));
    assert!(h.pool.get_entry(&sell_entry.id.to_string()).await.unwrap().is_none());

    // Durable rows mirror the store
    let buy_row = PoolEntryRepo::find_active_by_transaction(&h.db, buy_txn.id)
        .await
        .unwrap()
        .expect("buy row stays active");
    assert_eq!(buy_row.amount, dec!(300000));
    assert!(PoolEntryRepo::find_active_by_transaction(&h.db, sell_txn.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn timed_out_entry_routes_to_cips() {
    let _guard = SERIAL.lock().await;
    let Some(h) = try_harness().await else {
        eprintln!("skipping: Postgres/Redis not available");
        return;
    };

    let trader = seed_trader(&h.db).await;
    let mut txn = Transaction::new(trader.id, Direction::NgnToCny, dec!(1000000));
    txn.transition_to(TransactionStatus::Funded).unwrap();
    TransactionRepo::insert(&h.db, &txn).await.unwrap();

    // Entry whose deadline passed an hour ago
    let mut entry = PoolEntry::new(txn.id, trader.id, Direction::NgnToCny, dec!(1000000), dec!(50), 24);
    entry.entered_pool_at = Utc::now() - Duration::hours(26);
    entry.expires_at = Utc::now() - Duration::hours(1);
    PoolEntryRepo::insert(&h.db, &entry).await.unwrap();
    let data = EntryData {
        transaction_id: txn.id.to_string(),
        reference: txn.reference.as_str().to_string(),
        source_amount: dec!(1000000),
        target_amount: None,
        direction: Direction::NgnToCny,
        currency: tradeflow_common::Currency::Ngn,
        trader_id: trader.id.to_string(),
        entered_pool_at: entry.entered_pool_at,
        expires_at: entry.expires_at,
    };
    h.pool.add(&entry.id.to_string(), &data, 50.0).await.unwrap();

    let report = run_completed_cycle(&h).await;
    assert_eq!(report.timeouts, 1);
    assert_eq!(report.exact_matches + report.multi_matches + report.partial_matches, 0);

    let after = TransactionRepo::find_by_id(&h.db, txn.id).await.unwrap().unwrap();
    assert_eq!(after.status, TransactionStatus::Expired);
    assert_eq!(after.settlement_method, Some(SettlementMethod::CipsSettled));

    assert!(h.pool.get_entry(&entry.id.to_string()).await.unwrap().is_none());
    assert!(PoolEntryRepo::find_active_by_transaction(&h.db, txn.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn concurrent_cycle_is_skipped_by_lock() {
    let _guard = SERIAL.lock().await;
    let Some(h) = try_harness().await else {
        eprintln!("skipping: Postgres/Redis not available");
        return;
    };

    let held = h.pool.acquire_lock().await.unwrap().expect("lock acquired");

    match h.engine.run_cycle().await.unwrap() {
        CycleOutcome::Skipped => {}
        CycleOutcome::Completed(_) => panic!("second runner must be skipped"),
    }

    h.pool.release_lock(&held).await.unwrap();

    // With the lock free the cycle runs (empty pool, empty report)
    let report = run_completed_cycle(&h).await;
    assert_eq!(report.pool_size_start.total, 0);
}

#[tokio::test]
async fn pool_reconciliation_restores_missing_entries() {
    let _guard = SERIAL.lock().await;
    let Some(h) = try_harness().await else {
        eprintln!("skipping: Postgres/Redis not available");
        return;
    };

    let trader = seed_trader(&h.db).await;
    let (txn, entry) = seed_pooled_txn(&h, &trader, Direction::NgnToCny, dec!(750000), 42.0).await;

    // Simulate a Redis wipe; the database row survives
    h.pool.remove(&entry.id.to_string(), Direction::NgnToCny).await.unwrap();
    assert!(h.pool.get_entry(&entry.id.to_string()).await.unwrap().is_none());

    let restored = h.engine.reconcile_pool().await.unwrap();
    assert!(restored >= 1);

    let back = h
        .pool
        .get_entry(&entry.id.to_string())
        .await
        .unwrap()
        .expect("entry restored from database");
    assert_eq!(back.source_amount, dec!(750000));
    assert_eq!(back.transaction_id, txn.id.to_string());
}

#[tokio::test]
async fn webhook_ingestion_classifies_and_funds() {
    let _guard = SERIAL.lock().await;
    let Some(h) = try_harness().await else {
        eprintln!("skipping: Postgres/Redis not available");
        return;
    };

    let rates = Arc::new(RateEngine::new(
        h.redis.clone(),
        Arc::new(MockRateProvider::new()),
        RateEngineConfig::default(),
    ));
    let ingestor = PaymentIngestor::new(
        h.db.clone(),
        h.pool.clone(),
        rates,
        h.notifier.clone(),
        EngineConfig::default(),
    );

    let trader = seed_trader(&h.db).await;
    let mut txn = Transaction::new(trader.id, Direction::NgnToCny, dec!(1000000));
    txn.fee_amount = dec!(20000);
    TransactionRepo::insert(&h.db, &txn).await.unwrap();
    let account_number = txn.reference.virtual_account_number();

    // 80% of the expected 1,020,000: held, no state change
    let outcome = ingestor
        .process(WebhookPayment {
            session_id: "SIM-1".to_string(),
            account_number: account_number.clone(),
            amount: dec!(816000),
        })
        .await
        .unwrap();
    match outcome {
        IngestOutcome::Held { shortfall, .. } => assert_eq!(shortfall, dec!(204000)),
        other => panic!("expected held, got {other:?}"),
    }
    let after = TransactionRepo::find_by_id(&h.db, txn.id).await.unwrap().unwrap();
    assert_eq!(after.status, TransactionStatus::Initiated);
    assert!(PoolEntryRepo::find_active_by_transaction(&h.db, txn.id)
        .await
        .unwrap()
        .is_none());

    // Re-posting at 97%: adjusted, funded, pooled with scaled amounts
    let outcome = ingestor
        .process(WebhookPayment {
            session_id: "SIM-2".to_string(),
            account_number: account_number.clone(),
            amount: dec!(989400),
        })
        .await
        .unwrap();
    let pool_entry_id = match outcome {
        IngestOutcome::Success {
            classification,
            transaction_status,
            pool_entry_id,
            ..
        } => {
            assert_eq!(classification, PaymentClassification::Adjusted);
            assert_eq!(transaction_status, TransactionStatus::Funded);
            pool_entry_id
        }
        other => panic!("expected success, got {other:?}"),
    };

    let after = TransactionRepo::find_by_id(&h.db, txn.id).await.unwrap().unwrap();
    assert_eq!(after.status, TransactionStatus::Funded);
    assert_eq!(after.source_amount, dec!(970000.00));
    assert_eq!(after.fee_amount, dec!(19400.00));
    assert!(after.funded_at.is_some());

    let pooled = h.pool.get_entry(&pool_entry_id).await.unwrap().unwrap();
    assert_eq!(pooled.source_amount, dec!(970000.00));

    // Same webhook again: duplicate, no second pool entry
    let outcome = ingestor
        .process(WebhookPayment {
            session_id: "SIM-3".to_string(),
            account_number,
            amount: dec!(989400),
        })
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Duplicate { .. }));

    // Funded notification eventually recorded (held one too)
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let sent = h.notifier.sent();
    assert!(sent
        .iter()
        .any(|n| matches!(n, tradeflow_engine::Notification::Funded { .. })));
    assert!(sent
        .iter()
        .any(|n| matches!(n, tradeflow_engine::Notification::PaymentHeld { .. })));
}

#[tokio::test]
async fn expiry_worker_times_out_stale_initiated() {
    let _guard = SERIAL.lock().await;
    let Some(h) = try_harness().await else {
        eprintln!("skipping: Postgres/Redis not available");
        return;
    };

    let trader = seed_trader(&h.db).await;
    let mut txn = Transaction::new(trader.id, Direction::NgnToCny, dec!(1000000));
    txn.created_at = Utc::now() - Duration::hours(3);
    TransactionRepo::insert(&h.db, &txn).await.unwrap();

    let worker = ExpiryWorker::new(h.db.clone(), h.notifier.clone(), EngineConfig::default());
    let sweep = worker.sweep().await.unwrap();
    assert!(sweep.expired_count >= 1);
    assert!(sweep
        .expired_references
        .contains(&txn.reference.as_str().to_string()));

    let after = TransactionRepo::find_by_id(&h.db, txn.id).await.unwrap().unwrap();
    assert_eq!(after.status, TransactionStatus::Expired);
}
