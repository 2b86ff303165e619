//! HTTP surface tests driving the router with in-process requests.
//!
//! Requires `DATABASE_URL` and a reachable Redis; every test skips
//! itself otherwise. Redis database 0 is shared with the engine tests,
//! so these only exercise read paths and rejection paths.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use deadpool_redis::{Config as RedisConfig, Runtime};
use tower::ServiceExt;

use tradeflow_api::{router, AppState};
use tradeflow_crypto::FieldCipher;
use tradeflow_engine::{
    EngineConfig, LogDispatcher, MatchingEngine, NotificationDispatcher, PaymentIngestor,
    TransactionService,
};
use tradeflow_fx::{MockRateProvider, RateEngine, RateEngineConfig};
use tradeflow_pool::PoolStore;

async fn try_app(dev_mode: bool) -> Option<Router> {
    let database_url = std::env::var("DATABASE_URL").ok()?;
    let db = tradeflow_db::connect(&database_url, 5).await.ok()?;
    tradeflow_db::migrate(&db).await.ok()?;

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let redis = RedisConfig::from_url(format!("{redis_url}/0"))
        .create_pool(Some(Runtime::Tokio1))
        .ok()?;
    redis.get().await.ok()?;

    let pool = PoolStore::new(redis.clone());
    let rates = Arc::new(RateEngine::new(
        redis,
        Arc::new(MockRateProvider::new()),
        RateEngineConfig::default(),
    ));
    let notifier: Arc<dyn NotificationDispatcher> = Arc::new(LogDispatcher);
    let engine = Arc::new(MatchingEngine::new(
        db.clone(),
        pool.clone(),
        notifier.clone(),
        EngineConfig::default(),
    ));
    let ingestor = Arc::new(PaymentIngestor::new(
        db.clone(),
        pool.clone(),
        rates.clone(),
        notifier,
        EngineConfig::default(),
    ));
    let transactions = Arc::new(TransactionService::new(
        db.clone(),
        pool.clone(),
        rates.clone(),
        FieldCipher::from_secret("test-secret").ok()?,
    ));

    Some(router(AppState {
        db,
        pool,
        rates,
        engine,
        ingestor,
        transactions,
        dev_mode,
    }))
}

fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn webhook_rejects_malformed_account_number() {
    let Some(app) = try_app(false).await else {
        eprintln!("skipping: Postgres/Redis not available");
        return;
    };

    let response = app
        .oneshot(json_post(
            "/webhooks/providus",
            serde_json::json!({
                "sessionId": "S-1",
                "accountNumber": "XX12345678",
                "transactionAmount": "1000000",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_rejects_unknown_reference() {
    let Some(app) = try_app(false).await else {
        eprintln!("skipping: Postgres/Redis not available");
        return;
    };

    let response = app
        .oneshot(json_post(
            "/webhooks/providus",
            serde_json::json!({
                "sessionId": "S-1",
                "accountNumber": "TFNOSUCH00",
                "transactionAmount": "1000000",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn webhook_rejects_unparseable_amount() {
    let Some(app) = try_app(false).await else {
        eprintln!("skipping: Postgres/Redis not available");
        return;
    };

    let response = app
        .oneshot(json_post(
            "/webhooks/providus",
            serde_json::json!({
                "sessionId": "S-1",
                "accountNumber": "TFA1B2C3D4",
                "transactionAmount": "one million",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn current_rates_are_public() {
    let Some(app) = try_app(false).await else {
        eprintln!("skipping: Postgres/Redis not available");
        return;
    };

    let response = app
        .oneshot(
            Request::builder()
                .uri("/rates/current")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body.get("ngn_per_usd").is_some());
    assert!(body.get("cny_per_usd").is_some());
    assert!(body.get("ngn_per_cny").is_some());
    assert_eq!(body["source"], "mock");
}

#[tokio::test]
async fn quote_requires_trader_identity() {
    let Some(app) = try_app(false).await else {
        eprintln!("skipping: Postgres/Redis not available");
        return;
    };

    let response = app
        .oneshot(
            Request::builder()
                .uri("/rates/quote?source=NGN&target=CNY&amount=1000000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn dev_endpoint_forbidden_outside_development() {
    let Some(app) = try_app(false).await else {
        eprintln!("skipping: Postgres/Redis not available");
        return;
    };

    let response = app
        .oneshot(json_post(
            "/dev/simulate-payment",
            serde_json::json!({
                "transaction_id": uuid::Uuid::new_v4(),
                "amount": "1000000",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn pool_status_reports_both_directions() {
    let Some(app) = try_app(false).await else {
        eprintln!("skipping: Postgres/Redis not available");
        return;
    };

    let response = app
        .oneshot(
            Request::builder()
                .uri("/matching/pool")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body.get("ngn_to_cny_count").is_some());
    assert!(body.get("cny_to_ngn_count").is_some());
}
