//! TradeFlow HTTP Surface
//!
//! axum router wiring the webhook ingestion path, the rate endpoints,
//! transaction creation, and the matching admin surface. Authentication
//! and webhook signature validation happen upstream; handlers trust the
//! gateway-injected trader header.

pub mod config;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tradeflow_engine::{MatchingEngine, PaymentIngestor, TransactionService};
use tradeflow_fx::RateEngine;
use tradeflow_pool::PoolStore;

pub use config::AppConfig;
pub use error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub pool: PoolStore,
    pub rates: Arc<RateEngine>,
    pub engine: Arc<MatchingEngine>,
    pub ingestor: Arc<PaymentIngestor>,
    pub transactions: Arc<TransactionService>,
    /// Enables the `/dev` endpoints.
    pub dev_mode: bool,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/providus", post(handlers::webhooks::providus))
        .route("/rates/current", get(handlers::rates::current))
        .route("/rates/quote", get(handlers::rates::quote))
        .route(
            "/transactions",
            get(handlers::transactions::list).post(handlers::transactions::create),
        )
        .route("/transactions/:id", get(handlers::transactions::get))
        .route(
            "/transactions/:id/cancel",
            post(handlers::transactions::cancel),
        )
        .route("/matching/trigger", post(handlers::matching::trigger))
        .route("/matching/pool", get(handlers::matching::pool_status))
        .route("/matching/history", get(handlers::matching::history))
        .route("/dev/simulate-payment", post(handlers::dev::simulate_payment))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
