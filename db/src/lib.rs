//! TradeFlow Database Layer
//!
//! Postgres repositories for the four persisted entities: traders,
//! transactions, matches, and the durable matching pool. Repository
//! methods are generic over [`sqlx::PgExecutor`] so callers can run
//! them against the shared pool or inside a single transaction (the
//! matching cycle persists everything in one).

pub mod matches;
pub mod pool_entries;
pub mod traders;
pub mod transactions;

pub use matches::MatchRepo;
pub use pool_entries::PoolEntryRepo;
pub use traders::TraderRepo;
pub use transactions::TransactionRepo;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Errors from database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Row decode error: {0}")]
    Decode(String),
}

impl From<DbError> for tradeflow_common::TradeFlowError {
    fn from(e: DbError) -> Self {
        tradeflow_common::TradeFlowError::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Connect to Postgres with a bounded pool.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run the bundled migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../migrations").run(pool).await?;
    Ok(())
}
