//! TradeFlow Pool Store
//!
//! The volatile half of the matching pool: per-direction sorted sets
//! ordered by priority score, a detail hash per entry, and the
//! distributed lock that keeps matching cycles single-flight across
//! processes. The database rows remain the system of record; this store
//! is the priority-ordered working set.

pub mod store;

pub use store::{PoolLock, PoolStats, PoolStore, SnapshotEntry};

/// Errors from pool store operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<deadpool_redis::PoolError> for PoolError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        PoolError::Redis(e.to_string())
    }
}

impl From<deadpool_redis::redis::RedisError> for PoolError {
    fn from(e: deadpool_redis::redis::RedisError) -> Self {
        PoolError::Redis(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PoolError>;
