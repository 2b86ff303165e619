//! FX engine error types.

use thiserror::Error;

/// Errors that can occur in the FX engine.
#[derive(Debug, Error)]
pub enum FxError {
    /// Quoting is paused due to anomalous rate movement.
    #[error("Rate service temporarily paused due to unusual market movement")]
    CircuitBreakerOpen,

    /// Currency pair outside NGN/CNY and CNY/NGN.
    #[error("Unsupported currency pair: {from}/{target}")]
    UnsupportedPair { from: String, target: String },

    /// Quote amount must be positive.
    #[error("Quote amount must be positive")]
    NonPositiveAmount,

    /// Provider returned no usable rates.
    #[error("Rates not available: {0}")]
    RateNotAvailable(String),

    /// Provider returned an error.
    #[error("Rate provider error: {0}")]
    Provider(String),

    /// Provider call timed out.
    #[error("Rate provider timed out after {0}s")]
    ProviderTimeout(u64),

    /// Key-value store error.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Cached blob could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<deadpool_redis::PoolError> for FxError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        FxError::Cache(e.to_string())
    }
}

impl From<deadpool_redis::redis::RedisError> for FxError {
    fn from(e: deadpool_redis::redis::RedisError) -> Self {
        FxError::Cache(e.to_string())
    }
}

impl From<serde_json::Error> for FxError {
    fn from(e: serde_json::Error) -> Self {
        FxError::Serialization(e.to_string())
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
