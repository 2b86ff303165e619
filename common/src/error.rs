//! Error types shared across the TradeFlow core.

use crate::{TraderId, TransactionStatus};
use thiserror::Error;

/// Main error type for TradeFlow core operations.
#[derive(Error, Debug)]
pub enum TradeFlowError {
    /// A request failed validation before any state change.
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Invalid transaction lifecycle transition. Always a programming
    /// error; aborts the current unit of work.
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// Transaction not found for the given reference.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Trader not found.
    #[error("Trader not found: {0}")]
    TraderNotFound(TraderId),

    /// Quote has expired or never existed.
    #[error("Quote not found or expired: {0}")]
    QuoteNotFound(String),

    /// Monthly USD volume limit would be exceeded.
    #[error("Monthly limit exceeded: used {used}, limit {limit}")]
    MonthlyLimitExceeded { used: String, limit: String },

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Key-value store error.
    #[error("Cache error: {0}")]
    Cache(String),

    /// External provider error (rate API, bank API).
    #[error("Provider error: {0}")]
    Provider(String),

    /// Field encryption / decryption error.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TradeFlowError {
    /// Check if this error is safe for the caller to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TradeFlowError::Database(_)
                | TradeFlowError::Cache(_)
                | TradeFlowError::Provider(_)
        )
    }
}

/// Result type alias for TradeFlow core operations.
pub type Result<T> = std::result::Result<T, TradeFlowError>;
