//! Request handlers.

pub mod dev;
pub mod matching;
pub mod rates;
pub mod transactions;
pub mod webhooks;

use axum::http::HeaderMap;

use tradeflow_common::TraderId;

use crate::ApiError;

/// Header the upstream gateway injects after JWT validation.
pub const TRADER_ID_HEADER: &str = "x-trader-id";

/// Resolve the authenticated trader from the gateway header.
pub fn authenticated_trader(headers: &HeaderMap) -> Result<TraderId, ApiError> {
    let raw = headers
        .get(TRADER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing trader identity".to_string()))?;
    TraderId::parse(raw).map_err(|_| ApiError::Unauthorized("Invalid trader identity".to_string()))
}
