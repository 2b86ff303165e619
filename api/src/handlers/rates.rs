//! FX rate endpoints.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

use tradeflow_common::Currency;
use tradeflow_db::TraderRepo;
use tradeflow_fx::engine::CurrentRates;
use tradeflow_fx::{FxError, Quote};

use crate::handlers::authenticated_trader;
use crate::{ApiError, AppState};

/// `GET /rates/current`
///
/// Public mid-market cross rate; 503 while the circuit breaker is open.
pub async fn current(State(state): State<AppState>) -> Result<Json<CurrentRates>, ApiError> {
    if state.rates.is_circuit_breaker_open().await.map_err(ApiError::Fx)? {
        return Err(ApiError::Fx(FxError::CircuitBreakerOpen));
    }

    let rates = state.rates.get_rates().await?;
    Ok(Json(rates))
}

/// Query parameters for a quote request.
#[derive(Debug, Deserialize)]
pub struct QuoteParams {
    pub source: String,
    pub target: String,
    pub amount: Decimal,
}

/// `GET /rates/quote`
///
/// Authenticated: the trader's monthly volume picks the fee tier.
pub async fn quote(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<QuoteParams>,
) -> Result<Json<Quote>, ApiError> {
    let trader_id = authenticated_trader(&headers)?;
    let trader = TraderRepo::find_by_id(&state.db, trader_id)
        .await
        .map_err(tradeflow_common::TradeFlowError::from)?
        .ok_or(tradeflow_common::TradeFlowError::TraderNotFound(trader_id))?;

    let source = Currency::from_str(&params.source)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let target = Currency::from_str(&params.target)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let quote = state
        .rates
        .generate_quote(source, target, params.amount, trader.monthly_used_usd)
        .await?;

    Ok(Json(quote))
}
