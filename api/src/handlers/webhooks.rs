//! Providus Bank payment webhook.

use axum::extract::State;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

use tradeflow_engine::{IngestOutcome, WebhookPayment};

use crate::{ApiError, AppState};

/// Providus notification payload. The HMAC signature header is
/// validated upstream before the request reaches this handler.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvidusPayload {
    pub session_id: String,
    pub account_number: String,
    /// Stringified decimal amount.
    pub transaction_amount: String,
}

/// `POST /webhooks/providus`
pub async fn providus(
    State(state): State<AppState>,
    Json(payload): Json<ProvidusPayload>,
) -> Result<Json<IngestOutcome>, ApiError> {
    if payload.session_id.is_empty() || payload.account_number.is_empty() {
        return Err(ApiError::BadRequest(
            "Missing required fields: accountNumber, transactionAmount, sessionId".to_string(),
        ));
    }

    let amount = Decimal::from_str(&payload.transaction_amount)
        .map_err(|_| ApiError::BadRequest("Invalid transactionAmount".to_string()))?;

    let outcome = state
        .ingestor
        .process(WebhookPayment {
            session_id: payload.session_id,
            account_number: payload.account_number,
            amount,
        })
        .await?;

    Ok(Json(outcome))
}
