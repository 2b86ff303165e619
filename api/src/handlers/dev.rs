//! Development-only endpoints.
//!
//! `POST /dev/simulate-payment` builds a Providus-format webhook
//! payload for a transaction and feeds it straight into the ingestion
//! path, skipping the HTTP round-trip. Returns 403 outside development.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use tradeflow_common::{TradeFlowError, TransactionId, TransactionStatus};
use tradeflow_db::TransactionRepo;
use tradeflow_engine::{IngestOutcome, WebhookPayment};

use crate::{ApiError, AppState};

/// Request to simulate a payment.
#[derive(Debug, Deserialize)]
pub struct SimulatePaymentRequest {
    pub transaction_id: Uuid,
    pub amount: Decimal,
}

/// Simulated payment result plus the payload that would have arrived.
#[derive(Debug, Serialize)]
pub struct SimulatePaymentResponse {
    pub result: IngestOutcome,
    pub webhook_payload: Value,
}

/// Build a Providus-format webhook payload for the dev endpoint.
fn simulate_webhook_payload(account_number: &str, amount: Decimal, reference: &str) -> Value {
    let now = Utc::now();
    json!({
        "sessionId": format!("SIM-{reference}-{}", now.timestamp()),
        "accountNumber": account_number,
        "tranRemarks": format!("Payment for {reference}"),
        "transactionAmount": amount.to_string(),
        "settledAmount": amount.to_string(),
        "feeAmount": "0.00",
        "vatAmount": "0.00",
        "currency": "NGN",
        "initiationTranRef": reference,
        "settlementId": format!("SET-{reference}"),
        "sourceAccountNumber": "0012345678",
        "sourceAccountName": "Test Payer",
        "sourceBankName": "Test Bank",
        "channelId": "1",
        "tranDateTime": now.to_rfc3339(),
    })
}

/// `POST /dev/simulate-payment`
pub async fn simulate_payment(
    State(state): State<AppState>,
    Json(request): Json<SimulatePaymentRequest>,
) -> Result<Json<SimulatePaymentResponse>, ApiError> {
    if !state.dev_mode {
        return Err(ApiError::Forbidden(
            "Simulate payment is only available in development mode".to_string(),
        ));
    }

    let txn = TransactionRepo::find_by_id(
        &state.db,
        TransactionId::from_uuid(request.transaction_id),
    )
    .await
    .map_err(TradeFlowError::from)?
    .ok_or_else(|| TradeFlowError::TransactionNotFound(request.transaction_id.to_string()))?;

    if txn.status != TransactionStatus::Initiated {
        return Err(ApiError::Conflict(format!(
            "Transaction is already in '{}' status",
            txn.status
        )));
    }

    let account_number = txn.reference.virtual_account_number();
    let webhook_payload =
        simulate_webhook_payload(&account_number, request.amount, txn.reference.as_str());
    let session_id = webhook_payload["sessionId"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    let result = state
        .ingestor
        .process(WebhookPayment {
            session_id,
            account_number,
            amount: request.amount,
        })
        .await?;

    Ok(Json(SimulatePaymentResponse {
        result,
        webhook_payload,
    }))
}
