//! Transaction endpoints.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tradeflow_common::{Transaction, TransactionId, TransactionStatus};
use tradeflow_db::TransactionRepo;
use tradeflow_engine::{CreateTransactionRequest, DepositInstructions};

use crate::handlers::authenticated_trader;
use crate::{ApiError, AppState};

/// Response for a created transaction.
#[derive(Debug, Serialize)]
pub struct CreateTransactionResponse {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub deposit_instructions: DepositInstructions,
}

/// `POST /transactions`
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateTransactionRequest>,
) -> Result<Json<CreateTransactionResponse>, ApiError> {
    let trader_id = authenticated_trader(&headers)?;

    let (transaction, deposit_instructions) =
        state.transactions.create(trader_id, request).await?;

    Ok(Json(CreateTransactionResponse {
        transaction,
        deposit_instructions,
    }))
}

/// Pagination and filter parameters for the transaction list.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
    pub status: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    20
}

/// Paginated transaction list.
#[derive(Debug, Serialize)]
pub struct TransactionListResponse {
    pub items: Vec<Transaction>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

/// `GET /transactions`
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<TransactionListResponse>, ApiError> {
    let trader_id = authenticated_trader(&headers)?;

    let status = match params.status.as_deref() {
        Some(raw) => Some(
            TransactionStatus::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown status: {raw}")))?,
        ),
        None => None,
    };
    let per_page = params.per_page.clamp(1, 100);

    let (items, total) = TransactionRepo::list_for_trader(
        &state.db,
        trader_id,
        status,
        params.page,
        per_page,
    )
    .await
    .map_err(tradeflow_common::TradeFlowError::from)?;

    Ok(Json(TransactionListResponse {
        items,
        total,
        page: params.page.max(1),
        per_page,
    }))
}

/// `GET /transactions/:id`
pub async fn get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, ApiError> {
    let trader_id = authenticated_trader(&headers)?;

    let txn = TransactionRepo::find_by_id(&state.db, TransactionId::from_uuid(id))
        .await
        .map_err(tradeflow_common::TradeFlowError::from)?
        .ok_or_else(|| {
            tradeflow_common::TradeFlowError::TransactionNotFound(id.to_string())
        })?;

    if txn.trader_id != trader_id {
        return Err(ApiError::Forbidden(
            "You do not have access to this transaction".to_string(),
        ));
    }

    Ok(Json(txn))
}

/// `POST /transactions/:id/cancel`
pub async fn cancel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, ApiError> {
    let trader_id = authenticated_trader(&headers)?;

    let txn = state
        .transactions
        .cancel(trader_id, TransactionId::from_uuid(id))
        .await?;

    Ok(Json(txn))
}
