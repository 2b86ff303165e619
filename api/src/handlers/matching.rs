//! Matching engine admin endpoints.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use tradeflow_common::MatchRecord;
use tradeflow_db::MatchRepo;
use tradeflow_engine::CycleOutcome;
use tradeflow_pool::PoolStats;

use crate::{ApiError, AppState};

/// `POST /matching/trigger`
///
/// Run a matching cycle immediately instead of waiting for the next
/// scheduled tick. Reports `skipped` when another runner holds the
/// lock; that is not an error.
pub async fn trigger(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match state.engine.run_cycle().await? {
        CycleOutcome::Skipped => Ok(Json(json!({ "skipped": true }))),
        CycleOutcome::Completed(report) => Ok(Json(json!({
            "skipped": false,
            "report": report,
        }))),
    }
}

/// `GET /matching/pool`
pub async fn pool_status(State(state): State<AppState>) -> Result<Json<PoolStats>, ApiError> {
    let stats = state
        .pool
        .stats()
        .await
        .map_err(|e| tradeflow_common::TradeFlowError::Cache(e.to_string()))?;
    Ok(Json(stats))
}

/// Pagination for the match history.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

/// One page of historical match records.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub items: Vec<MatchRecord>,
    pub page: i64,
    pub page_size: i64,
}

/// `GET /matching/history`
pub async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let page = params.page.max(1);
    let page_size = params.page_size.clamp(1, 100);

    let items = MatchRepo::recent(&state.db, page_size, (page - 1) * page_size)
        .await
        .map_err(tradeflow_common::TradeFlowError::from)?;

    Ok(Json(HistoryResponse {
        items,
        page,
        page_size,
    }))
}
