//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use tradeflow_common::TradeFlowError;
use tradeflow_fx::FxError;

/// Error wrapper giving every domain error an HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] TradeFlowError),

    #[error(transparent)]
    Fx(#[from] FxError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Core(e) => match e {
                TradeFlowError::Validation { .. }
                | TradeFlowError::MonthlyLimitExceeded { .. }
                | TradeFlowError::QuoteNotFound(_) => StatusCode::BAD_REQUEST,
                TradeFlowError::TransactionNotFound(_) | TradeFlowError::TraderNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                TradeFlowError::InvalidTransition { .. } => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Fx(e) => match e {
                FxError::CircuitBreakerOpen => StatusCode::SERVICE_UNAVAILABLE,
                FxError::UnsupportedPair { .. } | FxError::NonPositiveAmount => {
                    StatusCode::BAD_REQUEST
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
