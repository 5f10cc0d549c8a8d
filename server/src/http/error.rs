use axum::{Json, http::StatusCode, response::IntoResponse};
use rescue_core::error::{EngineError, RpcErrorKind};
use rescue_executors::{rescue::RescueError, store::LedgerStoreError};

use crate::http::types::{ErrorResponse, ErrorResponseInner};

/// A rescue error paired with the HTTP status class it maps to.
#[derive(Debug)]
pub struct ApiRescueError(pub RescueError);

impl From<RescueError> for ApiRescueError {
    fn from(error: RescueError) -> Self {
        ApiRescueError(error)
    }
}

impl From<EngineError> for ApiRescueError {
    fn from(error: EngineError) -> Self {
        ApiRescueError(error.into())
    }
}

impl From<LedgerStoreError> for ApiRescueError {
    fn from(error: LedgerStoreError) -> Self {
        ApiRescueError(error.into())
    }
}

impl IntoResponse for ApiRescueError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let retryable = self.0.is_retryable();

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.0, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %self.0, "Request rejected");
        }

        (
            status,
            Json(ErrorResponse {
                error: ErrorResponseInner {
                    message: self.0.to_string(),
                    details: self.0,
                    retryable,
                },
            }),
        )
            .into_response()
    }
}

impl ApiRescueError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            RescueError::Validation { .. } => StatusCode::BAD_REQUEST,
            RescueError::OperationInProgress { .. } => StatusCode::CONFLICT,
            RescueError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            RescueError::Engine { error } => match error {
                EngineError::RpcError { kind, .. } => match kind {
                    RpcErrorKind::UnsupportedFeature { .. } => StatusCode::NOT_IMPLEMENTED,
                    _ => StatusCode::BAD_GATEWAY,
                },
                EngineError::ReceiptTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                EngineError::FeeValidationError { .. } => StatusCode::BAD_GATEWAY,
                EngineError::UnsupportedChain { .. } => StatusCode::BAD_REQUEST,
                EngineError::RpcConfigError { .. } | EngineError::InternalError { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            RescueError::Store { .. } | RescueError::Fatal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
