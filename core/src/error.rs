use alloy::{
    providers::{PendingTransactionError, WatchTxError},
    transports::{RpcError as AlloyRpcError, TransportErrorKind},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::Chain;

#[derive(Debug, Error, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcErrorKind {
    /// Server returned an error response.
    #[error("server returned an error response: {0}")]
    ErrorResp(RpcErrorResponse),

    /// Server returned a null response when a non-null response was expected.
    #[error("server returned a null response when a non-null response was expected")]
    NullResp,

    /// Rpc server returned an unsupported feature.
    #[error("unsupported feature: {message}")]
    UnsupportedFeature { message: String },

    /// Returned when a local pre-processing step fails. This allows custom
    /// errors from local signers or request pre-processors.
    #[error("local usage error: {message}")]
    InternalError { message: String },

    /// JSON serialization error.
    #[error("serialization error: {message}")]
    SerError { message: String },

    /// JSON deserialization error.
    #[error("deserialization error: {message}, text: {text}")]
    DeserError { message: String, text: String },

    #[error("HTTP error {status}")]
    TransportHttpError { status: u16, body: String },

    #[error("Other transport error: {message}")]
    OtherTransportError { message: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, utoipa::ToSchema)]
pub struct RpcErrorResponse {
    /// The error code.
    pub code: i64,
    /// The error message (if any).
    pub message: String,
    /// The error data (if any).
    pub data: Option<String>,
}

impl std::fmt::Display for RpcErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "code {}: {}", self.code, self.message)?;
        if let Some(data) = &self.data {
            write!(f, ", data: {data}")?;
        }
        Ok(())
    }
}

#[derive(Error, Debug, Serialize, Clone, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum EngineError {
    #[schema(title = "EVM RPC Error")]
    #[error("RPC error on chain {chain_id} at {rpc_url}: {message}")]
    RpcError {
        chain_id: u64,
        rpc_url: String,
        message: String,
        kind: RpcErrorKind,
    },

    #[schema(title = "RPC Configuration Error")]
    #[error("Bad RPC configuration: {message}")]
    RpcConfigError { message: String },

    #[schema(title = "Unsupported Chain")]
    #[error("Chain {chain_id} is not configured")]
    #[serde(rename_all = "camelCase")]
    UnsupportedChain { chain_id: u64 },

    #[schema(title = "Receipt Timeout")]
    #[error("Timed out after {timeout_secs}s waiting for receipt of {transaction_hash} on chain {chain_id}")]
    #[serde(rename_all = "camelCase")]
    ReceiptTimeout {
        chain_id: u64,
        transaction_hash: String,
        timeout_secs: u64,
    },

    #[schema(title = "Fee Validation Error")]
    #[error("Rejected fee estimate on chain {chain_id}: {message}")]
    #[serde(rename_all = "camelCase")]
    FeeValidationError { chain_id: u64, message: String },

    #[schema(title = "Internal Error")]
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

pub trait AlloyRpcErrorToEngineError {
    fn to_engine_error(&self, chain: &impl Chain) -> EngineError;
}

fn to_engine_rpc_error_kind(err: &AlloyRpcError<TransportErrorKind>) -> RpcErrorKind {
    match err {
        AlloyRpcError::ErrorResp(err) => RpcErrorKind::ErrorResp(RpcErrorResponse {
            code: err.code,
            message: err.message.to_string(),
            data: err.data.as_ref().map(|data| data.to_string()),
        }),
        AlloyRpcError::NullResp => RpcErrorKind::NullResp,
        AlloyRpcError::UnsupportedFeature(feature) => RpcErrorKind::UnsupportedFeature {
            message: feature.to_string(),
        },
        AlloyRpcError::LocalUsageError(err) => RpcErrorKind::InternalError {
            message: err.to_string(),
        },
        AlloyRpcError::SerError(err) => RpcErrorKind::SerError {
            message: err.to_string(),
        },
        AlloyRpcError::DeserError { err, text } => RpcErrorKind::DeserError {
            message: err.to_string(),
            text: text.to_string(),
        },
        AlloyRpcError::Transport(err) => match err {
            TransportErrorKind::HttpError(err) => RpcErrorKind::TransportHttpError {
                status: err.status,
                body: err.body.to_string(),
            },
            _ => RpcErrorKind::OtherTransportError {
                message: err.to_string(),
            },
        },
    }
}

impl AlloyRpcErrorToEngineError for AlloyRpcError<TransportErrorKind> {
    fn to_engine_error(&self, chain: &impl Chain) -> EngineError {
        EngineError::RpcError {
            chain_id: chain.chain_id(),
            rpc_url: chain.rpc_url().to_string(),
            message: self.to_string(),
            kind: to_engine_rpc_error_kind(self),
        }
    }
}

/// Converts a failed receipt wait into an engine error, keeping timeouts distinct.
pub fn pending_transaction_error(
    err: PendingTransactionError,
    chain: &impl Chain,
    transaction_hash: String,
    timeout_secs: u64,
) -> EngineError {
    match err {
        PendingTransactionError::TransportError(err) => err.to_engine_error(chain),
        PendingTransactionError::TxWatcher(WatchTxError::Timeout) => EngineError::ReceiptTimeout {
            chain_id: chain.chain_id(),
            transaction_hash,
            timeout_secs,
        },
        other => EngineError::RpcError {
            chain_id: chain.chain_id(),
            rpc_url: chain.rpc_url().to_string(),
            message: other.to_string(),
            kind: RpcErrorKind::OtherTransportError {
                message: other.to_string(),
            },
        },
    }
}

impl EngineError {
    /// Whether retrying the same call later can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::RpcError { kind, .. } => !matches!(
                kind,
                RpcErrorKind::ErrorResp(_) | RpcErrorKind::UnsupportedFeature { .. }
            ),
            EngineError::ReceiptTimeout { .. } => true,
            _ => false,
        }
    }
}
