use alloy::primitives::U256;
use rescue_core::{defs::WeiDef, error::EngineError};
use serde::Serialize;
use serde_with::{DisplayFromStr, serde_as};
use thiserror::Error;

use crate::store::LedgerStoreError;

/// Every way a rescue attempt can end without a receipt.
#[serde_as]
#[derive(Debug, Clone, Error, Serialize, utoipa::ToSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RescueError {
    /// Malformed input, rejected before any lock is taken.
    #[schema(title = "Validation Error")]
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Another rescue for the same address is running. Retry later.
    #[schema(title = "Operation In Progress")]
    #[error("A rescue for {compromised_address} is already in progress")]
    #[serde(rename_all = "camelCase")]
    OperationInProgress {
        compromised_address: String,
        held_for_ms: Option<u64>,
    },

    /// The available budget does not cover the estimated cost. Nothing was broadcast.
    #[schema(title = "Insufficient Funds")]
    #[error("Insufficient gas funds: {extra_gas_eth_needed} wei more needed")]
    #[serde(rename_all = "camelCase")]
    InsufficientFunds {
        #[serde_as(as = "DisplayFromStr")]
        #[schema(value_type = WeiDef)]
        extra_gas_eth_needed: U256,
        #[serde_as(as = "DisplayFromStr")]
        #[schema(value_type = WeiDef)]
        estimated_gas_eth: U256,
        #[serde_as(as = "DisplayFromStr")]
        #[schema(value_type = WeiDef)]
        remaining_eth: U256,
    },

    /// Upstream chain failure before anything was broadcast.
    #[schema(title = "Upstream Error")]
    #[error("Upstream error: {error}")]
    Engine {
        #[from]
        error: EngineError,
    },

    #[schema(title = "Store Error")]
    #[error("Ledger store error: {message}")]
    Store { message: String },

    /// Broadcast or receipt wait failed. The rescue record, if any, was marked failed.
    #[schema(title = "Rescue Failed")]
    #[error("Rescue failed: {message}")]
    #[serde(rename_all = "camelCase")]
    Fatal {
        message: String,
        rescue_transaction_hash: Option<String>,
    },
}

impl From<LedgerStoreError> for RescueError {
    fn from(err: LedgerStoreError) -> Self {
        RescueError::Store {
            message: err.to_string(),
        }
    }
}

impl RescueError {
    pub fn validation(message: impl Into<String>) -> Self {
        RescueError::Validation {
            message: message.into(),
        }
    }

    /// Whether the same request can succeed later without changes.
    pub fn is_retryable(&self) -> bool {
        match self {
            RescueError::OperationInProgress { .. } => true,
            RescueError::Engine { error } => error.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_funds_serializes_deficit_as_wei_strings() {
        let err = RescueError::InsufficientFunds {
            extra_gas_eth_needed: U256::from(5_000_000_000_000_000u64),
            estimated_gas_eth: U256::from(15_000_000_000_000_000u64),
            remaining_eth: U256::from(10_000_000_000_000_000u64),
        };

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "INSUFFICIENT_FUNDS");
        assert_eq!(json["extraGasEthNeeded"], "5000000000000000");
        assert_eq!(json["estimatedGasEth"], "15000000000000000");
        assert_eq!(json["remainingEth"], "10000000000000000");
    }

    #[test]
    fn only_contention_and_transient_upstream_errors_are_retryable() {
        assert!(
            RescueError::OperationInProgress {
                compromised_address: "0xaa".into(),
                held_for_ms: None,
            }
            .is_retryable()
        );
        assert!(!RescueError::validation("bad").is_retryable());
        assert!(
            RescueError::from(EngineError::ReceiptTimeout {
                chain_id: 1,
                transaction_hash: "0x01".into(),
                timeout_secs: 12,
            })
            .is_retryable()
        );
    }
}
