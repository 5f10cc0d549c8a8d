use alloy::primitives::{Address, U256};
use axum::{
    debug_handler,
    extract::State,
    response::{IntoResponse, Json},
};
use rescue_core::{
    defs::WeiDef,
    ledger::{GasPayment, RescueTransaction},
};
use rescue_executors::{
    rescue::RescueError,
    store::{LedgerView, ledger_view},
};
use serde::Serialize;
use serde_with::{DisplayFromStr, serde_as};
use utoipa::ToSchema;

use crate::http::{
    error::ApiRescueError,
    extractors::ApiPath,
    server::RescueServerState,
    types::{ErrorResponse, SuccessResponse},
};

// ===== TYPES =====

/// Pre-paid gas for one compromised address on one chain, with its full history.
#[serde_as]
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LedgerResponse {
    #[serde_as(as = "DisplayFromStr")]
    #[schema(value_type = WeiDef)]
    pub total_eth_paid: U256,
    #[serde_as(as = "DisplayFromStr")]
    #[schema(value_type = WeiDef)]
    pub total_eth_used: U256,
    #[serde_as(as = "DisplayFromStr")]
    #[schema(value_type = WeiDef)]
    pub remaining_eth: U256,
    pub payments: Vec<GasPayment>,
    pub rescues: Vec<RescueTransaction>,
}

impl From<LedgerView> for LedgerResponse {
    fn from(view: LedgerView) -> Self {
        Self {
            remaining_eth: view.balance.remaining(),
            total_eth_paid: view.balance.total_eth_paid,
            total_eth_used: view.balance.total_eth_used,
            payments: view.payments,
            rescues: view.rescues,
        }
    }
}

// ===== ROUTE HANDLER =====

#[utoipa::path(
    get,
    operation_id = "getLedger",
    path = "/ledger/{chainId}/{address}",
    tag = "Ledger",
    responses(
        (status = 200, description = "Recorded gas payments and rescues for the address", body = SuccessResponse<LedgerResponse>, content_type = "application/json"),
        (status = 400, description = "Malformed chain id or address", body = ErrorResponse, content_type = "application/json"),
    ),
    params(
        ("chainId" = u64, Path, description = "Chain the payments were made on"),
        ("address" = String, Path, description = "Compromised address, 0x-prefixed hex"),
    )
)]
/// Get Ledger
///
/// Gas paid, gas used and what remains for a compromised address. Reads only what is
/// already recorded; it does not trigger reconciliation.
#[debug_handler]
pub async fn get_ledger(
    State(state): State<RescueServerState>,
    ApiPath((chain_id, address)): ApiPath<(u64, String)>,
) -> Result<impl IntoResponse, ApiRescueError> {
    let address: Address = address.trim().parse().map_err(|e| {
        RescueError::validation(format!("address is not a 20-byte hex address: {e}"))
    })?;

    let view = ledger_view(state.store.as_ref(), chain_id, address).await?;

    Ok(Json(SuccessResponse::new(LedgerResponse::from(view))))
}
