use axum::{
    debug_handler,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use rescue_executors::rescue::{RescueRequest, RescueResponse};

use crate::http::{
    error::ApiRescueError,
    extractors::ApiJson,
    server::RescueServerState,
    types::{ErrorResponse, SuccessResponse},
};

// ===== ROUTE HANDLER =====

#[utoipa::path(
    post,
    operation_id = "rescueTokens",
    path = "/rescue",
    tag = "Rescue",
    request_body(content = RescueRequest, description = "Signed sweep of tokens out of a compromised address", content_type = "application/json"),
    responses(
        (status = 200, description = "Rescue transaction mined. `status` reflects the on-chain result", body = SuccessResponse<RescueResponse>, content_type = "application/json"),
        (status = 400, description = "Malformed request, unsupported chain, or address not delegated", body = ErrorResponse, content_type = "application/json"),
        (status = 402, description = "Pre-paid gas does not cover the estimated cost", body = ErrorResponse, content_type = "application/json"),
        (status = 409, description = "A rescue for this address is already running. Retry later", body = ErrorResponse, content_type = "application/json"),
        (status = 502, description = "Upstream RPC failure before broadcast", body = ErrorResponse, content_type = "application/json"),
    )
)]
/// Rescue Tokens
///
/// Sweep the listed tokens out of a compromised address into the receiver wallet. The relayer
/// pays the gas, charged against the address's pre-paid gas ledger or the relayer balance.
#[debug_handler]
pub async fn rescue_tokens(
    State(state): State<RescueServerState>,
    ApiJson(request): ApiJson<RescueRequest>,
) -> Result<impl IntoResponse, ApiRescueError> {
    tracing::info!(
        chain_id = ?request.chain_id,
        compromised_address = %request.compromised_address,
        tokens = request.tokens.len(),
        "Processing rescue request"
    );

    let response = state.admission.rescue(request).await?;

    tracing::info!(
        rescue_transaction_hash = %response.rescue_transaction_hash,
        status = ?response.status,
        "Rescue request completed"
    );

    Ok((StatusCode::OK, Json(SuccessResponse::new(response))))
}
