use axum::{
    debug_handler,
    extract::State,
    response::{IntoResponse, Json},
};
use rescue_executors::ledger::IngestionReport;

use crate::http::{server::RescueServerState, types::SuccessResponse};

#[utoipa::path(
    post,
    operation_id = "reconcileLedger",
    path = "/admin/ledger/reconcile",
    tag = "Admin",
    responses(
        (status = 200, description = "Reconciliation finished. Chains that failed are listed in `errors` and keep their checkpoint", body = SuccessResponse<IngestionReport>, content_type = "application/json"),
    )
)]
/// Reconcile Ledger
///
/// Scan every configured chain from its checkpoint to the current head and record new gas
/// payments. One chain failing does not stop the others.
#[debug_handler]
pub async fn reconcile_ledger(State(state): State<RescueServerState>) -> impl IntoResponse {
    tracing::info!("Processing ledger reconciliation request");

    let report = state.admission.ingestor().update_gas_transactions().await;

    tracing::info!(
        processed = report.processed,
        inserted = report.inserted,
        failed = report.errors.len(),
        "Ledger reconciliation completed"
    );

    Json(SuccessResponse::new(report))
}
