use std::sync::Arc;

use axum::{Json, Router, routing::get};
use explorer_core::ExplorerClient;
use rescue_executors::{
    ledger::GasLedgerIngestor, rescue::RescueAdmission, store::RedisLedgerStore,
};
use tokio::{sync::watch, task::JoinHandle};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_scalar::{Scalar, Servable};

use crate::chains::RescueChainService;

use super::routes::{
    admin::{
        ledger::{__path_reconcile_ledger, reconcile_ledger},
        metrics::get_metrics,
    },
    ledger::{__path_get_ledger, get_ledger},
    rescue::{__path_rescue_tokens, rescue_tokens},
};

pub type ServerIngestor = GasLedgerIngestor<RescueChainService, ExplorerClient, RedisLedgerStore>;
pub type ServerAdmission = RescueAdmission<RescueChainService, ExplorerClient, RedisLedgerStore>;

#[derive(Clone)]
pub struct RescueServerState {
    pub admission: Arc<ServerAdmission>,
    pub store: Arc<RedisLedgerStore>,
    pub metrics_registry: Arc<prometheus::Registry>,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Token Rescue Relayer",
        description = "Sweeps tokens out of compromised wallets through EIP-7702 delegation, with gas paid by the relayer."
    ),
    tags(
        (name = "Rescue", description = "Token rescue execution"),
        (name = "Ledger", description = "Pre-paid gas ledger"),
        (name = "Admin", description = "Operational endpoints"),
    )
)]
struct ApiDoc;

pub struct RescueServer {
    handle: Option<JoinHandle<Result<(), std::io::Error>>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    app: Router,
}

impl RescueServer {
    pub fn new(state: RescueServerState) -> Self {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(false);

        let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
            .routes(routes!(rescue_tokens))
            .routes(routes!(get_ledger))
            .routes(routes!(reconcile_ledger))
            .split_for_parts();

        let api_json = api.clone();
        let router = router
            .route("/api.json", get(move || async move { Json(api_json) }))
            .route("/admin/metrics", get(get_metrics))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
            .merge(Scalar::with_url("/reference", api));

        Self {
            handle: None,
            shutdown_tx: None,
            app: router,
        }
    }

    pub fn start(&mut self, listener: tokio::net::TcpListener) -> Result<(), std::io::Error> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let app = self.app.clone();
        let local_addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            tracing::info!("HTTP server starting on {}", local_addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let mut rx = shutdown_rx;
                    while !*rx.borrow() {
                        if rx.changed().await.is_err() {
                            break;
                        }
                    }
                    tracing::info!("HTTP server shutting down");
                })
                .await
        });

        self.handle = Some(handle);
        self.shutdown_tx = Some(shutdown_tx);

        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), std::io::Error> {
        if let Some(tx) = self.shutdown_tx.take() {
            if tx.send(true).is_err() {
                tracing::error!("Failed to send shutdown signal to HTTP server");
            }
        }

        if let Some(handle) = self.handle.take() {
            match handle.await {
                Ok(result) => {
                    if let Err(e) = result {
                        tracing::error!("HTTP server error during shutdown: {}", e);
                        return Err(e);
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to join HTTP server task: {}", e);
                    return Err(std::io::Error::other(format!("Task join error: {}", e)));
                }
            }
        }

        Ok(())
    }
}
