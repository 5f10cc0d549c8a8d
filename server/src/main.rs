use std::{sync::Arc, time::Duration};

use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use explorer_core::ExplorerClientBuilder;
use rescue_core::chain::ChainService;
use rescue_executors::{
    ledger::GasLedgerIngestor,
    lock::{LockRegistry, SharedClock, SystemClock},
    metrics::{ExecutorMetrics, initialize_metrics},
    rescue::{RescueAdmission, RescueOrchestrator},
    store::RedisLedgerStore,
};
use rescue_server::{
    chains::RescueChainService,
    config,
    http::server::{RescueServer, RescueServerState},
    reconcile::spawn_reconciler,
};
use tokio::sync::watch;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::get_config();

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level if RUST_LOG environment variable is not set
            "rescue_server=debug,tower_http=debug,axum=debug,rescue_executors=debug,rescue_core=debug,explorer_core=debug"
                .into()
        }));

    match config.server.log_format {
        config::LogFormat::Json => subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        config::LogFormat::Pretty => subscriber.with(tracing_subscriber::fmt::layer()).init(),
    }

    let metrics_registry = Arc::new(prometheus::Registry::new());
    let executor_metrics = ExecutorMetrics::new(&metrics_registry)
        .map_err(|e| anyhow::anyhow!("Failed to create executor metrics: {e}"))?;
    initialize_metrics(executor_metrics);
    tracing::info!("Executor metrics initialized");

    let relayer: PrivateKeySigner = config.relayer.private_key.trim().parse()?;
    let delegate_contract: Address = config.rescue.delegate_contract.trim().parse()?;

    let chains = Arc::new(RescueChainService::from_config(
        &config.rpc,
        &config.chains,
        &relayer,
    )?);
    tracing::info!(
        relayer = %relayer.address(),
        delegate_contract = %delegate_contract,
        chains = ?chains.chain_ids(),
        "Chain service initialized"
    );

    let redis_client = redis::Client::open(config.redis.url.as_str())?;
    let store = Arc::new(RedisLedgerStore::new(
        redis_client.get_connection_manager().await?,
        config.redis.namespace.clone(),
    ));
    tracing::info!("Ledger store initialized");

    let explorer = Arc::new(
        ExplorerClientBuilder::new(&config.explorer.url, config.explorer.api_key.clone())?
            .with_timeout(Duration::from_secs(config.explorer.timeout_secs))
            .build()?,
    );

    let clock: SharedClock = Arc::new(SystemClock);
    let rescue_locks = Arc::new(LockRegistry::resource(
        clock.clone(),
        Duration::from_secs(config.rescue.lock_timeout_secs),
        config.ledger.registry_idle_ttl(),
    ));
    let chain_locks = Arc::new(LockRegistry::queued(
        clock,
        config.ledger.lock_timeout(),
        config.ledger.registry_idle_ttl(),
    ));

    let ingestor = GasLedgerIngestor::new(
        chains.clone(),
        explorer,
        store.clone(),
        chain_locks.clone(),
    )
    .with_page_size(config.explorer.page_size);

    let orchestrator = RescueOrchestrator::new(chains.clone(), store.clone(), config.rescue.budget_mode)
        .with_max_block_window(config.rescue.max_block_window)
        .with_priority_fee_override(config.rescue.priority_fee_override.map(u128::from));

    let admission = RescueAdmission::new(
        chains,
        ingestor.clone(),
        orchestrator,
        rescue_locks.clone(),
        delegate_contract,
    );
    tracing::info!(budget_mode = ?config.rescue.budget_mode, "Rescue admission initialized");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background = vec![
        rescue_locks.spawn_sweeper(config.ledger.sweep_interval(), shutdown_rx.clone()),
        chain_locks.spawn_sweeper(config.ledger.sweep_interval(), shutdown_rx.clone()),
    ];
    if let Some(interval) = config.ledger.reconcile_interval() {
        background.push(spawn_reconciler(ingestor, interval, shutdown_rx.clone()));
    }

    let mut server = RescueServer::new(RescueServerState {
        admission: Arc::new(admission),
        store,
        metrics_registry,
    });

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    server.start(listener)?;

    tracing::info!("Server started, waiting for shutdown signal");
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {}", e);
    }
    tracing::info!("Shutdown signal received");

    if let Err(e) = server.shutdown().await {
        tracing::error!("Error during HTTP server shutdown: {}", e);
    } else {
        tracing::info!("HTTP server shut down successfully");
    }

    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Background tasks already stopped");
    }
    for result in futures::future::join_all(background).await {
        if let Err(e) = result {
            tracing::error!("Background task failed during shutdown: {}", e);
        }
    }
    tracing::info!("All background tasks stopped");

    Ok(())
}
