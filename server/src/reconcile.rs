use std::time::Duration;

use tokio::{sync::watch, task::JoinHandle};

use crate::http::server::ServerIngestor;

/// Reconciles every configured chain on a fixed cadence until `shutdown` flips to `true`.
/// The first run starts one full interval after spawn.
pub fn spawn_reconciler(
    ingestor: ServerIngestor,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(interval_secs = interval.as_secs(), "Ledger reconciler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = ingestor.update_gas_transactions().await;
                    for failure in &report.errors {
                        tracing::warn!(
                            chain_id = failure.chain_id,
                            error = %failure.message,
                            "Background reconciliation failed for chain"
                        );
                    }
                    tracing::debug!(
                        processed = report.processed,
                        inserted = report.inserted,
                        "Background reconciliation finished"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Ledger reconciler stopped");
                        break;
                    }
                }
            }
        }
    })
}
