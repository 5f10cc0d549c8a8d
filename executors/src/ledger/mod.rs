//! Reconciles the gas ledger from the backend wallet's on-chain history.

use std::{sync::Arc, time::Instant};

use alloy::primitives::{Address, TxHash};
use explorer_core::{TransactionHistory, TxListQuery, error::ExplorerError};
use rescue_core::{
    chain::{Chain, ChainService, ChainTransaction},
    error::EngineError,
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    lock::{LockError, LockRegistry, QueuedMutex},
    metrics::record_ingestion_scan,
    store::{LedgerStore, LedgerStoreError},
};

mod extract;

pub use extract::{GAS_PAYMENT_PAYLOAD_LENGTH, Rejection, classify, extract_gas_payment};

pub const DEFAULT_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Explorer(#[from] ExplorerError),

    #[error(transparent)]
    Store(#[from] LedgerStoreError),
}

/// Outcome of one successfully scanned chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainScan {
    pub chain_id: u64,
    pub start_block: u64,
    pub end_block: u64,
    pub pages: u32,
    pub inserted: usize,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestionFailure {
    pub chain_id: u64,
    pub message: String,
}

/// Result of a full reconciliation across every configured chain.
#[derive(Debug, Clone, Default, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    /// Chains whose range was scanned to the head without error.
    pub processed: usize,
    /// Gas payments newly recorded during this run.
    pub inserted: usize,
    pub errors: Vec<IngestionFailure>,
}

pub struct GasLedgerIngestor<CS, H, S> {
    chains: Arc<CS>,
    explorer: Arc<H>,
    store: Arc<S>,
    chain_locks: Arc<LockRegistry<QueuedMutex>>,
    page_size: u32,
}

impl<CS, H, S> Clone for GasLedgerIngestor<CS, H, S> {
    fn clone(&self) -> Self {
        Self {
            chains: self.chains.clone(),
            explorer: self.explorer.clone(),
            store: self.store.clone(),
            chain_locks: self.chain_locks.clone(),
            page_size: self.page_size,
        }
    }
}

impl<CS, H, S> GasLedgerIngestor<CS, H, S>
where
    CS: ChainService,
    H: TransactionHistory,
    S: LedgerStore,
{
    pub fn new(
        chains: Arc<CS>,
        explorer: Arc<H>,
        store: Arc<S>,
        chain_locks: Arc<LockRegistry<QueuedMutex>>,
    ) -> Self {
        Self {
            chains,
            explorer,
            store,
            chain_locks,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Scans every configured chain concurrently. A failing chain is reported and
    /// left at its old checkpoint; the others still complete.
    #[tracing::instrument(skip(self))]
    pub async fn update_gas_transactions(&self) -> IngestionReport {
        let chain_ids = self.chains.chain_ids();
        let scans = futures::future::join_all(
            chain_ids
                .iter()
                .map(|&chain_id| async move { (chain_id, self.update_chain(chain_id).await) }),
        )
        .await;

        let mut report = IngestionReport::default();
        for (chain_id, scan) in scans {
            match scan {
                Ok(scan) => {
                    report.processed += 1;
                    report.inserted += scan.inserted;
                }
                Err(e) => {
                    tracing::error!(chain_id, error = %e, "Gas ledger ingestion failed");
                    report.errors.push(IngestionFailure {
                        chain_id,
                        message: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            processed = report.processed,
            inserted = report.inserted,
            failed = report.errors.len(),
            "Gas ledger reconciliation finished"
        );
        report
    }

    /// Scans one chain from its checkpoint to the current head while holding that
    /// chain's ingestion lock.
    #[tracing::instrument(skip(self), fields(start_block = tracing::field::Empty, end_block = tracing::field::Empty))]
    pub async fn update_chain(&self, chain_id: u64) -> Result<ChainScan, IngestionError> {
        let lock = self.chain_locks.get(&chain_id.to_string());
        let _guard = lock.acquire(format!("ingest:{chain_id}")).await?;
        let started = Instant::now();

        let chain = self.chains.get_chain(chain_id)?;
        let last_block = self
            .store
            .get_checkpoint(chain_id)
            .await?
            .map(|record| record.last_block)
            .unwrap_or(0);

        let start_block = last_block + 1;
        let end_block = chain.get_block_number().await?;

        let span = tracing::Span::current();
        span.record("start_block", start_block);
        span.record("end_block", end_block);

        let mut scan = ChainScan {
            chain_id,
            start_block,
            end_block,
            pages: 0,
            inserted: 0,
        };

        if start_block > end_block {
            tracing::debug!("Checkpoint already at chain head");
            record_ingestion_scan(chain_id, started.elapsed().as_secs_f64());
            return Ok(scan);
        }

        let backend = chain.relayer_address();
        let mut query = TxListQuery {
            chain_id,
            address: backend,
            start_block,
            end_block,
            page: 1,
            offset: self.page_size,
        };

        loop {
            let rows = self.explorer.transactions_page(&query).await?;
            scan.pages += 1;

            tracing::debug!(
                start_block = query.start_block,
                page = query.page,
                rows = rows.len(),
                "Fetched explorer page"
            );

            let Some(last_row) = rows.last() else {
                break;
            };
            let last_fetched_block = last_row.block_number()?;

            for row in &rows {
                let tx = match row.to_chain_transaction() {
                    Ok(tx) => tx,
                    Err(e) => {
                        tracing::warn!(hash = %row.hash, error = %e, "Skipping malformed explorer row");
                        continue;
                    }
                };
                if self.record(&tx, backend, chain_id).await? {
                    scan.inserted += 1;
                }
            }

            if rows.len() < self.page_size as usize || last_fetched_block >= end_block {
                break;
            }

            // Re-anchor one block back so rows sharing the boundary block are fetched again
            // and deduplicated. A page that sits entirely inside one block cannot move the
            // anchor, so page forward instead.
            let next_start = last_fetched_block.saturating_sub(1);
            if next_start > query.start_block {
                query.start_block = next_start;
                query.page = 1;
            } else {
                query.page += 1;
            }
        }

        if self.store.advance_checkpoint(chain_id, end_block).await? {
            tracing::info!(
                last_block = end_block,
                inserted = scan.inserted,
                pages = scan.pages,
                "Advanced ingestion checkpoint"
            );
        }

        record_ingestion_scan(chain_id, started.elapsed().as_secs_f64());
        Ok(scan)
    }

    /// Looks up one transaction directly on chain and records it if it is a gas payment.
    /// Covers payments made after the last scan but before the next one.
    #[tracing::instrument(skip(self))]
    pub async fn ingest_transaction_hash(
        &self,
        chain_id: u64,
        gas_transaction_hash: TxHash,
    ) -> Result<bool, IngestionError> {
        if self.store.gas_payment_exists(gas_transaction_hash).await? {
            return Ok(false);
        }

        let lock = self.chain_locks.get(&chain_id.to_string());
        let _guard = lock.acquire(format!("ingest-hash:{gas_transaction_hash}")).await?;

        let chain = self.chains.get_chain(chain_id)?;
        let Some(tx) = chain.get_transaction(gas_transaction_hash).await? else {
            tracing::debug!("Gas transaction not found on chain");
            return Ok(false);
        };

        Ok(self.record(&tx, chain.relayer_address(), chain_id).await?)
    }

    async fn record(
        &self,
        tx: &ChainTransaction,
        backend: Address,
        chain_id: u64,
    ) -> Result<bool, LedgerStoreError> {
        let Some(payment) = extract_gas_payment(tx, backend, chain_id) else {
            return Ok(false);
        };

        if self.store.gas_payment_exists(payment.gas_transaction_hash).await? {
            return Ok(false);
        }

        let inserted = self.store.insert_gas_payment(&payment).await?;
        if inserted {
            tracing::info!(
                chain_id,
                gas_transaction_hash = %payment.gas_transaction_hash,
                compromised_address = %payment.compromised_address,
                eth_paid = %payment.eth_paid,
                block_number = payment.block_number,
                "Recorded gas payment"
            );
        }
        Ok(inserted)
    }
}
