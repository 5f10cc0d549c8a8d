//! Persistence for the gas ledger, rescue records and ingestion checkpoints.

use alloy::primitives::{Address, TxHash};
use rescue_core::{
    error::EngineError,
    ledger::{GasPayment, LastBlockRecord, LedgerBalance, RescueTransaction},
};
use thiserror::Error;
use uuid::Uuid;

mod redis_store;

pub use redis_store::RedisLedgerStore;

#[derive(Debug, Error)]
pub enum LedgerStoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Failed to (de)serialize {record}: {message}")]
    Serialization {
        record: &'static str,
        message: String,
    },

    #[error("Rescue transaction not found: {id}")]
    RescueTransactionNotFound { id: Uuid },
}

impl From<LedgerStoreError> for EngineError {
    fn from(err: LedgerStoreError) -> Self {
        EngineError::InternalError {
            message: err.to_string(),
        }
    }
}

/// Storage seen by the ingestion pipeline and the orchestrator.
///
/// `insert_gas_payment` must be a no-op returning `false` when the transaction hash is
/// already recorded, and `advance_checkpoint` must never lower a stored block.
pub trait LedgerStore: Send + Sync + 'static {
    fn insert_gas_payment(
        &self,
        payment: &GasPayment,
    ) -> impl Future<Output = Result<bool, LedgerStoreError>> + Send;

    fn gas_payment_exists(
        &self,
        gas_transaction_hash: TxHash,
    ) -> impl Future<Output = Result<bool, LedgerStoreError>> + Send;

    fn get_gas_payment(
        &self,
        gas_transaction_hash: TxHash,
    ) -> impl Future<Output = Result<Option<GasPayment>, LedgerStoreError>> + Send;

    fn gas_payments_for(
        &self,
        chain_id: u64,
        compromised_address: Address,
    ) -> impl Future<Output = Result<Vec<GasPayment>, LedgerStoreError>> + Send;

    fn create_rescue_transaction(
        &self,
        record: &RescueTransaction,
    ) -> impl Future<Output = Result<(), LedgerStoreError>> + Send;

    fn update_rescue_transaction(
        &self,
        record: &RescueTransaction,
    ) -> impl Future<Output = Result<(), LedgerStoreError>> + Send;

    fn get_rescue_transaction(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<RescueTransaction>, LedgerStoreError>> + Send;

    fn rescue_transactions_for(
        &self,
        chain_id: u64,
        compromised_address: Address,
    ) -> impl Future<Output = Result<Vec<RescueTransaction>, LedgerStoreError>> + Send;

    fn get_checkpoint(
        &self,
        chain_id: u64,
    ) -> impl Future<Output = Result<Option<LastBlockRecord>, LedgerStoreError>> + Send;

    /// Raises the checkpoint to `last_block`. Returns `false` if it was already at or above it.
    fn advance_checkpoint(
        &self,
        chain_id: u64,
        last_block: u64,
    ) -> impl Future<Output = Result<bool, LedgerStoreError>> + Send;
}

/// Everything recorded for one compromised address on one chain.
#[derive(Debug, Clone)]
pub struct LedgerView {
    pub balance: LedgerBalance,
    pub payments: Vec<GasPayment>,
    pub rescues: Vec<RescueTransaction>,
}

pub async fn ledger_view(
    store: &impl LedgerStore,
    chain_id: u64,
    compromised_address: Address,
) -> Result<LedgerView, LedgerStoreError> {
    let (mut payments, mut rescues) = futures::try_join!(
        store.gas_payments_for(chain_id, compromised_address),
        store.rescue_transactions_for(chain_id, compromised_address),
    )?;

    payments.sort_by_key(|p| (p.block_number, p.created_at));
    rescues.sort_by_key(|r| r.created_at);

    Ok(LedgerView {
        balance: LedgerBalance::from_records(&payments, &rescues),
        payments,
        rescues,
    })
}
