use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use alloy::primitives::{Address, TxHash, U256};
use chrono::Utc;
use rescue_core::{
    chain::{Chain, ChainService},
    gas::{apply_gas_buffer, calculate_fees, eth_used},
    ledger::{RescueStatus, RescueTransaction},
};
use rescue_eip7702_core::transaction::RescueCall;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use uuid::Uuid;

use super::RescueError;
use crate::{
    metrics::record_rescue_sent_to_mined,
    store::{LedgerStore, ledger_view},
};

/// Receipts are awaited for at most this many blocks unless configured otherwise.
pub const DEFAULT_MAX_BLOCK_WINDOW: u64 = 10;

/// Where the gas money for a rescue comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BudgetMode {
    /// The backend wallet's live balance. Nothing is read from or charged to the ledger.
    Local,
    /// What the compromised address pre-paid, minus what earlier rescues spent.
    Ledger,
}

/// A validated rescue, ready to execute.
#[derive(Debug, Clone)]
pub struct RescuePlan {
    pub chain_id: u64,
    pub call: RescueCall,
    pub gas_transaction_hash: Option<TxHash>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RescueOutcome {
    #[schema(value_type = rescue_core::defs::TxHashDef)]
    pub rescue_transaction_hash: TxHash,
    pub gas_used: u64,
    #[serde_as(as = "DisplayFromStr")]
    #[schema(value_type = rescue_core::defs::WeiDef)]
    pub eth_used: U256,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[schema(value_type = Option<rescue_core::defs::WeiDef>)]
    pub remaining_eth: Option<U256>,
    pub status: RescueStatus,
    pub record_id: Uuid,
}

pub struct RescueOrchestrator<CS, S> {
    chains: Arc<CS>,
    store: Arc<S>,
    mode: BudgetMode,
    max_block_window: u64,
    priority_fee_override: Option<u128>,
}

impl<CS, S> Clone for RescueOrchestrator<CS, S> {
    fn clone(&self) -> Self {
        Self {
            chains: self.chains.clone(),
            store: self.store.clone(),
            mode: self.mode,
            max_block_window: self.max_block_window,
            priority_fee_override: self.priority_fee_override,
        }
    }
}

impl<CS, S> RescueOrchestrator<CS, S>
where
    CS: ChainService,
    S: LedgerStore,
{
    pub fn new(chains: Arc<CS>, store: Arc<S>, mode: BudgetMode) -> Self {
        Self {
            chains,
            store,
            mode,
            max_block_window: DEFAULT_MAX_BLOCK_WINDOW,
            priority_fee_override: None,
        }
    }

    pub fn with_max_block_window(mut self, blocks: u64) -> Self {
        self.max_block_window = blocks.max(1);
        self
    }

    pub fn with_priority_fee_override(mut self, fee: Option<u128>) -> Self {
        self.priority_fee_override = fee;
        self
    }

    pub fn mode(&self) -> BudgetMode {
        self.mode
    }

    fn receipt_timeout(&self, chain: &impl Chain) -> Duration {
        chain.block_time() * self.max_block_window as u32
    }

    async fn budget(&self, chain: &impl Chain, compromised_address: Address) -> Result<U256, RescueError> {
        match self.mode {
            BudgetMode::Local => Ok(chain.get_balance(chain.relayer_address()).await?),
            BudgetMode::Ledger => {
                let view = ledger_view(self.store.as_ref(), chain.chain_id(), compromised_address).await?;
                Ok(view.balance.remaining())
            }
        }
    }

    /// Estimate, check budget, broadcast, await the receipt and record the outcome.
    ///
    /// Insufficient funds is decided before anything is written or sent. Once a
    /// `pending` record exists, a failed send or receipt wait marks it `failed`
    /// before returning.
    #[tracing::instrument(skip_all, fields(
        chain_id = plan.chain_id,
        compromised_address = %plan.call.compromised_address,
        mode = ?self.mode,
    ))]
    pub async fn execute(&self, plan: RescuePlan) -> Result<RescueOutcome, RescueError> {
        let chain = self.chains.get_chain(plan.chain_id)?;
        let relayer = chain.relayer_address();
        let compromised_address = plan.call.compromised_address;

        let budget = self.budget(&chain, compromised_address).await?;

        let estimate_request = plan.call.to_request(relayer, plan.chain_id);
        let raw_gas = chain.estimate_gas(&estimate_request).await?;
        let gas_limit = apply_gas_buffer(raw_gas);
        let fees = calculate_fees(&chain, self.priority_fee_override).await?;
        let estimated_gas_eth = fees.gas_to_eth(gas_limit);

        tracing::debug!(
            raw_gas,
            gas_limit,
            estimated_gas_eth = %estimated_gas_eth,
            budget = %budget,
            "Estimated rescue cost"
        );

        if estimated_gas_eth > budget {
            let extra_gas_eth_needed = estimated_gas_eth - budget;
            tracing::warn!(
                extra_gas_eth_needed = %extra_gas_eth_needed,
                estimated_gas_eth = %estimated_gas_eth,
                remaining_eth = %budget,
                "Insufficient gas funds for rescue"
            );
            return Err(RescueError::InsufficientFunds {
                extra_gas_eth_needed,
                estimated_gas_eth,
                remaining_eth: budget,
            });
        }

        let mut record = RescueTransaction {
            id: Uuid::new_v4(),
            compromised_address,
            receiver_address: plan.call.recipient,
            tokens: plan.call.tokens.clone(),
            gas_transaction_hash: plan.gas_transaction_hash,
            rescue_transaction_hash: None,
            gas_used: None,
            eth_used: None,
            chain_id: plan.chain_id,
            deadline: plan.call.deadline,
            status: RescueStatus::Pending,
            created_at: Utc::now(),
        };

        // ledger mode keeps an audit row from before broadcast
        let persisted = self.mode == BudgetMode::Ledger;
        if persisted {
            self.store.create_rescue_transaction(&record).await?;
        }

        let request = plan
            .call
            .to_priced_request(relayer, plan.chain_id, gas_limit, &fees);

        match self.broadcast_and_wait(&chain, request, &mut record, persisted).await {
            Ok(()) => {}
            Err(message) => {
                record.status = RescueStatus::Failed;
                if persisted {
                    if let Err(e) = self.store.update_rescue_transaction(&record).await {
                        tracing::error!(
                            record_id = %record.id,
                            error = %e,
                            "Failed to mark rescue transaction as failed"
                        );
                    }
                }
                tracing::error!(
                    record_id = %record.id,
                    rescue_transaction_hash = ?record.rescue_transaction_hash,
                    error = %message,
                    "Rescue aborted, record marked failed"
                );
                return Err(RescueError::Fatal {
                    message,
                    rescue_transaction_hash: record.rescue_transaction_hash.map(|h| h.to_string()),
                });
            }
        }

        if persisted {
            self.store.update_rescue_transaction(&record).await?;
        } else {
            self.store.create_rescue_transaction(&record).await?;
        }

        let spent = record.eth_used.unwrap_or_default();
        let remaining_eth = persisted.then(|| budget.saturating_sub(spent));

        Ok(RescueOutcome {
            rescue_transaction_hash: record.rescue_transaction_hash.unwrap_or_default(),
            gas_used: record.gas_used.unwrap_or_default(),
            eth_used: spent,
            remaining_eth,
            status: record.status,
            record_id: record.id,
        })
    }

    /// Fills `record` with the broadcast hash and receipt data. Errors come back as
    /// messages so the caller can do the failure bookkeeping in one place.
    async fn broadcast_and_wait(
        &self,
        chain: &impl Chain,
        request: alloy::rpc::types::TransactionRequest,
        record: &mut RescueTransaction,
        persisted: bool,
    ) -> Result<(), String> {
        let hash = chain
            .send_transaction(request)
            .await
            .map_err(|e| format!("broadcast failed: {e}"))?;
        let sent_at = Instant::now();
        record.rescue_transaction_hash = Some(hash);
        tracing::info!(rescue_transaction_hash = %hash, "Broadcast rescue transaction");

        // A lost hash write is retried by the final update. The receipt must still be
        // awaited so the gas gets charged.
        if persisted {
            if let Err(e) = self.store.update_rescue_transaction(record).await {
                tracing::warn!(
                    record_id = %record.id,
                    rescue_transaction_hash = %hash,
                    error = %e,
                    "Failed to record broadcast hash, continuing to receipt"
                );
            }
        }

        let timeout = self.receipt_timeout(chain);
        let receipt = chain
            .wait_for_receipt(hash, timeout)
            .await
            .map_err(|e| format!("receipt wait failed: {e}"))?;

        // a reverted rescue still paid for its gas
        record.status = if receipt.success {
            RescueStatus::Success
        } else {
            RescueStatus::Failed
        };
        record.gas_used = Some(receipt.gas_used);
        record.eth_used = Some(eth_used(receipt.gas_used, receipt.effective_gas_price));

        record_rescue_sent_to_mined(
            chain.chain_id(),
            record.status.as_str(),
            sent_at.elapsed().as_secs_f64(),
        );

        tracing::info!(
            rescue_transaction_hash = %hash,
            status = ?record.status,
            gas_used = receipt.gas_used,
            "Rescue transaction mined"
        );
        Ok(())
    }
}
