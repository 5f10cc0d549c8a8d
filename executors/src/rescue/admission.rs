use std::{str::FromStr, sync::Arc};

use alloy::primitives::{Address, Bytes, TxHash, U256};
use explorer_core::TransactionHistory;
use rescue_core::{chain::ChainService, defs::lower_hex};
use rescue_eip7702_core::{
    authorization::{PackedAuthorization, parse_signature},
    delegated_account::DelegatedAccount,
    transaction::RescueCall,
};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use uuid::Uuid;

use super::{BudgetMode, RescueError, RescueOrchestrator, RescueOutcome, RescuePlan};
use crate::{
    ledger::GasLedgerIngestor,
    lock::{LockRegistry, ResourceMutex},
    store::LedgerStore,
};

/// Accepts JSON numbers and decimal strings alike.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Number(serde_json::Number),
    Text(String),
}

impl Numeric {
    fn to_u64(&self, field: &str) -> Result<u64, RescueError> {
        let parsed = match self {
            Numeric::Number(n) => n.as_u64().ok_or_else(|| n.to_string()),
            Numeric::Text(s) => s.trim().parse::<u64>().map_err(|_| s.clone()),
        };
        parsed.map_err(|raw| {
            if raw.trim().starts_with('-') {
                RescueError::validation(format!("{field} must be non-negative, got {raw}"))
            } else {
                RescueError::validation(format!("{field} must be an unsigned integer, got {raw}"))
            }
        })
    }
}

impl From<u64> for Numeric {
    fn from(value: u64) -> Self {
        Numeric::Number(value.into())
    }
}

/// Rescue request as submitted by the victim's browser session.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RescueRequest {
    /// Packed EIP-7702 authorization signature, `r || s || v` as 130 hex characters.
    /// Omit when the address is already delegated to the rescue contract.
    pub authorization: Option<String>,
    /// 65-byte EIP-712 signature over the sweep.
    pub eip712_signature: String,
    #[schema(value_type = Vec<rescue_core::defs::AddressDef>)]
    pub tokens: Vec<String>,
    /// Unix seconds, as signed in the EIP-712 message.
    #[schema(value_type = u64)]
    pub deadline: Numeric,
    pub receiver_wallet: String,
    pub gas_transaction_hash: Option<String>,
    pub compromised_address: String,
    #[schema(value_type = u64)]
    pub chain_id: Numeric,
    /// Authorization nonce of the compromised EOA. Required with `authorization`.
    #[schema(value_type = Option<u64>)]
    pub nonce: Option<Numeric>,
}

/// A request whose every field parsed.
#[derive(Debug, Clone)]
pub struct ValidatedRescue {
    pub chain_id: u64,
    pub compromised_address: Address,
    pub receiver: Address,
    pub tokens: Vec<Address>,
    pub deadline: u64,
    pub signature: Bytes,
    pub authorization: Option<(PackedAuthorization, u64)>,
    pub gas_transaction_hash: Option<TxHash>,
}

fn parse_address(field: &str, raw: &str) -> Result<Address, RescueError> {
    Address::from_str(raw.trim())
        .map_err(|e| RescueError::validation(format!("{field} is not a 20-byte hex address: {e}")))
}

impl RescueRequest {
    pub fn validate(&self) -> Result<ValidatedRescue, RescueError> {
        let chain_id = self.chain_id.to_u64("chainId")?;
        let compromised_address = parse_address("compromisedAddress", &self.compromised_address)?;
        let receiver = parse_address("receiverWallet", &self.receiver_wallet)?;

        if self.tokens.is_empty() {
            return Err(RescueError::validation("tokens must not be empty"));
        }
        let tokens = self
            .tokens
            .iter()
            .enumerate()
            .map(|(i, token)| parse_address(&format!("tokens[{i}]"), token))
            .collect::<Result<Vec<_>, _>>()?;

        let deadline = self.deadline.to_u64("deadline")?;
        let signature = parse_signature(&self.eip712_signature)
            .map_err(|e| RescueError::validation(e.to_string()))?;

        let authorization = match &self.authorization {
            Some(packed) => {
                let parsed = PackedAuthorization::parse(packed)
                    .map_err(|e| RescueError::validation(e.to_string()))?;
                let nonce = self
                    .nonce
                    .as_ref()
                    .ok_or_else(|| RescueError::validation("nonce is required with an authorization"))?
                    .to_u64("nonce")?;
                Some((parsed, nonce))
            }
            None => None,
        };

        let gas_transaction_hash = self
            .gas_transaction_hash
            .as_deref()
            .map(|raw| {
                TxHash::from_str(raw.trim()).map_err(|e| {
                    RescueError::validation(format!("gasTransactionHash is not a 32-byte hex hash: {e}"))
                })
            })
            .transpose()?;

        Ok(ValidatedRescue {
            chain_id,
            compromised_address,
            receiver,
            tokens,
            deadline,
            signature,
            authorization,
            gas_transaction_hash,
        })
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RescueResponse {
    #[schema(value_type = rescue_core::defs::TxHashDef)]
    pub rescue_transaction_hash: TxHash,
    pub gas_used: u64,
    #[serde_as(as = "DisplayFromStr")]
    #[schema(value_type = rescue_core::defs::WeiDef)]
    pub eth_used: U256,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[schema(value_type = Option<rescue_core::defs::WeiDef>)]
    pub remaining_eth: Option<U256>,
    pub status: rescue_core::ledger::RescueStatus,
}

impl From<RescueOutcome> for RescueResponse {
    fn from(outcome: RescueOutcome) -> Self {
        Self {
            rescue_transaction_hash: outcome.rescue_transaction_hash,
            gas_used: outcome.gas_used,
            eth_used: outcome.eth_used,
            remaining_eth: outcome.remaining_eth,
            status: outcome.status,
        }
    }
}

/// Front door for rescues: validation, the per-address lock, ledger catch-up, dispatch.
pub struct RescueAdmission<CS, H, S> {
    chains: Arc<CS>,
    ingestor: GasLedgerIngestor<CS, H, S>,
    orchestrator: RescueOrchestrator<CS, S>,
    rescue_locks: Arc<LockRegistry<ResourceMutex>>,
    delegate_contract: Address,
}

impl<CS, H, S> Clone for RescueAdmission<CS, H, S> {
    fn clone(&self) -> Self {
        Self {
            chains: self.chains.clone(),
            ingestor: self.ingestor.clone(),
            orchestrator: self.orchestrator.clone(),
            rescue_locks: self.rescue_locks.clone(),
            delegate_contract: self.delegate_contract,
        }
    }
}

impl<CS, H, S> RescueAdmission<CS, H, S>
where
    CS: ChainService,
    H: TransactionHistory,
    S: LedgerStore,
{
    pub fn new(
        chains: Arc<CS>,
        ingestor: GasLedgerIngestor<CS, H, S>,
        orchestrator: RescueOrchestrator<CS, S>,
        rescue_locks: Arc<LockRegistry<ResourceMutex>>,
        delegate_contract: Address,
    ) -> Self {
        Self {
            chains,
            ingestor,
            orchestrator,
            rescue_locks,
            delegate_contract,
        }
    }

    pub fn ingestor(&self) -> &GasLedgerIngestor<CS, H, S> {
        &self.ingestor
    }

    #[tracing::instrument(skip_all, fields(
        chain_id = tracing::field::Empty,
        compromised_address = tracing::field::Empty,
    ))]
    pub async fn rescue(&self, request: RescueRequest) -> Result<RescueResponse, RescueError> {
        let validated = request.validate()?;
        let span = tracing::Span::current();
        span.record("chain_id", validated.chain_id);
        span.record(
            "compromised_address",
            tracing::field::display(lower_hex(&validated.compromised_address)),
        );

        let chain = self.chains.get_chain(validated.chain_id)?;

        let authorization = match validated.authorization {
            Some((packed, nonce)) => {
                Some(packed.into_signed(validated.chain_id, self.delegate_contract, nonce))
            }
            None => {
                let account = DelegatedAccount::new(validated.compromised_address, &chain);
                if !account.is_delegated_to(self.delegate_contract).await? {
                    return Err(RescueError::validation(format!(
                        "{} is not delegated to the rescue contract {} and no authorization was supplied",
                        lower_hex(&validated.compromised_address),
                        lower_hex(&self.delegate_contract),
                    )));
                }
                None
            }
        };

        let key = lower_hex(&validated.compromised_address);
        let lock = self.rescue_locks.get(&key);
        let Some(_guard) = lock.try_acquire(format!("rescue:{}", Uuid::new_v4())) else {
            let held_for_ms = lock.lock_duration().map(|d| d.as_millis() as u64);
            tracing::info!(held_for_ms = ?held_for_ms, "Rescue already in progress for address");
            return Err(RescueError::OperationInProgress {
                compromised_address: key,
                held_for_ms,
            });
        };

        if self.orchestrator.mode() == BudgetMode::Ledger {
            self.reconcile(validated.chain_id, validated.gas_transaction_hash)
                .await;
        }

        let plan = RescuePlan {
            chain_id: validated.chain_id,
            call: RescueCall {
                compromised_address: validated.compromised_address,
                recipient: validated.receiver,
                tokens: validated.tokens,
                deadline: validated.deadline,
                signature: validated.signature,
                authorization,
            },
            gas_transaction_hash: validated.gas_transaction_hash,
        };

        let outcome = self.orchestrator.execute(plan).await?;
        Ok(outcome.into())
    }

    /// Brings the ledger up to date for this chain. Failures are logged and the rescue
    /// continues against whatever the ledger already holds.
    async fn reconcile(&self, chain_id: u64, gas_transaction_hash: Option<TxHash>) {
        if let Err(e) = self.ingestor.update_chain(chain_id).await {
            tracing::warn!(chain_id, error = %e, "Ledger catch-up failed before rescue");
        }

        if let Some(hash) = gas_transaction_hash {
            match self.ingestor.ingest_transaction_hash(chain_id, hash).await {
                Ok(true) => tracing::info!(gas_transaction_hash = %hash, "Recorded gas payment from direct lookup"),
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    gas_transaction_hash = %hash,
                    error = %e,
                    "Direct gas transaction lookup failed"
                ),
            }
        }
    }
}
