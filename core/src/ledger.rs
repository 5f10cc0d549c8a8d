//! Persisted records of the gas ledger and rescue lifecycle.

use alloy::primitives::{Address, TxHash, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use uuid::Uuid;

use crate::defs::{AddressDef, TxHashDef, WeiDef, lower_hex_address};

/// An ETH transfer to the backend wallet earmarked for one compromised address.
/// Never mutated once written; `gas_transaction_hash` is unique across the ledger.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GasPayment {
    pub id: Uuid,
    #[serde(with = "lower_hex_address")]
    #[schema(value_type = AddressDef)]
    pub compromised_address: Address,
    #[schema(value_type = TxHashDef)]
    pub gas_transaction_hash: TxHash,
    #[serde_as(as = "DisplayFromStr")]
    #[schema(value_type = WeiDef)]
    pub eth_paid: U256,
    pub chain_id: u64,
    pub block_number: u64,
    pub created_at: DateTime<Utc>,
}

impl GasPayment {
    pub fn new(
        compromised_address: Address,
        gas_transaction_hash: TxHash,
        eth_paid: U256,
        chain_id: u64,
        block_number: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            compromised_address,
            gas_transaction_hash,
            eth_paid,
            chain_id,
            block_number,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RescueStatus {
    Pending,
    Success,
    Failed,
}

impl RescueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RescueStatus::Pending => "pending",
            RescueStatus::Success => "success",
            RescueStatus::Failed => "failed",
        }
    }
}

/// One rescue attempt, from `pending` before broadcast to `success`/`failed`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RescueTransaction {
    pub id: Uuid,
    #[serde(with = "lower_hex_address")]
    #[schema(value_type = AddressDef)]
    pub compromised_address: Address,
    #[schema(value_type = AddressDef)]
    pub receiver_address: Address,
    #[schema(value_type = Vec<AddressDef>)]
    pub tokens: Vec<Address>,
    #[schema(value_type = Option<TxHashDef>)]
    pub gas_transaction_hash: Option<TxHash>,
    #[schema(value_type = Option<TxHashDef>)]
    pub rescue_transaction_hash: Option<TxHash>,
    pub gas_used: Option<u64>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[schema(value_type = Option<WeiDef>)]
    pub eth_used: Option<U256>,
    pub chain_id: u64,
    pub deadline: u64,
    pub status: RescueStatus,
    pub created_at: DateTime<Utc>,
}

/// Per-chain ingestion checkpoint. `last_block` never decreases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastBlockRecord {
    pub chain_id: u64,
    pub last_block: u64,
    pub updated_at: DateTime<Utc>,
}

/// Pre-paid gas for one compromised address on one chain.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LedgerBalance {
    #[serde_as(as = "DisplayFromStr")]
    #[schema(value_type = WeiDef)]
    pub total_eth_paid: U256,
    #[serde_as(as = "DisplayFromStr")]
    #[schema(value_type = WeiDef)]
    pub total_eth_used: U256,
}

impl LedgerBalance {
    pub fn from_records(payments: &[GasPayment], rescues: &[RescueTransaction]) -> Self {
        Self {
            total_eth_paid: payments.iter().map(|p| p.eth_paid).sum(),
            total_eth_used: rescues.iter().filter_map(|r| r.eth_used).sum(),
        }
    }

    /// Paid minus used, floored at zero.
    pub fn remaining(&self) -> U256 {
        self.total_eth_paid.saturating_sub(self.total_eth_used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, b256};

    #[test]
    fn gas_payment_persists_lowercase_address_and_decimal_wei() {
        let payment = GasPayment::new(
            address!("0xabcdef0123456789abcdef0123456789abcdef01"),
            b256!("0x1111111111111111111111111111111111111111111111111111111111111111"),
            U256::from(10_000_000_000_000_000u64),
            1,
            42,
        );

        let json = serde_json::to_value(&payment).unwrap();
        assert_eq!(
            json["compromisedAddress"],
            "0xabcdef0123456789abcdef0123456789abcdef01"
        );
        assert_eq!(json["ethPaid"], "10000000000000000");

        let back: GasPayment = serde_json::from_value(json).unwrap();
        assert_eq!(back, payment);
    }

    #[test]
    fn remaining_balance_subtracts_recorded_usage() {
        let who = address!("0x00000000000000000000000000000000000000aa");
        let payments = vec![
            GasPayment::new(who, TxHash::with_last_byte(1), U256::from(700u64), 1, 1),
            GasPayment::new(who, TxHash::with_last_byte(2), U256::from(300u64), 1, 2),
        ];
        let rescue = RescueTransaction {
            id: Uuid::new_v4(),
            compromised_address: who,
            receiver_address: Address::ZERO,
            tokens: vec![],
            gas_transaction_hash: None,
            rescue_transaction_hash: None,
            gas_used: Some(10),
            eth_used: Some(U256::from(400u64)),
            chain_id: 1,
            deadline: 0,
            status: RescueStatus::Success,
            created_at: Utc::now(),
        };
        let pending = RescueTransaction {
            eth_used: None,
            status: RescueStatus::Pending,
            ..rescue.clone()
        };

        let balance = LedgerBalance::from_records(&payments, &[rescue, pending]);
        assert_eq!(balance.total_eth_paid, U256::from(1000u64));
        assert_eq!(balance.remaining(), U256::from(600u64));

        let overdrawn = LedgerBalance {
            total_eth_paid: U256::from(1u64),
            total_eth_used: U256::from(2u64),
        };
        assert_eq!(overdrawn.remaining(), U256::ZERO);
    }
}
