use alloy::primitives::{Address, TxHash};
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, aio::ConnectionManager};
use rescue_core::{
    defs::lower_hex,
    ledger::{GasPayment, LastBlockRecord, RescueTransaction},
};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use super::{LedgerStore, LedgerStoreError};

/// Ledger tables as Redis hashes, each with a per-(chain, address) index set.
pub struct RedisLedgerStore {
    redis: ConnectionManager,
    namespace: Option<String>,
}

impl RedisLedgerStore {
    pub fn new(redis: ConnectionManager, namespace: Option<String>) -> Self {
        Self { redis, namespace }
    }

    fn key(&self, name: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}:{name}"),
            None => name.to_string(),
        }
    }

    pub fn gas_payments_key(&self) -> String {
        self.key("gas_payments")
    }

    fn gas_payments_index_key(&self, chain_id: u64, address: &Address) -> String {
        self.key(&format!("gas_payments:{chain_id}:{}", lower_hex(address)))
    }

    pub fn rescue_transactions_key(&self) -> String {
        self.key("rescue_transactions")
    }

    fn rescue_transactions_index_key(&self, chain_id: u64, address: &Address) -> String {
        self.key(&format!("rescue_transactions:{chain_id}:{}", lower_hex(address)))
    }

    pub fn last_block_key(&self) -> String {
        self.key("last_block")
    }

    fn last_block_updated_at_key(&self) -> String {
        self.key("last_block:updated_at")
    }

    async fn load_indexed<T: DeserializeOwned>(
        &self,
        table_key: String,
        index_key: String,
        record: &'static str,
    ) -> Result<Vec<T>, LedgerStoreError> {
        let mut conn = self.redis.clone();
        let ids: Vec<String> = conn.smembers(&index_key).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(&table_key)
            .arg(&ids)
            .query_async(&mut conn)
            .await?;

        rows.into_iter()
            .flatten()
            .map(|json| decode(&json, record))
            .collect()
    }
}

fn encode<T: Serialize>(value: &T, record: &'static str) -> Result<String, LedgerStoreError> {
    serde_json::to_string(value).map_err(|e| LedgerStoreError::Serialization {
        record,
        message: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(json: &str, record: &'static str) -> Result<T, LedgerStoreError> {
    serde_json::from_str(json).map_err(|e| LedgerStoreError::Serialization {
        record,
        message: e.to_string(),
    })
}

impl LedgerStore for RedisLedgerStore {
    async fn insert_gas_payment(&self, payment: &GasPayment) -> Result<bool, LedgerStoreError> {
        let json = encode(payment, "gas payment")?;
        let hash = payment.gas_transaction_hash.to_string();

        // HSETNX is the uniqueness constraint on the transaction hash
        let script = redis::Script::new(
            r#"
            local table_key = KEYS[1]
            local index_key = KEYS[2]
            local hash = ARGV[1]
            local payment_json = ARGV[2]

            if redis.call('HSETNX', table_key, hash, payment_json) == 1 then
                redis.call('SADD', index_key, hash)
                return 1
            end
            return 0
            "#,
        );

        let inserted: i32 = script
            .key(self.gas_payments_key())
            .key(self.gas_payments_index_key(payment.chain_id, &payment.compromised_address))
            .arg(&hash)
            .arg(&json)
            .invoke_async(&mut self.redis.clone())
            .await?;

        Ok(inserted == 1)
    }

    async fn gas_payment_exists(&self, gas_transaction_hash: TxHash) -> Result<bool, LedgerStoreError> {
        let mut conn = self.redis.clone();
        let exists: bool = conn
            .hexists(self.gas_payments_key(), gas_transaction_hash.to_string())
            .await?;
        Ok(exists)
    }

    async fn get_gas_payment(
        &self,
        gas_transaction_hash: TxHash,
    ) -> Result<Option<GasPayment>, LedgerStoreError> {
        let mut conn = self.redis.clone();
        let json: Option<String> = conn
            .hget(self.gas_payments_key(), gas_transaction_hash.to_string())
            .await?;
        json.map(|json| decode(&json, "gas payment")).transpose()
    }

    async fn gas_payments_for(
        &self,
        chain_id: u64,
        compromised_address: Address,
    ) -> Result<Vec<GasPayment>, LedgerStoreError> {
        self.load_indexed(
            self.gas_payments_key(),
            self.gas_payments_index_key(chain_id, &compromised_address),
            "gas payment",
        )
        .await
    }

    async fn create_rescue_transaction(
        &self,
        record: &RescueTransaction,
    ) -> Result<(), LedgerStoreError> {
        let json = encode(record, "rescue transaction")?;
        let id = record.id.to_string();
        let mut conn = self.redis.clone();

        let _: () = redis::pipe()
            .atomic()
            .hset(self.rescue_transactions_key(), &id, &json)
            .ignore()
            .sadd(
                self.rescue_transactions_index_key(record.chain_id, &record.compromised_address),
                &id,
            )
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn update_rescue_transaction(
        &self,
        record: &RescueTransaction,
    ) -> Result<(), LedgerStoreError> {
        let json = encode(record, "rescue transaction")?;
        let mut conn = self.redis.clone();

        let exists: bool = conn
            .hexists(self.rescue_transactions_key(), record.id.to_string())
            .await?;
        if !exists {
            return Err(LedgerStoreError::RescueTransactionNotFound { id: record.id });
        }

        let _: () = conn
            .hset(self.rescue_transactions_key(), record.id.to_string(), json)
            .await?;
        Ok(())
    }

    async fn get_rescue_transaction(
        &self,
        id: Uuid,
    ) -> Result<Option<RescueTransaction>, LedgerStoreError> {
        let mut conn = self.redis.clone();
        let json: Option<String> = conn
            .hget(self.rescue_transactions_key(), id.to_string())
            .await?;
        json.map(|json| decode(&json, "rescue transaction"))
            .transpose()
    }

    async fn rescue_transactions_for(
        &self,
        chain_id: u64,
        compromised_address: Address,
    ) -> Result<Vec<RescueTransaction>, LedgerStoreError> {
        self.load_indexed(
            self.rescue_transactions_key(),
            self.rescue_transactions_index_key(chain_id, &compromised_address),
            "rescue transaction",
        )
        .await
    }

    async fn get_checkpoint(&self, chain_id: u64) -> Result<Option<LastBlockRecord>, LedgerStoreError> {
        let mut conn = self.redis.clone();
        let (last_block, updated_at): (Option<u64>, Option<String>) = redis::pipe()
            .hget(self.last_block_key(), chain_id)
            .hget(self.last_block_updated_at_key(), chain_id)
            .query_async(&mut conn)
            .await?;

        let Some(last_block) = last_block else {
            return Ok(None);
        };

        let updated_at = updated_at
            .as_deref()
            .map(DateTime::parse_from_rfc3339)
            .transpose()
            .map_err(|e| LedgerStoreError::Serialization {
                record: "checkpoint",
                message: e.to_string(),
            })?
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_default();

        Ok(Some(LastBlockRecord {
            chain_id,
            last_block,
            updated_at,
        }))
    }

    async fn advance_checkpoint(&self, chain_id: u64, last_block: u64) -> Result<bool, LedgerStoreError> {
        // compare-and-set that only ever raises the stored block
        let script = redis::Script::new(
            r#"
            local block_key = KEYS[1]
            local updated_key = KEYS[2]
            local chain_id = ARGV[1]
            local next_block = tonumber(ARGV[2])

            local current = tonumber(redis.call('HGET', block_key, chain_id) or '-1')
            if next_block > current then
                redis.call('HSET', block_key, chain_id, ARGV[2])
                redis.call('HSET', updated_key, chain_id, ARGV[3])
                return 1
            end
            return 0
            "#,
        );

        let advanced: i32 = script
            .key(self.last_block_key())
            .key(self.last_block_updated_at_key())
            .arg(chain_id)
            .arg(last_block)
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut self.redis.clone())
            .await?;

        Ok(advanced == 1)
    }
}
