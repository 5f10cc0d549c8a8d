use std::time::Duration;

use alloy::primitives::{Address, Bytes, TxHash, U256};
use rescue_core::chain::ChainTransaction;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{ExplorerError, SerializableReqwestError};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// One `account/txlist` request: a block range plus page/offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxListQuery {
    pub chain_id: u64,
    pub address: Address,
    pub start_block: u64,
    pub end_block: u64,
    pub page: u32,
    pub offset: u32,
}

/// A transaction row as returned by Etherscan-style explorers. Every field is a string.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerTransaction {
    pub block_number: String,
    pub hash: String,
    pub from: String,
    #[serde(default)]
    pub to: String,
    pub value: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub is_error: String,
    #[serde(default, rename = "txreceipt_status")]
    pub receipt_status: String,
}

impl ExplorerTransaction {
    pub fn block_number(&self) -> Result<u64, ExplorerError> {
        self.block_number
            .parse()
            .map_err(|e| ExplorerError::malformed(&self.hash, format!("blockNumber: {e}")))
    }

    /// Converts the row into the same shape the RPC path produces.
    pub fn to_chain_transaction(&self) -> Result<ChainTransaction, ExplorerError> {
        let hash: TxHash = self
            .hash
            .parse()
            .map_err(|e| ExplorerError::malformed(&self.hash, format!("hash: {e}")))?;
        let from: Address = self
            .from
            .parse()
            .map_err(|e| ExplorerError::malformed(&self.hash, format!("from: {e}")))?;
        // contract creations come back with an empty `to`
        let to = match self.to.as_str() {
            "" => None,
            raw => Some(
                raw.parse::<Address>()
                    .map_err(|e| ExplorerError::malformed(&self.hash, format!("to: {e}")))?,
            ),
        };
        let value: U256 = self
            .value
            .parse()
            .map_err(|e| ExplorerError::malformed(&self.hash, format!("value: {e}")))?;
        let input = match self.input.as_str() {
            "" | "0x" => Bytes::new(),
            raw => raw
                .parse::<Bytes>()
                .map_err(|e| ExplorerError::malformed(&self.hash, format!("input: {e}")))?,
        };

        Ok(ChainTransaction {
            hash,
            from,
            to,
            value,
            input,
            block_number: Some(self.block_number()?),
            success: Some(self.is_error != "1" && self.receipt_status != "0"),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TxListResult {
    Transactions(Vec<ExplorerTransaction>),
    Message(String),
}

#[derive(Debug, Deserialize)]
struct TxListResponse {
    status: String,
    message: String,
    result: TxListResult,
}

/// Source of an address's transaction history, page by page.
pub trait TransactionHistory: Send + Sync {
    fn transactions_page(
        &self,
        query: &TxListQuery,
    ) -> impl Future<Output = Result<Vec<ExplorerTransaction>, ExplorerError>> + Send;
}

pub struct ExplorerClient {
    pub url: Url,
    pub api_key: String,
    pub client: reqwest::Client,
}

pub struct ExplorerClientBuilder {
    pub url: Url,
    pub api_key: String,
    pub timeout: Duration,
}

impl ExplorerClientBuilder {
    pub fn new(url: &str, api_key: impl Into<String>) -> Result<Self, ExplorerError> {
        Ok(Self {
            url: Url::parse(url).map_err(|e| ExplorerError::url(url.to_owned(), e))?,
            api_key: api_key.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<ExplorerClient, ExplorerError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(ExplorerError::http_client_backend)?;

        Ok(ExplorerClient {
            url: self.url,
            api_key: self.api_key,
            client,
        })
    }
}

impl TransactionHistory for ExplorerClient {
    async fn transactions_page(
        &self,
        query: &TxListQuery,
    ) -> Result<Vec<ExplorerTransaction>, ExplorerError> {
        tracing::debug!(
            chain_id = query.chain_id,
            address = %query.address,
            start_block = query.start_block,
            end_block = query.end_block,
            page = query.page,
            "Fetching explorer transaction page"
        );

        let response = self
            .client
            .get(self.url.clone())
            .query(&[
                ("chainid", query.chain_id.to_string()),
                ("module", "account".to_string()),
                ("action", "txlist".to_string()),
                ("address", format!("{:#x}", query.address)),
                ("startblock", query.start_block.to_string()),
                ("endblock", query.end_block.to_string()),
                ("page", query.page.to_string()),
                ("offset", query.offset.to_string()),
                ("sort", "asc".to_string()),
                ("apikey", self.api_key.clone()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(SerializableReqwestError::from)?;

        let body: TxListResponse = response
            .json()
            .await
            .map_err(SerializableReqwestError::from)?;

        match body.result {
            TxListResult::Transactions(rows) => Ok(rows),
            // "No transactions found" is reported as status 0 with an empty array,
            // which deserializes as `Transactions` above.
            TxListResult::Message(detail) => {
                tracing::warn!(
                    chain_id = query.chain_id,
                    status = %body.status,
                    message = %body.message,
                    detail = %detail,
                    "Explorer returned an error"
                );
                Err(ExplorerError::ApiError {
                    message: body.message,
                    detail,
                })
            }
        }
    }
}
