use std::time::Duration;

use alloy::{
    consensus::Transaction as _,
    eips::BlockNumberOrTag,
    network::{EthereumWallet, ReceiptResponse},
    primitives::{Address, Bytes, TxHash, U256},
    providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    transports::http::reqwest::Url,
};
use serde::{Deserialize, Serialize};

use crate::error::{AlloyRpcErrorToEngineError, EngineError, pending_transaction_error};

pub const LOCAL_CHAIN_ID: u64 = 31337;
pub const LOCAL_RPC_URL: &str = "http://127.0.0.1:8545";

/// Chains the relayer knows how to reach. Anything else is rejected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum SupportedChain {
    Mainnet,
    Sepolia,
    Optimism,
    Bsc,
    Polygon,
    Base,
    BaseSepolia,
    Arbitrum,
    Local,
}

impl SupportedChain {
    pub const ALL: [SupportedChain; 9] = [
        SupportedChain::Mainnet,
        SupportedChain::Sepolia,
        SupportedChain::Optimism,
        SupportedChain::Bsc,
        SupportedChain::Polygon,
        SupportedChain::Base,
        SupportedChain::BaseSepolia,
        SupportedChain::Arbitrum,
        SupportedChain::Local,
    ];

    pub fn chain_id(&self) -> u64 {
        match self {
            SupportedChain::Mainnet => 1,
            SupportedChain::Sepolia => 11155111,
            SupportedChain::Optimism => 10,
            SupportedChain::Bsc => 56,
            SupportedChain::Polygon => 137,
            SupportedChain::Base => 8453,
            SupportedChain::BaseSepolia => 84532,
            SupportedChain::Arbitrum => 42161,
            SupportedChain::Local => LOCAL_CHAIN_ID,
        }
    }

    /// Network name used to build remote RPC URLs.
    pub fn network(&self) -> &'static str {
        match self {
            SupportedChain::Mainnet => "eth-mainnet",
            SupportedChain::Sepolia => "eth-sepolia",
            SupportedChain::Optimism => "opt-mainnet",
            SupportedChain::Bsc => "bnb-mainnet",
            SupportedChain::Polygon => "polygon-mainnet",
            SupportedChain::Base => "base-mainnet",
            SupportedChain::BaseSepolia => "base-sepolia",
            SupportedChain::Arbitrum => "arb-mainnet",
            SupportedChain::Local => "local",
        }
    }

    pub fn block_time(&self) -> Duration {
        match self {
            SupportedChain::Mainnet | SupportedChain::Sepolia => Duration::from_secs(12),
            SupportedChain::Bsc => Duration::from_secs(3),
            SupportedChain::Polygon | SupportedChain::Optimism => Duration::from_secs(2),
            SupportedChain::Base | SupportedChain::BaseSepolia => Duration::from_secs(2),
            SupportedChain::Arbitrum => Duration::from_millis(250),
            SupportedChain::Local => Duration::from_secs(1),
        }
    }
}

impl TryFrom<u64> for SupportedChain {
    type Error = EngineError;

    fn try_from(chain_id: u64) -> Result<Self, Self::Error> {
        SupportedChain::ALL
            .into_iter()
            .find(|chain| chain.chain_id() == chain_id)
            .ok_or(EngineError::UnsupportedChain { chain_id })
    }
}

impl From<SupportedChain> for u64 {
    fn from(chain: SupportedChain) -> Self {
        chain.chain_id()
    }
}

/// Where RPC traffic goes: a local node, or the hosted provider keyed by network name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcMode {
    Local,
    Remote,
}

/// A transaction as seen on chain, reduced to what the gas ledger needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    pub hash: TxHash,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub block_number: Option<u64>,
    /// `None` while the transaction is still pending.
    pub success: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReceipt {
    pub transaction_hash: TxHash,
    pub success: bool,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    pub block_number: Option<u64>,
}

pub trait Chain: Send + Sync {
    fn chain_id(&self) -> u64;
    fn rpc_url(&self) -> Url;
    fn block_time(&self) -> Duration;

    /// The backend wallet that pays gas and receives gas payments.
    fn relayer_address(&self) -> Address;

    fn get_balance(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<U256, EngineError>> + Send;

    fn get_block_number(&self) -> impl Future<Output = Result<u64, EngineError>> + Send;

    /// Base fee of the latest block.
    fn get_base_fee(&self) -> impl Future<Output = Result<u128, EngineError>> + Send;

    fn get_max_priority_fee_per_gas(
        &self,
    ) -> impl Future<Output = Result<u128, EngineError>> + Send;

    fn get_code(&self, address: Address)
    -> impl Future<Output = Result<Bytes, EngineError>> + Send;

    fn get_transaction(
        &self,
        hash: TxHash,
    ) -> impl Future<Output = Result<Option<ChainTransaction>, EngineError>> + Send;

    fn estimate_gas(
        &self,
        request: &TransactionRequest,
    ) -> impl Future<Output = Result<u64, EngineError>> + Send;

    /// Signs with the relayer wallet and broadcasts. Returns once the node accepted it.
    fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> impl Future<Output = Result<TxHash, EngineError>> + Send;

    fn wait_for_receipt(
        &self,
        hash: TxHash,
        timeout: Duration,
    ) -> impl Future<Output = Result<ChainReceipt, EngineError>> + Send;
}

pub struct RpcChainConfig<'a> {
    pub chain: SupportedChain,
    pub mode: RpcMode,
    pub rpc_base_url: &'a str,
    pub api_key: &'a str,
    pub rpc_url_override: Option<&'a str>,
    pub relayer: &'a PrivateKeySigner,
}

#[derive(Clone)]
pub struct RpcChain {
    chain: SupportedChain,
    rpc_url: Url,
    relayer_address: Address,
    pub provider: DynProvider,
}

impl RpcChainConfig<'_> {
    pub fn resolve_rpc_url(&self) -> Result<Url, EngineError> {
        let raw = match (self.rpc_url_override, self.mode) {
            (Some(url), _) => url.to_string(),
            (None, RpcMode::Local) => LOCAL_RPC_URL.to_string(),
            (None, RpcMode::Remote) if self.chain == SupportedChain::Local => {
                LOCAL_RPC_URL.to_string()
            }
            (None, RpcMode::Remote) => format!(
                "https://{network}.{base_url}/{api_key}",
                network = self.chain.network(),
                base_url = self.rpc_base_url,
                api_key = self.api_key,
            ),
        };

        Url::parse(&raw).map_err(|e| EngineError::RpcConfigError {
            message: format!(
                "Failed to parse RPC URL for chain {}: {e}",
                self.chain.chain_id()
            ),
        })
    }

    pub fn to_chain(&self) -> Result<RpcChain, EngineError> {
        let rpc_url = self.resolve_rpc_url()?;
        let wallet = EthereumWallet::from(self.relayer.clone());

        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(rpc_url.clone())
            .erased();

        Ok(RpcChain {
            chain: self.chain,
            rpc_url,
            relayer_address: self.relayer.address(),
            provider,
        })
    }
}

impl Chain for RpcChain {
    fn chain_id(&self) -> u64 {
        self.chain.chain_id()
    }

    fn rpc_url(&self) -> Url {
        self.rpc_url.clone()
    }

    fn block_time(&self) -> Duration {
        self.chain.block_time()
    }

    fn relayer_address(&self) -> Address {
        self.relayer_address
    }

    async fn get_balance(&self, address: Address) -> Result<U256, EngineError> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| e.to_engine_error(self))
    }

    async fn get_block_number(&self) -> Result<u64, EngineError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| e.to_engine_error(self))
    }

    async fn get_base_fee(&self) -> Result<u128, EngineError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(|e| e.to_engine_error(self))?
            .ok_or_else(|| EngineError::InternalError {
                message: format!("Latest block missing on chain {}", self.chain_id()),
            })?;

        block
            .header
            .base_fee_per_gas
            .map(u128::from)
            .ok_or_else(|| EngineError::FeeValidationError {
                chain_id: self.chain_id(),
                message: "latest block has no base fee, chain does not support EIP-1559"
                    .to_string(),
            })
    }

    async fn get_max_priority_fee_per_gas(&self) -> Result<u128, EngineError> {
        self.provider
            .get_max_priority_fee_per_gas()
            .await
            .map_err(|e| e.to_engine_error(self))
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, EngineError> {
        self.provider
            .get_code_at(address)
            .await
            .map_err(|e| e.to_engine_error(self))
    }

    async fn get_transaction(&self, hash: TxHash) -> Result<Option<ChainTransaction>, EngineError> {
        let Some(tx) = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(|e| e.to_engine_error(self))?
        else {
            return Ok(None);
        };

        let success = match tx.block_number {
            Some(_) => self
                .provider
                .get_transaction_receipt(hash)
                .await
                .map_err(|e| e.to_engine_error(self))?
                .map(|receipt| receipt.status()),
            None => None,
        };

        Ok(Some(ChainTransaction {
            hash,
            from: tx.inner.signer(),
            to: tx.to(),
            value: tx.value(),
            input: tx.input().clone(),
            block_number: tx.block_number,
            success,
        }))
    }

    async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64, EngineError> {
        self.provider
            .estimate_gas(request.clone())
            .await
            .map_err(|e| e.to_engine_error(self))
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash, EngineError> {
        let pending = self
            .provider
            .send_transaction(request)
            .await
            .map_err(|e| e.to_engine_error(self))?;

        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(
        &self,
        hash: TxHash,
        timeout: Duration,
    ) -> Result<ChainReceipt, EngineError> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), hash)
            .with_timeout(Some(timeout))
            .get_receipt()
            .await
            .map_err(|e| pending_transaction_error(e, self, hash.to_string(), timeout.as_secs()))?;

        Ok(ChainReceipt {
            transaction_hash: hash,
            success: receipt.status(),
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
            block_number: receipt.block_number,
        })
    }
}

pub trait ChainService: Send + Sync {
    fn get_chain(&self, chain_id: u64) -> Result<impl Chain + Clone + 'static, EngineError>;

    /// Every chain configured at startup, in configuration order.
    fn chain_ids(&self) -> Vec<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn signer() -> PrivateKeySigner {
        ANVIL_KEY.parse().unwrap()
    }

    fn config<'a>(
        chain: SupportedChain,
        mode: RpcMode,
        rpc_url_override: Option<&'a str>,
        relayer: &'a PrivateKeySigner,
    ) -> RpcChainConfig<'a> {
        RpcChainConfig {
            chain,
            mode,
            rpc_base_url: "g.alchemy.com/v2",
            api_key: "key123",
            rpc_url_override,
            relayer,
        }
    }

    #[test]
    fn resolves_remote_url_from_network_name() {
        let signer = signer();
        let url = config(SupportedChain::Base, RpcMode::Remote, None, &signer)
            .resolve_rpc_url()
            .unwrap();
        assert_eq!(url.as_str(), "https://base-mainnet.g.alchemy.com/v2/key123");
    }

    #[test]
    fn local_mode_and_local_chain_use_localhost() {
        let signer = signer();
        let local_mode = config(SupportedChain::Mainnet, RpcMode::Local, None, &signer)
            .resolve_rpc_url()
            .unwrap();
        let local_chain = config(SupportedChain::Local, RpcMode::Remote, None, &signer)
            .resolve_rpc_url()
            .unwrap();

        assert_eq!(local_mode.as_str(), "http://127.0.0.1:8545/");
        assert_eq!(local_chain, local_mode);
    }

    #[test]
    fn override_wins_over_mode() {
        let signer = signer();
        let url = config(
            SupportedChain::Sepolia,
            RpcMode::Remote,
            Some("https://rpc.example.org/sepolia"),
            &signer,
        )
        .resolve_rpc_url()
        .unwrap();
        assert_eq!(url.as_str(), "https://rpc.example.org/sepolia");
    }

    #[test]
    fn unknown_chain_id_is_rejected() {
        assert!(matches!(
            SupportedChain::try_from(999_999),
            Err(EngineError::UnsupportedChain { chain_id: 999_999 })
        ));
        assert_eq!(SupportedChain::try_from(8453).unwrap(), SupportedChain::Base);
    }

    #[tokio::test]
    async fn builds_chain_with_relayer_address() {
        let signer = signer();
        let chain = config(SupportedChain::Local, RpcMode::Local, None, &signer)
            .to_chain()
            .unwrap();
        assert_eq!(chain.relayer_address(), signer.address());
        assert_eq!(chain.chain_id(), LOCAL_CHAIN_ID);
    }
}
