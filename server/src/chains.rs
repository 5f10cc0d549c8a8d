use std::collections::HashMap;

use alloy::signers::local::PrivateKeySigner;
use rescue_core::{
    chain::{ChainService, RpcChain, RpcChainConfig, SupportedChain},
    error::EngineError,
};

use crate::config::{ChainConfig, RpcConfig};

/// Every configured chain, connected once at startup.
pub struct RescueChainService {
    chains: HashMap<u64, RpcChain>,
    order: Vec<u64>,
}

impl RescueChainService {
    /// Fails on the first chain id outside [`SupportedChain`] or with an unusable RPC URL.
    pub fn from_config(
        rpc: &RpcConfig,
        chains: &[ChainConfig],
        relayer: &PrivateKeySigner,
    ) -> Result<Self, EngineError> {
        let mut connected = HashMap::with_capacity(chains.len());
        let mut order = Vec::with_capacity(chains.len());

        for configured in chains {
            let chain = SupportedChain::try_from(configured.chain_id)?;
            let rpc_chain = RpcChainConfig {
                chain,
                mode: rpc.mode,
                rpc_base_url: &rpc.base_url,
                api_key: &rpc.api_key,
                rpc_url_override: configured.rpc_url.as_deref(),
                relayer,
            }
            .to_chain()?;

            tracing::info!(
                chain_id = configured.chain_id,
                network = chain.network(),
                "Configured chain"
            );

            if connected.insert(configured.chain_id, rpc_chain).is_none() {
                order.push(configured.chain_id);
            }
        }

        Ok(Self {
            chains: connected,
            order,
        })
    }
}

#[allow(refining_impl_trait)]
impl ChainService for RescueChainService {
    fn get_chain(&self, chain_id: u64) -> Result<RpcChain, EngineError> {
        self.chains
            .get(&chain_id)
            .cloned()
            .ok_or(EngineError::UnsupportedChain { chain_id })
    }

    fn chain_ids(&self) -> Vec<u64> {
        self.order.clone()
    }
}
