use std::time::Duration;

use alloy::{
    primitives::{Address, Bytes, TxHash, U256},
    rpc::types::TransactionRequest,
    transports::http::reqwest::Url,
};
use rescue_core::{
    chain::{Chain, ChainReceipt, ChainTransaction},
    error::EngineError,
};
use rescue_eip7702_core::delegated_account::DelegatedAccount;

/// Chain stub that only answers `eth_getCode`.
struct CodeOnlyChain {
    code: Bytes,
}

fn unused() -> EngineError {
    EngineError::InternalError {
        message: "not used by delegation checks".to_string(),
    }
}

impl Chain for CodeOnlyChain {
    fn chain_id(&self) -> u64 {
        31337
    }

    fn rpc_url(&self) -> Url {
        Url::parse("http://127.0.0.1:8545").unwrap()
    }

    fn block_time(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn relayer_address(&self) -> Address {
        Address::ZERO
    }

    async fn get_balance(&self, _address: Address) -> Result<U256, EngineError> {
        Err(unused())
    }

    async fn get_block_number(&self) -> Result<u64, EngineError> {
        Err(unused())
    }

    async fn get_base_fee(&self) -> Result<u128, EngineError> {
        Err(unused())
    }

    async fn get_max_priority_fee_per_gas(&self) -> Result<u128, EngineError> {
        Err(unused())
    }

    async fn get_code(&self, _address: Address) -> Result<Bytes, EngineError> {
        Ok(self.code.clone())
    }

    async fn get_transaction(&self, _hash: TxHash) -> Result<Option<ChainTransaction>, EngineError> {
        Err(unused())
    }

    async fn estimate_gas(&self, _request: &TransactionRequest) -> Result<u64, EngineError> {
        Err(unused())
    }

    async fn send_transaction(&self, _request: TransactionRequest) -> Result<TxHash, EngineError> {
        Err(unused())
    }

    async fn wait_for_receipt(
        &self,
        _hash: TxHash,
        _timeout: Duration,
    ) -> Result<ChainReceipt, EngineError> {
        Err(unused())
    }
}

fn designator(target: Address) -> Bytes {
    let mut code = vec![0xef, 0x01, 0x00];
    code.extend_from_slice(target.as_slice());
    Bytes::from(code)
}

#[tokio::test]
async fn detects_delegation_to_rescue_contract() {
    let rescue_contract = Address::with_last_byte(0x77);
    let chain = CodeOnlyChain {
        code: designator(rescue_contract),
    };
    let account = DelegatedAccount::new(Address::with_last_byte(0xaa), &chain);

    assert_eq!(account.delegation_target().await.unwrap(), Some(rescue_contract));
    assert!(account.is_delegated_to(rescue_contract).await.unwrap());
    assert!(!account.is_delegated_to(Address::with_last_byte(0x78)).await.unwrap());
}

#[tokio::test]
async fn plain_eoa_and_regular_contracts_are_not_delegated() {
    let empty = CodeOnlyChain { code: Bytes::new() };
    let account = DelegatedAccount::new(Address::with_last_byte(0xaa), &empty);
    assert_eq!(account.delegation_target().await.unwrap(), None);

    let contract = CodeOnlyChain {
        code: Bytes::from(vec![0x60; 40]),
    };
    let account = DelegatedAccount::new(Address::with_last_byte(0xaa), &contract);
    assert!(!account.is_delegated_to(Address::with_last_byte(0x77)).await.unwrap());
}
