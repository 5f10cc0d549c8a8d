use alloy::{
    eips::eip7702::SignedAuthorization,
    network::{TransactionBuilder, TransactionBuilder7702},
    primitives::{Address, Bytes, U256},
    rpc::types::TransactionRequest,
    sol,
    sol_types::SolCall,
};
use rescue_core::gas::FeeEstimate;

sol!(
    /// Delegate contract executed in the context of the compromised EOA. Verifies the
    /// EIP-712 sweep signature and moves every listed token to `recipient`.
    function rescueTokens(
        address recipient,
        address[] calldata tokens,
        uint256 deadline,
        bytes calldata signature
    ) external;
);

/// A sweep of `tokens` out of `compromised_address`, paid for by the relayer.
#[derive(Debug, Clone)]
pub struct RescueCall {
    pub compromised_address: Address,
    pub recipient: Address,
    pub tokens: Vec<Address>,
    pub deadline: u64,
    pub signature: Bytes,
    /// Present when the EOA is not yet delegated and the victim signed a fresh tuple.
    pub authorization: Option<SignedAuthorization>,
}

impl RescueCall {
    pub fn calldata(&self) -> Bytes {
        rescueTokensCall {
            recipient: self.recipient,
            tokens: self.tokens.clone(),
            deadline: U256::from(self.deadline),
            signature: self.signature.clone(),
        }
        .abi_encode()
        .into()
    }

    /// Unpriced request from the relayer to the delegated EOA, used for estimation.
    pub fn to_request(&self, relayer: Address, chain_id: u64) -> TransactionRequest {
        let request = TransactionRequest::default()
            .with_from(relayer)
            .with_to(self.compromised_address)
            .with_value(U256::ZERO)
            .with_input(self.calldata())
            .with_chain_id(chain_id);

        match &self.authorization {
            Some(authorization) => request.with_authorization_list(vec![authorization.clone()]),
            None => request,
        }
    }

    pub fn to_priced_request(
        &self,
        relayer: Address,
        chain_id: u64,
        gas_limit: u64,
        fees: &FeeEstimate,
    ) -> TransactionRequest {
        self.to_request(relayer, chain_id)
            .with_gas_limit(gas_limit)
            .with_max_fee_per_gas(fees.max_fee_per_gas)
            .with_max_priority_fee_per_gas(fees.max_priority_fee_per_gas)
    }
}
