use alloy::primitives::Address;
use rescue_core::{chain::Chain, error::EngineError};

use crate::constants::{EIP_7702_DELEGATION_CODE_LENGTH, EIP_7702_DELEGATION_PREFIX};

/// Represents an EOA address that can have EIP-7702 delegation, associated with a specific chain
#[derive(Clone, Debug)]
pub struct DelegatedAccount<'a, C: Chain> {
    /// The EOA address that may have delegation
    pub eoa_address: Address,
    /// The chain this account operates on
    pub chain: &'a C,
}

impl<'a, C: Chain> DelegatedAccount<'a, C> {
    pub fn new(eoa_address: Address, chain: &'a C) -> Self {
        Self { eoa_address, chain }
    }

    /// The contract the EOA currently delegates to, if any.
    pub async fn delegation_target(&self) -> Result<Option<Address>, EngineError> {
        let code = self.chain.get_code(self.eoa_address).await?;

        if code.len() < EIP_7702_DELEGATION_CODE_LENGTH
            || !code.starts_with(&EIP_7702_DELEGATION_PREFIX)
        {
            tracing::debug!(
                eoa_address = ?self.eoa_address,
                code_length = code.len(),
                "No EIP-7702 delegation designator"
            );
            return Ok(None);
        }

        // 0xef0100 ++ 20 byte target
        Ok(Some(Address::from_slice(
            &code[3..EIP_7702_DELEGATION_CODE_LENGTH],
        )))
    }

    /// Check if the EOA has EIP-7702 delegation to `delegation_contract`
    pub async fn is_delegated_to(&self, delegation_contract: Address) -> Result<bool, EngineError> {
        let target = self.delegation_target().await?;
        let is_delegated = target == Some(delegation_contract);

        tracing::debug!(
            eoa_address = ?self.eoa_address,
            target_address = ?target,
            delegation_contract = ?delegation_contract,
            has_delegation = is_delegated,
            "EIP-7702 delegation check result"
        );

        Ok(is_delegated)
    }
}
