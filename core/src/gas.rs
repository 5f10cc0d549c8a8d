//! EIP-1559 fee computation and gas-to-wei conversion.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

use crate::{chain::Chain, error::EngineError};

pub const WEI_PER_GWEI: u128 = 1_000_000_000;

/// `maxFeePerGas = BASE_FEE_MULTIPLIER * baseFee + priorityFee`. Doubling survives six
/// consecutive full blocks of 12.5% base-fee growth.
pub const BASE_FEE_MULTIPLIER: u128 = 2;

/// Added on top of every gas-unit estimate before it is priced.
pub const GAS_ESTIMATE_BUFFER_PERCENT: u64 = 10;

/// Upper bound accepted from the fee oracle for the priority fee.
pub const MAX_PRIORITY_FEE_PER_GAS: u128 = 100 * WEI_PER_GWEI;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeeValidationError {
    #[error("maxFeePerGas {max_fee_per_gas} is below baseFee + priorityFee ({floor})")]
    MaxFeeBelowFloor { max_fee_per_gas: u128, floor: u128 },

    #[error("maxPriorityFeePerGas {max_priority_fee_per_gas} exceeds ceiling {ceiling}")]
    PriorityFeeTooHigh {
        max_priority_fee_per_gas: u128,
        ceiling: u128,
    },
}

#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeEstimate {
    #[serde_as(as = "DisplayFromStr")]
    pub base_fee_per_gas: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub max_fee_per_gas: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub max_priority_fee_per_gas: u128,
}

impl FeeEstimate {
    pub fn from_base_fee(base_fee_per_gas: u128, max_priority_fee_per_gas: u128) -> Self {
        Self {
            base_fee_per_gas,
            max_fee_per_gas: base_fee_per_gas
                .saturating_mul(BASE_FEE_MULTIPLIER)
                .saturating_add(max_priority_fee_per_gas),
            max_priority_fee_per_gas,
        }
    }

    pub fn validate(&self) -> Result<(), FeeValidationError> {
        if self.max_priority_fee_per_gas > MAX_PRIORITY_FEE_PER_GAS {
            return Err(FeeValidationError::PriorityFeeTooHigh {
                max_priority_fee_per_gas: self.max_priority_fee_per_gas,
                ceiling: MAX_PRIORITY_FEE_PER_GAS,
            });
        }

        let floor = self
            .base_fee_per_gas
            .saturating_add(self.max_priority_fee_per_gas);
        if self.max_fee_per_gas < floor {
            return Err(FeeValidationError::MaxFeeBelowFloor {
                max_fee_per_gas: self.max_fee_per_gas,
                floor,
            });
        }

        Ok(())
    }

    /// Worst-case cost in wei of `gas_units` at this fee cap.
    pub fn gas_to_eth(&self, gas_units: u64) -> U256 {
        U256::from(gas_units) * U256::from(self.max_fee_per_gas)
    }
}

/// Inflates a raw estimate by [`GAS_ESTIMATE_BUFFER_PERCENT`], rounding up.
pub fn apply_gas_buffer(gas_units: u64) -> u64 {
    let buffered = (gas_units as u128 * (100 + GAS_ESTIMATE_BUFFER_PERCENT) as u128).div_ceil(100);
    u64::try_from(buffered).unwrap_or(u64::MAX)
}

/// Actual spend recorded from a receipt.
pub fn eth_used(gas_used: u64, effective_gas_price: u128) -> U256 {
    U256::from(gas_used) * U256::from(effective_gas_price)
}

/// Reads the latest base fee and the chain's priority fee (unless overridden) and
/// derives a validated fee set.
pub async fn calculate_fees(
    chain: &impl Chain,
    priority_fee_override: Option<u128>,
) -> Result<FeeEstimate, EngineError> {
    let base_fee_per_gas = chain.get_base_fee().await?;
    let max_priority_fee_per_gas = match priority_fee_override {
        Some(fee) => fee,
        None => chain.get_max_priority_fee_per_gas().await?,
    };

    let fees = FeeEstimate::from_base_fee(base_fee_per_gas, max_priority_fee_per_gas);
    fees.validate()
        .map_err(|e| EngineError::FeeValidationError {
            chain_id: chain.chain_id(),
            message: e.to_string(),
        })?;

    tracing::debug!(
        chain_id = chain.chain_id(),
        base_fee_per_gas = fees.base_fee_per_gas,
        max_fee_per_gas = fees.max_fee_per_gas,
        max_priority_fee_per_gas = fees.max_priority_fee_per_gas,
        "Calculated EIP-1559 fees"
    );

    Ok(fees)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_fee_is_double_base_plus_priority() {
        let fees = FeeEstimate::from_base_fee(30 * WEI_PER_GWEI, 2 * WEI_PER_GWEI);
        assert_eq!(fees.max_fee_per_gas, 62 * WEI_PER_GWEI);
        assert!(fees.validate().is_ok());
    }

    #[test]
    fn rejects_priority_fee_above_ceiling() {
        let fees = FeeEstimate::from_base_fee(WEI_PER_GWEI, 101 * WEI_PER_GWEI);
        assert!(matches!(
            fees.validate(),
            Err(FeeValidationError::PriorityFeeTooHigh { .. })
        ));

        let at_ceiling = FeeEstimate::from_base_fee(WEI_PER_GWEI, 100 * WEI_PER_GWEI);
        assert!(at_ceiling.validate().is_ok());
    }

    #[test]
    fn rejects_max_fee_below_floor() {
        let fees = FeeEstimate {
            base_fee_per_gas: 10,
            max_fee_per_gas: 11,
            max_priority_fee_per_gas: 2,
        };
        assert_eq!(
            fees.validate(),
            Err(FeeValidationError::MaxFeeBelowFloor {
                max_fee_per_gas: 11,
                floor: 12
            })
        );
    }

    #[test]
    fn buffer_adds_ten_percent_rounding_up() {
        assert_eq!(apply_gas_buffer(100_000), 110_000);
        assert_eq!(apply_gas_buffer(21_001), 23_102);
        assert_eq!(apply_gas_buffer(0), 0);
    }

    #[test]
    fn converts_units_to_wei() {
        let fees = FeeEstimate::from_base_fee(10 * WEI_PER_GWEI, WEI_PER_GWEI);
        assert_eq!(fees.gas_to_eth(100_000), U256::from(2_100_000u64 * WEI_PER_GWEI as u64));
        assert_eq!(eth_used(50_000, 3), U256::from(150_000u64));
    }

    #[test]
    fn fee_estimate_serializes_amounts_as_strings() {
        let fees = FeeEstimate::from_base_fee(7, 1);
        let json = serde_json::to_value(fees).unwrap();
        assert_eq!(json["maxFeePerGas"], "15");
    }
}
