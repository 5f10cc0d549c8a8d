use alloy::{
    eips::eip7702::{Authorization, SignedAuthorization},
    hex,
    primitives::{Address, Bytes, U256},
};

use crate::constants::{PACKED_AUTHORIZATION_LENGTH, SIGNATURE_LENGTH};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PackedInputError {
    #[error("{field} is not valid hex: {message}")]
    InvalidHex { field: &'static str, message: String },

    #[error("{field} must be {expected} hex characters, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("authorization recovery id {0} is not one of 0, 1, 27, 28")]
    InvalidRecoveryId(u8),
}

/// Decodes `0x`-optional hex that must be exactly `expected_bytes` long.
pub fn decode_fixed_hex(
    input: &str,
    expected_bytes: usize,
    field: &'static str,
) -> Result<Vec<u8>, PackedInputError> {
    let digits = input.strip_prefix("0x").unwrap_or(input);
    if digits.len() != expected_bytes * 2 {
        return Err(PackedInputError::InvalidLength {
            field,
            expected: expected_bytes * 2,
            actual: digits.len(),
        });
    }

    hex::decode(digits).map_err(|e| PackedInputError::InvalidHex {
        field,
        message: e.to_string(),
    })
}

pub fn parse_signature(input: &str) -> Result<Bytes, PackedInputError> {
    decode_fixed_hex(input, SIGNATURE_LENGTH, "eip712Signature").map(Bytes::from)
}

/// The signature half of an EIP-7702 authorization, packed as `r || s || v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedAuthorization {
    pub r: U256,
    pub s: U256,
    pub y_parity: u8,
}

impl PackedAuthorization {
    pub fn parse(input: &str) -> Result<Self, PackedInputError> {
        let bytes = decode_fixed_hex(input, PACKED_AUTHORIZATION_LENGTH, "authorization")?;

        let y_parity = match bytes[64] {
            0 | 27 => 0,
            1 | 28 => 1,
            other => return Err(PackedInputError::InvalidRecoveryId(other)),
        };

        Ok(Self {
            r: U256::from_be_slice(&bytes[..32]),
            s: U256::from_be_slice(&bytes[32..64]),
            y_parity,
        })
    }

    /// Reassembles the tuple the victim signed: delegate `delegate` on `chain_id` at `nonce`.
    pub fn into_signed(self, chain_id: u64, delegate: Address, nonce: u64) -> SignedAuthorization {
        SignedAuthorization::new_unchecked(
            Authorization {
                chain_id: U256::from(chain_id),
                address: delegate,
                nonce,
            },
            self.y_parity,
            self.r,
            self.s,
        )
    }
}
