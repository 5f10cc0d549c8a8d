use alloy::primitives::Address;
use serde::{Deserialize, Deserializer, Serializer};

#[derive(serde::Serialize, serde::Deserialize, Clone, utoipa::ToSchema)]
#[schema(title = "EVM Address")]
/// Used to represent an EVM address. This is a string of length 42 with a `0x` prefix. Non-checksummed addresses are also supported.
pub struct AddressDef(pub String);

#[derive(serde::Serialize, serde::Deserialize, Clone, utoipa::ToSchema)]
#[schema(title = "Transaction Hash")]
/// A 0x prefixed, 32 byte hex string.
pub struct TxHashDef(pub String);

#[derive(serde::Serialize, serde::Deserialize, Clone, utoipa::ToSchema)]
#[schema(title = "Wei Amount")]
/// A non-negative integer amount of wei, encoded as a base-10 string.
pub struct WeiDef(pub String);

/// Lower-case `0x` hex form used for ledger keys and persisted records.
pub fn lower_hex(address: &Address) -> String {
    format!("{address:#x}")
}

/// Serde adapter persisting addresses as lower-case hex.
pub mod lower_hex_address {
    use super::*;

    pub fn serialize<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&lower_hex(address))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
