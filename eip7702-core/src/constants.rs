/// EIP-7702 delegation prefix bytes
pub const EIP_7702_DELEGATION_PREFIX: [u8; 3] = [0xef, 0x01, 0x00];

/// EIP-7702 delegation code length (prefix + address)
pub const EIP_7702_DELEGATION_CODE_LENGTH: usize = 23;

/// Packed authorization: 32 bytes r, 32 bytes s, 1 byte recovery id.
pub const PACKED_AUTHORIZATION_LENGTH: usize = 65;

/// EIP-712 signatures carried by rescue requests are always 65 bytes.
pub const SIGNATURE_LENGTH: usize = 65;
