//! Account addresses, tokens and hex helpers shared by every module

use std::fmt;
use std::str::FromStr;

use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};

use crate::error::ValidationError;

/// 32-byte transaction hash
pub type TxHash = [u8; 32];

/// keccak256 digest of `data`
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Lowercase hex with a `0x` prefix
pub fn encode_0x(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decode a `0x`-prefixed hex string of exactly `N` bytes
pub fn decode_fixed_hex<const N: usize>(
    field: &'static str,
    value: &str,
) -> Result<[u8; N], ValidationError> {
    let invalid = || ValidationError::InvalidHex {
        field,
        value: value.to_string(),
    };
    let digits = value.strip_prefix("0x").ok_or_else(invalid)?;
    if digits.len() != N * 2 {
        return Err(invalid());
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(digits, &mut out).map_err(|_| invalid())?;
    Ok(out)
}

/// Decode a `0x`-prefixed hex string of any even length
pub fn decode_hex(field: &'static str, value: &str) -> Result<Vec<u8>, ValidationError> {
    let invalid = || ValidationError::InvalidHex {
        field,
        value: value.to_string(),
    };
    let digits = value.strip_prefix("0x").ok_or_else(invalid)?;
    hex::decode(digits).map_err(|_| invalid())
}

/// Parse a non-negative amount given in decimal or as `0x` hex
pub fn parse_u256(field: &'static str, value: &str) -> Result<U256, ValidationError> {
    let invalid = || ValidationError::InvalidAmount {
        field,
        value: value.to_string(),
    };
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') {
        return Err(invalid());
    }
    match trimmed.strip_prefix("0x") {
        Some(digits) if !digits.is_empty() && digits.len() <= 64 => {
            U256::from_str_radix(digits, 16).map_err(|_| invalid())
        }
        Some(_) => Err(invalid()),
        None => U256::from_dec_str(trimmed).map_err(|_| invalid()),
    }
}

/// serde adapter for fixed byte arrays as `0x` hex strings
pub mod hex_array {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_0x(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode_fixed_hex::<N>("hex", &s).map_err(de::Error::custom)
    }
}

/// serde adapter for amounts as decimal strings
pub mod u256_dec {
    use primitive_types::U256;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_u256("amount", &s).map_err(de::Error::custom)
    }
}

// ============================================================================
// Address
// ============================================================================

/// A 20-byte account address
///
/// Parsing is strict: a `0x` prefix and 40 hex digits are required, and
/// mixed-case input must carry a valid EIP-55 checksum. Display always uses
/// the checksummed form.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

/// Sentinel address the settlement contract uses for the native currency
pub const ETH_ADDRESS: Address = Address([0xee; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    /// Parse `value`, reporting `field` on failure
    pub fn parse(field: &'static str, value: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        };

        let digits = value.strip_prefix("0x").ok_or_else(invalid)?;
        if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| invalid())?;
        let address = Address(bytes);

        let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
        if has_lower && has_upper && address.to_checksum()[2..] != *digits {
            return Err(invalid());
        }

        Ok(address)
    }

    /// Address of an uncompressed 65-byte public key: keccak256(X || Y)[12..]
    pub fn from_uncompressed_public_key(public_key: &[u8; 65]) -> Self {
        let hash = keccak256(&public_key[1..]);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash[12..]);
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase hex without checksum
    pub fn to_lowercase_hex(&self) -> String {
        encode_0x(&self.0)
    }

    /// EIP-55 checksum encoding
    pub fn to_checksum(&self) -> String {
        let hex_addr = hex::encode(self.0);
        let hash = keccak256(hex_addr.as_bytes());

        let mut result = String::with_capacity(42);
        result.push_str("0x");

        for (i, c) in hex_addr.chars().enumerate() {
            if c.is_ascii_digit() {
                result.push(c);
            } else {
                let hash_byte = hash[i / 2];
                let nibble = if i % 2 == 0 { hash_byte >> 4 } else { hash_byte & 0x0f };
                if nibble >= 8 {
                    result.push(c.to_ascii_uppercase());
                } else {
                    result.push(c);
                }
            }
        }

        result
    }

    /// Left-pad into a 32-byte ABI word
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }
}

impl FromStr for Address {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse("address", s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_checksum())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::parse("address", &s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Token
// ============================================================================

/// Asset moved by a send or withdrawal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {
    /// Native currency, addressed on-chain by [`ETH_ADDRESS`]
    Eth,
    Erc20(Address),
}

impl Token {
    /// Accepts `"ETH"` (any case), the sentinel address, or a token address
    pub fn parse(field: &'static str, value: &str) -> Result<Self, ValidationError> {
        if value.eq_ignore_ascii_case("eth") {
            return Ok(Token::Eth);
        }
        Ok(Token::from(Address::parse(field, value)?))
    }

    /// Contract-level address, the sentinel for ETH
    pub fn address(&self) -> Address {
        match self {
            Token::Eth => ETH_ADDRESS,
            Token::Erc20(address) => *address,
        }
    }

    pub fn is_eth(&self) -> bool {
        matches!(self, Token::Eth)
    }
}

impl From<Address> for Token {
    fn from(address: Address) -> Self {
        if address == ETH_ADDRESS {
            Token::Eth
        } else {
            Token::Erc20(address)
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Eth => f.write_str("ETH"),
            Token::Erc20(address) => write!(f, "{}", address),
        }
    }
}
