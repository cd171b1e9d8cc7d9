//! Error taxonomy for the protocol engine
//!
//! Validation failures are raised before any cryptographic or network work
//! and carry the offending field and the value received. Their messages are
//! part of the public contract and are surfaced verbatim.

use std::fmt;

use primitive_types::U256;
use thiserror::Error;

use crate::types::{encode_0x, Address, TxHash};

/// Which codec path rejected an encryption count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountUse {
    Encryption,
    Decryption,
}

impl fmt::Display for CountUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountUse::Encryption => f.write_str("Invalid count provided for encryption"),
            CountUse::Decryption => f.write_str("Invalid count for decryption"),
        }
    }
}

/// Malformed caller input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("chainConfig not provided")]
    MissingChainConfig,

    #[error("Invalid start block provided in chainConfig. Got '{0}'")]
    InvalidStartBlock(String),

    #[error("Invalid chainId provided in chainConfig. Got '{0}'")]
    InvalidChainId(String),

    #[error("Invalid subgraphUrl provided in chainConfig. Got '{0}'")]
    InvalidSubgraphUrl(String),

    #[error("Invalid address provided for {field}. Got '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("Invalid public key provided for {field}. Got '{value}'")]
    InvalidPublicKey { field: &'static str, value: String },

    /// The offending value is a secret and is never echoed back
    #[error("Invalid private key provided for {field}")]
    InvalidPrivateKey { field: &'static str },

    #[error("Invalid hex string provided for {field}. Got '{value}'")]
    InvalidHex { field: &'static str, value: String },

    #[error("Invalid amount provided for {field}. Got '{value}'")]
    InvalidAmount { field: &'static str, value: String },

    #[error("Data string must be null or in hex format with 0x prefix")]
    InvalidCallData,

    #[error("{0}")]
    InvalidCount(CountUse),

    #[error("Invalid viewing key")]
    InvalidViewingKey,

    #[error("Invalid ciphertext")]
    InvalidCiphertext,

    #[error("Invalid recipient address")]
    InvalidRecipientAddress,

    #[error("Invalid public key")]
    InvalidRecipientPublicKey,

    #[error("Sending to a public key requires the support_pub_key option")]
    PublicKeyRecipientDisabled,

    #[error("Sending to a transaction hash requires the support_tx_hash option")]
    TxHashRecipientDisabled,

    #[error("Batch send requires at least one send")]
    EmptyBatch,
}

/// Key material that is syntactically well-formed but unusable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Key pair has no private key")]
    MissingPrivateKey,

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}

/// Failure reported by a signing capability
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SignerError(pub String);

/// Failure reported by a chain or announcement collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Transaction reverted: {0}")]
    Reverted(String),

    #[error("Announcement source unavailable: {0}")]
    SourceUnavailable(String),
}

/// Failure reported by the key-value store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Store backend failed: {0}")]
    Backend(String),

    #[error("Corrupt value under key '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

/// Top-level error returned by every fallible protocol operation
#[derive(Debug, Error)]
pub enum UmbraError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Unsupported chain ID provided")]
    UnsupportedChain { chain_id: u64 },

    #[error("Signing unavailable: {0}")]
    SigningUnavailable(#[from] SignerError),

    #[error(
        "Insufficient balance to complete transfer. Has {available} tokens, tried to send {required} tokens."
    )]
    InsufficientBalance { available: U256, required: U256 },

    #[error(
        "Address {0} has not registered stealth keys. Please ask them to setup their Umbra account"
    )]
    RecipientNotRegistered(Address),

    #[error("No public key found for address {0}. The account has not sent a transaction yet")]
    PublicKeyNotFound(Address),

    #[error("No public key could be recovered from transaction {}", encode_0x(.0))]
    TransactionNotFound(TxHash),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T, E = UmbraError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_verbatim() {
        assert_eq!(
            ValidationError::InvalidStartBlock("1".into()).to_string(),
            "Invalid start block provided in chainConfig. Got '1'"
        );
        assert_eq!(
            ValidationError::InvalidCount(CountUse::Decryption).to_string(),
            "Invalid count for decryption"
        );
        assert_eq!(
            UmbraError::UnsupportedChain { chain_id: 999 }.to_string(),
            "Unsupported chain ID provided"
        );
        assert_eq!(
            UmbraError::InsufficientBalance {
                available: U256::zero(),
                required: U256::from(5u64),
            }
            .to_string(),
            "Insufficient balance to complete transfer. Has 0 tokens, tried to send 5 tokens."
        );
    }

    #[test]
    fn test_private_key_error_does_not_echo_value() {
        let msg = ValidationError::InvalidPrivateKey { field: "viewingPrivateKey" }.to_string();
        assert_eq!(msg, "Invalid private key provided for viewingPrivateKey");
    }
}
