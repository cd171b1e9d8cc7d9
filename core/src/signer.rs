//! Signing capabilities consumed by the protocol
//!
//! Key derivation only needs [`MessageSigner`], a single-method capability, so
//! any wallet implementation can be injected. Sends and withdrawals take a
//! [`Wallet`], which also exposes the account address.

use std::fmt;

use k256::{
    ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey},
    PublicKey, SecretKey,
};
use rand::rngs::OsRng;

use crate::error::{CryptoError, SignerError, ValidationError};
use crate::keys::{address_of, KeyPair};
use crate::types::{decode_fixed_hex, encode_0x, keccak256, Address};

/// Capability to sign an arbitrary message as an EIP-191 personal message
pub trait MessageSigner: Send + Sync {
    fn sign_message(&self, message: &[u8]) -> Result<Signature, SignerError>;
}

/// An account able to authorize transactions
pub trait Wallet: MessageSigner {
    fn address(&self) -> Address;

    /// Sign a raw 32-byte digest without any prefix
    fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature, SignerError>;
}

/// Recoverable ECDSA signature: r || s || v
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// Recovery id, 27/28 (or 0/1 from some hardware wallets)
    pub v: u8,
}

impl Signature {
    pub fn from_bytes(bytes: &[u8; 65]) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Self { r, s, v: bytes[64] }
    }

    pub fn from_hex(field: &'static str, value: &str) -> Result<Self, ValidationError> {
        let bytes: [u8; 65] = decode_fixed_hex(field, value)?;
        Ok(Self::from_bytes(&bytes))
    }

    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    pub fn to_hex(&self) -> String {
        encode_0x(&self.to_bytes())
    }

    pub fn recovery_id(&self) -> Result<RecoveryId, CryptoError> {
        let id = match self.v {
            0 | 1 => self.v,
            27 | 28 => self.v - 27,
            other => {
                return Err(CryptoError::InvalidSignature(format!(
                    "unexpected recovery byte {other}"
                )))
            }
        };
        RecoveryId::try_from(id).map_err(|e| CryptoError::InvalidSignature(e.to_string()))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

/// EIP-191 personal-sign hash of `message`
pub fn eip191_hash(message: &[u8]) -> [u8; 32] {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    let mut data = Vec::with_capacity(prefix.len() + message.len());
    data.extend_from_slice(prefix.as_bytes());
    data.extend_from_slice(message);
    keccak256(&data)
}

/// Recover the signing account from a prehashed digest
pub fn recover_address(digest: &[u8; 32], signature: &Signature) -> Result<Address, CryptoError> {
    let recovery_id = signature.recovery_id()?;
    let mut rs = [0u8; 64];
    rs[..32].copy_from_slice(&signature.r);
    rs[32..].copy_from_slice(&signature.s);
    let sig = EcdsaSignature::from_slice(&rs)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let verifying_key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    Ok(address_of(&PublicKey::from(&verifying_key)))
}

/// Recover the signer of an EIP-191 personal message
pub fn recover_message_signer(message: &[u8], signature: &Signature) -> Result<Address, CryptoError> {
    recover_address(&eip191_hash(message), signature)
}

// ============================================================================
// Local Wallet
// ============================================================================

/// In-process wallet over a secp256k1 signing key
///
/// Nonces follow RFC 6979, so signing the same message twice yields the same
/// signature and key derivation from a raw private key is reproducible.
#[derive(Clone)]
pub struct LocalWallet {
    signing_key: SigningKey,
    address: Address,
}

impl LocalWallet {
    pub fn new(key_pair: &KeyPair) -> Result<Self, CryptoError> {
        Ok(Self::from_secret_key(key_pair.secret_key()?))
    }

    pub fn from_secret_key(secret: &SecretKey) -> Self {
        Self {
            signing_key: SigningKey::from(secret),
            address: address_of(&secret.public_key()),
        }
    }

    pub fn random() -> Self {
        Self::from_secret_key(&SecretKey::random(&mut OsRng))
    }

    pub fn from_private_key_hex(value: &str) -> Result<Self, ValidationError> {
        let key_pair = KeyPair::from_private_key_hex("privateKey", value)?;
        Self::new(&key_pair).map_err(|_| ValidationError::InvalidPrivateKey { field: "privateKey" })
    }

    /// Sign a prehashed digest, returning v as 27/28
    pub fn sign_hash(&self, digest: &[u8; 32]) -> Result<Signature, CryptoError> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;
        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(Signature {
            r,
            s,
            v: recovery_id.to_byte() + 27,
        })
    }
}

impl MessageSigner for LocalWallet {
    fn sign_message(&self, message: &[u8]) -> Result<Signature, SignerError> {
        self.sign_hash(&eip191_hash(message))
            .map_err(|e| SignerError(e.to_string()))
    }
}

impl Wallet for LocalWallet {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature, SignerError> {
        self.sign_hash(digest).map_err(|e| SignerError(e.to_string()))
    }
}

impl fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWallet")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_recover_message() {
        let wallet = LocalWallet::random();
        let signature = wallet.sign_message(b"hello umbra").unwrap();
        assert!(signature.v == 27 || signature.v == 28);
        let recovered = recover_message_signer(b"hello umbra", &signature).unwrap();
        assert_eq!(recovered, wallet.address());
        let other = recover_message_signer(b"hello world", &signature).unwrap();
        assert_ne!(other, wallet.address());
    }

    #[test]
    fn test_signing_is_deterministic() {
        let wallet = LocalWallet::random();
        let a = wallet.sign_message(b"same message").unwrap();
        let b = wallet.sign_message(b"same message").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sign_digest_recovers_without_prefix() {
        let wallet = LocalWallet::random();
        let digest = keccak256(b"raw digest");
        let signature = wallet.sign_digest(&digest).unwrap();
        assert_eq!(recover_address(&digest, &signature).unwrap(), wallet.address());
    }

    #[test]
    fn test_signature_hex_roundtrip() {
        let wallet = LocalWallet::random();
        let signature = wallet.sign_message(b"roundtrip").unwrap();
        let parsed = Signature::from_hex("signature", &signature.to_hex()).unwrap();
        assert_eq!(parsed, signature);
    }

    #[test]
    fn test_recovery_byte_normalization() {
        let wallet = LocalWallet::random();
        let mut signature = wallet.sign_message(b"v").unwrap();
        signature.v -= 27;
        assert_eq!(
            recover_message_signer(b"v", &signature).unwrap(),
            wallet.address()
        );
        signature.v = 5;
        assert!(recover_message_signer(b"v", &signature).is_err());
    }

    #[test]
    fn test_eip191_hash_known_value() {
        // keccak256("\x19Ethereum Signed Message:\n5hello")
        assert_eq!(
            encode_0x(&eip191_hash(b"hello")),
            "0x50b2c43fd39106bafbba0da34fc430e1f91e3c96ea2acee2bc34119f92b37750"
        );
    }
}
