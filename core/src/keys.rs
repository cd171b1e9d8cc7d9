//! secp256k1 key material
//!
//! Security features:
//! - Secret scalars are zeroized on drop
//! - Debug output never includes private key material
//! - Public-only key pairs are first-class (a receiver's published keys)

use std::fmt;

use k256::{
    elliptic_curve::{ops::Reduce, sec1::ToEncodedPoint},
    FieldBytes, NonZeroScalar, ProjectivePoint, PublicKey, Scalar, SecretKey, U256,
};
use rand::rngs::OsRng;
use zeroize::Zeroize;

use crate::error::{CryptoError, ValidationError};
use crate::types::{decode_fixed_hex, encode_0x, Address};

// ============================================================================
// Zeroizing Scalar Wrapper
// ============================================================================

/// Scalar bytes that are wiped when dropped
#[derive(Clone)]
pub struct SecretScalar {
    bytes: [u8; 32],
}

impl SecretScalar {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    pub fn from_scalar(scalar: &Scalar) -> Self {
        Self {
            bytes: scalar.to_bytes().into(),
        }
    }

    /// Reduced modulo the curve order
    pub fn to_scalar(&self) -> Scalar {
        <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(self.bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl Drop for SecretScalar {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// Interpret 32 big-endian bytes as a scalar in `[1, n-1]`
pub(crate) fn nonzero_scalar(bytes: &[u8; 32]) -> Option<NonZeroScalar> {
    Option::from(NonZeroScalar::from_repr(FieldBytes::from(*bytes)))
}

// ============================================================================
// Key Pair
// ============================================================================

/// A secp256k1 key pair and its derived account address
///
/// The private half is optional so that a receiver's published public keys
/// can flow through the same type.
#[derive(Clone)]
pub struct KeyPair {
    secret: Option<SecretKey>,
    public_key: PublicKey,
    address: Address,
}

impl KeyPair {
    /// Fresh key pair from OS entropy
    pub fn random() -> Self {
        Self::from_secret_key(SecretKey::random(&mut OsRng))
    }

    pub fn from_secret_key(secret: SecretKey) -> Self {
        let public_key = secret.public_key();
        Self {
            address: address_of(&public_key),
            secret: Some(secret),
            public_key,
        }
    }

    /// Rejects zero and values at or above the curve order
    pub fn from_private_key_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let secret = SecretKey::from_slice(bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret))
    }

    /// Parse a `0x`-prefixed 32-byte hex private key
    pub fn from_private_key_hex(field: &'static str, value: &str) -> Result<Self, ValidationError> {
        let mut bytes: [u8; 32] = decode_fixed_hex(field, value)
            .map_err(|_| ValidationError::InvalidPrivateKey { field })?;
        let key_pair = Self::from_private_key_bytes(&bytes)
            .map_err(|_| ValidationError::InvalidPrivateKey { field });
        bytes.zeroize();
        key_pair
    }

    pub fn from_public_key(public_key: PublicKey) -> Self {
        Self {
            address: address_of(&public_key),
            secret: None,
            public_key,
        }
    }

    /// Parse a SEC1 public key, compressed (33 bytes) or uncompressed (65 bytes)
    pub fn from_public_key_hex(field: &'static str, value: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidPublicKey {
            field,
            value: value.to_string(),
        };
        let digits = value.strip_prefix("0x").ok_or_else(invalid)?;
        let bytes = hex::decode(digits).map_err(|_| invalid())?;
        if bytes.len() != 33 && bytes.len() != 65 {
            return Err(invalid());
        }
        let public_key = PublicKey::from_sec1_bytes(&bytes).map_err(|_| invalid())?;
        Ok(Self::from_public_key(public_key))
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// 65 bytes: 0x04 || X || Y
    pub fn public_key_uncompressed(&self) -> [u8; 65] {
        uncompressed(&self.public_key)
    }

    /// 33 bytes: 0x02/0x03 || X
    pub fn public_key_compressed(&self) -> [u8; 33] {
        compressed(&self.public_key)
    }

    pub fn public_key_hex(&self) -> String {
        encode_0x(&self.public_key_uncompressed())
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn has_private_key(&self) -> bool {
        self.secret.is_some()
    }

    pub fn secret_key(&self) -> Result<&SecretKey, CryptoError> {
        self.secret.as_ref().ok_or(CryptoError::MissingPrivateKey)
    }

    /// Export the private key as `0x`-prefixed hex
    ///
    /// WARNING: Handle the returned string with extreme care!
    pub fn private_key_hex(&self) -> Option<String> {
        self.secret.as_ref().map(|secret| {
            let mut bytes: [u8; 32] = secret.to_bytes().into();
            let hex = encode_0x(&bytes);
            bytes.zeroize();
            hex
        })
    }

    /// Public-only copy of this key pair
    pub fn public_only(&self) -> Self {
        Self::from_public_key(self.public_key)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address)
            .field("has_private_key", &self.has_private_key())
            .finish_non_exhaustive()
    }
}

impl PartialEq for KeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
    }
}

pub(crate) fn uncompressed(public_key: &PublicKey) -> [u8; 65] {
    let point = public_key.to_encoded_point(false);
    let mut out = [0u8; 65];
    out.copy_from_slice(point.as_bytes());
    out
}

pub(crate) fn compressed(public_key: &PublicKey) -> [u8; 33] {
    let point = public_key.to_encoded_point(true);
    let mut out = [0u8; 33];
    out.copy_from_slice(point.as_bytes());
    out
}

pub(crate) fn address_of(public_key: &PublicKey) -> Address {
    Address::from_uncompressed_public_key(&uncompressed(public_key))
}

/// Convert a projective point into a public key, rejecting the identity
pub(crate) fn public_key_from_point(point: ProjectivePoint) -> Result<PublicKey, CryptoError> {
    PublicKey::from_affine(point.to_affine()).map_err(|_| CryptoError::InvalidPublicKey)
}

// ============================================================================
// Random Scalar
// ============================================================================

/// Per-payment ephemeral secret `r` in `[1, n-1]`
///
/// Never reuse one across payments: reuse links the two stealth addresses.
#[derive(Clone)]
pub struct RandomScalar {
    scalar: NonZeroScalar,
}

impl RandomScalar {
    /// Uniform sample from OS entropy
    pub fn generate() -> Self {
        Self {
            scalar: NonZeroScalar::random(&mut OsRng),
        }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        nonzero_scalar(bytes)
            .map(|scalar| Self { scalar })
            .ok_or(CryptoError::InvalidPrivateKey)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.scalar.to_bytes().into()
    }

    pub fn to_hex(&self) -> String {
        encode_0x(&self.to_bytes())
    }

    pub(crate) fn scalar(&self) -> &NonZeroScalar {
        &self.scalar
    }

    /// r·G
    pub fn public_point(&self) -> ProjectivePoint {
        ProjectivePoint::GENERATOR * *self.scalar
    }
}

impl fmt::Debug for RandomScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RandomScalar(..)")
    }
}

impl PartialEq for RandomScalar {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_scalar_roundtrip() {
        let scalar = *NonZeroScalar::random(&mut OsRng);
        let wrapped = SecretScalar::from_scalar(&scalar);
        assert_eq!(wrapped.to_scalar(), scalar);
    }

    #[test]
    fn test_key_pair_address_matches_public_key() {
        let key_pair = KeyPair::random();
        let public = key_pair.public_key_uncompressed();
        assert_eq!(public[0], 0x04);
        assert_eq!(key_pair.address(), Address::from_uncompressed_public_key(&public));
        assert_eq!(key_pair.private_key_hex().unwrap().len(), 66);
    }

    #[test]
    fn test_known_private_key_address() {
        // Hardhat / anvil account #0
        let key_pair = KeyPair::from_private_key_hex(
            "privateKey",
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        )
        .unwrap();
        assert_eq!(
            key_pair.address().to_string(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }

    #[test]
    fn test_public_only_key_pair() {
        let full = KeyPair::random();
        let public = KeyPair::from_public_key_hex("publicKey", &full.public_key_hex()).unwrap();
        assert!(!public.has_private_key());
        assert_eq!(public.address(), full.address());
        assert_eq!(public.secret_key().unwrap_err(), CryptoError::MissingPrivateKey);

        let compressed_hex = encode_0x(&full.public_key_compressed());
        let from_compressed = KeyPair::from_public_key_hex("publicKey", &compressed_hex).unwrap();
        assert_eq!(from_compressed, full);
    }

    #[test]
    fn test_invalid_private_keys_rejected() {
        let invalid = [
            "",
            "0x",
            "0xea40eda38ee75464fd68074e35c1e52c03ac041e2ffba23efaa93d425487f88",
            "ea40eda38ee75464fd68074e35c1e52c03ac041e2ffba23efaa93d425487f88a",
            "0x0000000000000000000000000000000000000000000000000000000000000000",
            "0xffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        ];
        for value in invalid {
            assert!(KeyPair::from_private_key_hex("privateKey", value).is_err(), "{value}");
        }
    }

    #[test]
    fn test_random_scalar_rejects_zero() {
        assert!(RandomScalar::from_bytes(&[0u8; 32]).is_err());
        let r = RandomScalar::generate();
        let again = RandomScalar::from_bytes(&r.to_bytes()).unwrap();
        assert_eq!(r, again);
    }
}
