//! Sender-side stealth address generation and stealth key reconstruction
//!
//! Dual-key stealth addresses on secp256k1:
//!
//! ```text
//! P  = r·V                      shared secret point (receiver: v·R)
//! h  = keccak256(DOMAIN || P)   s = h mod n, view tag = h[0]
//! S' = S + s·G                  stealth public key
//! R  = r·G                      ephemeral public key, published
//! c  = r XOR keystream(P)       encrypted payload, published
//! ```
//!
//! The stealth private key is `(spend + s) mod n`.

use k256::{elliptic_curve::sec1::ToEncodedPoint, NonZeroScalar, ProjectivePoint, PublicKey, Scalar};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::codec::{FixedRecord, PayloadCodec, RECORD_LEN};
use crate::error::{CryptoError, ValidationError};
use crate::keys::{
    compressed, nonzero_scalar, public_key_from_point, KeyPair, RandomScalar, SecretScalar,
};
use crate::types::{encode_0x, hex_array, keccak256, Address};

/// Domain separator for the shared-secret-to-scalar hash
const STEALTH_SCALAR_DOMAIN: &[u8] = b"umbra/stealth-scalar/v1";

/// Domain separator for the payload encryption secret
const STEALTH_PAYLOAD_DOMAIN: &[u8] = b"umbra/stealth-payload/v1";

/// The payload codec always runs with counter zero; each payment already has
/// a fresh secret.
const PAYLOAD_COUNTER: u64 = 0;

// ============================================================================
// Receiver Public Keys
// ============================================================================

/// The public keys a receiver publishes for senders
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StealthKeys {
    pub spending_public_key: PublicKey,
    pub viewing_public_key: PublicKey,
}

impl StealthKeys {
    pub fn from_hex(spending_public_key: &str, viewing_public_key: &str) -> Result<Self, ValidationError> {
        let spending = KeyPair::from_public_key_hex("spendingPublicKey", spending_public_key)?;
        let viewing = KeyPair::from_public_key_hex("viewingPublicKey", viewing_public_key)?;
        Ok(Self {
            spending_public_key: *spending.public_key(),
            viewing_public_key: *viewing.public_key(),
        })
    }
}

// ============================================================================
// Shared Secret
// ============================================================================

/// Compressed ECDH point, wiped on drop
pub(crate) struct SharedSecret {
    point: [u8; 33],
}

impl SharedSecret {
    /// `secret · public`; both sides of the exchange reach the same point
    pub(crate) fn derive(secret: &NonZeroScalar, public: &PublicKey) -> Result<Self, CryptoError> {
        let point = public.to_projective() * **secret;
        let shared = public_key_from_point(point)?;
        Ok(Self {
            point: compressed(&shared),
        })
    }

    /// The stealth scalar `s` and the view tag, both taken from one hash
    pub(crate) fn stealth_scalar(&self) -> Result<(StealthScalar, u8), CryptoError> {
        let mut input = Vec::with_capacity(STEALTH_SCALAR_DOMAIN.len() + 33);
        input.extend_from_slice(STEALTH_SCALAR_DOMAIN);
        input.extend_from_slice(&self.point);
        let hash = keccak256(&input);
        input.zeroize();

        let view_tag = hash[0];
        let mut candidate = hash;
        for salt in 0..=u8::MAX {
            if let Some(scalar) = nonzero_scalar(&candidate) {
                candidate.zeroize();
                return Ok((StealthScalar { scalar }, view_tag));
            }
            let mut salted = [0u8; 33];
            salted[..32].copy_from_slice(&candidate);
            salted[32] = salt;
            candidate = keccak256(&salted);
        }
        Err(CryptoError::InvalidPrivateKey)
    }

    /// Secret keying the payload codec
    pub(crate) fn payload_secret(&self) -> [u8; 32] {
        let mut input = Vec::with_capacity(STEALTH_PAYLOAD_DOMAIN.len() + 33);
        input.extend_from_slice(STEALTH_PAYLOAD_DOMAIN);
        input.extend_from_slice(&self.point);
        let secret = keccak256(&input);
        input.zeroize();
        secret
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        self.point.zeroize();
    }
}

// ============================================================================
// Stealth Scalar
// ============================================================================

/// The hashed shared secret `s` linking the spending key to one stealth key
#[derive(Clone, Copy)]
pub struct StealthScalar {
    scalar: NonZeroScalar,
}

impl StealthScalar {
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
}

impl std::fmt::Debug for StealthScalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StealthScalar(..)")
    }
}

impl PartialEq for StealthScalar {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl FixedRecord for RandomScalar {
    type Error = CryptoError;

    fn to_record(&self) -> [u8; RECORD_LEN] {
        self.to_bytes()
    }

    fn from_record(bytes: &[u8; RECORD_LEN]) -> Result<Self, Self::Error> {
        RandomScalar::from_bytes(bytes)
    }
}

// ============================================================================
// Announcement Payload
// ============================================================================

/// What a sender publishes next to the payment so the receiver can find it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StealthPayload {
    #[serde(with = "hex_array")]
    pub ephemeral_public_key: [u8; 33],
    #[serde(with = "hex_array")]
    pub ciphertext: [u8; 32],
    pub view_tag: u8,
}

impl StealthPayload {
    pub(crate) fn decrypt_random(&self, shared: &SharedSecret) -> Result<RandomScalar, CryptoError> {
        let mut secret = shared.payload_secret();
        let random = PayloadCodec::new(&secret).decrypt(U256::from(PAYLOAD_COUNTER), &self.ciphertext);
        secret.zeroize();
        random
    }
}

/// Result of preparing a send (sender side)
#[derive(Clone, Debug)]
pub struct StealthSend {
    /// Public-only key pair of the one-time address
    pub stealth_key_pair: KeyPair,
    pub payload: StealthPayload,
    /// The ephemeral secret. Never reuse it for another payment.
    pub random: RandomScalar,
}

impl StealthSend {
    pub fn stealth_address(&self) -> Address {
        self.stealth_key_pair.address()
    }
}

/// Compute the stealth address and payload for `keys` with a fresh ephemeral secret
pub fn prepare_send(keys: &StealthKeys) -> Result<StealthSend, CryptoError> {
    generate_stealth(keys, &RandomScalar::generate())
}

/// Compute the stealth address and payload for `keys` under `random`
pub fn generate_stealth(keys: &StealthKeys, random: &RandomScalar) -> Result<StealthSend, CryptoError> {
    // P = r·V
    let shared = SharedSecret::derive(random.scalar(), &keys.viewing_public_key)?;
    let (stealth_scalar, view_tag) = shared.stealth_scalar()?;

    // S' = S + s·G
    let stealth_public_key = compute_stealth_public_key(&keys.spending_public_key, &stealth_scalar)?;

    // R = r·G
    let ephemeral = public_key_from_point(random.public_point())?;

    let mut secret = shared.payload_secret();
    let ciphertext = PayloadCodec::new(&secret).encrypt(U256::from(PAYLOAD_COUNTER), random);
    secret.zeroize();

    Ok(StealthSend {
        stealth_key_pair: KeyPair::from_public_key(stealth_public_key),
        payload: StealthPayload {
            ephemeral_public_key: compressed(&ephemeral),
            ciphertext,
            view_tag,
        },
        random: random.clone(),
    })
}

/// S + s·G
pub fn compute_stealth_public_key(
    spending_public_key: &PublicKey,
    stealth_scalar: &StealthScalar,
) -> Result<PublicKey, CryptoError> {
    let point = spending_public_key.to_projective() + ProjectivePoint::GENERATOR * *stealth_scalar.scalar;
    public_key_from_point(point)
}

/// `(spend + s) mod n`, the private key controlling one stealth address
pub fn compute_stealth_private_key(
    spending_key_pair: &KeyPair,
    stealth_scalar: &StealthScalar,
) -> Result<KeyPair, CryptoError> {
    let spend: Scalar = *spending_key_pair.secret_key()?.to_nonzero_scalar();
    let sum = SecretScalar::from_scalar(&(spend + *stealth_scalar.scalar));
    KeyPair::from_private_key_bytes(sum.as_bytes())
}

/// Uncompressed SEC1 encoding, for display
pub fn public_key_hex(public_key: &PublicKey) -> String {
    encode_0x(public_key.to_encoded_point(false).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::GeneratedKeys;

    fn receiver() -> GeneratedKeys {
        GeneratedKeys {
            spending_key_pair: KeyPair::random(),
            viewing_key_pair: KeyPair::random(),
        }
    }

    #[test]
    fn test_receiver_reaches_same_stealth_address() {
        let keys = receiver();
        let send = prepare_send(&keys.stealth_keys()).unwrap();

        let ephemeral = PublicKey::from_sec1_bytes(&send.payload.ephemeral_public_key).unwrap();
        let viewing = keys.viewing_key_pair.secret_key().unwrap().to_nonzero_scalar();
        let shared = SharedSecret::derive(&viewing, &ephemeral).unwrap();
        let (s, tag) = shared.stealth_scalar().unwrap();
        assert_eq!(tag, send.payload.view_tag);

        let stealth_public = compute_stealth_public_key(keys.spending_key_pair.public_key(), &s).unwrap();
        assert_eq!(KeyPair::from_public_key(stealth_public).address(), send.stealth_address());

        let recovered = send.payload.decrypt_random(&shared).unwrap();
        assert_eq!(recovered, send.random);
    }

    #[test]
    fn test_stealth_private_key_controls_address() {
        let keys = receiver();
        let random = RandomScalar::generate();
        let send = generate_stealth(&keys.stealth_keys(), &random).unwrap();

        let shared = SharedSecret::derive(random.scalar(), keys.viewing_key_pair.public_key()).unwrap();
        let (s, _) = shared.stealth_scalar().unwrap();
        let stealth = compute_stealth_private_key(&keys.spending_key_pair, &s).unwrap();
        assert_eq!(stealth.address(), send.stealth_address());
        assert_eq!(stealth.public_key(), send.stealth_key_pair.public_key());
    }

    #[test]
    fn test_same_random_is_deterministic() {
        let keys = receiver().stealth_keys();
        let random = RandomScalar::generate();
        let a = generate_stealth(&keys, &random).unwrap();
        let b = generate_stealth(&keys, &random).unwrap();
        assert_eq!(a.stealth_address(), b.stealth_address());
        assert_eq!(a.payload, b.payload);
    }

    #[test]
    fn test_stealth_address_differs_from_spending_address() {
        let keys = receiver();
        let send = prepare_send(&keys.stealth_keys()).unwrap();
        assert_ne!(send.stealth_address(), keys.spending_key_pair.address());
        assert!(!send.stealth_key_pair.has_private_key());
    }

    #[test]
    fn test_public_only_spending_key_cannot_reconstruct() {
        let keys = receiver();
        let s = StealthScalar::from_bytes(&[1u8; 32]).unwrap();
        let public_only = keys.spending_key_pair.public_only();
        assert_eq!(
            compute_stealth_private_key(&public_only, &s).unwrap_err(),
            CryptoError::MissingPrivateKey
        );
    }

    #[test]
    fn test_payload_serde_uses_hex() {
        let send = prepare_send(&receiver().stealth_keys()).unwrap();
        let json = serde_json::to_value(send.payload).unwrap();
        assert!(json["ephemeralPublicKey"].as_str().unwrap().starts_with("0x0"));
        let back: StealthPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, send.payload);
    }
}
