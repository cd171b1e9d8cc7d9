//! Deterministic spending/viewing key derivation from a wallet signature
//!
//! The wallet signs one fixed message. The signature's `r` half seeds the
//! spending key and its `s` half seeds the viewing key, each through SHA-256,
//! so the same wallet always regenerates the same pair without any stored
//! state.

use sha2::{Digest, Sha256};
use tracing::debug;
use zeroize::Zeroize;

use crate::error::{CryptoError, Result};
use crate::keys::KeyPair;
use crate::signer::{MessageSigner, Signature};
use crate::stealth::StealthKeys;

/// Message every wallet signs to unlock its stealth keys
pub const KEY_DERIVATION_MESSAGE: &str =
    "Sign this message to access your Umbra account.\n\nOnly sign this message for a trusted client!";

/// A receiver's spending and viewing key pairs
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedKeys {
    pub spending_key_pair: KeyPair,
    pub viewing_key_pair: KeyPair,
}

impl GeneratedKeys {
    /// The public halves a sender needs
    pub fn stealth_keys(&self) -> StealthKeys {
        StealthKeys {
            spending_public_key: *self.spending_key_pair.public_key(),
            viewing_public_key: *self.viewing_key_pair.public_key(),
        }
    }
}

/// Ask `signer` for the derivation signature and derive both key pairs
pub fn generate_private_keys<S: MessageSigner + ?Sized>(signer: &S) -> Result<GeneratedKeys> {
    let signature = signer.sign_message(KEY_DERIVATION_MESSAGE.as_bytes())?;
    Ok(keys_from_signature(&signature)?)
}

/// Derive both key pairs from an existing derivation signature
pub fn keys_from_signature(signature: &Signature) -> Result<GeneratedKeys, CryptoError> {
    // Rejects anything that is not a recoverable signature
    signature.recovery_id()?;

    Ok(GeneratedKeys {
        spending_key_pair: hash_to_key_pair(&signature.r)?,
        viewing_key_pair: hash_to_key_pair(&signature.s)?,
    })
}

/// sha256(seed), re-hashed with an incrementing salt byte until it is a
/// valid non-zero scalar below the curve order
fn hash_to_key_pair(seed: &[u8; 32]) -> Result<KeyPair, CryptoError> {
    let mut digest: [u8; 32] = Sha256::digest(seed).into();

    for salt in 0..=u8::MAX {
        if let Ok(key_pair) = KeyPair::from_private_key_bytes(&digest) {
            digest.zeroize();
            return Ok(key_pair);
        }
        debug!(salt, "derived scalar out of range, re-hashing");
        let mut hasher = Sha256::new();
        hasher.update(digest);
        hasher.update([salt]);
        digest = hasher.finalize().into();
    }

    digest.zeroize();
    Err(CryptoError::InvalidPrivateKey)
}
