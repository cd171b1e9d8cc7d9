//! Receiver-side announcement scanning
//!
//! Every announcement is checked independently: recompute the shared secret
//! from the viewing key and the ephemeral key, derive `s`, rebuild the
//! candidate stealth address and compare it with the announced receiver in
//! constant time. Announcements addressed to someone else are skipped, never
//! treated as errors.

use k256::{NonZeroScalar, PublicKey};
use primitive_types::U256;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{debug, trace};

use crate::error::{CryptoError, ValidationError};
use crate::keys::{address_of, compressed, public_key_from_point, KeyPair, RandomScalar};
use crate::stealth::{compute_stealth_public_key, SharedSecret, StealthPayload, StealthScalar};
use crate::types::{hex_array, u256_dec, Address, TxHash};

/// A payment announcement as emitted by the settlement contract
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    /// Stealth address that received the funds
    pub receiver: Address,
    #[serde(with = "u256_dec")]
    pub amount: U256,
    /// Token address, the ETH sentinel for native sends
    pub token: Address,
    pub from: Address,
    #[serde(flatten)]
    pub payload: StealthPayload,
    pub block_number: u64,
    #[serde(with = "hex_array")]
    pub tx_hash: TxHash,
}

/// An announcement addressed to the scanning receiver
#[derive(Clone, Debug, PartialEq)]
pub struct UserAnnouncement {
    pub announcement: Announcement,
    /// Ephemeral secret recovered from the payload
    pub random_number: RandomScalar,
    /// Combine with the spending key to reconstruct the stealth private key
    pub stealth_scalar: StealthScalar,
    pub stealth_address: Address,
}

/// Whether the one-byte view tag may reject announcements early
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ViewTagPolicy {
    /// Skip announcements whose tag disagrees before decrypting
    #[default]
    Prefilter,
    /// Run the full match on every announcement
    Ignore,
}

/// Receiver's scanning capability: spending public key plus viewing secret
#[derive(Clone)]
pub struct Scanner {
    spending_public_key: PublicKey,
    viewing_secret: NonZeroScalar,
    view_tag_policy: ViewTagPolicy,
}

impl Scanner {
    pub fn new(spending_public_key: PublicKey, viewing_key_pair: &KeyPair) -> Result<Self, CryptoError> {
        let viewing_secret = viewing_key_pair.secret_key()?.to_nonzero_scalar();
        Ok(Self {
            spending_public_key,
            viewing_secret,
            view_tag_policy: ViewTagPolicy::default(),
        })
    }

    /// Validates both keys before any announcement is looked at
    pub fn from_hex(spending_public_key: &str, viewing_private_key: &str) -> Result<Self, ValidationError> {
        let spending = KeyPair::from_public_key_hex("spendingPublicKey", spending_public_key)?;
        let viewing = KeyPair::from_private_key_hex("viewingPrivateKey", viewing_private_key)?;
        Self::new(*spending.public_key(), &viewing)
            .map_err(|_| ValidationError::InvalidPrivateKey { field: "viewingPrivateKey" })
    }

    pub fn with_view_tag_policy(mut self, policy: ViewTagPolicy) -> Self {
        self.view_tag_policy = policy;
        self
    }

    /// Match one announcement, `None` when it belongs to someone else
    pub fn check(&self, announcement: &Announcement) -> Option<UserAnnouncement> {
        let payload = &announcement.payload;

        let ephemeral = match PublicKey::from_sec1_bytes(&payload.ephemeral_public_key) {
            Ok(key) => key,
            Err(_) => {
                debug!(tx = %hex::encode(announcement.tx_hash), "skipping announcement with invalid ephemeral key");
                return None;
            }
        };

        let shared = SharedSecret::derive(&self.viewing_secret, &ephemeral).ok()?;
        let (stealth_scalar, view_tag) = shared.stealth_scalar().ok()?;

        if self.view_tag_policy == ViewTagPolicy::Prefilter && view_tag != payload.view_tag {
            trace!(block = announcement.block_number, "view tag mismatch");
            return None;
        }

        let random_number = match payload.decrypt_random(&shared) {
            Ok(random) => random,
            Err(_) => {
                debug!(block = announcement.block_number, "payload decrypts to an invalid scalar");
                return None;
            }
        };

        // The decrypted secret must reproduce the published ephemeral key
        let ephemeral_check = public_key_from_point(random_number.public_point()).ok()?;
        if !bool::from(compressed(&ephemeral_check).ct_eq(&payload.ephemeral_public_key)) {
            debug!(block = announcement.block_number, "payload does not match ephemeral key");
            return None;
        }

        let stealth_public_key = compute_stealth_public_key(&self.spending_public_key, &stealth_scalar).ok()?;
        let stealth_address = address_of(&stealth_public_key);
        if !bool::from(stealth_address.as_bytes().ct_eq(announcement.receiver.as_bytes())) {
            debug!(block = announcement.block_number, "stealth address mismatch");
            return None;
        }

        Some(UserAnnouncement {
            announcement: announcement.clone(),
            random_number,
            stealth_scalar,
            stealth_address,
        })
    }

    /// Lazily yield matches in input order
    ///
    /// Dropping the iterator stops the scan between announcements; nothing is
    /// written anywhere, so a scan can be restarted from any block.
    pub fn matches<'a, I>(&'a self, announcements: I) -> impl Iterator<Item = UserAnnouncement> + 'a
    where
        I: IntoIterator<Item = &'a Announcement>,
        I::IntoIter: 'a,
    {
        announcements.into_iter().filter_map(move |a| self.check(a))
    }

    /// Check all announcements in parallel, preserving input order
    pub fn scan_all(&self, announcements: &[Announcement]) -> Vec<UserAnnouncement> {
        announcements
            .par_iter()
            .filter_map(|a| self.check(a))
            .collect()
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("view_tag_policy", &self.view_tag_policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::GeneratedKeys;
    use crate::stealth::prepare_send;
    use crate::types::ETH_ADDRESS;

    fn announcement_for(keys: &GeneratedKeys, block: u64) -> Announcement {
        let send = prepare_send(&keys.stealth_keys()).unwrap();
        Announcement {
            receiver: send.stealth_address(),
            amount: U256::from(1_000u64),
            token: ETH_ADDRESS,
            from: Address([0x11; 20]),
            payload: send.payload,
            block_number: block,
            tx_hash: [block as u8; 32],
        }
    }

    fn keys() -> GeneratedKeys {
        GeneratedKeys {
            spending_key_pair: KeyPair::random(),
            viewing_key_pair: KeyPair::random(),
        }
    }

    #[test]
    fn test_finds_own_announcement() {
        let receiver = keys();
        let ann = announcement_for(&receiver, 1);
        let scanner = Scanner::new(*receiver.spending_key_pair.public_key(), &receiver.viewing_key_pair).unwrap();
        let found = scanner.check(&ann).unwrap();
        assert_eq!(found.stealth_address, ann.receiver);
    }

    #[test]
    fn test_ignores_foreign_announcement() {
        let receiver = keys();
        let other = keys();
        let ann = announcement_for(&other, 1);
        let scanner = Scanner::new(*receiver.spending_key_pair.public_key(), &receiver.viewing_key_pair).unwrap();
        assert!(scanner.check(&ann).is_none());
        let full = scanner.clone().with_view_tag_policy(ViewTagPolicy::Ignore);
        assert!(full.check(&ann).is_none());
    }

    #[test]
    fn test_wrong_view_tag_only_matters_when_prefiltering() {
        let receiver = keys();
        let mut ann = announcement_for(&receiver, 3);
        ann.payload.view_tag = ann.payload.view_tag.wrapping_add(1);
        let scanner = Scanner::new(*receiver.spending_key_pair.public_key(), &receiver.viewing_key_pair).unwrap();
        assert!(scanner.check(&ann).is_none());
        let full = scanner.with_view_tag_policy(ViewTagPolicy::Ignore);
        assert!(full.check(&ann).is_some());
    }

    #[test]
    fn test_garbage_ephemeral_key_is_skipped() {
        let receiver = keys();
        let mut ann = announcement_for(&receiver, 4);
        ann.payload.ephemeral_public_key = [0xff; 33];
        let scanner = Scanner::new(*receiver.spending_key_pair.public_key(), &receiver.viewing_key_pair).unwrap();
        assert!(scanner.check(&ann).is_none());
    }

    #[test]
    fn test_parallel_scan_preserves_order() {
        let receiver = keys();
        let other = keys();
        let anns: Vec<_> = (0..24u64)
            .map(|i| if i % 3 == 0 { announcement_for(&receiver, i) } else { announcement_for(&other, i) })
            .collect();
        let scanner = Scanner::new(*receiver.spending_key_pair.public_key(), &receiver.viewing_key_pair).unwrap();

        let sequential: Vec<u64> = scanner.matches(&anns).map(|m| m.announcement.block_number).collect();
        let parallel: Vec<u64> = scanner.scan_all(&anns).iter().map(|m| m.announcement.block_number).collect();
        assert_eq!(sequential, vec![0, 3, 6, 9, 12, 15, 18, 21]);
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_malformed_own_keys_fail_up_front() {
        let viewing = KeyPair::random().private_key_hex().unwrap();
        assert!(Scanner::from_hex("0x1234", &viewing).is_err());
        let spending = KeyPair::random().public_key_hex();
        assert!(Scanner::from_hex(&spending, "0x1234").is_err());
    }

    #[test]
    fn test_public_only_viewing_key_rejected() {
        let receiver = keys();
        let result = Scanner::new(*receiver.spending_key_pair.public_key(), &receiver.viewing_key_pair.public_only());
        assert_eq!(result.unwrap_err(), CryptoError::MissingPrivateKey);
    }

    #[test]
    fn test_announcement_json_roundtrip() {
        let ann = announcement_for(&keys(), 9);
        let json = serde_json::to_string(&ann).unwrap();
        assert!(json.contains("\"blockNumber\":9"));
        assert!(json.contains("\"amount\":\"1000\""));
        let back: Announcement = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ann);
    }
}
