//! Deterministic-keystream encryption of fixed-width records
//!
//! `keystream(secret, counter) = keccak256(secret || uint256_be(counter))`
//! and both directions XOR the record with it, so the operation is its own
//! inverse. The stealth payload (counter 0, record = ephemeral scalar) and
//! the account-send cache (counter = rotating per-account count) share it.

use primitive_types::U256;

use crate::types::keccak256;

/// Width of every record handled by the codec
pub const RECORD_LEN: usize = 32;

/// A value with a fixed 32-byte big-endian encoding
pub trait FixedRecord: Sized {
    type Error;

    fn to_record(&self) -> [u8; RECORD_LEN];

    /// Decode any 32 bytes. Decoy plaintexts must still parse or fail cleanly.
    fn from_record(bytes: &[u8; RECORD_LEN]) -> Result<Self, Self::Error>;
}

/// Keystream-XOR codec parameterized by a secret
pub struct PayloadCodec<'a> {
    secret: &'a [u8; 32],
}

impl<'a> PayloadCodec<'a> {
    pub fn new(secret: &'a [u8; 32]) -> Self {
        Self { secret }
    }

    pub fn keystream(&self, counter: U256) -> [u8; RECORD_LEN] {
        let mut input = [0u8; 64];
        input[..32].copy_from_slice(self.secret);
        counter.to_big_endian(&mut input[32..]);
        keccak256(&input)
    }

    /// XOR `data` with the keystream for `counter`
    pub fn apply(&self, counter: U256, data: &[u8; RECORD_LEN]) -> [u8; RECORD_LEN] {
        let stream = self.keystream(counter);
        let mut out = [0u8; RECORD_LEN];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = data[i] ^ stream[i];
        }
        out
    }

    pub fn encrypt<R: FixedRecord>(&self, counter: U256, record: &R) -> [u8; RECORD_LEN] {
        self.apply(counter, &record.to_record())
    }

    pub fn decrypt<R: FixedRecord>(
        &self,
        counter: U256,
        ciphertext: &[u8; RECORD_LEN],
    ) -> Result<R, R::Error> {
        R::from_record(&self.apply(counter, ciphertext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Raw([u8; 32]);

    impl FixedRecord for Raw {
        type Error = std::convert::Infallible;

        fn to_record(&self) -> [u8; 32] {
            self.0
        }

        fn from_record(bytes: &[u8; 32]) -> Result<Self, Self::Error> {
            Ok(Raw(*bytes))
        }
    }

    #[test]
    fn test_apply_is_self_inverse() {
        let secret = [7u8; 32];
        let codec = PayloadCodec::new(&secret);
        let data = [0x42u8; 32];
        let once = codec.apply(U256::from(3u64), &data);
        assert_ne!(once, data);
        assert_eq!(codec.apply(U256::from(3u64), &once), data);
    }

    #[test]
    fn test_counter_changes_keystream() {
        let secret = [1u8; 32];
        let codec = PayloadCodec::new(&secret);
        assert_ne!(codec.keystream(U256::zero()), codec.keystream(U256::one()));
        assert_ne!(codec.keystream(U256::zero()), codec.keystream(U256::MAX));
    }

    #[test]
    fn test_record_roundtrip_preserves_leading_zeros() {
        let secret = [9u8; 32];
        let codec = PayloadCodec::new(&secret);
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        let ciphertext = codec.encrypt(U256::from(661u64), &Raw(bytes));
        let Raw(plain) = codec.decrypt::<Raw>(U256::from(661u64), &ciphertext).unwrap();
        assert_eq!(plain, bytes);
    }

    #[test]
    fn test_wrong_secret_yields_different_plaintext() {
        let secret = [2u8; 32];
        let other = [3u8; 32];
        let data = [0xabu8; 32];
        let ciphertext = PayloadCodec::new(&secret).apply(U256::zero(), &data);
        assert_ne!(PayloadCodec::new(&other).apply(U256::zero(), &ciphertext), data);
    }
}
