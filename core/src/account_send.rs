//! Encrypted local history of the sends an account initiated
//!
//! Each send is reduced to a 32-byte record (recipient, two flags and a
//! fragment of the recipient's public key) and encrypted with the payload
//! codec under the sender's viewing key and a per-account counter:
//!
//! ```text
//! | recipient address | adv | pkc | public key bytes 1..12 |
//! |      20 bytes     | 4b  | 4b  |        11 bytes        |
//! ```
//!
//! The public key fragment only helps identify a recipient on screen. It can
//! not be turned back into the key.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use primitive_types::U256;
use rand::{rngs::OsRng, Rng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use crate::codec::{FixedRecord, PayloadCodec, RECORD_LEN};
use crate::error::{CountUse, Result, StoreError, ValidationError};
use crate::keys::KeyPair;
use crate::store::KeyValueStore;
use crate::types::{decode_fixed_hex, encode_0x, hex_array, parse_u256, u256_dec, Address, TxHash};

/// Prefix of every store key written by this module
pub const STORAGE_PREFIX: &str = "umbra-account-sends";

/// Tag marking a public key as a non-reconstructable fragment
const FRAGMENT_TAG: u8 = 0x99;

const FRAGMENT_LEN: usize = 11;

// ============================================================================
// Record
// ============================================================================

/// Decrypted account-send metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountSendData {
    pub address: Address,
    pub advanced_mode: bool,
    pub use_public_key_checked: bool,
    pub pub_key_fragment: [u8; FRAGMENT_LEN],
}

impl AccountSendData {
    /// Fragment rendered as `0x99` followed by its 11 bytes
    pub fn pub_key(&self) -> String {
        let mut tagged = [0u8; FRAGMENT_LEN + 1];
        tagged[0] = FRAGMENT_TAG;
        tagged[1..].copy_from_slice(&self.pub_key_fragment);
        encode_0x(&tagged)
    }
}

impl FixedRecord for AccountSendData {
    type Error = std::convert::Infallible;

    fn to_record(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[..20].copy_from_slice(self.address.as_bytes());
        out[20] = (u8::from(self.advanced_mode) << 4) | u8::from(self.use_public_key_checked);
        out[21..].copy_from_slice(&self.pub_key_fragment);
        out
    }

    fn from_record(bytes: &[u8; RECORD_LEN]) -> std::result::Result<Self, Self::Error> {
        let mut address = [0u8; 20];
        address.copy_from_slice(&bytes[..20]);
        let mut pub_key_fragment = [0u8; FRAGMENT_LEN];
        pub_key_fragment.copy_from_slice(&bytes[21..]);
        // Any other nibble value reads as false, so foreign plaintexts still parse
        Ok(Self {
            address: Address(address),
            advanced_mode: bytes[20] >> 4 == 1,
            use_public_key_checked: bytes[20] & 0x0f == 1,
            pub_key_fragment,
        })
    }
}

/// Unvalidated account data for one send
#[derive(Clone, Copy, Debug)]
pub struct AccountDataInput<'a> {
    pub recipient_address: &'a str,
    pub advanced_mode: bool,
    pub use_public_key_checked: bool,
    /// Uncompressed `0x04` public key of the recipient
    pub pub_key: &'a str,
}

/// Unvalidated encryption parameters
#[derive(Clone, Copy, Debug)]
pub struct EncryptionParams<'a> {
    /// Decimal (or `0x` hex) counter, at most 2^256 - 1
    pub encryption_count: &'a str,
    pub viewing_private_key: &'a str,
}

/// Validate `input` and pack it into a record
pub fn build_account_data(input: &AccountDataInput<'_>) -> Result<AccountSendData, ValidationError> {
    let address = Address::parse("recipientAddress", input.recipient_address)
        .map_err(|_| ValidationError::InvalidRecipientAddress)?;

    if !input.pub_key.starts_with("0x04") || input.pub_key.len() != 132 {
        return Err(ValidationError::InvalidRecipientPublicKey);
    }
    let public_key = KeyPair::from_public_key_hex("pubKey", input.pub_key)
        .map_err(|_| ValidationError::InvalidRecipientPublicKey)?
        .public_key_uncompressed();

    let mut pub_key_fragment = [0u8; FRAGMENT_LEN];
    pub_key_fragment.copy_from_slice(&public_key[1..=FRAGMENT_LEN]);

    Ok(AccountSendData {
        address,
        advanced_mode: input.advanced_mode,
        use_public_key_checked: input.use_public_key_checked,
        pub_key_fragment,
    })
}

fn parse_count(value: &str, usage: CountUse) -> Result<U256, ValidationError> {
    parse_u256("encryptionCount", value).map_err(|_| ValidationError::InvalidCount(usage))
}

// ============================================================================
// Codec
// ============================================================================

/// Account-send codec keyed by a viewing private key
pub struct AccountSendCodec {
    viewing_key: [u8; 32],
}

impl AccountSendCodec {
    /// Any `0x`-prefixed 32-byte hex string is accepted as the key
    pub fn new(viewing_private_key: &str) -> Result<Self, ValidationError> {
        let viewing_key = decode_fixed_hex::<32>("viewingPrivateKey", viewing_private_key)
            .map_err(|_| ValidationError::InvalidViewingKey)?;
        Ok(Self { viewing_key })
    }

    pub fn encrypt(&self, count: U256, data: &AccountSendData) -> [u8; RECORD_LEN] {
        PayloadCodec::new(&self.viewing_key).encrypt(count, data)
    }

    pub fn decrypt(&self, count: U256, ciphertext: &[u8; RECORD_LEN]) -> AccountSendData {
        match PayloadCodec::new(&self.viewing_key).decrypt::<AccountSendData>(count, ciphertext) {
            Ok(data) => data,
            Err(never) => match never {},
        }
    }
}

impl Drop for AccountSendCodec {
    fn drop(&mut self) {
        self.viewing_key.zeroize();
    }
}

/// Encrypt account data, returning `0x`-prefixed hex
///
/// Inputs are validated in order: count, viewing key, recipient, public key.
pub fn encrypt_account_data(
    input: &AccountDataInput<'_>,
    params: &EncryptionParams<'_>,
) -> Result<String, ValidationError> {
    let count = parse_count(params.encryption_count, CountUse::Encryption)?;
    let codec = AccountSendCodec::new(params.viewing_private_key)?;
    let data = build_account_data(input)?;
    Ok(encode_0x(&codec.encrypt(count, &data)))
}

/// Decrypt a `0x`-prefixed 32-byte ciphertext
///
/// Inputs are validated in order: count, viewing key, ciphertext.
pub fn decrypt_account_data(
    ciphertext: &str,
    params: &EncryptionParams<'_>,
) -> Result<AccountSendData, ValidationError> {
    let count = parse_count(params.encryption_count, CountUse::Decryption)?;
    let codec = AccountSendCodec::new(params.viewing_private_key)?;
    let ciphertext = decode_fixed_hex::<RECORD_LEN>("ciphertext", ciphertext)
        .map_err(|_| ValidationError::InvalidCiphertext)?;
    Ok(codec.decrypt(count, &ciphertext))
}

// ============================================================================
// Store
// ============================================================================

/// Plain metadata stored next to each encrypted record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSendRecord {
    #[serde(with = "hex_array")]
    pub account_send_ciphertext: [u8; RECORD_LEN],
    #[serde(with = "u256_dec")]
    pub amount: U256,
    pub token_address: Address,
    #[serde(with = "hex_array")]
    pub tx_hash: TxHash,
    pub date_sent: DateTime<Utc>,
}

/// Unencrypted part of a send to record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnencryptedSend {
    pub amount: U256,
    pub token_address: Address,
    pub tx_hash: TxHash,
    /// Local account that initiated the send, keys the history
    pub sender_address: Address,
}

/// A decrypted history entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountSend {
    pub recipient_address: Address,
    pub advanced_mode: bool,
    pub use_public_key_checked: bool,
    pub pub_key: String,
    pub amount: U256,
    pub token_address: Address,
    pub tx_hash: TxHash,
    pub date_sent: DateTime<Utc>,
}

pub fn records_key(address: &Address, chain_id: u64) -> String {
    format!("{STORAGE_PREFIX}-{address}-{chain_id}")
}

pub fn count_key(address: &Address, chain_id: u64) -> String {
    format!("{STORAGE_PREFIX}-count-{address}-{chain_id}")
}

/// Send history over a [`KeyValueStore`]
///
/// Updates to one account's counter and list are serialized by a per-key
/// lock, so concurrent sends cannot make the two diverge.
pub struct AccountSendCache<S> {
    store: S,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: KeyValueStore> AccountSendCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Drop the map entry once no other task holds or waits on `lock`
    async fn release_lock(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    /// Encrypt and append one send to the sender's history
    ///
    /// A fresh random 128-bit base counter is chosen whenever the counter or
    /// the list is missing (the list then restarts). Entry `i` is encrypted
    /// under `base + i`. If the list cannot be written the previous counter
    /// is put back, so the two never disagree.
    pub async fn store_send(
        &self,
        chain_id: u64,
        viewing_private_key: &str,
        send: &UnencryptedSend,
        account_data: &AccountDataInput<'_>,
    ) -> Result<()> {
        let codec = AccountSendCodec::new(viewing_private_key)?;
        let data = build_account_data(account_data)?;

        let list_key = records_key(&send.sender_address, chain_id);
        let count_key = count_key(&send.sender_address, chain_id);
        let lock = self.lock_for(&list_key).await;
        let result = {
            let _guard = lock.lock().await;
            self.append_send(&list_key, &count_key, &codec, &data, send).await
        };
        self.release_lock(&list_key, lock).await;
        result
    }

    async fn append_send(
        &self,
        list_key: &str,
        count_key: &str,
        codec: &AccountSendCodec,
        data: &AccountSendData,
        send: &UnencryptedSend,
    ) -> Result<()> {
        let existing_count = match self.store.get(count_key).await? {
            Some(value) => Some(read_count(count_key, &value)?),
            None => None,
        };
        let existing_list = match self.store.get(list_key).await? {
            Some(Value::Array(items)) => Some(items),
            Some(_) => {
                return Err(StoreError::Corrupt {
                    key: list_key.to_string(),
                    reason: "expected a list".into(),
                }
                .into())
            }
            None => None,
        };

        // `restart` holds the counter to put back if the new list is not stored
        let (base, mut list, restart) = match (existing_count, existing_list) {
            (Some(base), Some(list)) => (base, list, None),
            (previous, _) => (U256::from(OsRng.gen::<u128>()), Vec::new(), Some(previous)),
        };

        let index = U256::from(list.len());
        let count = base.checked_add(index).ok_or_else(|| StoreError::Corrupt {
            key: count_key.to_string(),
            reason: "encryption count overflow".into(),
        })?;

        let record = AccountSendRecord {
            account_send_ciphertext: codec.encrypt(count, data),
            amount: send.amount,
            token_address: send.token_address,
            tx_hash: send.tx_hash,
            date_sent: Utc::now(),
        };
        list.push(serde_json::to_value(&record).map_err(|e| StoreError::Backend(e.to_string()))?);
        let stored = list.len();

        if restart.is_some() {
            debug!(key = %count_key, "starting a new encryption count");
            self.store.set(count_key, write_count(base)).await?;
        }
        if let Err(err) = self.store.set(list_key, Value::Array(list)).await {
            if let Some(previous) = restart {
                self.restore_count(count_key, previous).await;
            }
            return Err(err.into());
        }

        info!(key = %list_key, entries = stored, "recorded account send");
        Ok(())
    }

    async fn restore_count(&self, count_key: &str, previous: Option<U256>) {
        let restored = match previous {
            Some(count) => self.store.set(count_key, write_count(count)).await,
            None => self.store.remove(count_key).await,
        };
        if let Err(err) = restored {
            warn!(key = %count_key, error = %err, "could not restore encryption count");
        }
    }

    /// Decrypt the history of `address`, most recent first
    pub async fn fetch_account_sends(
        &self,
        address: &Address,
        chain_id: u64,
        viewing_private_key: &str,
    ) -> Result<Vec<AccountSend>> {
        let codec = AccountSendCodec::new(viewing_private_key)?;
        let list_key = records_key(address, chain_id);
        let count_key = count_key(address, chain_id);

        let (count, list) = match (
            self.store.get(&count_key).await?,
            self.store.get(&list_key).await?,
        ) {
            (Some(count), Some(list)) => (read_count(&count_key, &count)?, list),
            _ => return Ok(Vec::new()),
        };

        let records: Vec<AccountSendRecord> = serde_json::from_value(list).map_err(|e| StoreError::Corrupt {
            key: list_key.clone(),
            reason: e.to_string(),
        })?;

        let mut sends = Vec::with_capacity(records.len());
        for (i, record) in records.into_iter().enumerate() {
            let entry_count = count.checked_add(U256::from(i)).ok_or_else(|| StoreError::Corrupt {
                key: count_key.clone(),
                reason: "encryption count overflow".into(),
            })?;
            let data = codec.decrypt(entry_count, &record.account_send_ciphertext);
            sends.push(AccountSend {
                recipient_address: data.address,
                advanced_mode: data.advanced_mode,
                use_public_key_checked: data.use_public_key_checked,
                pub_key: data.pub_key(),
                amount: record.amount,
                token_address: record.token_address,
                tx_hash: record.tx_hash,
                date_sent: record.date_sent,
            });
        }
        sends.reverse();
        Ok(sends)
    }
}

/// Counts fitting in a JSON number are stored as one, larger ones as decimal strings
fn write_count(count: U256) -> Value {
    if count <= U256::from(u64::MAX) {
        Value::from(count.as_u64())
    } else {
        Value::String(count.to_string())
    }
}

fn read_count(key: &str, value: &Value) -> Result<U256, StoreError> {
    let corrupt = || StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("invalid encryption count {value}"),
    };
    match value {
        Value::Number(n) => n.as_u64().map(U256::from).ok_or_else(corrupt),
        Value::String(s) => parse_u256("encryptionCount", s).map_err(|_| corrupt()),
        _ => Err(corrupt()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::UmbraError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    /// Memory store whose writes to one key can be made to fail
    struct FlakyStore {
        inner: MemoryStore,
        key: String,
        failures: AtomicUsize,
    }

    impl FlakyStore {
        fn new(key: String) -> Self {
            Self {
                inner: MemoryStore::new(),
                key,
                failures: AtomicUsize::new(0),
            }
        }

        fn fail_next(&self, writes: usize) {
            self.failures.store(writes, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
            if key == self.key
                && self
                    .failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(StoreError::Backend("disk full".into()));
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key).await
        }

        async fn clear(&self) -> Result<(), StoreError> {
            self.inner.clear().await
        }
    }

    const SENDER: Address = Address([0x11; 20]);

    fn unencrypted(amount: u64) -> UnencryptedSend {
        UnencryptedSend {
            amount: U256::from(amount),
            token_address: Address([0x22; 20]),
            tx_hash: [0x33; 32],
            sender_address: SENDER,
        }
    }

    const VIEWING_KEY: &str = "0x290a15e2b46811c84a0c26624fd7fdc12e38143ae75518fc48375d41035ec5c1";
    const RECIPIENT: &str = "0x2436012a54c81f2F03e6E3D83090f3F5967bF1B5";
    const PUB_KEY: &str = "0x0476698beebe8ee5c74d8cc50ab84ac301ee8f10af6f28d0ffd6adf4d6d3b9b762d46ca56d3dad2ce13213a6f42278dabbb53259f2d92681ea6a0b98197a719be3";

    fn input(advanced_mode: bool, use_public_key_checked: bool) -> AccountDataInput<'static> {
        AccountDataInput {
            recipient_address: RECIPIENT,
            advanced_mode,
            use_public_key_checked,
            pub_key: PUB_KEY,
        }
    }

    #[test]
    fn test_record_layout() {
        let data = build_account_data(&input(true, false)).unwrap();
        assert_eq!(
            encode_0x(&data.to_record()),
            "0x2436012a54c81f2f03e6e3d83090f3f5967bf1b51076698beebe8ee5c74d8cc5"
        );
        assert_eq!(data.pub_key(), "0x9976698beebe8ee5c74d8cc5");
    }

    #[test]
    fn test_decoy_nibbles_read_as_false() {
        let mut bytes = [0u8; 32];
        bytes[20] = 0x72;
        let data = AccountSendData::from_record(&bytes).unwrap();
        assert!(!data.advanced_mode);
        assert!(!data.use_public_key_checked);
    }

    #[test]
    fn test_count_zero_vector() {
        let params = EncryptionParams {
            encryption_count: "0",
            viewing_private_key: VIEWING_KEY,
        };
        assert_eq!(
            encrypt_account_data(&input(true, true), &params).unwrap(),
            "0x9f3873e440b439d4e7561e70b5db28af7abb67257f6353e8d6e057bd2ed16621"
        );
    }

    #[test]
    fn test_validation_order() {
        let params = EncryptionParams {
            encryption_count: "-1",
            viewing_private_key: "0x",
        };
        let bad_input = AccountDataInput {
            recipient_address: "0x",
            ..input(false, false)
        };
        assert_eq!(
            encrypt_account_data(&bad_input, &params).unwrap_err(),
            ValidationError::InvalidCount(CountUse::Encryption)
        );
        let params = EncryptionParams {
            encryption_count: "1",
            ..params
        };
        assert_eq!(
            encrypt_account_data(&bad_input, &params).unwrap_err(),
            ValidationError::InvalidViewingKey
        );
    }

    #[test]
    fn test_count_storage_format() {
        assert_eq!(write_count(U256::from(10012u64)), Value::from(10012u64));
        let big = U256::from(u128::MAX);
        assert_eq!(read_count("k", &write_count(big)).unwrap(), big);
        assert!(read_count("k", &Value::Bool(true)).is_err());
        assert!(read_count("k", &serde_json::json!(-5)).is_err());
    }

    #[tokio::test]
    async fn test_failed_list_write_leaves_no_new_counter() {
        let cache = AccountSendCache::new(FlakyStore::new(records_key(&SENDER, 1)));
        let count_key = count_key(&SENDER, 1);
        cache.store_send(1, VIEWING_KEY, &unencrypted(1), &input(true, false)).await.unwrap();

        // A list left behind without its counter
        cache.store().inner.remove(&count_key).await.unwrap();
        cache.store().fail_next(1);
        let result = cache.store_send(1, VIEWING_KEY, &unencrypted(2), &input(true, false)).await;
        assert!(matches!(result, Err(UmbraError::Store(StoreError::Backend(_)))));
        assert_eq!(cache.store().inner.get(&count_key).await.unwrap(), None);

        // The next send restarts the list instead of appending to the stale one
        cache.store_send(1, VIEWING_KEY, &unencrypted(3), &input(false, true)).await.unwrap();
        let sends = cache.fetch_account_sends(&SENDER, 1, VIEWING_KEY).await.unwrap();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].amount, U256::from(3u64));
        assert_eq!(sends[0].recipient_address, Address::parse("recipient", RECIPIENT).unwrap());
        assert!(sends[0].use_public_key_checked);
    }

    #[tokio::test]
    async fn test_failed_list_write_restores_previous_counter() {
        let cache = AccountSendCache::new(FlakyStore::new(records_key(&SENDER, 1)));
        let count_key = count_key(&SENDER, 1);
        cache.store().inner.set(&count_key, Value::from(7u64)).await.unwrap();

        cache.store().fail_next(1);
        assert!(cache.store_send(1, VIEWING_KEY, &unencrypted(1), &input(true, true)).await.is_err());
        assert_eq!(cache.store().inner.get(&count_key).await.unwrap(), Some(Value::from(7u64)));
        assert!(cache.fetch_account_sends(&SENDER, 1, VIEWING_KEY).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_locks_are_released() {
        let cache = AccountSendCache::new(FlakyStore::new(records_key(&SENDER, 1)));
        let (send_a, send_b) = (unencrypted(1), unencrypted(2));
        let (input_a, input_b) = (input(true, false), input(true, false));
        let (a, b) = tokio::join!(
            cache.store_send(1, VIEWING_KEY, &send_a, &input_a),
            cache.store_send(1, VIEWING_KEY, &send_b, &input_b),
        );
        a.unwrap();
        b.unwrap();
        cache.store().fail_next(1);
        assert!(cache.store_send(1, VIEWING_KEY, &unencrypted(3), &input(true, false)).await.is_err());
        cache.store_send(5, VIEWING_KEY, &unencrypted(4), &input(true, false)).await.unwrap();

        assert!(cache.locks.lock().await.is_empty());
        assert_eq!(cache.fetch_account_sends(&SENDER, 1, VIEWING_KEY).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_empty_history() {
        let cache = AccountSendCache::new(MemoryStore::new());
        let address = Address::parse("address", RECIPIENT).unwrap();
        let sends = cache.fetch_account_sends(&address, 5, VIEWING_KEY).await.unwrap();
        assert!(sends.is_empty());
    }
}
