//! Umbra core - stealth address payments on secp256k1
//!
//! A sender derives a one-time address for a receiver from the receiver's
//! published spending and viewing keys, pays it, and announces an encrypted
//! payload. The receiver scans announcements with the viewing key, recognises
//! its own payments, and rebuilds the one-time private key with the spending
//! key. Nobody else can link the address to the receiver.
//!
//! ```text
//! P      = r * V                         shared point
//! s      = H("umbra/stealth-scalar/v1" || P)
//! stealth = S + s * G                     one-time public key
//! c      = r XOR H(H("umbra/stealth-payload/v1" || P) || 0)
//! ```

pub mod account_send;
pub mod chain;
pub mod codec;
pub mod config;
pub mod derivation;
pub mod error;
pub mod keys;
pub mod scan;
pub mod signer;
pub mod stealth;
pub mod store;
pub mod types;
pub mod umbra;
pub mod withdraw;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;


#[cfg(test)]
mod test_vectors;



pub use account_send::{
    decrypt_account_data, encrypt_account_data, AccountDataInput, AccountSend, AccountSendCache,
    AccountSendData, EncryptionParams, UnencryptedSend,
};
pub use chain::{AnnouncementQuery, AnnouncementSource, ChainClient, TxOverrides};
pub use config::ChainConfig;
pub use derivation::{generate_private_keys, GeneratedKeys, KEY_DERIVATION_MESSAGE};
pub use error::{ChainError, CryptoError, Result, SignerError, StoreError, UmbraError, ValidationError};
pub use keys::{KeyPair, RandomScalar};
pub use primitive_types::U256;
pub use scan::{Announcement, Scanner, UserAnnouncement, ViewTagPolicy};
pub use signer::{LocalWallet, MessageSigner, Signature, Wallet};
pub use stealth::{StealthKeys, StealthPayload, StealthScalar, StealthSend};
pub use store::{KeyValueStore, MemoryStore};
pub use types::{Address, Token, ETH_ADDRESS};
pub use umbra::{
    BatchSendReceipt, LookupOptions, Recipient, ScanOverrides, SendOptions, SendReceipt, SendRequest, Umbra,
};
pub use withdraw::{sign_withdraw, WithdrawParams, WithdrawRequest};
