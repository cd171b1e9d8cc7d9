//! Encrypted wallet key storage
//!
//! Uses AES-256-GCM for encryption and Argon2id for key derivation.
//! The wallet private key is never stored in plaintext. Stealth keys are
//! not stored at all: they are re-derived from the wallet on demand.

use std::fs;
use std::path::PathBuf;

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{bail, Context, Result};
use argon2::{
    password_hash::{rand_core::RngCore, SaltString},
    Argon2, PasswordHasher, PasswordVerifier,
};
use serde::{Deserialize, Serialize};
use umbra_core::{KeyPair, LocalWallet};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::{wallet_file, write_private};

/// Argon2 parameters for key derivation
const ARGON2_M_COST: u32 = 65536; // 64 MB memory
const ARGON2_T_COST: u32 = 3;
const ARGON2_P_COST: u32 = 4;

const FILE_VERSION: u8 = 1;

/// Encrypted key file format
#[derive(Serialize, Deserialize)]
pub struct EncryptedKeyFile {
    pub version: u8,
    /// Checksummed wallet address, readable without the password
    pub address: String,
    /// Salt for Argon2
    pub salt: String,
    /// Nonce for AES-GCM (base64)
    pub nonce: String,
    /// Encrypted data (base64)
    pub ciphertext: String,
    /// Argon2 hash used to reject a wrong password early
    pub password_hash: Option<String>,
    pub created_at: String,
}

/// Unencrypted key data (internal use only)
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyData {
    pub private_key: [u8; 32],
}

impl KeyData {
    pub fn from_key_pair(key_pair: &KeyPair) -> Result<Self> {
        let hex = key_pair
            .private_key_hex()
            .context("Wallet key pair has no private key")?;
        let mut private_key = [0u8; 32];
        let decoded = hex::decode_to_slice(&hex[2..], &mut private_key);
        let mut hex = hex;
        hex.zeroize();
        decoded.context("Malformed private key")?;
        Ok(Self { private_key })
    }

    pub fn key_pair(&self) -> Result<KeyPair> {
        KeyPair::from_private_key_bytes(&self.private_key).context("Stored private key is invalid")
    }

    pub fn wallet(&self) -> Result<LocalWallet> {
        Ok(LocalWallet::new(&self.key_pair()?)?)
    }
}

fn argon2() -> Result<Argon2<'static>> {
    let params = argon2::Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(32))
        .map_err(|e| anyhow::anyhow!("Argon2 params error: {}", e))?;
    Ok(Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params))
}

fn derive_cipher(argon2: &Argon2<'_>, password: &str, salt: &str) -> Result<Aes256Gcm> {
    let mut key_bytes = [0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut key_bytes)
        .map_err(|e| anyhow::anyhow!("Key derivation failed: {}", e))?;
    let cipher = Aes256Gcm::new_from_slice(&key_bytes)
        .map_err(|e| anyhow::anyhow!("Cipher creation failed: {}", e));
    key_bytes.zeroize();
    cipher
}

impl EncryptedKeyFile {
    /// Encrypt key data with a password
    pub fn encrypt(data: &KeyData, password: &str) -> Result<Self> {
        let address = data.key_pair()?.address();
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = argon2()?;
        let cipher = derive_cipher(&argon2, password, salt.as_str())?;

        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);

        let mut plaintext = serde_json::to_vec(data)?;
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|e| anyhow::anyhow!("Encryption failed: {}", e));
        plaintext.zeroize();
        let ciphertext = ciphertext?;

        let password_hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .ok()
            .map(|h| h.to_string());

        Ok(Self {
            version: FILE_VERSION,
            address: address.to_checksum(),
            salt: salt.as_str().to_string(),
            nonce: b64::encode(&nonce_bytes),
            ciphertext: b64::encode(&ciphertext),
            password_hash,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Decrypt key data with a password
    pub fn decrypt(&self, password: &str) -> Result<KeyData> {
        if self.version != FILE_VERSION {
            bail!("Unsupported key file version {}", self.version);
        }

        let argon2 = argon2()?;
        if let Some(ref hash) = self.password_hash {
            let parsed_hash = argon2::PasswordHash::new(hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash: {}", e))?;
            argon2
                .verify_password(password.as_bytes(), &parsed_hash)
                .map_err(|_| anyhow::anyhow!("Invalid password"))?;
        }

        let cipher = derive_cipher(&argon2, password, &self.salt)?;

        let nonce_bytes = b64::decode(&self.nonce).context("Invalid nonce encoding")?;
        let ciphertext = b64::decode(&self.ciphertext).context("Invalid ciphertext encoding")?;
        let nonce_array: [u8; 12] = nonce_bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("Invalid nonce length"))?;
        let nonce = Nonce::from(nonce_array);

        let mut plaintext = cipher
            .decrypt(&nonce, ciphertext.as_ref())
            .map_err(|_| anyhow::anyhow!("Decryption failed - wrong password or corrupted data"))?;
        let data = serde_json::from_slice(&plaintext).context("Failed to parse decrypted key data");
        plaintext.zeroize();
        data
    }
}

/// Encrypted wallet file manager
pub struct SecureKeyStorage {
    path: PathBuf,
}

impl SecureKeyStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Storage at `~/.umbra/wallet.enc`
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(wallet_file()?))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn save(&self, data: &KeyData, password: &str) -> Result<()> {
        let encrypted = EncryptedKeyFile::encrypt(data, password)?;
        write_private(&self.path, &serde_json::to_string_pretty(&encrypted)?)
    }

    fn read(&self) -> Result<EncryptedKeyFile> {
        if !self.exists() {
            bail!("No wallet found. Run 'umbra keygen' first.");
        }
        let json = fs::read_to_string(&self.path).context("Failed to read encrypted key file")?;
        serde_json::from_str(&json).context("Failed to parse encrypted key file")
    }

    /// Wallet address without decrypting
    pub fn address(&self) -> Result<String> {
        Ok(self.read()?.address)
    }

    pub fn load(&self, password: &str) -> Result<KeyData> {
        self.read()?.decrypt(password)
    }
}

/// Password strength validation
pub fn validate_password_strength(password: &str) -> Result<()> {
    if password.len() < 8 {
        bail!("Password must be at least 8 characters");
    }

    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_numeric());

    if !has_upper || !has_lower || !has_digit {
        bail!("Password must contain uppercase, lowercase, and numeric characters");
    }

    Ok(())
}

/// Prompt for password securely (hides input)
pub fn prompt_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(prompt).context("Failed to read password")
}

/// Prompt for password with confirmation
pub fn prompt_new_password(prompt: &str) -> Result<String> {
    let password = prompt_password(prompt)?;
    let confirm = prompt_password("Confirm password: ")?;

    if password != confirm {
        bail!("Passwords do not match");
    }

    validate_password_strength(&password)?;

    Ok(password)
}

/// Prompt for the password and decrypt the stored wallet
pub fn unlock_wallet(storage: &SecureKeyStorage) -> Result<KeyData> {
    let password = prompt_password("Enter password to unlock wallet: ")?;
    storage
        .load(&password)
        .context("Failed to decrypt wallet. Wrong password?")
}

// Base64 encoding/decoding helpers
mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};

    pub fn encode(data: &[u8]) -> String {
        STANDARD.encode(data)
    }

    pub fn decode(s: &str) -> anyhow::Result<Vec<u8>> {
        STANDARD.decode(s).map_err(|e| anyhow::anyhow!("Base64 decode error: {}", e))
    }
}
