//! Encrypted history of payments sent from this account

use anyhow::{Context, Result};
use colored::Colorize;
use umbra_core::types::{decode_fixed_hex, parse_u256};
use zeroize::Zeroizing;
use umbra_core::{
    decrypt_account_data, encrypt_account_data, generate_private_keys, AccountDataInput, AccountSend,
    AccountSendCache, AccountSendData, Address, EncryptionParams, KeyValueStore, UnencryptedSend,
};

use crate::config::cache_file;
use crate::file_store::FileStore;
use crate::secure_storage::{unlock_wallet, KeyData, SecureKeyStorage};

/// Recipient details kept for one send
pub struct RecipientArgs {
    pub recipient: String,
    pub pub_key: String,
    pub advanced: bool,
    pub use_public_key: bool,
}

impl RecipientArgs {
    fn input(&self) -> AccountDataInput<'_> {
        AccountDataInput {
            recipient_address: &self.recipient,
            advanced_mode: self.advanced,
            use_public_key_checked: self.use_public_key,
            pub_key: &self.pub_key,
        }
    }
}

pub enum CacheAction {
    Encrypt { recipient: RecipientArgs, count: String },
    Decrypt { ciphertext: String, count: String },
    Record {
        recipient: RecipientArgs,
        amount: String,
        token: String,
        tx_hash: String,
    },
    History,
}

/// The local wallet, with the viewing key that encrypts its history
pub struct Account {
    pub address: Address,
    pub viewing_private_key: Zeroizing<String>,
}

impl Account {
    pub fn from_key_data(key_data: &KeyData) -> Result<Self> {
        let keys = generate_private_keys(&key_data.wallet()?)?;
        let viewing_private_key = keys
            .viewing_key_pair
            .private_key_hex()
            .map(Zeroizing::new)
            .context("Derived viewing key has no private half")?;

        Ok(Self {
            address: key_data.key_pair()?.address(),
            viewing_private_key,
        })
    }
}

fn unlock_account() -> Result<Account> {
    let storage = SecureKeyStorage::open_default()?;
    Account::from_key_data(&unlock_wallet(&storage)?)
}

pub fn encrypt(viewing_private_key: &str, recipient: &RecipientArgs, count: &str) -> Result<String> {
    let params = EncryptionParams {
        encryption_count: count,
        viewing_private_key,
    };
    Ok(encrypt_account_data(&recipient.input(), &params)?)
}

pub fn decrypt(viewing_private_key: &str, ciphertext: &str, count: &str) -> Result<AccountSendData> {
    let params = EncryptionParams {
        encryption_count: count,
        viewing_private_key,
    };
    Ok(decrypt_account_data(ciphertext, &params)?)
}

#[allow(clippy::too_many_arguments)]
pub async fn record<S: KeyValueStore>(
    cache: &AccountSendCache<S>,
    chain_id: u64,
    sender: Address,
    viewing_private_key: &str,
    recipient: &RecipientArgs,
    amount: &str,
    token: &str,
    tx_hash: &str,
) -> Result<()> {
    let send = UnencryptedSend {
        amount: parse_u256("amount", amount)?,
        token_address: Address::parse("token", token)?,
        tx_hash: decode_fixed_hex::<32>("txHash", tx_hash)?,
        sender_address: sender,
    };
    cache
        .store_send(chain_id, viewing_private_key, &send, &recipient.input())
        .await?;
    Ok(())
}

fn print_send(index: usize, send: &AccountSend) {
    println!("{}. {}", index + 1, send.recipient_address.to_string().yellow());
    println!("   Amount:     {}", send.amount);
    println!("   Token:      {}", send.token_address);
    println!("   Public key: {}", send.pub_key);
    println!("   Advanced:   {}", send.advanced_mode);
    println!("   Tx:         0x{}", hex::encode(send.tx_hash));
    println!("   Sent:       {}", send.date_sent.to_rfc3339());
    println!();
}

pub async fn run(chain_id: u64, action: CacheAction) -> Result<()> {
    let account = unlock_account()?;

    match action {
        CacheAction::Encrypt { recipient, count } => {
            println!("{}", encrypt(&account.viewing_private_key, &recipient, &count)?);
        }
        CacheAction::Decrypt { ciphertext, count } => {
            let data = decrypt(&account.viewing_private_key, &ciphertext, &count)?;
            println!("  Recipient:  {}", data.address);
            println!("  Advanced:   {}", data.advanced_mode);
            println!("  Public key: {}", data.pub_key());
            println!("  Checked:    {}", data.use_public_key_checked);
        }
        CacheAction::Record {
            recipient,
            amount,
            token,
            tx_hash,
        } => {
            let cache = AccountSendCache::new(FileStore::new(cache_file()?));
            record(
                &cache,
                chain_id,
                account.address,
                &account.viewing_private_key,
                &recipient,
                &amount,
                &token,
                &tx_hash,
            )
            .await?;
            println!("{}", "Send recorded.".green());
        }
        CacheAction::History => {
            let cache = AccountSendCache::new(FileStore::new(cache_file()?));
            let sends = cache
                .fetch_account_sends(&account.address, chain_id, &account.viewing_private_key)
                .await?;

            if sends.is_empty() {
                println!("{}", "No sends recorded on this chain.".yellow());
                return Ok(());
            }
            println!("{}", format!("{} send(s), most recent first:", sends.len()).green().bold());
            println!();
            for (i, send) in sends.iter().enumerate() {
                print_send(i, send);
            }
        }
    }

    Ok(())
}
