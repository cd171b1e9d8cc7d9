//! Wallet creation and stealth key derivation

use std::path::Path;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use umbra_core::{generate_private_keys, KeyPair};

use crate::config::{profile_file, save_profile_to, Profile};
use crate::secure_storage::{prompt_new_password, prompt_password, KeyData, SecureKeyStorage};

/// Options for key generation
pub struct KeygenOptions {
    /// Overwrite an existing wallet
    pub force: bool,
    /// Import an existing wallet private key instead of generating one
    pub import_key: bool,
}

/// Encrypt `wallet` into `storage` and write the matching public profile
///
/// Stealth keys come from the wallet's signature over the fixed derivation
/// message, so the same wallet always yields the same profile.
pub fn create_account(
    storage: &SecureKeyStorage,
    profile_path: &Path,
    wallet: &KeyPair,
    password: &str,
) -> Result<Profile> {
    let key_data = KeyData::from_key_pair(wallet)?;
    let keys = generate_private_keys(&key_data.wallet()?).context("Failed to derive stealth keys")?;

    storage.save(&key_data, password)?;
    let profile = Profile::new(wallet.address(), &keys);
    save_profile_to(profile_path, &profile)?;
    Ok(profile)
}

pub fn run(options: KeygenOptions) -> Result<()> {
    let storage = SecureKeyStorage::open_default()?;

    if storage.exists() && !options.force {
        bail!(
            "A wallet already exists. Use --force to overwrite.\n\
             Warning: funds held by the old wallet's stealth addresses need its key to withdraw!"
        );
    }

    println!("{}", "=== Umbra Key Generation ===".cyan().bold());
    println!();

    let wallet = if options.import_key {
        let mut hex = prompt_password("Wallet private key (0x...): ")?;
        let imported = KeyPair::from_private_key_hex("privateKey", hex.trim());
        zeroize::Zeroize::zeroize(&mut hex);
        imported?
    } else {
        println!("{}", "Generating a new wallet key...".cyan());
        KeyPair::random()
    };

    println!();
    println!("{}", "Choose a strong password to encrypt your wallet.".cyan());
    println!("{}", "Requirements: 8+ chars, uppercase, lowercase, and numbers".dimmed());
    println!();

    let password = prompt_new_password("Enter password: ")?;
    let profile = create_account(&storage, &profile_file()?, &wallet, &password)?;

    println!();
    println!("{}", "Wallet encrypted and stealth keys derived!".green().bold());
    println!();
    println!("{}:", "Wallet Address".yellow());
    println!("  {}", profile.address);
    println!();
    println!("{}:", "Spending Public Key".yellow());
    println!("  {}", profile.spending_public_key);
    println!();
    println!("{}:", "Viewing Public Key".yellow());
    println!("  {}", profile.viewing_public_key);
    println!();
    println!(
        "{}",
        format!("Encrypted wallet saved to: {}", storage.path().display()).dimmed()
    );

    if !options.import_key {
        println!();
        println!("{}", "IMPORTANT: This key exists only in the encrypted file.".red().bold());
        println!("{}", "If you lose your password, your funds are PERMANENTLY LOST.".red());
    }

    Ok(())
}
