//! Export view key (scan-only capability)

use anyhow::Result;
use colored::Colorize;
use umbra_core::generate_private_keys;

use crate::secure_storage::{unlock_wallet, KeyData, SecureKeyStorage};

/// Scan-only credentials
pub struct ViewKeyExport {
    pub viewing_private_key: String,
    pub spending_public_key: String,
}

pub fn view_key(key_data: &KeyData) -> Result<ViewKeyExport> {
    let keys = generate_private_keys(&key_data.wallet()?)?;
    let viewing_private_key = keys
        .viewing_key_pair
        .private_key_hex()
        .ok_or_else(|| anyhow::anyhow!("Derived viewing key has no private half"))?;

    Ok(ViewKeyExport {
        viewing_private_key,
        spending_public_key: keys.spending_key_pair.public_key_hex(),
    })
}

pub fn run() -> Result<()> {
    let storage = SecureKeyStorage::open_default()?;
    let key_data = unlock_wallet(&storage)?;
    let export = view_key(&key_data)?;

    println!();
    println!("{}", "View Key Export".yellow().bold());
    println!();
    println!(
        "{}",
        "The view key allows scanning for payments WITHOUT spending capability.".dimmed()
    );
    println!();
    println!("{}:", "Viewing Private Key".yellow());
    println!("  {}", export.viewing_private_key);
    println!("{}:", "Spending Public Key".yellow());
    println!("  {}", export.spending_public_key);
    println!();
    println!(
        "{}",
        "Use both with 'umbra scan --view-key <key> --spending-public-key <key>'.".dimmed()
    );
    println!(
        "{}",
        "WARNING: Anyone with this key can see all your incoming payments!".red()
    );
    println!("{}", "         They CANNOT spend your funds.".green());

    Ok(())
}
