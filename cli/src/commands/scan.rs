//! Scan an exported announcement log for incoming payments

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use serde::Serialize;
use umbra_core::stealth::compute_stealth_private_key;
use umbra_core::{
    generate_private_keys, Address, Announcement, AnnouncementQuery, AnnouncementSource, ChainConfig, ChainError,
    GeneratedKeys, Scanner, UserAnnouncement, ViewTagPolicy, ETH_ADDRESS, U256,
};

use crate::secure_storage::{unlock_wallet, SecureKeyStorage};

/// Announcements exported to a JSON array, oldest first
pub struct FileAnnouncements {
    announcements: Vec<Announcement>,
}

impl FileAnnouncements {
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read announcements from {}", path.display()))?;
        let announcements = serde_json::from_str(&json).context("Announcement file is not a valid JSON array")?;
        Ok(Self { announcements })
    }
}

impl From<Vec<Announcement>> for FileAnnouncements {
    fn from(announcements: Vec<Announcement>) -> Self {
        Self { announcements }
    }
}

#[async_trait]
impl AnnouncementSource for FileAnnouncements {
    async fn announcements(&self, query: &AnnouncementQuery) -> Result<Vec<Announcement>, ChainError> {
        Ok(self
            .announcements
            .iter()
            .filter(|a| a.block_number >= query.from_block)
            .filter(|a| query.to_block.map_or(true, |to| a.block_number <= to))
            .cloned()
            .collect())
    }
}

/// Where the scanning keys come from
pub enum ScanKeys {
    /// Exported view key: finds payments but cannot spend them
    ViewOnly {
        spending_public_key: String,
        viewing_private_key: String,
    },
    /// Keys derived from the unlocked wallet
    Wallet(GeneratedKeys),
}

pub struct ScanOptions {
    pub file: PathBuf,
    pub start_block: Option<u64>,
    pub end_block: Option<u64>,
    pub ignore_view_tag: bool,
    pub reveal_keys: bool,
    pub json: bool,
}

/// One payment found for the user
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub stealth_address: Address,
    pub amount: String,
    pub token: Address,
    pub from: Address,
    pub block_number: u64,
    pub tx_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stealth_private_key: Option<String>,
}

pub async fn find_payments<S: AnnouncementSource>(
    source: &S,
    config: &ChainConfig,
    keys: &ScanKeys,
    options: &ScanOptions,
) -> Result<Vec<Payment>> {
    let scanner = match keys {
        ScanKeys::ViewOnly {
            spending_public_key,
            viewing_private_key,
        } => Scanner::from_hex(spending_public_key, viewing_private_key)?,
        ScanKeys::Wallet(keys) => Scanner::new(*keys.spending_key_pair.public_key(), &keys.viewing_key_pair)?,
    };
    let policy = if options.ignore_view_tag {
        ViewTagPolicy::Ignore
    } else {
        ViewTagPolicy::Prefilter
    };
    let scanner = scanner.with_view_tag_policy(policy);

    let query = AnnouncementQuery {
        contract: config.umbra_address,
        from_block: options.start_block.unwrap_or(config.start_block),
        to_block: options.end_block,
    };
    let announcements = source.announcements(&query).await?;
    tracing::debug!(count = announcements.len(), from = query.from_block, "loaded announcements");

    scanner
        .scan_all(&announcements)
        .into_iter()
        .map(|found| to_payment(found, keys, options.reveal_keys))
        .collect()
}

fn to_payment(found: UserAnnouncement, keys: &ScanKeys, reveal_keys: bool) -> Result<Payment> {
    let stealth_private_key = match (keys, reveal_keys) {
        (ScanKeys::Wallet(keys), true) => {
            compute_stealth_private_key(&keys.spending_key_pair, &found.stealth_scalar)?.private_key_hex()
        }
        _ => None,
    };
    let announcement = found.announcement;

    Ok(Payment {
        stealth_address: found.stealth_address,
        amount: announcement.amount.to_string(),
        token: announcement.token,
        from: announcement.from,
        block_number: announcement.block_number,
        tx_hash: format!("0x{}", hex::encode(announcement.tx_hash)),
        stealth_private_key,
    })
}

pub async fn run(config: &ChainConfig, options: ScanOptions, view_key: Option<(String, String)>) -> Result<()> {
    let keys = match view_key {
        Some((spending_public_key, viewing_private_key)) => ScanKeys::ViewOnly {
            spending_public_key,
            viewing_private_key,
        },
        None => {
            let storage = SecureKeyStorage::open_default()?;
            let key_data = unlock_wallet(&storage)?;
            ScanKeys::Wallet(generate_private_keys(&key_data.wallet()?)?)
        }
    };
    if options.reveal_keys && matches!(keys, ScanKeys::ViewOnly { .. }) {
        anyhow::bail!("--reveal-keys needs the wallet; a view key cannot spend");
    }

    if !options.json {
        println!("{}", "Scanning for incoming stealth payments...".cyan());
    }

    let source = FileAnnouncements::load(&options.file)?;
    let payments = find_payments(&source, config, &keys, &options).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&payments)?);
        return Ok(());
    }

    println!();
    if payments.is_empty() {
        println!("{}", "No incoming payments found.".yellow());
        if options.start_block.is_none() {
            println!(
                "{}",
                format!("Scanned from block {}. Try --start-block to widen the range.", config.start_block).dimmed()
            );
        }
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} payment(s):", payments.len()).green().bold()
    );
    println!();

    for (i, payment) in payments.iter().enumerate() {
        println!("{}. {}", i + 1, "Payment".yellow());
        println!("   Address: {}", payment.stealth_address);
        println!("   Amount:  {}", payment.amount);
        if payment.token == ETH_ADDRESS {
            println!("   Token:   ETH");
        } else {
            println!("   Token:   {}", payment.token);
        }
        println!("   From:    {}", payment.from);
        println!("   Block:   {}", payment.block_number);
        println!("   Tx:      {}", payment.tx_hash);
        if let Some(ref key) = payment.stealth_private_key {
            println!("   Key:     {}", key.red());
        }
        println!();
    }

    let eth_total = payments
        .iter()
        .filter(|p| p.token == ETH_ADDRESS)
        .filter_map(|p| U256::from_dec_str(&p.amount).ok())
        .fold(U256::zero(), |acc, amount| acc.saturating_add(amount));
    println!("{}", format!("Total ETH received: {} wei", eth_total).green().bold());

    Ok(())
}
