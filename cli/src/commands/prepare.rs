//! Offline stealth address preparation for a recipient's published keys

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use umbra_core::stealth::prepare_send;
use umbra_core::{Address, StealthKeys, StealthPayload};

/// What a sender needs to pay and announce
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PreparedPayment {
    pub stealth_address: Address,
    pub stealth_public_key: String,
    pub payload: StealthPayload,
}

pub fn prepare(spending_public_key: &str, viewing_public_key: &str) -> Result<PreparedPayment> {
    let keys = StealthKeys::from_hex(spending_public_key, viewing_public_key)?;
    let send = prepare_send(&keys)?;

    Ok(PreparedPayment {
        stealth_address: send.stealth_address(),
        stealth_public_key: send.stealth_key_pair.public_key_hex(),
        payload: send.payload,
    })
}

pub fn run(spending_public_key: &str, viewing_public_key: &str, json: bool) -> Result<()> {
    let prepared = prepare(spending_public_key, viewing_public_key)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&prepared)?);
        return Ok(());
    }

    println!();
    println!("{}", "Stealth Payment Prepared".yellow().bold());
    println!();
    println!("  Stealth address: {}", prepared.stealth_address);
    println!("  Ephemeral key:   0x{}", hex::encode(prepared.payload.ephemeral_public_key));
    println!("  Ciphertext:      0x{}", hex::encode(prepared.payload.ciphertext));
    println!("  View tag:        {}", prepared.payload.view_tag);
    println!();
    println!(
        "{}",
        "Pay the stealth address and announce the payload in the same transaction.".dimmed()
    );

    Ok(())
}
