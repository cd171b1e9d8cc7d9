//! Display the public stealth keys

use anyhow::Result;
use colored::Colorize;

use crate::config::load_profile;

pub fn run() -> Result<()> {
    let profile = load_profile()?;
    // Fails loudly on a hand-edited profile
    profile.stealth_keys()?;

    println!();
    println!("{}", "Your Umbra Account".yellow().bold());
    println!();
    println!("  Address:             {}", profile.address);
    println!("  Spending public key: {}", profile.spending_public_key);
    println!("  Viewing public key:  {}", profile.viewing_public_key);
    println!();
    println!(
        "{}",
        "Publish both public keys to receive payments at one-time stealth addresses.".dimmed()
    );

    Ok(())
}
