//! Show configuration, supported chains and key info

use anyhow::Result;
use colored::Colorize;
use umbra_core::ChainConfig;

use crate::config::{cache_file, load_profile, profile_file, umbra_dir};
use crate::secure_storage::SecureKeyStorage;

fn print_chain(name: &str, config: &ChainConfig) {
    println!("  {} (chain {})", name.cyan(), config.chain_id);
    println!("    Umbra:       {}", config.umbra_address);
    println!("    Batch send:  {}", config.batch_send_address);
    println!("    Start block: {}", config.start_block);
    match config.subgraph_url {
        Some(ref url) => println!("    Subgraph:    {}", url),
        None => println!("    Subgraph:    {}", "none".dimmed()),
    }
}

pub fn run(active: &ChainConfig) -> Result<()> {
    println!();
    println!("{}", "Umbra Configuration".yellow().bold());
    println!();

    println!("{}:", "Active Chain".cyan());
    print_chain(active.network_name().unwrap_or("custom"), active);
    println!();

    println!("{}:", "Account".cyan());
    let storage = SecureKeyStorage::open_default()?;
    if let Ok(address) = storage.address() {
        println!("  Wallet:  {} (encrypted)", address);
    }
    match load_profile() {
        Ok(profile) => {
            println!("  {}", "CONFIGURED".green());
            println!("  Address: {}", profile.address);
            println!("  Created: {}", profile.created_at);
        }
        Err(_) => {
            println!("  {}", "NOT CONFIGURED".red());
            println!("  Run 'umbra keygen' to create a wallet");
        }
    }
    println!();

    println!("{}:", "Supported Chains".cyan());
    for (name, config) in ChainConfig::known() {
        print_chain(name, &config);
    }
    println!();

    println!("{}:", "File Locations".cyan());
    println!("  Directory: {}", umbra_dir()?.display());
    println!("  Profile:   {}", profile_file()?.display());
    println!("  Wallet:    {}", storage.path().display());
    println!("  History:   {}", cache_file()?.display());

    Ok(())
}
