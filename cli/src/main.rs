//! Umbra CLI - stealth address payments from the command line

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

mod commands;
mod config;
mod file_store;
mod logging;
mod secure_storage;



use commands::*;

#[derive(Parser)]
#[command(name = "umbra")]
#[command(version = "0.1.0")]
#[command(about = "Umbra - private payments to stealth addresses on EVM chains")]
#[command(long_about = r#"
Umbra lets anyone pay you at a fresh one-time address that only you can
link to your account. Publish your spending and viewing public keys,
scan announcements for payments, and withdraw with the stealth key.

Quick Start:
  1. umbra keygen           Create a wallet and derive stealth keys
  2. umbra address          Show the public keys to publish
  3. umbra scan <file>      Find payments in an announcement log
  4. umbra sign-withdraw    Authorize a relayer to withdraw for you
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Chain to operate on
    #[arg(long, global = true, default_value_t = 1)]
    chain_id: u64,

    /// JSON chain config, overrides --chain-id
    #[arg(long, global = true)]
    chain_config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Args)]
struct RecipientOpts {
    /// Recipient account address
    #[arg(long)]
    recipient: String,

    /// Recipient's uncompressed public key (0x04...)
    #[arg(long)]
    pub_key: String,

    /// Recipient was resolved in advanced mode
    #[arg(long)]
    advanced: bool,

    /// Sender opted into sending to a public key
    #[arg(long)]
    use_public_key: bool,
}

impl From<RecipientOpts> for cache::RecipientArgs {
    fn from(opts: RecipientOpts) -> Self {
        Self {
            recipient: opts.recipient,
            pub_key: opts.pub_key,
            advanced: opts.advanced,
            use_public_key: opts.use_public_key,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create an encrypted wallet and derive its stealth keys
    Keygen {
        /// Force overwrite an existing wallet
        #[arg(short, long)]
        force: bool,

        /// Import a wallet private key (prompted, never echoed)
        #[arg(long)]
        import_key: bool,
    },

    /// Show your public stealth keys
    Address,

    /// Export the viewing key (scan-only, no spending capability)
    ExportViewKey,

    /// Compute a stealth address and announcement payload for a recipient
    Prepare {
        /// Recipient's spending public key
        #[arg(long)]
        spending_public_key: String,

        /// Recipient's viewing public key
        #[arg(long)]
        viewing_public_key: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Find payments in an exported announcement log
    Scan {
        /// JSON array of announcements
        file: PathBuf,

        /// First block to scan (default: the chain's start block)
        #[arg(long)]
        start_block: Option<u64>,

        /// Last block to scan, inclusive
        #[arg(long)]
        end_block: Option<u64>,

        /// Fully check every announcement instead of prefiltering by view tag
        #[arg(long)]
        ignore_view_tag: bool,

        /// Scan with an exported viewing private key instead of the wallet
        #[arg(long, requires = "spending_public_key")]
        view_key: Option<String>,

        /// Spending public key that goes with --view-key
        #[arg(long, requires = "view_key")]
        spending_public_key: Option<String>,

        /// Print the stealth private key of each payment
        #[arg(long)]
        reveal_keys: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Sign a withdrawal that a sponsor submits on your behalf
    SignWithdraw {
        /// Destination of the funds
        #[arg(long)]
        acceptor: String,

        /// Token held by the stealth address
        #[arg(long)]
        token: String,

        /// Relayer submitting the withdrawal
        #[arg(long)]
        sponsor: String,

        /// Fee paid to the sponsor, in token base units
        #[arg(long, default_value = "0")]
        sponsor_fee: String,

        /// Contract called after the withdrawal
        #[arg(long)]
        hook: Option<String>,

        /// Call data for the hook (0x...)
        #[arg(long)]
        data: Option<String>,
    },

    /// Manage the encrypted history of sent payments
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },

    /// Show configuration and supported chains
    Info,
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Encrypt one send record under a count
    Encrypt {
        #[command(flatten)]
        recipient: RecipientOpts,

        #[arg(long)]
        count: String,
    },

    /// Decrypt a send record
    Decrypt {
        #[arg(long)]
        ciphertext: String,

        #[arg(long)]
        count: String,
    },

    /// Append a send to the local history
    Record {
        #[command(flatten)]
        recipient: RecipientOpts,

        #[arg(long)]
        amount: String,

        #[arg(long)]
        token: String,

        #[arg(long)]
        tx_hash: String,
    },

    /// List recorded sends, most recent first
    History,
}

impl From<CacheCommand> for cache::CacheAction {
    fn from(command: CacheCommand) -> Self {
        match command {
            CacheCommand::Encrypt { recipient, count } => Self::Encrypt {
                recipient: recipient.into(),
                count,
            },
            CacheCommand::Decrypt { ciphertext, count } => Self::Decrypt { ciphertext, count },
            CacheCommand::Record {
                recipient,
                amount,
                token,
                tx_hash,
            } => Self::Record {
                recipient: recipient.into(),
                amount,
                token,
                tx_hash,
            },
            CacheCommand::History => Self::History,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;

    let chain = config::load_chain_config(cli.chain_id, cli.chain_config.as_deref())?;
    tracing::debug!(chain_id = chain.chain_id, "using chain config");

    match cli.command {
        Commands::Keygen { force, import_key } => {
            keygen::run(keygen::KeygenOptions { force, import_key })?;
        }
        Commands::Address => {
            address::run()?;
        }
        Commands::ExportViewKey => {
            export_view_key::run()?;
        }
        Commands::Prepare {
            spending_public_key,
            viewing_public_key,
            json,
        } => {
            prepare::run(&spending_public_key, &viewing_public_key, json)?;
        }
        Commands::Scan {
            file,
            start_block,
            end_block,
            ignore_view_tag,
            view_key,
            spending_public_key,
            reveal_keys,
            json,
        } => {
            let options = scan::ScanOptions {
                file,
                start_block,
                end_block,
                ignore_view_tag,
                reveal_keys,
                json,
            };
            let view_key = spending_public_key.zip(view_key);
            scan::run(&chain, options, view_key).await?;
        }
        Commands::SignWithdraw {
            acceptor,
            token,
            sponsor,
            sponsor_fee,
            hook,
            data,
        } => {
            let args = sign_withdraw::WithdrawArgs {
                acceptor,
                token,
                sponsor,
                sponsor_fee,
                hook,
                data,
            };
            sign_withdraw::run(&chain, args)?;
        }
        Commands::Cache { action } => {
            cache::run(chain.chain_id, action.into()).await?;
        }
        Commands::Info => {
            info::run(&chain)?;
        }
    }

    Ok(())
}
