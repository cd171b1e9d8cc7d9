//! Sign a relayed withdrawal authorization

use anyhow::Result;
use colored::Colorize;
use serde_json::Value;
use umbra_core::{sign_withdraw, ChainConfig, KeyPair, Signature, WithdrawParams, WithdrawRequest};
use zeroize::Zeroize;

use crate::secure_storage::prompt_password;

/// Command line inputs; the deployment comes from the chain config
pub struct WithdrawArgs {
    pub acceptor: String,
    pub token: String,
    pub sponsor: String,
    pub sponsor_fee: String,
    pub hook: Option<String>,
    pub data: Option<String>,
}

pub fn build_request(config: &ChainConfig, args: &WithdrawArgs) -> Result<WithdrawRequest> {
    let params = WithdrawParams {
        chain_id: Value::from(config.chain_id),
        umbra_address: config.umbra_address.to_checksum(),
        acceptor: args.acceptor.clone(),
        token: args.token.clone(),
        sponsor: args.sponsor.clone(),
        sponsor_fee: args.sponsor_fee.clone(),
        hook: args.hook.clone(),
        data: args.data.clone(),
    };
    Ok(params.validate()?)
}

pub fn sign(stealth_private_key: &str, request: &WithdrawRequest) -> Result<Signature> {
    let key_pair = KeyPair::from_private_key_hex("stealthPrivateKey", stealth_private_key)?;
    Ok(sign_withdraw(&key_pair, request)?)
}

pub fn run(config: &ChainConfig, args: WithdrawArgs) -> Result<()> {
    let request = build_request(config, &args)?;

    let mut stealth_key = prompt_password("Stealth private key (from 'umbra scan --reveal-keys'): ")?;
    let signed = sign(stealth_key.trim(), &request);
    stealth_key.zeroize();
    let signature = signed?;

    println!();
    println!("{}", "Withdrawal Authorized".green().bold());
    println!();
    println!("  Chain:      {}", request.chain_id);
    println!("  Contract:   {}", request.umbra_address);
    println!("  Acceptor:   {}", request.acceptor);
    println!("  Token:      {}", request.token);
    println!("  Sponsor:    {}", request.sponsor);
    println!("  Fee:        {}", request.sponsor_fee);
    println!("  Digest:     0x{}", hex::encode(request.digest()));
    println!("  Signature:  {}", signature.to_hex());
    println!();
    println!(
        "{}",
        "Hand the signature to the sponsor; it can only move funds to the acceptor.".dimmed()
    );

    Ok(())
}
