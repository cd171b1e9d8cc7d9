//! Protocol client tying the stealth protocol to a chain
//!
//! [`Umbra`] resolves recipients, prepares stealth payments, submits sends and
//! withdrawals through a [`ChainClient`] and scans announcements from an
//! [`AnnouncementSource`].

use std::collections::BTreeMap;

use k256::PublicKey;
use primitive_types::U256;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::chain::{
    AnnouncementQuery, AnnouncementSource, BatchItem, BatchSend, ChainClient, EthSend, TokenSend,
    TxOverrides, WithdrawOnBehalf,
};
use crate::config::ChainConfig;
use crate::derivation::{self, GeneratedKeys};
use crate::error::{Result, UmbraError, ValidationError};
use crate::keys::KeyPair;
use crate::scan::{Scanner, UserAnnouncement, ViewTagPolicy};
use crate::signer::{LocalWallet, MessageSigner, Signature, Wallet};
use crate::stealth::{self, StealthKeys, StealthScalar, StealthSend};
use crate::types::{decode_fixed_hex, Address, Token, TxHash};
use crate::withdraw::{self, WithdrawRequest};

/// Who a payment is for
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipient {
    /// Looked up in the stealth key registry, or by public key in advanced mode
    Address(Address),
    /// A bare public key, used as both spending and viewing key
    PublicKey(PublicKey),
    /// Stealth keys already known to the caller
    Keys(StealthKeys),
    /// A transaction whose signer's public key is used as both keys
    TxHash(TxHash),
}

impl Recipient {
    /// An address, a transaction hash, or a `0x04` uncompressed public key
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.len() {
            42 => return Ok(Recipient::Address(Address::parse("recipient", value)?)),
            66 => return Ok(Recipient::TxHash(decode_fixed_hex::<32>("recipient", value)?)),
            _ => {}
        }
        let key_pair = KeyPair::from_public_key_hex("recipient", value)?;
        Ok(Recipient::PublicKey(*key_pair.public_key()))
    }
}

impl From<Address> for Recipient {
    fn from(address: Address) -> Self {
        Recipient::Address(address)
    }
}

/// How a recipient address is resolved to keys
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LookupOptions {
    /// Use the account's own transaction public key instead of the registry
    pub advanced: bool,
    /// Allow sending to a bare public key
    pub support_pub_key: bool,
    /// Allow resolving a recipient from one of its transaction hashes
    pub support_tx_hash: bool,
}

/// Options accepted by [`Umbra::send`] and [`Umbra::batch_send`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub lookup: LookupOptions,
    pub tx: TxOverrides,
}

/// Options accepted by [`Umbra::scan`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanOverrides {
    /// Defaults to the chain config's start block
    pub start_block: Option<u64>,
    /// Defaults to the latest block
    pub end_block: Option<u64>,
    pub view_tag_policy: ViewTagPolicy,
}

/// One payment of a batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendRequest {
    pub recipient: Recipient,
    pub token: Token,
    pub amount: U256,
}

#[derive(Clone, Debug)]
pub struct SendReceipt {
    pub tx_hash: TxHash,
    pub stealth: StealthSend,
}

#[derive(Clone, Debug)]
pub struct BatchSendReceipt {
    pub tx_hash: TxHash,
    /// One per request, in the caller's order
    pub stealth: Vec<StealthSend>,
}

/// Protocol client for one network
pub struct Umbra<C> {
    client: C,
    config: ChainConfig,
}

impl<C: ChainClient> Umbra<C> {
    pub fn new(client: C, config: ChainConfig) -> Self {
        Self { client, config }
    }

    /// Use the registered config for `chain_id`
    pub fn for_chain_id(client: C, chain_id: u64) -> Result<Self> {
        Ok(Self::new(client, ChainConfig::for_chain_id(chain_id)?))
    }

    /// Accept a chain id or a config object as JSON
    pub fn from_json(client: C, config: &Value) -> Result<Self> {
        Ok(Self::new(client, ChainConfig::resolve(config)?))
    }

    pub fn chain_config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn generate_private_keys<S: MessageSigner + ?Sized>(&self, signer: &S) -> Result<GeneratedKeys> {
        derivation::generate_private_keys(signer)
    }

    /// Resolve `recipient` to the keys a sender encrypts to
    pub async fn lookup_recipient(&self, recipient: &Recipient, options: &LookupOptions) -> Result<StealthKeys> {
        match recipient {
            Recipient::Keys(keys) => Ok(*keys),
            Recipient::PublicKey(public_key) => {
                if !options.support_pub_key {
                    return Err(ValidationError::PublicKeyRecipientDisabled.into());
                }
                Ok(StealthKeys {
                    spending_public_key: *public_key,
                    viewing_public_key: *public_key,
                })
            }
            Recipient::TxHash(tx_hash) => {
                if !options.support_tx_hash {
                    return Err(ValidationError::TxHashRecipientDisabled.into());
                }
                let public_key = self
                    .client
                    .transaction_public_key(*tx_hash)
                    .await?
                    .ok_or(UmbraError::TransactionNotFound(*tx_hash))?;
                Ok(StealthKeys {
                    spending_public_key: public_key,
                    viewing_public_key: public_key,
                })
            }
            Recipient::Address(address) if options.advanced => {
                let public_key = self
                    .client
                    .account_public_key(*address)
                    .await?
                    .ok_or(UmbraError::PublicKeyNotFound(*address))?;
                Ok(StealthKeys {
                    spending_public_key: public_key,
                    viewing_public_key: public_key,
                })
            }
            Recipient::Address(address) => self
                .client
                .registered_stealth_keys(*address)
                .await?
                .ok_or(UmbraError::RecipientNotRegistered(*address)),
        }
    }

    /// Stealth address and payload for `recipient`, without sending anything
    pub async fn prepare_send(&self, recipient: &Recipient, options: &LookupOptions) -> Result<StealthSend> {
        let keys = self.lookup_recipient(recipient, options).await?;
        Ok(stealth::prepare_send(&keys)?)
    }

    /// Send `amount` of `token` to a fresh stealth address of `recipient`
    pub async fn send(
        &self,
        wallet: &dyn Wallet,
        token: Token,
        amount: U256,
        recipient: &Recipient,
        options: &SendOptions,
    ) -> Result<SendReceipt> {
        let sender = wallet.address();

        // ETH sufficiency is left to the chain, token balances are checked up front
        if let Token::Erc20(_) = token {
            self.ensure_balance(token, sender, amount).await?;
        }

        let stealth = self.prepare_send(recipient, &options.lookup).await?;
        let toll = self.client.toll(self.config.umbra_address).await?;

        let tx_hash = match token {
            Token::Eth => {
                let call = EthSend {
                    contract: self.config.umbra_address,
                    receiver: stealth.stealth_address(),
                    amount,
                    toll,
                    payload: stealth.payload,
                };
                self.client.send_eth(wallet, &call, &options.tx).await?
            }
            Token::Erc20(token_address) => {
                self.ensure_allowance(wallet, token_address, self.config.umbra_address, amount, &options.tx)
                    .await?;
                let call = TokenSend {
                    contract: self.config.umbra_address,
                    receiver: stealth.stealth_address(),
                    token: token_address,
                    amount,
                    toll,
                    payload: stealth.payload,
                };
                self.client.send_token(wallet, &call, &options.tx).await?
            }
        };

        info!(
            token = %token,
            %amount,
            stealth_address = %stealth.stealth_address(),
            "payment sent"
        );
        Ok(SendReceipt { tx_hash, stealth })
    }

    /// Send several payments in one batch-send transaction
    pub async fn batch_send(
        &self,
        wallet: &dyn Wallet,
        sends: &[SendRequest],
        options: &SendOptions,
    ) -> Result<BatchSendReceipt> {
        if sends.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }
        let sender = wallet.address();

        let mut eth_total = U256::zero();
        let mut token_totals: BTreeMap<Address, U256> = BTreeMap::new();
        for send in sends {
            match send.token {
                Token::Eth => eth_total = checked_sum(eth_total, send.amount)?,
                Token::Erc20(token) => {
                    let total = token_totals.entry(token).or_default();
                    *total = checked_sum(*total, send.amount)?;
                }
            }
        }

        for (token, total) in &token_totals {
            self.ensure_balance(Token::Erc20(*token), sender, *total).await?;
        }

        let mut stealth = Vec::with_capacity(sends.len());
        for send in sends {
            stealth.push(self.prepare_send(&send.recipient, &options.lookup).await?);
        }

        for (token, total) in &token_totals {
            self.ensure_allowance(wallet, *token, self.config.batch_send_address, *total, &options.tx)
                .await?;
        }

        let mut items: Vec<BatchItem> = sends
            .iter()
            .zip(&stealth)
            .map(|(send, prepared)| BatchItem {
                receiver: prepared.stealth_address(),
                token: send.token,
                amount: send.amount,
                payload: prepared.payload,
            })
            .collect();
        // Stable sort: the contract walks tokens in ascending address order
        items.sort_by_key(|item| item.token.address());

        let toll = self.client.toll(self.config.umbra_address).await?;
        let total_toll = toll
            .checked_mul(U256::from(sends.len()))
            .ok_or_else(|| amount_overflow("toll"))?;
        let value = checked_sum(eth_total, total_toll)?;

        let call = BatchSend {
            contract: self.config.batch_send_address,
            toll,
            value,
            items,
        };
        let tx_hash = self.client.batch_send(wallet, &call, &options.tx).await?;

        info!(payments = sends.len(), %value, "batch sent");
        Ok(BatchSendReceipt { tx_hash, stealth })
    }

    /// Find announcements addressed to the owner of `viewing_key_pair`
    pub async fn scan(
        &self,
        spending_public_key: &PublicKey,
        viewing_key_pair: &KeyPair,
        overrides: &ScanOverrides,
    ) -> Result<Vec<UserAnnouncement>>
    where
        C: AnnouncementSource,
    {
        // Own keys are checked before touching the network
        let scanner = Scanner::new(*spending_public_key, viewing_key_pair)?
            .with_view_tag_policy(overrides.view_tag_policy);

        let query = AnnouncementQuery {
            contract: self.config.umbra_address,
            from_block: overrides.start_block.unwrap_or(self.config.start_block),
            to_block: overrides.end_block,
        };
        let announcements = self.client.announcements(&query).await?;
        debug!(count = announcements.len(), from = query.from_block, "fetched announcements");

        let found = scanner.scan_all(&announcements);
        info!(scanned = announcements.len(), matched = found.len(), "scan complete");
        Ok(found)
    }

    /// Move funds out of a stealth address, signed by the stealth key itself
    pub async fn withdraw(
        &self,
        stealth_key_pair: &KeyPair,
        token: Token,
        destination: Address,
        overrides: &TxOverrides,
    ) -> Result<TxHash> {
        let wallet = LocalWallet::new(stealth_key_pair)?;
        let tx_hash = match token {
            Token::Eth => self.client.withdraw_eth(&wallet, destination, overrides).await?,
            Token::Erc20(token_address) => {
                self.client
                    .withdraw_token(&wallet, self.config.umbra_address, token_address, destination, overrides)
                    .await?
            }
        };
        info!(%token, from = %wallet.address(), to = %destination, "withdrawal sent");
        Ok(tx_hash)
    }

    /// Submit a withdrawal the stealth address owner authorized off-chain
    pub async fn withdraw_on_behalf(
        &self,
        relayer: &dyn Wallet,
        stealth_address: Address,
        request: &WithdrawRequest,
        signature: &Signature,
        overrides: &TxOverrides,
    ) -> Result<TxHash> {
        if request.chain_id != self.config.chain_id || request.umbra_address != self.config.umbra_address {
            warn!(
                chain_id = request.chain_id,
                contract = %request.umbra_address,
                "withdraw authorization was signed for a different deployment"
            );
        }
        let call = WithdrawOnBehalf {
            contract: self.config.umbra_address,
            stealth_address,
            request: request.clone(),
            signature: *signature,
        };
        let tx_hash = self.client.withdraw_token_on_behalf(relayer, &call, overrides).await?;
        info!(%stealth_address, relayer = %relayer.address(), "relayed withdrawal sent");
        Ok(tx_hash)
    }

    /// Authorization for a relayed withdrawal from the stealth address
    pub fn sign_withdraw(stealth_key_pair: &KeyPair, request: &WithdrawRequest) -> Result<Signature> {
        withdraw::sign_withdraw(stealth_key_pair, request)
    }

    /// Private key of a matched stealth address
    pub fn compute_stealth_private_key(
        spending_key_pair: &KeyPair,
        stealth_scalar: &StealthScalar,
    ) -> Result<KeyPair> {
        Ok(stealth::compute_stealth_private_key(spending_key_pair, stealth_scalar)?)
    }

    async fn ensure_balance(&self, token: Token, owner: Address, required: U256) -> Result<()> {
        let available = self.client.balance(token, owner).await?;
        if available < required {
            return Err(UmbraError::InsufficientBalance { available, required });
        }
        Ok(())
    }

    async fn ensure_allowance(
        &self,
        wallet: &dyn Wallet,
        token: Address,
        spender: Address,
        amount: U256,
        overrides: &TxOverrides,
    ) -> Result<()> {
        let allowance = self.client.allowance(token, wallet.address(), spender).await?;
        if allowance < amount {
            debug!(%token, %spender, "approving token spend");
            self.client
                .approve(wallet, token, spender, U256::MAX, overrides)
                .await?;
        }
        Ok(())
    }
}

fn checked_sum(a: U256, b: U256) -> Result<U256> {
    a.checked_add(b).ok_or_else(|| amount_overflow("amount"))
}

fn amount_overflow(field: &'static str) -> UmbraError {
    ValidationError::InvalidAmount {
        field,
        value: "overflow".into(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_parsing() {
        let address = "0x2436012a54c81f2F03e6E3D83090f3F5967bF1B5";
        assert!(matches!(Recipient::parse(address).unwrap(), Recipient::Address(_)));

        let public = KeyPair::random().public_key_hex();
        assert!(matches!(Recipient::parse(&public).unwrap(), Recipient::PublicKey(_)));

        let tx_hash = format!("0x{}", "ab".repeat(32));
        assert_eq!(Recipient::parse(&tx_hash).unwrap(), Recipient::TxHash([0xab; 32]));
        assert!(Recipient::parse(&format!("0x{}", "zz".repeat(32))).is_err());

        assert!(Recipient::parse("0x123").is_err());
        assert!(Recipient::parse("vitalik.eth").is_err());
    }

    #[test]
    fn test_send_options_default_off() {
        let options = SendOptions::default();
        assert!(!options.lookup.advanced);
        assert!(!options.lookup.support_pub_key);
        assert!(!options.lookup.support_tx_hash);
        assert_eq!(options.tx, TxOverrides::default());
        assert_eq!(ScanOverrides::default().view_tag_policy, ViewTagPolicy::Prefilter);
    }
}
