//! Interfaces to on-chain collaborators
//!
//! The settlement contracts, the token contracts and the announcement feed
//! live outside this crate. The protocol client talks to them only through
//! these traits, so transports (JSON-RPC, log queries, a subgraph) plug in
//! without touching protocol code.

use async_trait::async_trait;
use k256::PublicKey;
use primitive_types::U256;

use crate::error::ChainError;
use crate::scan::Announcement;
use crate::signer::{Signature, Wallet};
use crate::stealth::{StealthKeys, StealthPayload};
use crate::types::{Address, Token, TxHash};
use crate::withdraw::WithdrawRequest;

/// Optional transaction fields forwarded verbatim to the chain client
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxOverrides {
    pub gas_limit: Option<u64>,
    pub gas_price: Option<U256>,
    /// EIP-2718 transaction type
    pub tx_type: Option<u8>,
}

/// `sendEth(receiver, toll, pkx, ciphertext)` with `value = amount + toll`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EthSend {
    pub contract: Address,
    pub receiver: Address,
    pub amount: U256,
    pub toll: U256,
    pub payload: StealthPayload,
}

impl EthSend {
    pub fn value(&self) -> U256 {
        self.amount.saturating_add(self.toll)
    }
}

/// `sendToken(receiver, token, amount, pkx, ciphertext)` with `value = toll`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenSend {
    pub contract: Address,
    pub receiver: Address,
    pub token: Address,
    pub amount: U256,
    pub toll: U256,
    pub payload: StealthPayload,
}

/// One entry of a batch send
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchItem {
    pub receiver: Address,
    pub token: Token,
    pub amount: U256,
    pub payload: StealthPayload,
}

/// `batchSend(toll, items)`; the contract requires items sorted by token
/// address and `value` equal to the ETH total plus one toll per item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchSend {
    pub contract: Address,
    pub toll: U256,
    pub value: U256,
    pub items: Vec<BatchItem>,
}

/// `withdrawTokenOnBehalf`, submitted by a relayer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawOnBehalf {
    pub contract: Address,
    pub stealth_address: Address,
    pub request: WithdrawRequest,
    pub signature: Signature,
}

/// Block range and contract to read announcements from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnouncementQuery {
    pub contract: Address,
    pub from_block: u64,
    /// Inclusive; `None` means the latest block
    pub to_block: Option<u64>,
}

/// Contract calls and reads needed by the protocol client
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// ETH balance for [`Token::Eth`], token balance otherwise
    async fn balance(&self, token: Token, owner: Address) -> Result<U256, ChainError>;

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256, ChainError>;

    async fn approve(
        &self,
        owner: &dyn Wallet,
        token: Address,
        spender: Address,
        amount: U256,
        overrides: &TxOverrides,
    ) -> Result<TxHash, ChainError>;

    /// Fee charged per announcement by the settlement contract
    async fn toll(&self, contract: Address) -> Result<U256, ChainError>;

    async fn send_eth(&self, sender: &dyn Wallet, call: &EthSend, overrides: &TxOverrides) -> Result<TxHash, ChainError>;

    async fn send_token(
        &self,
        sender: &dyn Wallet,
        call: &TokenSend,
        overrides: &TxOverrides,
    ) -> Result<TxHash, ChainError>;

    async fn batch_send(
        &self,
        sender: &dyn Wallet,
        call: &BatchSend,
        overrides: &TxOverrides,
    ) -> Result<TxHash, ChainError>;

    /// Sweep the stealth address's whole ETH balance to `destination`
    async fn withdraw_eth(
        &self,
        stealth: &dyn Wallet,
        destination: Address,
        overrides: &TxOverrides,
    ) -> Result<TxHash, ChainError>;

    /// `withdrawToken(destination, token)` signed by the stealth address
    async fn withdraw_token(
        &self,
        stealth: &dyn Wallet,
        contract: Address,
        token: Address,
        destination: Address,
        overrides: &TxOverrides,
    ) -> Result<TxHash, ChainError>;

    async fn withdraw_token_on_behalf(
        &self,
        relayer: &dyn Wallet,
        call: &WithdrawOnBehalf,
        overrides: &TxOverrides,
    ) -> Result<TxHash, ChainError>;

    /// Keys published in the stealth key registry, if any
    async fn registered_stealth_keys(&self, account: Address) -> Result<Option<StealthKeys>, ChainError>;

    /// Public key recovered from one of the account's past transactions
    async fn account_public_key(&self, account: Address) -> Result<Option<PublicKey>, ChainError>;

    /// Public key recovered from the signature of transaction `tx_hash`
    async fn transaction_public_key(&self, tx_hash: TxHash) -> Result<Option<PublicKey>, ChainError>;
}

/// Feed of announcements, oldest first
#[async_trait]
pub trait AnnouncementSource: Send + Sync {
    async fn announcements(&self, query: &AnnouncementQuery) -> Result<Vec<Announcement>, ChainError>;
}
