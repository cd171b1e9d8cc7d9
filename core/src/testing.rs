//! In-memory chain for tests
//!
//! [`MemoryChain`] plays the settlement contract, the batch-send contract,
//! token contracts, the key registry and the announcement log. It enforces
//! the same preconditions the contracts do, so protocol flows can be
//! exercised end to end without a node.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use k256::PublicKey;
use primitive_types::U256;

use crate::chain::{
    AnnouncementQuery, AnnouncementSource, BatchSend, ChainClient, EthSend, TokenSend, TxOverrides,
    WithdrawOnBehalf,
};
use crate::config::ChainConfig;
use crate::error::ChainError;
use crate::scan::Announcement;
use crate::signer::Wallet;
use crate::stealth::{StealthKeys, StealthPayload};
use crate::types::{keccak256, Address, Token, TxHash};
use crate::withdraw::recover_withdraw_signer;

#[derive(Clone, Default)]
struct State {
    chain_id: u64,
    block_number: u64,
    balances: HashMap<(Token, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
    tolls: HashMap<Address, U256>,
    registry: HashMap<Address, StealthKeys>,
    account_keys: HashMap<Address, PublicKey>,
    transaction_keys: HashMap<TxHash, PublicKey>,
    /// Tokens held by the settlement contract per (stealth address, token)
    pending: HashMap<(Address, Address), U256>,
    announcements: Vec<Announcement>,
    transactions: u64,
}

impl State {
    fn balance(&self, token: Token, owner: Address) -> U256 {
        self.balances.get(&(token, owner)).copied().unwrap_or_default()
    }

    fn debit(&mut self, token: Token, owner: Address, amount: U256) -> Result<(), ChainError> {
        let balance = self.balance(token, owner);
        let rest = balance
            .checked_sub(amount)
            .ok_or_else(|| ChainError::Reverted(format!("{} has insufficient {} balance", owner, token)))?;
        self.balances.insert((token, owner), rest);
        Ok(())
    }

    fn credit(&mut self, token: Token, owner: Address, amount: U256) {
        let balance = self.balances.entry((token, owner)).or_default();
        *balance = balance.saturating_add(amount);
    }

    fn spend_allowance(&mut self, token: Address, owner: Address, spender: Address, amount: U256) -> Result<(), ChainError> {
        let allowance = self.allowances.get(&(token, owner, spender)).copied().unwrap_or_default();
        let rest = allowance
            .checked_sub(amount)
            .ok_or_else(|| ChainError::Reverted("ERC20: insufficient allowance".into()))?;
        if allowance != U256::MAX {
            self.allowances.insert((token, owner, spender), rest);
        }
        Ok(())
    }

    fn next_tx(&mut self) -> TxHash {
        self.transactions += 1;
        self.block_number += 1;
        let mut seed = [0u8; 16];
        seed[..8].copy_from_slice(&self.chain_id.to_be_bytes());
        seed[8..].copy_from_slice(&self.transactions.to_be_bytes());
        keccak256(&seed)
    }

    fn announce(&mut self, tx_hash: TxHash, receiver: Address, amount: U256, token: Token, from: Address, payload: StealthPayload) {
        self.announcements.push(Announcement {
            receiver,
            amount,
            token: token.address(),
            from,
            payload,
            block_number: self.block_number,
            tx_hash,
        });
    }

    fn take_pending(&mut self, stealth: Address, token: Address) -> Result<U256, ChainError> {
        match self.pending.remove(&(stealth, token)) {
            Some(amount) if !amount.is_zero() => Ok(amount),
            _ => Err(ChainError::Reverted("Umbra: No balance to withdraw or wrong token".into())),
        }
    }
}

/// Single-process stand-in for the deployed contracts
#[derive(Default)]
pub struct MemoryChain {
    state: Mutex<State>,
}

impl MemoryChain {
    /// Empty chain whose head sits at the config's start block
    pub fn new(config: &ChainConfig) -> Self {
        Self {
            state: Mutex::new(State {
                chain_id: config.chain_id,
                block_number: config.start_block,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, ChainError> {
        self.state
            .lock()
            .map_err(|_| ChainError::Request("chain state poisoned".into()))
    }

    pub fn set_balance(&self, token: Token, owner: Address, amount: U256) -> Result<(), ChainError> {
        self.state()?.balances.insert((token, owner), amount);
        Ok(())
    }

    pub fn set_toll(&self, contract: Address, toll: U256) -> Result<(), ChainError> {
        self.state()?.tolls.insert(contract, toll);
        Ok(())
    }

    pub fn register_keys(&self, account: Address, keys: StealthKeys) -> Result<(), ChainError> {
        self.state()?.registry.insert(account, keys);
        Ok(())
    }

    pub fn set_account_public_key(&self, account: Address, public_key: PublicKey) -> Result<(), ChainError> {
        self.state()?.account_keys.insert(account, public_key);
        Ok(())
    }

    pub fn set_transaction_public_key(&self, tx_hash: TxHash, public_key: PublicKey) -> Result<(), ChainError> {
        self.state()?.transaction_keys.insert(tx_hash, public_key);
        Ok(())
    }

    /// Tokens the settlement contract holds for `stealth`
    pub fn pending_tokens(&self, stealth: Address, token: Address) -> Result<U256, ChainError> {
        Ok(self.state()?.pending.get(&(stealth, token)).copied().unwrap_or_default())
    }

    /// Inject an announcement without moving any funds
    pub fn push_announcement(&self, announcement: Announcement) -> Result<(), ChainError> {
        self.state()?.announcements.push(announcement);
        Ok(())
    }

    pub fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.state()?.block_number)
    }
}

#[async_trait]
impl ChainClient for MemoryChain {
    async fn balance(&self, token: Token, owner: Address) -> Result<U256, ChainError> {
        Ok(self.state()?.balance(token, owner))
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256, ChainError> {
        Ok(self
            .state()?
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default())
    }

    async fn approve(
        &self,
        owner: &dyn Wallet,
        token: Address,
        spender: Address,
        amount: U256,
        _overrides: &TxOverrides,
    ) -> Result<TxHash, ChainError> {
        let mut state = self.state()?;
        state.allowances.insert((token, owner.address(), spender), amount);
        Ok(state.next_tx())
    }

    async fn toll(&self, contract: Address) -> Result<U256, ChainError> {
        Ok(self.state()?.tolls.get(&contract).copied().unwrap_or_default())
    }

    async fn send_eth(&self, sender: &dyn Wallet, call: &EthSend, _overrides: &TxOverrides) -> Result<TxHash, ChainError> {
        let mut state = self.state()?;
        let toll = state.tolls.get(&call.contract).copied().unwrap_or_default();
        if call.toll != toll {
            return Err(ChainError::Reverted("Umbra: Must pay the exact toll".into()));
        }
        let from = sender.address();
        state.debit(Token::Eth, from, call.value())?;
        state.credit(Token::Eth, call.receiver, call.amount);
        state.credit(Token::Eth, call.contract, call.toll);

        let tx_hash = state.next_tx();
        state.announce(tx_hash, call.receiver, call.amount, Token::Eth, from, call.payload);
        Ok(tx_hash)
    }

    async fn send_token(&self, sender: &dyn Wallet, call: &TokenSend, _overrides: &TxOverrides) -> Result<TxHash, ChainError> {
        let mut state = self.state()?;
        let toll = state.tolls.get(&call.contract).copied().unwrap_or_default();
        if call.toll != toll {
            return Err(ChainError::Reverted("Umbra: Must pay the exact toll".into()));
        }
        let from = sender.address();
        if state.pending.contains_key(&(call.receiver, call.token)) {
            return Err(ChainError::Reverted("Umbra: Cannot send more tokens to stealth address".into()));
        }
        let mut next = state.clone();
        next.spend_allowance(call.token, from, call.contract, call.amount)?;
        next.debit(Token::Eth, from, call.toll)?;
        next.debit(Token::Erc20(call.token), from, call.amount)?;
        next.credit(Token::Eth, call.contract, call.toll);
        next.pending.insert((call.receiver, call.token), call.amount);

        let tx_hash = next.next_tx();
        next.announce(tx_hash, call.receiver, call.amount, Token::Erc20(call.token), from, call.payload);
        *state = next;
        Ok(tx_hash)
    }

    async fn batch_send(&self, sender: &dyn Wallet, call: &BatchSend, _overrides: &TxOverrides) -> Result<TxHash, ChainError> {
        let mut state = self.state()?;
        let from = sender.address();

        if !call.items.windows(2).all(|pair| pair[0].token.address() <= pair[1].token.address()) {
            return Err(ChainError::Reverted("BatchSend: items not sorted by token".into()));
        }
        let eth_total = call
            .items
            .iter()
            .filter(|item| item.token.is_eth())
            .try_fold(U256::zero(), |total, item| total.checked_add(item.amount))
            .ok_or_else(|| ChainError::Reverted("BatchSend: overflow".into()))?;
        let expected = call
            .toll
            .checked_mul(U256::from(call.items.len()))
            .and_then(|tolls| tolls.checked_add(eth_total))
            .ok_or_else(|| ChainError::Reverted("BatchSend: overflow".into()))?;
        if call.value != expected {
            return Err(ChainError::Reverted("BatchSend: Value mismatch".into()));
        }

        // Applied to a copy so a revert leaves no partial transfers behind
        let mut next = state.clone();
        next.debit(Token::Eth, from, call.value)?;
        let tx_hash = next.next_tx();
        for item in &call.items {
            match item.token {
                Token::Eth => next.credit(Token::Eth, item.receiver, item.amount),
                Token::Erc20(token) => {
                    next.spend_allowance(token, from, call.contract, item.amount)?;
                    next.debit(item.token, from, item.amount)?;
                    let pending = next.pending.entry((item.receiver, token)).or_default();
                    *pending = pending.saturating_add(item.amount);
                }
            }
            next.credit(Token::Eth, call.contract, call.toll);
            next.announce(tx_hash, item.receiver, item.amount, item.token, from, item.payload);
        }
        *state = next;
        Ok(tx_hash)
    }

    async fn withdraw_eth(&self, stealth: &dyn Wallet, destination: Address, _overrides: &TxOverrides) -> Result<TxHash, ChainError> {
        let mut state = self.state()?;
        let from = stealth.address();
        let amount = state.balance(Token::Eth, from);
        if amount.is_zero() {
            return Err(ChainError::Reverted("nothing to withdraw".into()));
        }
        state.debit(Token::Eth, from, amount)?;
        state.credit(Token::Eth, destination, amount);
        Ok(state.next_tx())
    }

    async fn withdraw_token(
        &self,
        stealth: &dyn Wallet,
        _contract: Address,
        token: Address,
        destination: Address,
        _overrides: &TxOverrides,
    ) -> Result<TxHash, ChainError> {
        let mut state = self.state()?;
        let amount = state.take_pending(stealth.address(), token)?;
        state.credit(Token::Erc20(token), destination, amount);
        Ok(state.next_tx())
    }

    async fn withdraw_token_on_behalf(
        &self,
        _relayer: &dyn Wallet,
        call: &WithdrawOnBehalf,
        _overrides: &TxOverrides,
    ) -> Result<TxHash, ChainError> {
        let mut state = self.state()?;
        let request = &call.request;
        if request.chain_id != state.chain_id || request.umbra_address != call.contract {
            return Err(ChainError::Reverted("Umbra: Invalid Signature".into()));
        }
        let signer = recover_withdraw_signer(request, &call.signature)
            .map_err(|e| ChainError::Reverted(e.to_string()))?;
        if signer != call.stealth_address {
            return Err(ChainError::Reverted("Umbra: Invalid Signature".into()));
        }

        let amount = state.take_pending(call.stealth_address, request.token)?;
        let Some(rest) = amount.checked_sub(request.sponsor_fee) else {
            state.pending.insert((call.stealth_address, request.token), amount);
            return Err(ChainError::Reverted("Umbra: Sponsor fee exceeds balance".into()));
        };
        let token = Token::Erc20(request.token);
        state.credit(token, request.sponsor, request.sponsor_fee);
        state.credit(token, request.acceptor, rest);
        Ok(state.next_tx())
    }

    async fn registered_stealth_keys(&self, account: Address) -> Result<Option<StealthKeys>, ChainError> {
        Ok(self.state()?.registry.get(&account).copied())
    }

    async fn account_public_key(&self, account: Address) -> Result<Option<PublicKey>, ChainError> {
        Ok(self.state()?.account_keys.get(&account).copied())
    }

    async fn transaction_public_key(&self, tx_hash: TxHash) -> Result<Option<PublicKey>, ChainError> {
        Ok(self.state()?.transaction_keys.get(&tx_hash).copied())
    }
}

#[async_trait]
impl AnnouncementSource for MemoryChain {
    async fn announcements(&self, query: &AnnouncementQuery) -> Result<Vec<Announcement>, ChainError> {
        let state = self.state()?;
        Ok(state
            .announcements
            .iter()
            .filter(|a| a.block_number >= query.from_block)
            .filter(|a| query.to_block.map_or(true, |to| a.block_number <= to))
            .cloned()
            .collect())
    }
}
