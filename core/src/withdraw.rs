//! Off-chain withdraw authorization for relayers
//!
//! The stealth address owner signs a digest binding the chain, the settlement
//! contract, the destination, the token, the sponsor and its fee, plus an
//! optional post-withdraw hook call. Any relayer can submit the signature; the
//! contract recovers the signer and only releases funds when it equals the
//! stealth address.
//!
//! ```text
//! digest = keccak256(abi.encode(
//!     uint256 chainId, address umbra, address acceptor, address token,
//!     address sponsor, uint256 sponsorFee, address hook, bytes data))
//! signature = personal_sign(stealthKey, digest)
//! ```

use primitive_types::U256;
use serde::Deserialize;
use serde_json::Value;

use crate::config::{display_value, positive_integer};
use crate::error::{CryptoError, Result, ValidationError};
use crate::keys::KeyPair;
use crate::signer::{recover_message_signer, LocalWallet, MessageSigner, Signature};
use crate::types::{keccak256, parse_u256, Address};

/// Number of static head words before the dynamic `bytes` tail
const HEAD_WORDS: usize = 8;

/// Validated withdraw authorization parameters
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawRequest {
    pub chain_id: u64,
    pub umbra_address: Address,
    /// Destination of the withdrawn funds
    pub acceptor: Address,
    pub token: Address,
    pub sponsor: Address,
    pub sponsor_fee: U256,
    /// Contract called after the withdrawal, zero for none
    pub hook: Address,
    pub data: Vec<u8>,
}

impl WithdrawRequest {
    pub fn new(
        chain_id: u64,
        umbra_address: Address,
        acceptor: Address,
        token: Address,
        sponsor: Address,
        sponsor_fee: U256,
    ) -> Self {
        Self {
            chain_id,
            umbra_address,
            acceptor,
            token,
            sponsor,
            sponsor_fee,
            hook: Address::ZERO,
            data: Vec::new(),
        }
    }

    pub fn with_hook(mut self, hook: Address, data: Vec<u8>) -> Self {
        self.hook = hook;
        self.data = data;
        self
    }

    /// `abi.encode` of the signed tuple
    pub fn abi_encode(&self) -> Vec<u8> {
        let padded = self.data.len().div_ceil(32) * 32;
        let mut out = Vec::with_capacity((HEAD_WORDS + 1) * 32 + padded);

        out.extend_from_slice(&u256_word(U256::from(self.chain_id)));
        out.extend_from_slice(&self.umbra_address.to_word());
        out.extend_from_slice(&self.acceptor.to_word());
        out.extend_from_slice(&self.token.to_word());
        out.extend_from_slice(&self.sponsor.to_word());
        out.extend_from_slice(&u256_word(self.sponsor_fee));
        out.extend_from_slice(&self.hook.to_word());
        // Offset of the bytes tail, measured from the start of the tuple
        out.extend_from_slice(&u256_word(U256::from(HEAD_WORDS * 32)));

        out.extend_from_slice(&u256_word(U256::from(self.data.len())));
        out.extend_from_slice(&self.data);
        out.resize(out.len() + (padded - self.data.len()), 0);
        out
    }

    pub fn digest(&self) -> [u8; 32] {
        keccak256(&self.abi_encode())
    }
}

/// Withdraw authorization inputs exactly as a caller supplied them
///
/// `chain_id` stays a raw JSON value so that strings and fractions are
/// reported back instead of being coerced.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawParams {
    pub chain_id: Value,
    pub umbra_address: String,
    pub acceptor: String,
    pub token: String,
    pub sponsor: String,
    pub sponsor_fee: String,
    #[serde(default)]
    pub hook: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

impl WithdrawParams {
    pub fn validate(&self) -> Result<WithdrawRequest, ValidationError> {
        let chain_id = positive_integer(&self.chain_id)
            .ok_or_else(|| ValidationError::InvalidChainId(display_value(Some(&self.chain_id))))?;
        let umbra_address = Address::parse("umbraAddress", &self.umbra_address)?;
        let acceptor = Address::parse("acceptor", &self.acceptor)?;
        let token = Address::parse("token", &self.token)?;
        let sponsor = Address::parse("sponsor", &self.sponsor)?;
        let sponsor_fee = parse_u256("sponsorFee", &self.sponsor_fee)?;
        let hook = match &self.hook {
            Some(hook) => Address::parse("hook", hook)?,
            None => Address::ZERO,
        };
        let data = match &self.data {
            Some(data) => parse_call_data(data)?,
            None => Vec::new(),
        };

        Ok(WithdrawRequest::new(chain_id, umbra_address, acceptor, token, sponsor, sponsor_fee)
            .with_hook(hook, data))
    }
}

/// `0x`-prefixed, even-length hex; `0x` alone is empty call data
pub fn parse_call_data(value: &str) -> Result<Vec<u8>, ValidationError> {
    let digits = value
        .strip_prefix("0x")
        .ok_or(ValidationError::InvalidCallData)?;
    hex::decode(digits).map_err(|_| ValidationError::InvalidCallData)
}

/// Sign `request` with the stealth address's private key
pub fn sign_withdraw(stealth_key_pair: &KeyPair, request: &WithdrawRequest) -> Result<Signature> {
    if request.chain_id == 0 {
        return Err(ValidationError::InvalidChainId("0".into()).into());
    }
    let wallet = LocalWallet::new(stealth_key_pair)?;
    Ok(wallet.sign_message(&request.digest())?)
}

/// Address that produced `signature` over `request`
pub fn recover_withdraw_signer(
    request: &WithdrawRequest,
    signature: &Signature,
) -> Result<Address, CryptoError> {
    recover_message_signer(&request.digest(), signature)
}

fn u256_word(value: U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}
