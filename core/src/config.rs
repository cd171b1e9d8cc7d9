//! Per-network parameters and the well-known network registry
//!
//! A [`ChainConfig`] is either looked up by chain id or supplied by the caller
//! as JSON. Caller-supplied configs are validated field by field and the first
//! bad field is reported with the value that was received.

use std::convert::TryFrom;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use url::Url;

use crate::error::{UmbraError, ValidationError};
use crate::types::Address;

/// Settlement contract, deployed at the same address on every supported network
pub const UMBRA_ADDRESS: Address = Address([
    0xfb, 0x2d, 0xc5, 0x80, 0xee, 0xd9, 0x55, 0xb5, 0x28, 0x40, 0x7b, 0x4d, 0x36, 0xff, 0xaf, 0xe3,
    0xda, 0x68, 0x54, 0x01,
]);

/// Batch-send contract, deployed at the same address on every supported network
pub const BATCH_SEND_ADDRESS: Address = Address([
    0x0d, 0x81, 0xdf, 0x22, 0x2b, 0xb4, 0x4b, 0x88, 0x32, 0x65, 0x53, 0x85, 0x86, 0x82, 0x97, 0x15,
    0xcf, 0x15, 0x71, 0x63,
]);

const SUBGRAPH_BASE: &str = "https://api.thegraph.com/subgraphs/name/scopelift/";

struct KnownChain {
    name: &'static str,
    chain_id: u64,
    start_block: u64,
    subgraph: Option<&'static str>,
}

const KNOWN_CHAINS: &[KnownChain] = &[
    KnownChain { name: "localhost", chain_id: 1337, start_block: 8_505_089, subgraph: None },
    KnownChain { name: "goerli", chain_id: 5, start_block: 7_718_444, subgraph: Some("umbragoerli") },
    KnownChain { name: "mainnet", chain_id: 1, start_block: 12_343_914, subgraph: Some("umbramainnet") },
    KnownChain { name: "optimism", chain_id: 10, start_block: 4_069_556, subgraph: Some("umbraoptimism") },
    KnownChain { name: "gnosis_chain", chain_id: 100, start_block: 28_237_950, subgraph: Some("umbragnosis") },
    KnownChain { name: "polygon", chain_id: 137, start_block: 20_717_318, subgraph: Some("umbrapolygon") },
    KnownChain { name: "arbitrum_one", chain_id: 42161, start_block: 7_285_883, subgraph: Some("umbraarbitrumone") },
    KnownChain { name: "sepolia", chain_id: 11_155_111, start_block: 3_590_825, subgraph: Some("umbrasepolia") },
];

/// Static parameters of one network
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "Value")]
pub struct ChainConfig {
    pub chain_id: u64,
    pub umbra_address: Address,
    pub batch_send_address: Address,
    /// Lower bound for announcement scans
    pub start_block: u64,
    /// `None` when no indexed announcement source exists for the network
    #[serde(serialize_with = "serialize_subgraph_url")]
    pub subgraph_url: Option<Url>,
}

impl ChainConfig {
    /// Registered parameters for `chain_id`
    pub fn for_chain_id(chain_id: u64) -> Result<Self, UmbraError> {
        KNOWN_CHAINS
            .iter()
            .find(|chain| chain.chain_id == chain_id)
            .map(Self::from_known)
            .ok_or(UmbraError::UnsupportedChain { chain_id })
    }

    /// Every registered network, in registry order
    pub fn known() -> impl Iterator<Item = (&'static str, ChainConfig)> {
        KNOWN_CHAINS.iter().map(|chain| (chain.name, Self::from_known(chain)))
    }

    /// Registry name of this config's network, if it is a known one
    pub fn network_name(&self) -> Option<&'static str> {
        KNOWN_CHAINS
            .iter()
            .find(|chain| chain.chain_id == self.chain_id)
            .map(|chain| chain.name)
    }

    fn from_known(chain: &KnownChain) -> Self {
        Self {
            chain_id: chain.chain_id,
            umbra_address: UMBRA_ADDRESS,
            batch_send_address: BATCH_SEND_ADDRESS,
            start_block: chain.start_block,
            subgraph_url: chain
                .subgraph
                .and_then(|name| Url::parse(&format!("{SUBGRAPH_BASE}{name}")).ok()),
        }
    }

    /// Accept either a bare chain id (registry lookup) or a full config object
    pub fn resolve(value: &Value) -> Result<Self, UmbraError> {
        match value {
            Value::Number(_) => {
                let chain_id = positive_integer(value)
                    .ok_or_else(|| ValidationError::InvalidChainId(display_value(Some(value))))?;
                Self::for_chain_id(chain_id)
            }
            other => Ok(Self::from_json(other)?),
        }
    }

    /// Validate a caller-supplied config object
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        if value.is_null() {
            return Err(ValidationError::MissingChainConfig);
        }

        let start_block = value.get("startBlock");
        let start_block = start_block
            .and_then(Value::as_u64)
            .ok_or_else(|| ValidationError::InvalidStartBlock(display_value(start_block)))?;

        let chain_id = value.get("chainId");
        let chain_id = chain_id
            .and_then(positive_integer)
            .ok_or_else(|| ValidationError::InvalidChainId(display_value(chain_id)))?;

        let subgraph = value.get("subgraphUrl");
        let subgraph_url = match subgraph {
            Some(Value::Bool(false)) => None,
            Some(Value::String(s)) => Some(
                Url::parse(s).map_err(|_| ValidationError::InvalidSubgraphUrl(s.clone()))?,
            ),
            other => return Err(ValidationError::InvalidSubgraphUrl(display_value(other))),
        };

        Ok(Self {
            chain_id,
            umbra_address: address_field(value, "umbraAddress")?,
            batch_send_address: address_field(value, "batchSendAddress")?,
            start_block,
            subgraph_url,
        })
    }
}

impl TryFrom<Value> for ChainConfig {
    type Error = ValidationError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(&value)
    }
}

fn address_field(value: &Value, field: &'static str) -> Result<Address, ValidationError> {
    match value.get(field) {
        Some(Value::String(s)) => Address::parse(field, s),
        other => Err(ValidationError::InvalidAddress {
            field,
            value: display_value(other),
        }),
    }
}

fn serialize_subgraph_url<S: Serializer>(url: &Option<Url>, serializer: S) -> Result<S::Ok, S::Error> {
    match url {
        Some(url) => serializer.serialize_str(url.as_str()),
        None => serializer.serialize_bool(false),
    }
}

/// A JSON integer greater than zero
pub(crate) fn positive_integer(value: &Value) -> Option<u64> {
    value.as_u64().filter(|n| *n > 0)
}

/// Render a received JSON value for an error message
pub(crate) fn display_value(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_lookup() {
        let mainnet = ChainConfig::for_chain_id(1).unwrap();
        assert_eq!(mainnet.start_block, 12_343_914);
        assert_eq!(mainnet.umbra_address.to_string(), "0xFb2dc580Eed955B528407b4d36FfaFe3da685401");
        assert_eq!(
            mainnet.batch_send_address.to_string(),
            "0x0d81Df222BB44b883265538586829715CF157163"
        );
        assert_eq!(
            mainnet.subgraph_url.unwrap().as_str(),
            "https://api.thegraph.com/subgraphs/name/scopelift/umbramainnet"
        );

        let local = ChainConfig::for_chain_id(1337).unwrap();
        assert_eq!(local.subgraph_url, None);
        assert_eq!(local.network_name(), Some("localhost"));
    }

    #[test]
    fn test_unsupported_chain() {
        let err = ChainConfig::for_chain_id(999_999).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported chain ID provided");
    }

    #[test]
    fn test_known_chains_have_unique_ids() {
        let mut ids: Vec<u64> = ChainConfig::known().map(|(_, c)| c.chain_id).collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }

    #[test]
    fn test_valid_custom_config() {
        let config = ChainConfig::from_json(&json!({
            "chainId": 31337,
            "umbraAddress": "0xFb2dc580Eed955B528407b4d36FfaFe3da685401",
            "batchSendAddress": "0x0d81Df222BB44b883265538586829715CF157163",
            "startBlock": 0,
            "subgraphUrl": false
        }))
        .unwrap();
        assert_eq!(config.chain_id, 31337);
        assert_eq!(config.start_block, 0);
        assert!(config.subgraph_url.is_none());
    }

    #[test]
    fn test_serde_roundtrip_keeps_false_marker() {
        let config = ChainConfig::for_chain_id(1337).unwrap();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["subgraphUrl"], json!(false));
        assert_eq!(json["chainId"], json!(1337));
        let back: ChainConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_resolve_accepts_chain_id_or_object() {
        assert_eq!(ChainConfig::resolve(&json!(10)).unwrap().chain_id, 10);
        assert!(matches!(
            ChainConfig::resolve(&json!(12345)),
            Err(UmbraError::UnsupportedChain { chain_id: 12345 })
        ));
        let err = ChainConfig::resolve(&json!({})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid start block provided in chainConfig. Got 'undefined'");
    }

    #[test]
    fn test_bad_subgraph_url() {
        let err = ChainConfig::from_json(&json!({
            "umbraAddress": "123", "startBlock": 1, "chainId": 1, "subgraphUrl": "not a url"
        }))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid subgraphUrl provided in chainConfig. Got 'not a url'"
        );
    }

    #[test]
    fn test_bad_address_fields() {
        let err = ChainConfig::from_json(&json!({
            "startBlock": 0, "chainId": 4, "subgraphUrl": false
        }))
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidAddress {
                field: "umbraAddress",
                value: "undefined".into()
            }
        );
    }
}
