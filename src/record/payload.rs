//! JSON payload shapes carried inside request arguments, result payloads
//! and object memory.

use super::{PulseNumber, RecordId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Method name of every call entering through the public API
pub const API_CALL_METHOD: &str = "Call";

/// Arguments of an API `Call` request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallParams {
    pub call_site: String,
    #[serde(default)]
    pub call_params: serde_json::Value,
    /// Caller member reference
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub public_key: String,
}

impl CallParams {
    /// String field of `callParams`, empty when missing
    pub fn param_str(&self, key: &str) -> String {
        self.call_params
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    #[serde(default)]
    pub returns: serde_json::Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl ResultPayload {
    pub fn return_str(&self, key: &str) -> Option<String> {
        self.returns
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemberState {
    pub public_key: String,
    pub wallet: Option<RecordId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WalletState {
    /// asset name -> account object
    pub accounts: HashMap<String, RecordId>,
    /// eth tx hash -> deposit object
    pub deposits: HashMap<String, RecordId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccountState {
    pub balance: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DepositState {
    pub balance: String,
    pub amount: String,
    #[serde(rename = "pulseDepositUnHold")]
    pub pulse_deposit_unhold: PulseNumber,
    pub tx_hash: String,
    /// seconds
    pub lockup: i64,
    pub vesting: i64,
    pub vesting_step: i64,
    pub is_confirmed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BurnedBalanceState {
    pub balance: String,
}

/// Flat genesis shard: public key -> member object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PublicKeyShardState {
    pub map: HashMap<String, RecordId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MigrationShardState {
    pub free_addresses: Vec<String>,
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Decode a state payload; malformed input is logged and degrades to zero values
pub fn decode_or_default<T: DeserializeOwned + Default>(bytes: &[u8], what: &str, id: RecordId) -> T {
    match decode(bytes) {
        Ok(state) => state,
        Err(e) => {
            log::warn!("⚠️  Malformed {} payload in record {}: {}", what, id, e);
            T::default()
        }
    }
}
