//! API wire types

use crate::store::{SwapRecord, SwapResultRecord, SwapStatus, SwapTxType};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Successful registration post result.
pub const SUCCESS_POST_RESULT: &str = "Success";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub identifier: String,
    pub src_chain: String,
    pub dest_chain: String,
    pub pair_ids: Vec<String>,
    pub version: String,
}

/// Per-log-index registration outcome of a router swap transaction.
pub type MapIntResult = BTreeMap<u32, String>;

/// Unified swap view merging the registration and result stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapInfo {
    pub pair_id: String,
    pub tx_id: String,
    pub tx_to: String,
    pub bind: String,
    pub swap_type: SwapTxType,
    pub status: SwapStatus,
    pub timestamp: i64,
    pub memo: String,

    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub swap_tx: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub swap_value: String,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub swap_height: u64,
    #[serde(skip_serializing_if = "is_zero_i64", default)]
    pub swap_time: i64,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub swap_nonce: u64,

    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub from_chain_id: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub to_chain_id: String,
    #[serde(default)]
    pub log_index: u32,
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

impl From<SwapRecord> for SwapInfo {
    fn from(swap: SwapRecord) -> Self {
        Self {
            pair_id: swap.pair_id,
            tx_id: swap.tx_id,
            tx_to: swap.tx_to,
            bind: swap.bind,
            swap_type: swap.tx_type,
            status: swap.status,
            timestamp: swap.timestamp,
            memo: swap.memo,
            swap_tx: String::new(),
            swap_value: String::new(),
            swap_height: 0,
            swap_time: 0,
            swap_nonce: 0,
            from_chain_id: swap.from_chain_id,
            to_chain_id: swap.to_chain_id,
            log_index: swap.log_index,
        }
    }
}

impl From<SwapResultRecord> for SwapInfo {
    fn from(result: SwapResultRecord) -> Self {
        Self {
            pair_id: result.pair_id,
            tx_id: result.tx_id,
            tx_to: result.tx_to,
            bind: result.bind,
            swap_type: result.tx_type,
            status: result.status,
            timestamp: result.timestamp,
            memo: result.memo,
            swap_tx: result.swap_tx,
            swap_value: result.value,
            swap_height: result.swap_height,
            swap_time: result.swap_time,
            swap_nonce: result.swap_nonce,
            from_chain_id: result.from_chain_id,
            to_chain_id: result.to_chain_id,
            log_index: result.log_index,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct P2shAddressInfo {
    pub bind_address: String,
    pub p2sh_address: String,
    pub redeem_script: String,
    pub redeem_script_disasm: String,
}
