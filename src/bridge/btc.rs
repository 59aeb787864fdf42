//! Bitcoin P2SH leaf service
//!
//! Derives the per-user deposit address: a P2SH whose redeem script embeds
//! the user's counterpart-chain address ahead of an ordinary pay-to-pubkey-
//! hash spend by the threshold signer:
//!
//! ```text
//! <bind payload> OP_DROP OP_DUP OP_HASH160 <signer pkh> OP_EQUALVERIFY OP_CHECKSIG
//! ```
//!
//! Deposit verification walks the funding transaction over bitcoind
//! JSON-RPC and sums the outputs paying the derived address.

use crate::bridge::{P2shBridge, SwapVerification, TxSwapInfo};
use crate::config::{ChainConfig, PairConfig};
use crate::error::VerifyError;

use anyhow::Result;
use async_trait::async_trait;
use bitcoin::blockdata::opcodes::all::{OP_CHECKSIG, OP_DROP, OP_DUP, OP_EQUALVERIFY, OP_HASH160};
use bitcoin::blockdata::script::{Builder, PushBytesBuf};
use bitcoin::hashes::Hash;
use bitcoin::{Address, Network, PublicKey, ScriptBuf};
use ethers::types::U256;
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::warn;

pub struct BtcBridge {
    config: ChainConfig,
    pair: PairConfig,
    network: Network,
    /// hash160 of the threshold signer's public key.
    signer_pkh: [u8; 20],
    rpc: BtcRpcClient,
}

impl BtcBridge {
    pub fn new(config: ChainConfig, pair: PairConfig) -> Result<Self> {
        let network = Network::from_str(&config.name)
            .map_err(|_| anyhow::anyhow!("Chain {} is not a bitcoin network name", config.name))?;

        // The signer is configured as a hex public key; the redeem script
        // needs its hash160.
        let pubkey = PublicKey::from_str(&pair.src_token.signer_address)
            .map_err(|e| anyhow::anyhow!("Bad btc signer pubkey: {}", e))?;
        let signer_pkh = pubkey.pubkey_hash().to_byte_array();

        let url = config
            .rpc_urls
            .first()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Bitcoin chain has no RPC URL"))?;
        let rpc = BtcRpcClient::new(url, config.rpc_user.clone(), config.rpc_password.clone());

        Ok(Self {
            config,
            pair,
            network,
            signer_pkh,
            rpc,
        })
    }

    fn redeem_script(&self, bind_address: &str) -> Result<ScriptBuf, VerifyError> {
        let payload = hex::decode(bind_address.trim_start_matches("0x"))
            .map_err(|_| VerifyError::InvalidAddress(bind_address.to_string()))?;
        if payload.is_empty() || payload.len() > 75 {
            return Err(VerifyError::InvalidAddress(bind_address.to_string()));
        }
        let payload = PushBytesBuf::try_from(payload)
            .map_err(|_| VerifyError::InvalidAddress(bind_address.to_string()))?;
        let pkh = PushBytesBuf::try_from(self.signer_pkh.to_vec())
            .map_err(|_| VerifyError::InvalidAddress(bind_address.to_string()))?;

        Ok(Builder::new()
            .push_slice(payload)
            .push_opcode(OP_DROP)
            .push_opcode(OP_DUP)
            .push_opcode(OP_HASH160)
            .push_slice(pkh)
            .push_opcode(OP_EQUALVERIFY)
            .push_opcode(OP_CHECKSIG)
            .into_script())
    }
}

#[async_trait]
impl P2shBridge for BtcBridge {
    fn pair_id(&self) -> &str {
        &self.pair.pair_id
    }

    fn get_p2sh_address(&self, bind_address: &str) -> Result<(String, Vec<u8>), VerifyError> {
        let script = self.redeem_script(bind_address)?;
        let address = Address::p2sh(&script, self.network)
            .map_err(|_| VerifyError::InvalidAddress(bind_address.to_string()))?;
        Ok((address.to_string(), script.into_bytes()))
    }

    async fn verify_p2sh_transaction(
        &self,
        pair_id: &str,
        tx_id: &str,
        bind_address: &str,
        allow_unstable: bool,
    ) -> SwapVerification {
        let mut info = TxSwapInfo {
            pair_id: pair_id.to_string(),
            tx_id: tx_id.to_string(),
            bind: bind_address.to_string(),
            ..Default::default()
        };

        let (p2sh_address, _) = match self.get_p2sh_address(bind_address) {
            Ok(derived) => derived,
            Err(err) => return SwapVerification::failed(info, err),
        };
        info.tx_to = p2sh_address.clone();

        let tx = match self.rpc.get_raw_transaction(tx_id).await {
            Ok(Some(tx)) => tx,
            Ok(None) => return SwapVerification::failed(info, VerifyError::TxNotFound),
            Err(err) => return SwapVerification::failed(info, err),
        };

        let confirmations = tx["confirmations"].as_u64().unwrap_or(0);
        if !allow_unstable && confirmations < self.config.confirmation_blocks {
            return SwapVerification::failed(info, VerifyError::TxNotStable);
        }

        // Sum every output paying the derived deposit address.
        let mut total_sats: u64 = 0;
        for vout in tx["vout"].as_array().map(|v| v.as_slice()).unwrap_or(&[]) {
            let pays_us = vout["scriptPubKey"]["address"]
                .as_str()
                .map(|a| a == p2sh_address)
                .unwrap_or(false);
            if pays_us {
                let btc = vout["value"].as_f64().unwrap_or(0.0);
                total_sats += (btc * 100_000_000.0).round() as u64;
            }
        }
        if total_sats == 0 {
            return SwapVerification::failed(info, VerifyError::DepositLogNotFound);
        }
        info.value = U256::from(total_sats);

        let token = &self.pair.src_token;
        if let Some(max) = token.maximum_swap.as_deref().and_then(|m| m.parse::<u64>().ok()) {
            if total_sats > max {
                return SwapVerification::failed(info, VerifyError::TxWithBigValue);
            }
        }
        if let Some(min) = token.minimum_swap.as_deref().and_then(|m| m.parse::<u64>().ok()) {
            if total_sats < min {
                return SwapVerification::failed(info, VerifyError::TxWithWrongValue);
            }
        }

        SwapVerification::ok(info)
    }
}

/// Minimal bitcoind JSON-RPC client.
struct BtcRpcClient {
    url: String,
    user: Option<String>,
    password: Option<String>,
    client: reqwest::Client,
}

impl BtcRpcClient {
    fn new(url: String, user: Option<String>, password: Option<String>) -> Self {
        Self {
            url,
            user,
            password,
            client: reqwest::Client::new(),
        }
    }

    /// `getrawtransaction <txid> true`; `Ok(None)` when the node does not
    /// know the transaction.
    async fn get_raw_transaction(&self, tx_id: &str) -> Result<Option<Value>, VerifyError> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": "spanbridge",
            "method": "getrawtransaction",
            "params": [tx_id, true],
        });

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.password.as_deref());
        }

        let response: Value = request
            .send()
            .await
            .map_err(|e| VerifyError::RpcQuery(e.to_string()))?
            .json()
            .await
            .map_err(|e| VerifyError::RpcQuery(e.to_string()))?;

        if let Some(err) = response.get("error").filter(|e| !e.is_null()) {
            // -5: no such mempool or blockchain transaction
            if err["code"].as_i64() == Some(-5) {
                return Ok(None);
            }
            warn!("bitcoind rpc error: {}", err);
            return Err(VerifyError::RpcQuery(err.to_string()));
        }

        Ok(Some(response["result"].clone()))
    }
}
