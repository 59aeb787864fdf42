//! Shared test fixtures: deterministic settings and a scriptable bridge.

use crate::bridge::{
    BridgeCapabilities, BridgeRegistry, BuildTxArgs, ChainBridge, RawTx, RouterSwapper,
    SwapVerification, TxStatus, TxSwapInfo,
};
use crate::config::{
    ApiConfig, BridgeConfig, ChainConfig, ChainKind, DatabaseConfig, MetricsConfig, MpcConfig,
    PairConfig, Settings, TokenConfig,
};
use crate::core::Core;
use crate::error::VerifyError;
use crate::store::MemSwapStore;

use async_trait::async_trait;
use ethers::utils::keccak256;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn test_settings() -> Settings {
    let mut chains = HashMap::new();
    chains.insert(
        "ethereum".to_string(),
        ChainConfig {
            chain_id: "1".into(),
            name: "ethereum".into(),
            kind: ChainKind::Evm,
            rpc_urls: vec!["http://127.0.0.1:8545".into()],
            confirmation_blocks: 12,
            router_contract: Some("0x00000000000000000000000000000000000000c0".into()),
            router_signer: Some("0x00000000000000000000000000000000000000f0".into()),
            rpc_user: None,
            rpc_password: None,
            pair_id: None,
            enabled: true,
        },
    );
    chains.insert(
        "bsc".to_string(),
        ChainConfig {
            chain_id: "56".into(),
            name: "bsc".into(),
            kind: ChainKind::Evm,
            rpc_urls: vec!["http://127.0.0.1:8546".into()],
            confirmation_blocks: 15,
            router_contract: Some("0x00000000000000000000000000000000000000c1".into()),
            router_signer: Some("0x00000000000000000000000000000000000000f1".into()),
            rpc_user: None,
            rpc_password: None,
            pair_id: None,
            enabled: true,
        },
    );
    chains.insert(
        "bitcoin".to_string(),
        ChainConfig {
            chain_id: "0".into(),
            name: "regtest".into(),
            kind: ChainKind::Bitcoin,
            rpc_urls: vec!["http://127.0.0.1:18443".into()],
            confirmation_blocks: 6,
            router_contract: None,
            router_signer: None,
            rpc_user: Some("user".into()),
            rpc_password: Some("pass".into()),
            pair_id: Some("BTC".into()),
            enabled: true,
        },
    );

    let mut pairs = HashMap::new();
    pairs.insert(
        "USDC".to_string(),
        PairConfig {
            pair_id: "USDC".into(),
            src_token: TokenConfig {
                symbol: "USDC".into(),
                decimals: 6,
                contract_address: Some("0x00000000000000000000000000000000000000a0".into()),
                deposit_address: Some("0x00000000000000000000000000000000000000d0".into()),
                signer_address: "0x00000000000000000000000000000000000000f0".into(),
                maximum_swap: Some("1000000000000".into()),
                minimum_swap: Some("100".into()),
            },
            dest_token: TokenConfig {
                symbol: "anyUSDC".into(),
                decimals: 6,
                contract_address: Some("0x00000000000000000000000000000000000000a1".into()),
                deposit_address: None,
                signer_address: "0x00000000000000000000000000000000000000f1".into(),
                maximum_swap: None,
                minimum_swap: None,
            },
        },
    );
    pairs.insert(
        "BTC".to_string(),
        PairConfig {
            pair_id: "BTC".into(),
            src_token: TokenConfig {
                symbol: "BTC".into(),
                decimals: 8,
                contract_address: None,
                deposit_address: None,
                // secp256k1 generator point, a valid compressed pubkey
                signer_address:
                    "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798".into(),
                maximum_swap: Some("1000000000".into()),
                minimum_swap: Some("10000".into()),
            },
            dest_token: TokenConfig {
                symbol: "anyBTC".into(),
                decimals: 8,
                contract_address: Some("0x00000000000000000000000000000000000000a2".into()),
                deposit_address: None,
                signer_address: "0x00000000000000000000000000000000000000f1".into(),
                maximum_swap: None,
                minimum_swap: None,
            },
        },
    );

    Settings {
        log_filter: None,
        bridge: BridgeConfig {
            identifier: "spanbridge".into(),
            src_chain: "ethereum".into(),
            dest_chain: "bsc".into(),
        },
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 2,
        },
        api: ApiConfig {
            host: "127.0.0.1".into(),
            port: 0,
        },
        metrics: MetricsConfig {
            enabled: false,
            port: 0,
        },
        mpc: MpcConfig {
            enabled: true,
            rpc_url: "http://127.0.0.1:5870".into(),
            initiators: vec!["0xInitiator".into()],
        },
        chains,
        pairs,
    }
}

/// Scriptable bridge standing in for a chain adapter. Every behavior is
/// preset through the `set_*` methods; verification calls are counted so
/// tests can assert on short-circuits.
pub struct MockBridge {
    chain_id: String,
    router_signer: String,
    verification: Mutex<Option<SwapVerification>>,
    stable_verification: Mutex<Option<SwapVerification>>,
    tx_status: Mutex<Option<TxStatus>>,
    router_registrations: Mutex<Vec<SwapVerification>>,
    router_verification: Mutex<Option<Result<TxSwapInfo, VerifyError>>>,
    raw_tx: Mutex<Vec<u8>>,
    nonce_capable: AtomicBool,
    stable_verify_count: AtomicUsize,
    router_verify_count: AtomicUsize,
}

impl MockBridge {
    pub fn new(chain_id: &str) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            router_signer: "0x00000000000000000000000000000000000000f0".into(),
            verification: Mutex::new(None),
            stable_verification: Mutex::new(None),
            tx_status: Mutex::new(None),
            router_registrations: Mutex::new(Vec::new()),
            router_verification: Mutex::new(None),
            raw_tx: Mutex::new(b"mock raw tx".to_vec()),
            nonce_capable: AtomicBool::new(true),
            stable_verify_count: AtomicUsize::new(0),
            router_verify_count: AtomicUsize::new(0),
        }
    }

    pub fn set_verification(&self, verification: SwapVerification) {
        *self.verification.lock().unwrap() = Some(verification);
    }

    pub fn set_stable_verification(&self, verification: SwapVerification) {
        *self.stable_verification.lock().unwrap() = Some(verification);
    }

    pub fn set_tx_status(&self, status: Option<TxStatus>) {
        *self.tx_status.lock().unwrap() = status;
    }

    pub fn set_router_registrations(&self, verifications: Vec<SwapVerification>) {
        *self.router_registrations.lock().unwrap() = verifications;
    }

    pub fn set_router_verification(&self, result: Result<TxSwapInfo, VerifyError>) {
        *self.router_verification.lock().unwrap() = Some(result);
    }

    pub fn set_raw_tx(&self, raw: Vec<u8>) {
        *self.raw_tx.lock().unwrap() = raw;
    }

    pub fn set_nonce_capable(&self, capable: bool) {
        self.nonce_capable.store(capable, Ordering::Relaxed);
    }

    pub fn stable_verify_calls(&self) -> usize {
        self.stable_verify_count.load(Ordering::Relaxed)
    }

    pub fn router_verify_calls(&self) -> usize {
        self.router_verify_count.load(Ordering::Relaxed)
    }

    fn default_verification(&self, pair_id: &str, tx_id: &str) -> SwapVerification {
        SwapVerification::failed(
            TxSwapInfo {
                pair_id: pair_id.to_string(),
                tx_id: tx_id.to_string(),
                ..Default::default()
            },
            VerifyError::TxNotFound,
        )
    }
}

#[async_trait]
impl ChainBridge for MockBridge {
    fn chain_id(&self) -> &str {
        &self.chain_id
    }

    fn capabilities(&self) -> BridgeCapabilities {
        BridgeCapabilities {
            retryable_nonce: self.nonce_capable.load(Ordering::Relaxed),
        }
    }

    async fn verify_transaction(
        &self,
        pair_id: &str,
        tx_id: &str,
        allow_unstable: bool,
    ) -> SwapVerification {
        if allow_unstable {
            self.verification
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| self.default_verification(pair_id, tx_id))
        } else {
            self.stable_verify_count.fetch_add(1, Ordering::Relaxed);
            let stable = self.stable_verification.lock().unwrap().clone();
            stable
                .or_else(|| self.verification.lock().unwrap().clone())
                .unwrap_or_else(|| self.default_verification(pair_id, tx_id))
        }
    }

    async fn get_transaction_status(&self, _tx_id: &str) -> Option<TxStatus> {
        self.tx_status.lock().unwrap().clone()
    }

    async fn build_raw_transaction(&self, _args: &BuildTxArgs) -> Result<RawTx, VerifyError> {
        Ok(self.raw_tx.lock().unwrap().clone())
    }

    fn verify_msg_hash(&self, raw_tx: &[u8], expected: &[String]) -> Result<(), VerifyError> {
        if expected.len() != 1 {
            return Err(VerifyError::WrongCountOfMsgHashes);
        }
        let computed = hex::encode(keccak256(raw_tx));
        let wanted = expected[0].trim_start_matches("0x");
        if !computed.eq_ignore_ascii_case(wanted) {
            return Err(VerifyError::MsgHashMismatch);
        }
        Ok(())
    }

    fn is_valid_address(&self, address: &str) -> bool {
        !address.is_empty()
    }
}

#[async_trait]
impl RouterSwapper for MockBridge {
    fn router_signer(&self) -> &str {
        &self.router_signer
    }

    async fn register_router_swap_tx(
        &self,
        _tx_id: &str,
    ) -> Result<Vec<SwapVerification>, VerifyError> {
        Ok(self.router_registrations.lock().unwrap().clone())
    }

    async fn verify_router_swap_tx(
        &self,
        _tx_id: &str,
        _log_index: u32,
        _allow_unstable: bool,
    ) -> Result<TxSwapInfo, VerifyError> {
        self.router_verify_count.fetch_add(1, Ordering::Relaxed);
        self.router_verification
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(Err(VerifyError::TxNotFound))
    }
}

/// A [`Core`] over the in-memory store with the two mock bridges wired as
/// the classic pair and as routers under their chain ids.
pub fn test_core(src: Arc<MockBridge>, dest: Arc<MockBridge>) -> Core {
    let mut registry = BridgeRegistry::new(
        src.clone() as Arc<dyn ChainBridge>,
        dest.clone() as Arc<dyn ChainBridge>,
    );
    registry.register_router(
        src.chain_id.clone(),
        src.clone() as Arc<dyn ChainBridge>,
        src.clone() as Arc<dyn RouterSwapper>,
    );
    registry.register_router(
        dest.chain_id.clone(),
        dest.clone() as Arc<dyn ChainBridge>,
        dest.clone() as Arc<dyn RouterSwapper>,
    );

    Core::new(
        Arc::new(test_settings()),
        Arc::new(registry),
        Arc::new(MemSwapStore::new()),
    )
}
