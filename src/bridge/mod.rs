//! Chain bridges
//!
//! All chain-specific knowledge lives behind the [`ChainBridge`] trait and
//! its optional capability traits. The core never inspects chain internals;
//! it verifies, builds and hashes through these operations only.
//!
//! Optional capabilities are separate traits held in separate registry maps
//! populated at registration time, so a caller asks the registry rather
//! than downcasting a bridge object.

pub mod btc;
pub mod evm;

use crate::error::VerifyError;

use async_trait::async_trait;
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Opaque destination-chain transaction bytes; only the bridge that built
/// them knows the encoding.
pub type RawTx = Vec<u8>;

/// What a bridge learned about a source-chain swap transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxSwapInfo {
    pub pair_id: String,
    pub tx_id: String,
    /// Contract or deposit address the transaction targeted.
    pub tx_to: String,
    /// The user's counterpart-chain address.
    pub bind: String,
    pub value: U256,

    // Router swap fields.
    #[serde(default)]
    pub for_native: bool,
    #[serde(default)]
    pub for_underlying: bool,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub path: Vec<String>,
    #[serde(default)]
    pub amount_out_min: U256,
    #[serde(default)]
    pub from_chain_id: String,
    #[serde(default)]
    pub to_chain_id: String,
    #[serde(default)]
    pub log_index: u32,
}

/// Verification result: the info a bridge could extract plus the outcome.
/// Recoverable failures (not stable yet, value out of bounds, ...) still
/// carry enough info to register the swap for later re-verification.
#[derive(Debug, Clone)]
pub struct SwapVerification {
    pub info: TxSwapInfo,
    pub outcome: Result<(), VerifyError>,
}

impl SwapVerification {
    pub fn ok(info: TxSwapInfo) -> Self {
        Self {
            info,
            outcome: Ok(()),
        }
    }

    pub fn failed(info: TxSwapInfo, err: VerifyError) -> Self {
        Self {
            info,
            outcome: Err(err),
        }
    }

    /// Collapse into a strict result, for callers that need a fully
    /// verified swap and not a registrable-with-memo one.
    pub fn into_result(self) -> Result<TxSwapInfo, VerifyError> {
        match self.outcome {
            Ok(()) => Ok(self.info),
            Err(err) => Err(err),
        }
    }
}

/// On-chain inclusion status of a transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxStatus {
    pub block_height: u64,
    pub confirmations: u64,
}

/// Fixed capability descriptor, checked by the registry instead of
/// downcasting bridge objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeCapabilities {
    /// Bridge manages destination nonces, so a parked swap may be retried.
    pub retryable_nonce: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapType {
    Swapin,
    Swapout,
    RouterSwap,
}

/// The msg-context document circulated with a sign request: everything a
/// follower needs to rebuild the destination transaction from the original
/// source event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildTxArgs {
    pub identifier: String,
    pub swap_type: SwapType,
    pub tx_type: crate::store::SwapTxType,
    pub pair_id: String,
    pub swap_id: String,
    pub bind: String,
    #[serde(default)]
    pub log_index: u32,
    #[serde(default)]
    pub for_native: bool,
    #[serde(default)]
    pub for_underlying: bool,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub path: Vec<String>,
    #[serde(default)]
    pub amount_out_min: U256,
    #[serde(default)]
    pub from_chain_id: String,
    #[serde(default)]
    pub to_chain_id: String,

    /// Sender of the destination transaction; set during rebuild, never
    /// taken from the circulated document.
    #[serde(default)]
    pub from: String,
    /// Value observed on the source chain; set during rebuild.
    #[serde(default)]
    pub origin_value: U256,
    /// Chain-specific extras (gas, nonce) chosen by the initiator.
    #[serde(default)]
    pub extra: Option<serde_json::Value>,
}

/// Core capability set every chain adapter provides.
#[async_trait]
pub trait ChainBridge: Send + Sync {
    /// Decimal chain identifier.
    fn chain_id(&self) -> &str;

    fn capabilities(&self) -> BridgeCapabilities {
        BridgeCapabilities::default()
    }

    /// Inspect a source-chain transaction and extract the swap it carries.
    /// With `allow_unstable` the bridge skips the confirmation-depth check.
    async fn verify_transaction(
        &self,
        pair_id: &str,
        tx_id: &str,
        allow_unstable: bool,
    ) -> SwapVerification;

    /// Inclusion status, `None` when the transaction is unknown.
    async fn get_transaction_status(&self, tx_id: &str) -> Option<TxStatus>;

    /// Construct the unsigned destination-chain transaction.
    async fn build_raw_transaction(&self, args: &BuildTxArgs) -> Result<RawTx, VerifyError>;

    /// Recompute the signing hash(es) of `raw_tx` and require bit-exact
    /// equality with `expected`.
    fn verify_msg_hash(&self, raw_tx: &[u8], expected: &[String]) -> Result<(), VerifyError>;

    fn is_valid_address(&self, address: &str) -> bool;
}

/// Router-swap capability: one source transaction may carry several swap
/// logs, each registered under its own log index.
#[async_trait]
pub trait RouterSwapper: Send + Sync {
    /// Sender account for router destination transactions on this chain.
    fn router_signer(&self) -> &str;

    /// Extract every swap log of the transaction, one verification per log.
    async fn register_router_swap_tx(
        &self,
        tx_id: &str,
    ) -> Result<Vec<SwapVerification>, VerifyError>;

    /// Verify one specific swap log.
    async fn verify_router_swap_tx(
        &self,
        tx_id: &str,
        log_index: u32,
        allow_unstable: bool,
    ) -> Result<TxSwapInfo, VerifyError>;
}

/// Bitcoin-only capability: P2SH deposit address derivation and deposit
/// verification.
#[async_trait]
pub trait P2shBridge: Send + Sync {
    /// The single pair this bridge serves.
    fn pair_id(&self) -> &str;

    /// Derive the deposit address and redeem script binding `bind_address`.
    fn get_p2sh_address(&self, bind_address: &str) -> Result<(String, Vec<u8>), VerifyError>;

    async fn verify_p2sh_transaction(
        &self,
        pair_id: &str,
        tx_id: &str,
        bind_address: &str,
        allow_unstable: bool,
    ) -> SwapVerification;
}

/// Process-wide bridge registry. Built once at startup, read-only after.
pub struct BridgeRegistry {
    src: Arc<dyn ChainBridge>,
    dest: Arc<dyn ChainBridge>,
    routers: HashMap<String, Arc<dyn ChainBridge>>,
    router_swappers: HashMap<String, Arc<dyn RouterSwapper>>,
    btc: Option<Arc<dyn P2shBridge>>,
}

impl BridgeRegistry {
    pub fn new(src: Arc<dyn ChainBridge>, dest: Arc<dyn ChainBridge>) -> Self {
        Self {
            src,
            dest,
            routers: HashMap::new(),
            router_swappers: HashMap::new(),
            btc: None,
        }
    }

    /// Register a router-capable bridge under its decimal chain id.
    pub fn register_router(
        &mut self,
        chain_id: impl Into<String>,
        bridge: Arc<dyn ChainBridge>,
        swapper: Arc<dyn RouterSwapper>,
    ) {
        let chain_id = chain_id.into();
        self.routers.insert(chain_id.clone(), bridge);
        self.router_swappers.insert(chain_id, swapper);
    }

    pub fn register_btc(&mut self, bridge: Arc<dyn P2shBridge>) {
        self.btc = Some(bridge);
    }

    pub fn src_bridge(&self) -> &Arc<dyn ChainBridge> {
        &self.src
    }

    pub fn dest_bridge(&self) -> &Arc<dyn ChainBridge> {
        &self.dest
    }

    /// Classic bridge selection: swapins are observed on the source chain,
    /// swapouts on the destination chain.
    pub fn bridge_for(&self, is_swapin: bool) -> &Arc<dyn ChainBridge> {
        if is_swapin {
            &self.src
        } else {
            &self.dest
        }
    }

    pub fn router_bridge(&self, chain_id: &str) -> Result<&Arc<dyn ChainBridge>, VerifyError> {
        self.routers
            .get(chain_id)
            .ok_or_else(|| VerifyError::NoBridgeForChainId(chain_id.to_string()))
    }

    pub fn router_swapper(&self, chain_id: &str) -> Result<&Arc<dyn RouterSwapper>, VerifyError> {
        if !self.routers.contains_key(chain_id) {
            return Err(VerifyError::NoBridgeForChainId(chain_id.to_string()));
        }
        self.router_swappers
            .get(chain_id)
            .ok_or(VerifyError::RouterSwapNotSupported)
    }

    pub fn btc_bridge(&self) -> Result<&Arc<dyn P2shBridge>, VerifyError> {
        self.btc.as_ref().ok_or(VerifyError::NoBtcBridge)
    }

    pub fn has_router_support(&self) -> bool {
        !self.router_swappers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockBridge;

    #[test]
    fn registry_routes_by_chain_id() {
        let src = Arc::new(MockBridge::new("1"));
        let dest = Arc::new(MockBridge::new("56"));
        let mut registry =
            BridgeRegistry::new(src.clone() as Arc<dyn ChainBridge>, dest.clone() as _);
        registry.register_router("56", dest.clone() as _, dest.clone() as _);

        assert_eq!(registry.bridge_for(true).chain_id(), "1");
        assert_eq!(registry.bridge_for(false).chain_id(), "56");
        assert!(registry.router_bridge("56").is_ok());
        assert!(matches!(
            registry.router_bridge("137"),
            Err(VerifyError::NoBridgeForChainId(_))
        ));
        assert!(registry.router_swapper("56").is_ok());
        assert!(matches!(
            registry.btc_bridge(),
            Err(VerifyError::NoBtcBridge)
        ));
    }

    #[test]
    fn build_tx_args_roundtrip_via_msg_context() {
        let args = BuildTxArgs {
            identifier: "spanbridge".into(),
            swap_type: SwapType::RouterSwap,
            tx_type: crate::store::SwapTxType::RouterSwap,
            pair_id: "ROUTER".into(),
            swap_id: "0xt".into(),
            bind: "0xbob".into(),
            log_index: 3,
            for_native: true,
            for_underlying: false,
            token: "0xtoken".into(),
            path: vec!["0xa".into(), "0xb".into()],
            amount_out_min: U256::from(900u64),
            from_chain_id: "56".into(),
            to_chain_id: "1".into(),
            from: String::new(),
            origin_value: U256::zero(),
            extra: None,
        };
        let encoded = serde_json::to_string(&args).unwrap();
        let decoded: BuildTxArgs = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.swap_id, "0xt");
        assert_eq!(decoded.log_index, 3);
        assert_eq!(decoded.amount_out_min, U256::from(900u64));
        assert_eq!(decoded.swap_type, SwapType::RouterSwap);
    }
}
