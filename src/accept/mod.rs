//! Sign-acceptance worker
//!
//! Each quorum node runs one of these loops. For every pending sign
//! request it rebuilds the destination transaction from the original
//! source-chain event and votes AGREE only when hashing its own
//! reconstruction reproduces the circulated message hash. The initiator's
//! hash is never trusted, so a vote is a function of observable on-chain
//! state alone.
//!
//! Failures that merely mean "cannot decide yet" (or "not addressed to
//! us") skip voting entirely and leave the request for a later round;
//! every other failure votes DISAGREE. Submitted votes are remembered in a
//! bounded history so replaying a request yields the same vote without
//! re-verification.

use crate::bridge::{BuildTxArgs, SwapType};
use crate::core::Core;
use crate::error::VerifyError;
use crate::mpc::{SignClient, SignInfoData, SignVote};
use crate::store::SwapTxType;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, trace, warn};

const RETRY_INTERVAL: Duration = Duration::from_secs(3);
const WAIT_INTERVAL: Duration = Duration::from_secs(20);
const ACCEPT_HISTORY_CAPACITY: usize = 500;

/// Identifier used by replace-swap requests regardless of deployment.
const REPLACE_SWAP_IDENTIFIER: &str = "ReplaceSwap";

#[derive(Error, Debug)]
enum AcceptError {
    #[error("initiator mismatch")]
    InitiatorMismatch,

    #[error("wrong msg context")]
    WrongMsgContext,

    #[error("identifier mismatch")]
    IdentifierMismatch,

    #[error(transparent)]
    Verify(#[from] VerifyError),
}

impl AcceptError {
    /// Requests in this class are skipped (no vote) so transient chain
    /// instability or foreign requests never produce spurious DISAGREEs.
    fn is_ignorable(&self) -> bool {
        match self {
            AcceptError::InitiatorMismatch
            | AcceptError::WrongMsgContext
            | AcceptError::IdentifierMismatch => true,
            AcceptError::Verify(err) => matches!(
                err,
                VerifyError::NoBridgeForChainId(_)
                    | VerifyError::RouterSwapNotSupported
                    | VerifyError::UnknownPairId(_)
                    | VerifyError::NoBtcBridge
                    | VerifyError::TxNotStable
                    | VerifyError::TxNotFound
            ),
        }
    }
}

#[derive(Debug, Clone)]
struct AcceptRecord {
    vote: SignVote,
    msg_hash: Vec<String>,
    msg_context: Vec<String>,
}

/// Bounded vote history: FIFO eviction, O(1) lookup through the key map.
/// Process-local; discarded on restart.
struct SignHistory {
    capacity: usize,
    inner: RwLock<HistoryInner>,
}

#[derive(Default)]
struct HistoryInner {
    order: VecDeque<String>,
    entries: HashMap<String, AcceptRecord>,
}

impl SignHistory {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(HistoryInner::default()),
        }
    }

    async fn get(&self, key_id: &str) -> Option<AcceptRecord> {
        self.inner.read().await.entries.get(key_id).cloned()
    }

    async fn add(&self, key_id: String, record: AcceptRecord) {
        let mut inner = self.inner.write().await;
        if inner.entries.contains_key(&key_id) {
            inner.entries.insert(key_id, record);
            return;
        }
        if inner.order.len() == self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.entries.remove(&evicted);
            }
        }
        inner.order.push_back(key_id.clone());
        inner.entries.insert(key_id, record);
    }

    async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }
}

pub struct AcceptWorker {
    core: Core,
    client: Arc<dyn SignClient>,
    history: SignHistory,
}

impl AcceptWorker {
    pub fn new(core: Core, client: Arc<dyn SignClient>) -> Self {
        Self {
            core,
            client,
            history: SignHistory::new(ACCEPT_HISTORY_CAPACITY),
        }
    }

    /// Main loop; runs for process lifetime.
    pub async fn run(&self) {
        if !self.core.settings.mpc.enabled {
            info!("no need to start accept sign job as mpc is disabled");
            return;
        }
        info!("start accept sign job");

        loop {
            let sign_info = match self.client.get_cur_node_sign_info().await {
                Ok(list) => list,
                Err(err) => {
                    error!(%err, "getCurNodeSignInfo failed");
                    tokio::time::sleep(RETRY_INTERVAL).await;
                    continue;
                }
            };
            debug!(count = sign_info.len(), "acceptSign");
            for info in &sign_info {
                self.process_request(info).await;
            }
            tokio::time::sleep(WAIT_INTERVAL).await;
        }
    }

    async fn process_request(&self, sign_info: &SignInfoData) {
        let key_id = &sign_info.key;
        crate::metrics::record_sign_request();

        // Replaying a known request resubmits the remembered vote
        // without touching any chain.
        if let Some(prior) = self.history.get(key_id).await {
            debug!(key_id, vote = prior.vote.as_str(), "history sign");
            let _ = self
                .client
                .do_accept_sign(key_id, prior.vote, &prior.msg_hash, &prior.msg_context)
                .await;
            return;
        }

        let vote = match self.verify_sign_info(sign_info).await {
            Ok(()) => SignVote::Agree,
            Err(err) if err.is_ignorable() => {
                trace!(key_id, %err, "ignore sign");
                crate::metrics::record_sign_ignored();
                return;
            }
            Err(err) => {
                warn!(key_id, %err, "DISAGREE sign");
                SignVote::Disagree
            }
        };

        info!(key_id, vote = vote.as_str(), "accept sign");
        match self
            .client
            .do_accept_sign(key_id, vote, &sign_info.msg_hash, &sign_info.msg_context)
            .await
        {
            Ok(_) => {
                self.history
                    .add(
                        key_id.clone(),
                        AcceptRecord {
                            vote,
                            msg_hash: sign_info.msg_hash.clone(),
                            msg_context: sign_info.msg_context.clone(),
                        },
                    )
                    .await;
                crate::metrics::record_sign_vote(vote);
            }
            Err(err) => error!(key_id, %err, "accept sign job failed"),
        }
    }

    async fn verify_sign_info(&self, sign_info: &SignInfoData) -> Result<(), AcceptError> {
        if !self.core.settings.is_initiator(&sign_info.account) {
            return Err(AcceptError::InitiatorMismatch);
        }
        if sign_info.msg_context.len() != 1 {
            return Err(AcceptError::WrongMsgContext);
        }
        let args: BuildTxArgs = serde_json::from_str(&sign_info.msg_context[0])
            .map_err(|_| AcceptError::WrongMsgContext)?;
        if args.identifier != self.core.identifier() && args.identifier != REPLACE_SWAP_IDENTIFIER {
            return Err(AcceptError::IdentifierMismatch);
        }
        debug!(msg_hash = ?sign_info.msg_hash, swap_id = %args.swap_id, "verifySignInfo");
        self.rebuild_and_verify_msg_hash(&sign_info.msg_hash, args)
            .await
    }

    /// Rebuild the destination transaction from the source event and check
    /// that hashing it reproduces the circulated hash bit-exactly.
    async fn rebuild_and_verify_msg_hash(
        &self,
        msg_hash: &[String],
        mut args: BuildTxArgs,
    ) -> Result<(), AcceptError> {
        let (dst_bridge, signer, origin_value) = match args.swap_type {
            SwapType::RouterSwap => {
                let src_swapper = self.core.bridges.router_swapper(&args.from_chain_id)?;
                let dst_bridge = self.core.bridges.router_bridge(&args.to_chain_id)?;
                let dst_swapper = self.core.bridges.router_swapper(&args.to_chain_id)?;

                let swap_info = src_swapper
                    .verify_router_swap_tx(&args.swap_id, args.log_index, false)
                    .await?;
                (
                    dst_bridge,
                    dst_swapper.router_signer().to_string(),
                    swap_info.value,
                )
            }
            SwapType::Swapin | SwapType::Swapout => {
                let is_swapin = args.swap_type == SwapType::Swapin;
                let src_bridge = self.core.bridges.bridge_for(is_swapin);
                let dst_bridge = self.core.bridges.bridge_for(!is_swapin);
                let pair = self
                    .core
                    .settings
                    .pair(&args.pair_id)
                    .ok_or_else(|| VerifyError::UnknownPairId(args.pair_id.clone()))?;

                let swap_info = if args.tx_type == SwapTxType::P2shSwapin {
                    let btc = self.core.bridges.btc_bridge()?;
                    btc.verify_p2sh_transaction(&args.pair_id, &args.swap_id, &args.bind, false)
                        .await
                        .into_result()?
                } else {
                    src_bridge
                        .verify_transaction(&args.pair_id, &args.swap_id, false)
                        .await
                        .into_result()?
                };

                // The counterpart transaction lands on the opposite side.
                let signer = if is_swapin {
                    pair.dest_token.signer_address.clone()
                } else {
                    pair.src_token.signer_address.clone()
                };
                (dst_bridge, signer, swap_info.value)
            }
        };

        // The sender and value come from configuration and the source
        // event, never from the circulated document.
        args.from = signer;
        args.origin_value = origin_value;

        let raw_tx = dst_bridge.build_raw_transaction(&args).await?;
        dst_bridge.verify_msg_hash(&raw_tx, msg_hash)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::TxSwapInfo;
    use crate::mpc::MpcError;
    use crate::testutil::{test_core, MockBridge};
    use async_trait::async_trait;
    use ethers::types::U256;
    use ethers::utils::keccak256;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockSignClient {
        votes: Mutex<Vec<(String, SignVote)>>,
    }

    #[async_trait]
    impl SignClient for MockSignClient {
        async fn get_cur_node_sign_info(&self) -> Result<Vec<SignInfoData>, MpcError> {
            Ok(Vec::new())
        }

        async fn do_accept_sign(
            &self,
            key_id: &str,
            vote: SignVote,
            _msg_hash: &[String],
            _msg_context: &[String],
        ) -> Result<String, MpcError> {
            self.votes.lock().unwrap().push((key_id.to_string(), vote));
            Ok("Success".to_string())
        }
    }

    fn router_args(identifier: &str) -> BuildTxArgs {
        BuildTxArgs {
            identifier: identifier.into(),
            swap_type: SwapType::RouterSwap,
            tx_type: SwapTxType::RouterSwap,
            pair_id: "0xtoken".into(),
            swap_id: "0xt".into(),
            bind: "0xbob".into(),
            log_index: 0,
            for_native: false,
            for_underlying: false,
            token: "0xtoken".into(),
            path: Vec::new(),
            amount_out_min: U256::zero(),
            from_chain_id: "56".into(),
            to_chain_id: "1".into(),
            from: String::new(),
            origin_value: U256::zero(),
            extra: None,
        }
    }

    fn sign_request(key_id: &str, account: &str, args: &BuildTxArgs, msg_hash: &str) -> SignInfoData {
        SignInfoData {
            key: key_id.into(),
            account: account.into(),
            msg_hash: vec![msg_hash.into()],
            msg_context: vec![serde_json::to_string(args).unwrap()],
        }
    }

    fn worker_with_router_bridges() -> (AcceptWorker, Arc<MockBridge>, Arc<MockBridge>, Arc<MockSignClient>) {
        // Source chain 56 verifies the swap; destination chain 1 builds.
        let src = Arc::new(MockBridge::new("56"));
        let dst = Arc::new(MockBridge::new("1"));
        src.set_router_verification(Ok(TxSwapInfo {
            pair_id: "0xtoken".into(),
            tx_id: "0xt".into(),
            bind: "0xbob".into(),
            value: U256::from(1000u64),
            ..Default::default()
        }));
        dst.set_raw_tx(b"counterpart tx".to_vec());

        let core = test_core(src.clone(), dst.clone());
        let client = Arc::new(MockSignClient::default());
        let worker = AcceptWorker::new(core, client.clone());
        (worker, src, dst, client)
    }

    fn good_hash() -> String {
        hex::encode(keccak256(b"counterpart tx"))
    }

    #[tokio::test]
    async fn matching_reconstruction_votes_agree() {
        let (worker, _src, _dst, client) = worker_with_router_bridges();
        let args = router_args("spanbridge");
        let request = sign_request("key1", "0xinitiator", &args, &good_hash());

        worker.process_request(&request).await;

        let votes = client.votes.lock().unwrap().clone();
        assert_eq!(votes, vec![("key1".to_string(), SignVote::Agree)]);
        assert_eq!(worker.history.len().await, 1);
    }

    #[tokio::test]
    async fn diverging_hash_votes_disagree_and_replays_from_history() {
        let (worker, src, _dst, client) = worker_with_router_bridges();
        let args = router_args("spanbridge");
        let request = sign_request("key1", "0xinitiator", &args, &hex::encode([0u8; 32]));

        worker.process_request(&request).await;
        assert_eq!(src.router_verify_calls(), 1);

        // Same key replayed: same vote, no re-verification.
        worker.process_request(&request).await;
        assert_eq!(src.router_verify_calls(), 1, "history short-circuits verification");

        let votes = client.votes.lock().unwrap().clone();
        assert_eq!(
            votes,
            vec![
                ("key1".to_string(), SignVote::Disagree),
                ("key1".to_string(), SignVote::Disagree),
            ]
        );
    }

    #[tokio::test]
    async fn ignorable_failures_skip_voting() {
        let (worker, _src, _dst, client) = worker_with_router_bridges();

        // Unknown initiator.
        let args = router_args("spanbridge");
        let request = sign_request("key1", "0xstranger", &args, &good_hash());
        worker.process_request(&request).await;

        // Foreign identifier.
        let args = router_args("some-other-bridge");
        let request = sign_request("key2", "0xinitiator", &args, &good_hash());
        worker.process_request(&request).await;

        // Unknown destination chain.
        let mut args = router_args("spanbridge");
        args.to_chain_id = "137".into();
        let request = sign_request("key3", "0xinitiator", &args, &good_hash());
        worker.process_request(&request).await;

        // Malformed context.
        let mut request = sign_request("key4", "0xinitiator", &router_args("spanbridge"), &good_hash());
        request.msg_context = vec!["not json".into()];
        worker.process_request(&request).await;

        assert!(client.votes.lock().unwrap().is_empty());
        assert_eq!(worker.history.len().await, 0, "ignored requests leave no history");
    }

    #[tokio::test]
    async fn unstable_source_tx_is_left_for_a_later_round() {
        let (worker, src, _dst, client) = worker_with_router_bridges();
        src.set_router_verification(Err(VerifyError::TxNotStable));

        let args = router_args("spanbridge");
        let request = sign_request("key1", "0xinitiator", &args, &good_hash());
        worker.process_request(&request).await;

        assert!(client.votes.lock().unwrap().is_empty());

        // Once the source stabilizes the same request goes through.
        src.set_router_verification(Ok(TxSwapInfo {
            value: U256::from(1000u64),
            ..Default::default()
        }));
        worker.process_request(&request).await;
        let votes = client.votes.lock().unwrap().clone();
        assert_eq!(votes, vec![("key1".to_string(), SignVote::Agree)]);
    }

    #[tokio::test]
    async fn replace_swap_identifier_is_accepted() {
        let (worker, _src, _dst, client) = worker_with_router_bridges();
        let args = router_args(REPLACE_SWAP_IDENTIFIER);
        let request = sign_request("key1", "0xinitiator", &args, &good_hash());
        worker.process_request(&request).await;
        let votes = client.votes.lock().unwrap().clone();
        assert_eq!(votes, vec![("key1".to_string(), SignVote::Agree)]);
    }

    fn classic_args(pair_id: &str) -> BuildTxArgs {
        BuildTxArgs {
            identifier: "spanbridge".into(),
            swap_type: SwapType::Swapin,
            tx_type: SwapTxType::Swapin,
            pair_id: pair_id.into(),
            swap_id: "0xa".into(),
            bind: "0xbob".into(),
            log_index: 0,
            for_native: false,
            for_underlying: false,
            token: String::new(),
            path: Vec::new(),
            amount_out_min: U256::zero(),
            from_chain_id: String::new(),
            to_chain_id: String::new(),
            from: String::new(),
            origin_value: U256::zero(),
            extra: None,
        }
    }

    #[tokio::test]
    async fn classic_swapin_rebuild_votes_agree() {
        let src = Arc::new(MockBridge::new("1"));
        let dst = Arc::new(MockBridge::new("56"));
        src.set_stable_verification(crate::bridge::SwapVerification::ok(TxSwapInfo {
            pair_id: "USDC".into(),
            tx_id: "0xa".into(),
            bind: "0xbob".into(),
            value: U256::from(1000u64),
            ..Default::default()
        }));
        dst.set_raw_tx(b"counterpart tx".to_vec());
        let core = test_core(src.clone(), dst.clone());
        let client = Arc::new(MockSignClient::default());
        let worker = AcceptWorker::new(core, client.clone());

        let request = sign_request("key1", "0xinitiator", &classic_args("USDC"), &good_hash());
        worker.process_request(&request).await;

        let votes = client.votes.lock().unwrap().clone();
        assert_eq!(votes, vec![("key1".to_string(), SignVote::Agree)]);
        assert_eq!(src.stable_verify_calls(), 1);
    }

    #[tokio::test]
    async fn classic_ignorables_skip_voting() {
        let src = Arc::new(MockBridge::new("1"));
        let dst = Arc::new(MockBridge::new("56"));
        let core = test_core(src.clone(), dst.clone());
        let client = Arc::new(MockSignClient::default());
        let worker = AcceptWorker::new(core, client.clone());

        // Unknown pair.
        let request = sign_request("key1", "0xinitiator", &classic_args("NOPE"), &good_hash());
        worker.process_request(&request).await;

        // P2SH swapin without a bitcoin bridge.
        let mut args = classic_args("BTC");
        args.tx_type = SwapTxType::P2shSwapin;
        let request = sign_request("key2", "0xinitiator", &args, &good_hash());
        worker.process_request(&request).await;

        assert!(client.votes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_evicts_oldest_at_capacity() {
        let history = SignHistory::new(3);
        for i in 0..4 {
            history
                .add(
                    format!("key{i}"),
                    AcceptRecord {
                        vote: SignVote::Agree,
                        msg_hash: Vec::new(),
                        msg_context: Vec::new(),
                    },
                )
                .await;
        }
        assert_eq!(history.len().await, 3);
        assert!(history.get("key0").await.is_none(), "oldest entry evicted");
        assert!(history.get("key1").await.is_some());
        assert!(history.get("key3").await.is_some());
    }
}
