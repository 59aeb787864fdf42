//! Swap registration service
//!
//! Converts user submissions into verified swap records. Verification runs
//! against the source chain with the unstable view first; if that fails on
//! an already-mined transaction the stable view's answer wins. The
//! [`should_register_swap`] gate decides between persisting the swap (with
//! the error text as memo) and rejecting the submission outright.

use crate::api::types::{MapIntResult, P2shAddressInfo, SUCCESS_POST_RESULT};
use crate::bridge::SwapVerification;
use crate::core::Core;
use crate::error::{should_register_swap, RpcError, VerifyError};
use crate::store::{
    status_from_verify_outcome, StoreError, SwapRecord, SwapStatus, SwapStore, SwapTxType,
};

use bitcoin::ScriptBuf;
use tracing::{info, warn};

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Register a swapin observed on the source chain.
pub async fn swapin(core: &Core, tx_id: &str, pair_id: &str) -> Result<&'static str, RpcError> {
    swap(core, tx_id, pair_id, true).await
}

/// Register a swapout observed on the destination chain.
pub async fn swapout(core: &Core, tx_id: &str, pair_id: &str) -> Result<&'static str, RpcError> {
    swap(core, tx_id, pair_id, false).await
}

async fn swap(
    core: &Core,
    tx_id: &str,
    pair_id: &str,
    is_swapin: bool,
) -> Result<&'static str, RpcError> {
    let bridge = core.bridges.bridge_for(is_swapin);

    let mut verification = bridge.verify_transaction(pair_id, tx_id, true).await;
    if verification.outcome.is_err() {
        // The unstable view can miss a transaction the chain has already
        // mined; prefer the stable verdict in that case.
        if let Some(status) = bridge.get_transaction_status(tx_id).await {
            if status.block_height > 0 {
                verification = bridge.verify_transaction(pair_id, tx_id, false).await;
            }
        }
    }

    let tx_type = if is_swapin {
        SwapTxType::Swapin
    } else {
        SwapTxType::Swapout
    };
    add_swap_to_database(core, tx_id, tx_type, verification).await?;
    Ok(SUCCESS_POST_RESULT)
}

async fn add_swap_to_database(
    core: &Core,
    tx_id: &str,
    tx_type: SwapTxType,
    verification: SwapVerification,
) -> Result<(), RpcError> {
    if !should_register_swap(&verification.outcome) {
        let err = verification.outcome.unwrap_err();
        return Err(RpcError::verify_failed("verify swap failed!", err));
    }

    let memo = verification
        .outcome
        .as_ref()
        .err()
        .map(|e| e.to_string())
        .unwrap_or_default();
    let info = verification.info;
    let swap = SwapRecord {
        pair_id: info.pair_id,
        tx_id: tx_id.to_string(),
        tx_to: info.tx_to,
        tx_type,
        // Address-based chains key swaps on the lowercased bind.
        bind: info.bind.to_lowercase(),
        status: status_from_verify_outcome(&verification.outcome),
        timestamp: now(),
        memo,
        for_native: false,
        for_underlying: false,
        token: String::new(),
        path: Vec::new(),
        amount_out_min: String::new(),
        from_chain_id: String::new(),
        to_chain_id: String::new(),
        log_index: 0,
    };

    let is_swapin = tx_type == SwapTxType::Swapin;
    info!(is_swapin, tx_id = %swap.tx_id, pair_id = %swap.pair_id, bind = %swap.bind, "add swap");
    let added = if is_swapin {
        core.store.add_swapin(&swap).await
    } else {
        core.store.add_swapout(&swap).await
    };
    added.map_err(RpcError::internal)?;
    crate::metrics::record_swap_registered(tx_type);
    Ok(())
}

/// Reset a parked swapin to `TxNotStable` so the verifier picks it up
/// again. Only permitted when the source bridge manages nonces and the
/// current status is in the retryable subset.
pub async fn retry_swapin(core: &Core, tx_id: &str, pair_id: &str) -> Result<&'static str, RpcError> {
    let bridge = core.bridges.src_bridge();
    if !bridge.capabilities().retryable_nonce {
        return Err(RpcError::swap_cannot_retry());
    }

    let info = bridge
        .verify_transaction(pair_id, tx_id, false)
        .await
        .into_result()
        .map_err(|e| RpcError::verify_failed("retry swapin failed!", e))?;

    let bind = info.bind.to_lowercase();
    let swap = core
        .store
        .find_swapin(tx_id, pair_id, &bind)
        .await
        .map_err(|_| RpcError::internal("item not found"))?;
    if !swap.status.can_retry() {
        return Err(RpcError::swap_cannot_retry());
    }

    core.store
        .update_swapin_status(tx_id, pair_id, &bind, SwapStatus::TxNotStable, now(), Some(""))
        .await
        .map_err(RpcError::internal)?;
    Ok(SUCCESS_POST_RESULT)
}

/// Register a Bitcoin P2SH deposit. The bind address is supplied by the
/// caller because the deposit address itself encodes it.
pub async fn p2sh_swapin(core: &Core, tx_id: &str, bind: &str) -> Result<&'static str, RpcError> {
    let btc = core
        .bridges
        .btc_bridge()
        .map_err(|_| RpcError::not_btc_bridge())?;
    let pair_id = btc.pair_id().to_string();

    // Reject duplicates before spending a chain query.
    if core.store.find_swapin(tx_id, &pair_id, bind).await.is_ok() {
        return Err(RpcError::internal(StoreError::Duplicate));
    }

    let verification = btc.verify_p2sh_transaction(&pair_id, tx_id, bind, true).await;
    if !should_register_swap(&verification.outcome) {
        let err = verification.outcome.unwrap_err();
        return Err(RpcError::verify_failed("verify p2sh swapin failed!", err));
    }

    let memo = verification
        .outcome
        .as_ref()
        .err()
        .map(|e| e.to_string())
        .unwrap_or_default();
    let swap = SwapRecord {
        pair_id: verification.info.pair_id,
        tx_id: tx_id.to_string(),
        tx_to: verification.info.tx_to,
        tx_type: SwapTxType::P2shSwapin,
        // Bitcoin-side binds keep their case.
        bind: bind.to_string(),
        status: status_from_verify_outcome(&verification.outcome),
        timestamp: now(),
        memo,
        for_native: false,
        for_underlying: false,
        token: String::new(),
        path: Vec::new(),
        amount_out_min: String::new(),
        from_chain_id: String::new(),
        to_chain_id: String::new(),
        log_index: 0,
    };
    core.store
        .add_swapin(&swap)
        .await
        .map_err(RpcError::internal)?;
    info!(tx_id, bind, "add p2sh swapin");
    crate::metrics::record_swap_registered(SwapTxType::P2shSwapin);
    Ok(SUCCESS_POST_RESULT)
}

/// Register every swap log of a router transaction. Partial success is
/// normal: the response maps each log index to its own outcome.
pub async fn register_router_swap(
    core: &Core,
    from_chain_id: &str,
    tx_id: &str,
) -> Result<MapIntResult, RpcError> {
    if !core.bridges.has_router_support() {
        return Err(RpcError::internal(VerifyError::RouterSwapNotSupported));
    }
    let chain_id = ethers::types::U256::from_dec_str(from_chain_id)
        .map_err(|e| RpcError::internal(e))?
        .to_string();
    let swapper = core
        .bridges
        .router_swapper(&chain_id)
        .map_err(RpcError::internal)?;

    let verifications = swapper
        .register_router_swap_tx(tx_id)
        .await
        .map_err(|e| RpcError::verify_failed("register router swap failed!", e))?;

    let mut result = MapIntResult::new();
    for verification in verifications {
        let log_index = verification.info.log_index;
        if !should_register_swap(&verification.outcome) {
            let err = verification.outcome.unwrap_err();
            result.insert(log_index, format!("failed: {}", err));
            continue;
        }
        let memo = verification
            .outcome
            .as_ref()
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        let info = verification.info;
        let swap = SwapRecord {
            pair_id: info.pair_id,
            tx_id: tx_id.to_string(),
            tx_to: info.tx_to,
            tx_type: SwapTxType::RouterSwap,
            bind: info.bind.to_lowercase(),
            status: status_from_verify_outcome(&verification.outcome),
            timestamp: now(),
            memo,
            for_native: info.for_native,
            for_underlying: info.for_underlying,
            token: info.token,
            path: info.path,
            amount_out_min: info.amount_out_min.to_string(),
            from_chain_id: chain_id.clone(),
            to_chain_id: info.to_chain_id,
            log_index,
        };
        match core.store.add_router_swap(&swap).await {
            Ok(()) => {
                info!(tx_id, log_index, "add router swap");
                crate::metrics::record_swap_registered(SwapTxType::RouterSwap);
            }
            Err(err) => warn!(tx_id, log_index, %err, "add router swap"),
        }
        result.insert(log_index, "success".to_string());
    }
    Ok(result)
}

/// Register an account address; addresses are lowercased before use.
pub async fn register_address(core: &Core, address: &str) -> Result<&'static str, RpcError> {
    let address = address.to_lowercase();
    core.store
        .add_registered_address(&address, now())
        .await
        .map_err(RpcError::internal)?;
    info!(%address, "register address");
    Ok(SUCCESS_POST_RESULT)
}

/// Derive (and on first sight persist) the P2SH deposit address binding
/// `bind_address`.
pub async fn register_p2sh_address(
    core: &Core,
    bind_address: &str,
) -> Result<P2shAddressInfo, RpcError> {
    calc_p2sh_address(core, bind_address, true).await
}

/// Resolve an existing P2SH address back to its bind and re-derive.
pub async fn get_p2sh_address_info(
    core: &Core,
    p2sh_address: &str,
) -> Result<P2shAddressInfo, RpcError> {
    let bind_address = core
        .store
        .find_p2sh_bind_address(p2sh_address)
        .await
        .map_err(RpcError::internal)?;
    calc_p2sh_address(core, &bind_address, false).await
}

async fn calc_p2sh_address(
    core: &Core,
    bind_address: &str,
    add_to_database: bool,
) -> Result<P2shAddressInfo, RpcError> {
    let btc = core
        .bridges
        .btc_bridge()
        .map_err(|_| RpcError::not_btc_bridge())?;

    let (p2sh_address, redeem_script) = btc
        .get_p2sh_address(bind_address)
        .map_err(RpcError::internal)?;
    let disasm = ScriptBuf::from_bytes(redeem_script.clone()).to_asm_string();

    if add_to_database && core.store.find_p2sh_address(bind_address).await.is_err() {
        let record = crate::store::P2shAddressRecord {
            bind_address: bind_address.to_string(),
            p2sh_address: p2sh_address.clone(),
        };
        if let Err(err) = core.store.add_p2sh_address(&record).await {
            warn!(bind_address, %err, "add p2sh address");
        }
    }

    Ok(P2shAddressInfo {
        bind_address: bind_address.to_string(),
        p2sh_address,
        redeem_script: hex::encode(&redeem_script),
        redeem_script_disasm: disasm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::TxSwapInfo;
    use crate::testutil::{test_core, MockBridge};
    use ethers::types::U256;
    use std::sync::Arc;

    fn verified_info(pair_id: &str, bind: &str, value: u64) -> TxSwapInfo {
        TxSwapInfo {
            pair_id: pair_id.into(),
            tx_to: "0xdeposit".into(),
            bind: bind.into(),
            value: U256::from(value),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn happy_swapin_registers_not_stable() {
        let src = Arc::new(MockBridge::new("1"));
        src.set_verification(SwapVerification::ok(verified_info("USDC", "0xBob", 1000)));
        let core = test_core(src.clone(), Arc::new(MockBridge::new("56")));

        let posted = swapin(&core, "0xa", "USDC").await.unwrap();
        assert_eq!(posted, SUCCESS_POST_RESULT);

        let swap = core.store.find_swapin("0xa", "USDC", "0xbob").await.unwrap();
        assert_eq!(swap.status, SwapStatus::TxNotStable);
        assert!(swap.memo.is_empty());
        assert_eq!(swap.bind, "0xbob", "bind is lowercased");

        // Second identical call surfaces the duplicate.
        let err = swapin(&core, "0xa", "USDC").await.unwrap_err();
        assert_eq!(err.code, -32000);
        assert!(err.message.contains("duplicate"));
    }

    #[tokio::test]
    async fn unstable_tx_registers_with_memo() {
        let src = Arc::new(MockBridge::new("1"));
        src.set_verification(SwapVerification::failed(
            verified_info("USDC", "0xbob", 1000),
            VerifyError::TxNotStable,
        ));
        // Height 0: the stable retry is not attempted.
        src.set_tx_status(None);
        let core = test_core(src.clone(), Arc::new(MockBridge::new("56")));

        swapin(&core, "0xa", "USDC").await.unwrap();
        let swap = core.store.find_swapin("0xa", "USDC", "0xbob").await.unwrap();
        assert_eq!(swap.status, SwapStatus::TxNotStable);
        assert_eq!(swap.memo, "tx not stable");
    }

    #[tokio::test]
    async fn mined_tx_prefers_stable_verdict() {
        let src = Arc::new(MockBridge::new("1"));
        src.set_verification(SwapVerification::failed(
            verified_info("USDC", "0xbob", 1000),
            VerifyError::TxNotStable,
        ));
        src.set_tx_status(Some(crate::bridge::TxStatus {
            block_height: 42,
            confirmations: 3,
        }));
        src.set_stable_verification(SwapVerification::ok(verified_info("USDC", "0xbob", 1000)));
        let core = test_core(src.clone(), Arc::new(MockBridge::new("56")));

        swapin(&core, "0xa", "USDC").await.unwrap();
        let swap = core.store.find_swapin("0xa", "USDC", "0xbob").await.unwrap();
        assert!(swap.memo.is_empty(), "stable verdict wins");
        assert_eq!(src.stable_verify_calls(), 1);
    }

    #[tokio::test]
    async fn permanently_invalid_tx_is_rejected_without_record() {
        let src = Arc::new(MockBridge::new("1"));
        src.set_verification(SwapVerification::failed(
            verified_info("USDC", "0xbob", 0),
            VerifyError::DepositLogNotFound,
        ));
        src.set_tx_status(None);
        let core = test_core(src.clone(), Arc::new(MockBridge::new("56")));

        let err = swapin(&core, "0xbad", "USDC").await.unwrap_err();
        assert_eq!(err.code, -32099);
        assert!(core.store.find_swapin("0xbad", "USDC", "0xbob").await.is_err());
    }

    #[tokio::test]
    async fn retry_requires_retryable_status() {
        let src = Arc::new(MockBridge::new("1"));
        src.set_verification(SwapVerification::ok(verified_info("USDC", "0xbob", 1000)));
        src.set_stable_verification(SwapVerification::ok(verified_info("USDC", "0xbob", 1000)));
        let core = test_core(src.clone(), Arc::new(MockBridge::new("56")));

        swapin(&core, "0xa", "USDC").await.unwrap();

        // TxNotStable is not retryable.
        let err = retry_swapin(&core, "0xa", "USDC").await.unwrap_err();
        assert_eq!(err.code, -32094);

        // Park it in a retryable failure, then retry resets it.
        core.store
            .update_swapin_status("0xa", "USDC", "0xbob", SwapStatus::TxWithWrongMemo, 5, Some("wrong memo"))
            .await
            .unwrap();
        retry_swapin(&core, "0xa", "USDC").await.unwrap();
        let swap = core.store.find_swapin("0xa", "USDC", "0xbob").await.unwrap();
        assert_eq!(swap.status, SwapStatus::TxNotStable);
        assert!(swap.memo.is_empty(), "retry clears the memo");
    }

    #[tokio::test]
    async fn retry_requires_nonce_capable_bridge() {
        let src = Arc::new(MockBridge::new("1"));
        src.set_nonce_capable(false);
        let core = test_core(src.clone(), Arc::new(MockBridge::new("56")));
        let err = retry_swapin(&core, "0xa", "USDC").await.unwrap_err();
        assert_eq!(err.code, -32094);
    }

    #[tokio::test]
    async fn router_swap_registers_each_log_index() {
        let src = Arc::new(MockBridge::new("56"));
        let mut ok0 = verified_info("0xtoken", "0xBob", 1000);
        ok0.log_index = 0;
        ok0.to_chain_id = "1".into();
        let mut parked3 = verified_info("0xtoken", "0xBob", 2000);
        parked3.log_index = 3;
        parked3.to_chain_id = "1".into();
        src.set_router_registrations(vec![
            SwapVerification::ok(ok0),
            SwapVerification::failed(parked3, VerifyError::TxNotStable),
        ]);
        let core = test_core(src.clone(), src.clone());

        let result = register_router_swap(&core, "56", "0xt").await.unwrap();
        assert_eq!(result[&0], "success");
        assert_eq!(result[&3], "success");

        let swap0 = core.store.find_router_swap("56", "0xt", 0).await.unwrap();
        assert_eq!(swap0.status, SwapStatus::TxNotStable);
        assert!(swap0.memo.is_empty());
        let swap3 = core.store.find_router_swap("56", "0xt", 3).await.unwrap();
        assert_eq!(swap3.memo, "tx not stable");
    }

    #[tokio::test]
    async fn router_swap_reports_failed_logs() {
        let src = Arc::new(MockBridge::new("56"));
        let mut bad = verified_info("0xtoken", "0xbob", 0);
        bad.log_index = 7;
        src.set_router_registrations(vec![SwapVerification::failed(
            bad,
            VerifyError::DepositLogNotFound,
        )]);
        let core = test_core(src.clone(), src.clone());

        let result = register_router_swap(&core, "56", "0xt").await.unwrap();
        assert!(result[&7].starts_with("failed:"));
        assert!(core.store.find_router_swap("56", "0xt", 7).await.is_err());
    }

    #[tokio::test]
    async fn router_swap_requires_known_chain() {
        let src = Arc::new(MockBridge::new("56"));
        let core = test_core(src.clone(), src.clone());
        let err = register_router_swap(&core, "137", "0xt").await.unwrap_err();
        assert_eq!(err.code, -32000);
    }

    #[tokio::test]
    async fn addresses_register_lowercased() {
        let src = Arc::new(MockBridge::new("1"));
        let core = test_core(src.clone(), src.clone());

        register_address(&core, "0xAbCd").await.unwrap();
        let found = core.store.find_registered_address("0xabcd").await.unwrap();
        assert_eq!(found.address, "0xabcd");

        let err = register_address(&core, "0xABCD").await.unwrap_err();
        assert!(err.message.contains("duplicate"));
    }

    #[tokio::test]
    async fn p2sh_endpoints_require_btc_bridge() {
        let src = Arc::new(MockBridge::new("1"));
        let core = test_core(src.clone(), src.clone());

        let err = p2sh_swapin(&core, "0xa", "0xbob").await.unwrap_err();
        assert_eq!(err.code, -32096);
        let err = register_p2sh_address(&core, "0xbob").await.unwrap_err();
        assert_eq!(err.code, -32096);
    }
}
