//! Swap query service
//!
//! Read paths only. `get_swapin`/`get_swapout`/`get_router_swap` merge the
//! result and registration stores into one [`SwapInfo`] view, preferring
//! the result record when both exist.

use crate::api::types::{ServerInfo, SwapInfo};
use crate::config::PairConfig;
use crate::core::Core;
use crate::error::RpcError;
use crate::store::{
    LatestScanInfo, RegisteredAddress, SwapRecord, SwapResultRecord, SwapStatistics, SwapStore,
};

use tracing::debug;

pub async fn get_server_info(core: &Core) -> ServerInfo {
    ServerInfo {
        identifier: core.identifier().to_string(),
        src_chain: core.settings.src_chain().name.clone(),
        dest_chain: core.settings.dest_chain().name.clone(),
        pair_ids: core.settings.all_pair_ids(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

pub fn get_token_pair_info(core: &Core, pair_id: &str) -> Result<PairConfig, RpcError> {
    core.settings
        .pair(pair_id)
        .cloned()
        .ok_or_else(RpcError::token_pair_not_exist)
}

pub async fn get_swap_statistics(core: &Core, pair_id: &str) -> Result<SwapStatistics, RpcError> {
    debug!(pair_id, "receive GetSwapStatistics");
    core.store
        .get_swap_statistics(pair_id)
        .await
        .map_err(RpcError::internal)
}

/// Clamp a caller-supplied history limit. Zero selects the default page,
/// the sign selects the direction and survives clamping.
pub fn process_history_limit(limit: i64) -> i64 {
    match limit {
        0 => 20,
        l if l > 100 => 100,
        l if l < -100 => -100,
        l => l,
    }
}

pub async fn get_raw_swapin(
    core: &Core,
    tx_id: &str,
    pair_id: &str,
    bind: &str,
) -> Result<SwapRecord, RpcError> {
    core.store
        .find_swapin(tx_id, pair_id, bind)
        .await
        .map_err(RpcError::internal)
}

pub async fn get_raw_swapin_result(
    core: &Core,
    tx_id: &str,
    pair_id: &str,
    bind: &str,
) -> Result<SwapResultRecord, RpcError> {
    core.store
        .find_swapin_result(tx_id, pair_id, bind)
        .await
        .map_err(RpcError::internal)
}

pub async fn get_raw_swapout(
    core: &Core,
    tx_id: &str,
    pair_id: &str,
    bind: &str,
) -> Result<SwapRecord, RpcError> {
    core.store
        .find_swapout(tx_id, pair_id, bind)
        .await
        .map_err(RpcError::internal)
}

pub async fn get_raw_swapout_result(
    core: &Core,
    tx_id: &str,
    pair_id: &str,
    bind: &str,
) -> Result<SwapResultRecord, RpcError> {
    core.store
        .find_swapout_result(tx_id, pair_id, bind)
        .await
        .map_err(RpcError::internal)
}

pub async fn get_swapin(
    core: &Core,
    tx_id: &str,
    pair_id: &str,
    bind: &str,
) -> Result<SwapInfo, RpcError> {
    if let Ok(result) = core.store.find_swapin_result(tx_id, pair_id, bind).await {
        return Ok(result.into());
    }
    if let Ok(register) = core.store.find_swapin(tx_id, pair_id, bind).await {
        return Ok(register.into());
    }
    Err(RpcError::internal("swap not found"))
}

pub async fn get_swapout(
    core: &Core,
    tx_id: &str,
    pair_id: &str,
    bind: &str,
) -> Result<SwapInfo, RpcError> {
    if let Ok(result) = core.store.find_swapout_result(tx_id, pair_id, bind).await {
        return Ok(result.into());
    }
    if let Ok(register) = core.store.find_swapout(tx_id, pair_id, bind).await {
        return Ok(register.into());
    }
    Err(RpcError::internal("swap not found"))
}

pub async fn get_router_swap(
    core: &Core,
    from_chain_id: &str,
    tx_id: &str,
    log_index: &str,
) -> Result<SwapInfo, RpcError> {
    let log_index: u32 = log_index.parse().map_err(|e| RpcError::invalid_params(e))?;
    if let Ok(result) = core
        .store
        .find_router_swap_result(from_chain_id, tx_id, log_index)
        .await
    {
        return Ok(result.into());
    }
    if let Ok(register) = core
        .store
        .find_router_swap(from_chain_id, tx_id, log_index)
        .await
    {
        return Ok(register.into());
    }
    Err(RpcError::internal("swap not found"))
}

pub async fn get_swapin_history(
    core: &Core,
    address: &str,
    pair_id: &str,
    offset: i64,
    limit: i64,
) -> Result<Vec<SwapInfo>, RpcError> {
    debug!(address, pair_id, offset, limit, "receive GetSwapinHistory");
    let limit = process_history_limit(limit);
    let results = core
        .store
        .find_swapin_results(address, pair_id, offset, limit)
        .await
        .map_err(RpcError::internal)?;
    Ok(results.into_iter().map(Into::into).collect())
}

pub async fn get_swapout_history(
    core: &Core,
    address: &str,
    pair_id: &str,
    offset: i64,
    limit: i64,
) -> Result<Vec<SwapInfo>, RpcError> {
    debug!(address, pair_id, offset, limit, "receive GetSwapoutHistory");
    let limit = process_history_limit(limit);
    let results = core
        .store
        .find_swapout_results(address, pair_id, offset, limit)
        .await
        .map_err(RpcError::internal)?;
    Ok(results.into_iter().map(Into::into).collect())
}

pub async fn get_router_swap_history(
    core: &Core,
    from_chain_id: &str,
    address: &str,
    offset: i64,
    limit: i64,
) -> Result<Vec<SwapInfo>, RpcError> {
    let limit = process_history_limit(limit);
    let results = core
        .store
        .find_router_swap_results(from_chain_id, address, offset, limit)
        .await
        .map_err(RpcError::internal)?;
    Ok(results.into_iter().map(Into::into).collect())
}

pub async fn get_registered_address(
    core: &Core,
    address: &str,
) -> Result<RegisteredAddress, RpcError> {
    let address = address.to_lowercase();
    core.store
        .find_registered_address(&address)
        .await
        .map_err(RpcError::internal)
}

pub async fn get_latest_scan_info(core: &Core, is_src: bool) -> Result<LatestScanInfo, RpcError> {
    core.store
        .get_latest_scan_info(is_src)
        .await
        .map_err(RpcError::internal)
}

pub fn is_valid_swapin_bind_address(core: &Core, address: &str) -> bool {
    core.bridges.dest_bridge().is_valid_address(address)
}

pub fn is_valid_swapout_bind_address(core: &Core, address: &str) -> bool {
    core.bridges.src_bridge().is_valid_address(address)
}
