//! HTTP API
//!
//! One JSON-RPC 2.0 endpoint at `POST /rpc` carrying the whole swap
//! surface, plus a liveness probe. Method names keep the `swap.` service
//! prefix so existing clients keep working.

pub mod query;
pub mod registration;
pub mod types;

use crate::config::ApiConfig;
use crate::core::Core;
use crate::error::RpcError;
use crate::store::SwapStore;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, core: Core) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/rpc", post(rpc_handler))
        .route("/health", get(health_check))
        .with_state(core);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcErrorObject>,
}

#[derive(Serialize)]
struct RpcErrorObject {
    code: i32,
    message: String,
}

async fn rpc_handler(State(core): State<Core>, Json(request): Json<RpcRequest>) -> Json<RpcResponse> {
    let outcome = dispatch(&core, &request.method, request.params).await;
    crate::metrics::record_api_request(&request.method, outcome.is_ok());

    let response = match outcome {
        Ok(result) => RpcResponse {
            jsonrpc: "2.0",
            id: request.id,
            result: Some(result),
            error: None,
        },
        Err(err) => RpcResponse {
            jsonrpc: "2.0",
            id: request.id,
            result: None,
            error: Some(RpcErrorObject {
                code: err.code,
                message: err.message,
            }),
        },
    };
    Json(response)
}

async fn health_check(State(core): State<Core>) -> Json<Value> {
    let database = core.store.health_check().await.is_ok();
    Json(json!({
        "status": if database { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": database,
    }))
}

/// Accept parameters either as a bare object or as the single element of a
/// positional array.
fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    let value = match params {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    };
    serde_json::from_value(value).map_err(RpcError::invalid_params)
}

fn to_value<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(RpcError::internal)
}

#[derive(Deserialize)]
struct PairParams {
    pair_id: String,
}

#[derive(Deserialize)]
struct SwapParams {
    tx_id: String,
    pair_id: String,
}

#[derive(Deserialize)]
struct P2shSwapinParams {
    tx_id: String,
    bind: String,
}

#[derive(Deserialize)]
struct SwapKeyParams {
    tx_id: String,
    pair_id: String,
    bind: String,
}

#[derive(Deserialize)]
struct HistoryParams {
    address: String,
    pair_id: String,
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    limit: i64,
}

#[derive(Deserialize)]
struct RouterSwapParams {
    from_chain_id: String,
    tx_id: String,
}

#[derive(Deserialize)]
struct RouterSwapKeyParams {
    from_chain_id: String,
    tx_id: String,
    log_index: String,
}

#[derive(Deserialize)]
struct RouterHistoryParams {
    from_chain_id: String,
    address: String,
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    limit: i64,
}

#[derive(Deserialize)]
struct AddressParams {
    address: String,
}

#[derive(Deserialize)]
struct BindAddressParams {
    bind_address: String,
}

#[derive(Deserialize)]
struct P2shAddressParams {
    p2sh_address: String,
}

#[derive(Deserialize)]
struct ScanInfoParams {
    is_src: bool,
}

async fn dispatch(core: &Core, method: &str, params: Value) -> Result<Value, RpcError> {
    match method {
        "swap.GetServerInfo" => to_value(query::get_server_info(core).await),
        "swap.GetTokenPairInfo" => {
            let p: PairParams = parse_params(params)?;
            to_value(query::get_token_pair_info(core, &p.pair_id)?)
        }
        "swap.GetSwapStatistics" => {
            let p: PairParams = parse_params(params)?;
            to_value(query::get_swap_statistics(core, &p.pair_id).await?)
        }
        "swap.Swapin" => {
            let p: SwapParams = parse_params(params)?;
            to_value(registration::swapin(core, &p.tx_id, &p.pair_id).await?)
        }
        "swap.Swapout" => {
            let p: SwapParams = parse_params(params)?;
            to_value(registration::swapout(core, &p.tx_id, &p.pair_id).await?)
        }
        "swap.RetrySwapin" => {
            let p: SwapParams = parse_params(params)?;
            to_value(registration::retry_swapin(core, &p.tx_id, &p.pair_id).await?)
        }
        "swap.P2shSwapin" => {
            let p: P2shSwapinParams = parse_params(params)?;
            to_value(registration::p2sh_swapin(core, &p.tx_id, &p.bind).await?)
        }
        "swap.GetSwapin" => {
            let p: SwapKeyParams = parse_params(params)?;
            to_value(query::get_swapin(core, &p.tx_id, &p.pair_id, &p.bind).await?)
        }
        "swap.GetSwapout" => {
            let p: SwapKeyParams = parse_params(params)?;
            to_value(query::get_swapout(core, &p.tx_id, &p.pair_id, &p.bind).await?)
        }
        "swap.GetRawSwapin" => {
            let p: SwapKeyParams = parse_params(params)?;
            to_value(query::get_raw_swapin(core, &p.tx_id, &p.pair_id, &p.bind).await?)
        }
        "swap.GetRawSwapinResult" => {
            let p: SwapKeyParams = parse_params(params)?;
            to_value(query::get_raw_swapin_result(core, &p.tx_id, &p.pair_id, &p.bind).await?)
        }
        "swap.GetRawSwapout" => {
            let p: SwapKeyParams = parse_params(params)?;
            to_value(query::get_raw_swapout(core, &p.tx_id, &p.pair_id, &p.bind).await?)
        }
        "swap.GetRawSwapoutResult" => {
            let p: SwapKeyParams = parse_params(params)?;
            to_value(query::get_raw_swapout_result(core, &p.tx_id, &p.pair_id, &p.bind).await?)
        }
        "swap.GetSwapinHistory" => {
            let p: HistoryParams = parse_params(params)?;
            to_value(query::get_swapin_history(core, &p.address, &p.pair_id, p.offset, p.limit).await?)
        }
        "swap.GetSwapoutHistory" => {
            let p: HistoryParams = parse_params(params)?;
            to_value(query::get_swapout_history(core, &p.address, &p.pair_id, p.offset, p.limit).await?)
        }
        "swap.RegisterRouterSwap" => {
            let p: RouterSwapParams = parse_params(params)?;
            to_value(registration::register_router_swap(core, &p.from_chain_id, &p.tx_id).await?)
        }
        "swap.GetRouterSwap" => {
            let p: RouterSwapKeyParams = parse_params(params)?;
            to_value(query::get_router_swap(core, &p.from_chain_id, &p.tx_id, &p.log_index).await?)
        }
        "swap.GetRouterSwapHistory" => {
            let p: RouterHistoryParams = parse_params(params)?;
            to_value(
                query::get_router_swap_history(core, &p.from_chain_id, &p.address, p.offset, p.limit)
                    .await?,
            )
        }
        "swap.RegisterP2shAddress" => {
            let p: BindAddressParams = parse_params(params)?;
            to_value(registration::register_p2sh_address(core, &p.bind_address).await?)
        }
        "swap.GetP2shAddressInfo" => {
            let p: P2shAddressParams = parse_params(params)?;
            to_value(registration::get_p2sh_address_info(core, &p.p2sh_address).await?)
        }
        "swap.RegisterAddress" => {
            let p: AddressParams = parse_params(params)?;
            to_value(registration::register_address(core, &p.address).await?)
        }
        "swap.GetRegisteredAddress" => {
            let p: AddressParams = parse_params(params)?;
            to_value(query::get_registered_address(core, &p.address).await?)
        }
        "swap.GetLatestScanInfo" => {
            let p: ScanInfoParams = parse_params(params)?;
            to_value(query::get_latest_scan_info(core, p.is_src).await?)
        }
        "swap.IsValidSwapinBindAddress" => {
            let p: AddressParams = parse_params(params)?;
            to_value(query::is_valid_swapin_bind_address(core, &p.address))
        }
        "swap.IsValidSwapoutBindAddress" => {
            let p: AddressParams = parse_params(params)?;
            to_value(query::is_valid_swapout_bind_address(core, &p.address))
        }
        other => Err(RpcError::method_not_found(other)),
    }
}
