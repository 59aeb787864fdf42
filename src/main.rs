//! spanbridge - cross-chain bridge coordinator
//!
//! Registers user-submitted swap transactions after verifying them against
//! the source chain, serves swap status and history queries, and runs the
//! sign-acceptance worker that votes on threshold-sign requests by
//! independently rebuilding each proposed destination transaction.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

mod accept;
mod api;
mod bridge;
mod config;
mod core;
mod error;
mod metrics;
mod mpc;
mod store;
#[cfg(test)]
mod testutil;

use crate::accept::AcceptWorker;
use crate::bridge::btc::BtcBridge;
use crate::bridge::evm::EvmBridge;
use crate::bridge::{BridgeRegistry, ChainBridge, P2shBridge, RouterSwapper};
use crate::config::{ChainKind, Settings};
use crate::core::Core;
use crate::metrics::MetricsServer;
use crate::mpc::MpcRpcClient;
use crate::store::{MemSwapStore, PgSwapStore, SwapStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration first: it carries the default log filter.
    let settings = Arc::new(Settings::load()?);
    init_logging(&settings);

    info!("Starting spanbridge v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Loaded configuration for {} chains, {} pairs",
        settings.enabled_chains().len(),
        settings.pairs.len()
    );

    // Initialize persistence
    let swap_store: Arc<dyn SwapStore> = if settings.database.url.is_empty() {
        warn!("No database URL configured - using the in-memory store");
        Arc::new(MemSwapStore::new())
    } else {
        let store = PgSwapStore::new(&settings.database).await?;
        info!("Database connection established");
        Arc::new(store)
    };

    // Initialize chain bridges
    let bridges = Arc::new(build_bridges(&settings)?);
    info!("Chain bridges initialized");

    let core = Core::new(settings.clone(), bridges, swap_store);

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let core = core.clone();
        async move {
            if let Err(e) = api::run_server(config, core).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Start sign-acceptance worker
    let accept_handle = tokio::spawn({
        let worker = AcceptWorker::new(core.clone(), Arc::new(MpcRpcClient::new(&settings.mpc.rpc_url)));
        async move {
            worker.run().await;
        }
    });

    info!("spanbridge is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    wait_for_shutdown().await;

    info!("Shutdown signal received, stopping...");

    api_handle.abort();
    accept_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("spanbridge stopped");
    Ok(())
}

/// Build the bridge registry from configuration: the classic source and
/// destination pair, one router entry per router-capable EVM chain, and
/// the optional Bitcoin P2SH service.
fn build_bridges(settings: &Settings) -> Result<BridgeRegistry> {
    let src_cfg = settings.src_chain();
    let dest_cfg = settings.dest_chain();
    for (cfg, side) in [(src_cfg, "source"), (dest_cfg, "destination")] {
        if cfg.kind != ChainKind::Evm {
            anyhow::bail!("Classic {} chain {} must be an EVM chain", side, cfg.name);
        }
    }

    let src = Arc::new(EvmBridge::new(src_cfg.clone(), settings.pairs.clone(), true)?);
    let dest = Arc::new(EvmBridge::new(dest_cfg.clone(), settings.pairs.clone(), false)?);
    let mut registry = BridgeRegistry::new(
        src.clone() as Arc<dyn ChainBridge>,
        dest.clone() as Arc<dyn ChainBridge>,
    );

    let mut evm_bridges: HashMap<String, Arc<EvmBridge>> = HashMap::new();
    evm_bridges.insert(src_cfg.chain_id.clone(), src);
    evm_bridges.insert(dest_cfg.chain_id.clone(), dest);

    for (name, chain) in settings.enabled_chains() {
        match chain.kind {
            ChainKind::Evm => {
                if chain.router_contract.is_none() {
                    continue;
                }
                let bridge = match evm_bridges.get(&chain.chain_id) {
                    Some(bridge) => bridge.clone(),
                    None => {
                        let bridge =
                            Arc::new(EvmBridge::new(chain.clone(), settings.pairs.clone(), true)?);
                        evm_bridges.insert(chain.chain_id.clone(), bridge.clone());
                        bridge
                    }
                };
                info!("Registered router bridge for chain {} ({})", chain.chain_id, name);
                registry.register_router(
                    chain.chain_id.clone(),
                    bridge.clone() as Arc<dyn ChainBridge>,
                    bridge as Arc<dyn RouterSwapper>,
                );
            }
            ChainKind::Bitcoin => {
                let pair_id = chain.pair_id.as_deref().unwrap_or_default();
                let pair = settings
                    .pair(pair_id)
                    .ok_or_else(|| anyhow::anyhow!("Bitcoin chain {} has no pair", name))?;
                let btc = Arc::new(BtcBridge::new(chain.clone(), pair.clone())?);
                info!("Registered bitcoin p2sh bridge ({})", name);
                registry.register_btc(btc as Arc<dyn P2shBridge>);
            }
        }
    }

    Ok(registry)
}

fn init_logging(settings: &Settings) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_filter()));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Block until the process is asked to stop: SIGINT everywhere, SIGTERM
/// additionally on unix so container runtimes get a clean exit.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        tokio::select! {
            _ = signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
