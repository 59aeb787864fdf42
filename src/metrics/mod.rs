//! Prometheus metrics for monitoring
//!
//! Exposes counters for swap registrations, API traffic and the
//! sign-acceptance worker's votes.

use crate::mpc::SignVote;
use crate::store::SwapTxType;

use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_counter, Counter, CounterVec, Encoder, TextEncoder};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Registration metrics
    pub static ref SWAPS_REGISTERED: CounterVec = register_counter_vec!(
        "spanbridge_swaps_registered_total",
        "Total swap registrations accepted, by transaction type",
        &["tx_type"]
    ).unwrap();

    // API metrics
    pub static ref API_REQUESTS: CounterVec = register_counter_vec!(
        "spanbridge_api_requests_total",
        "Total JSON-RPC requests, by method and outcome",
        &["method", "outcome"]
    ).unwrap();

    // Sign-acceptance metrics
    pub static ref SIGN_REQUESTS: Counter = register_counter!(
        "spanbridge_sign_requests_total",
        "Total sign requests inspected"
    ).unwrap();

    pub static ref SIGN_VOTES: CounterVec = register_counter_vec!(
        "spanbridge_sign_votes_total",
        "Total sign votes submitted, by result",
        &["result"]
    ).unwrap();

    pub static ref SIGN_IGNORED: Counter = register_counter!(
        "spanbridge_sign_ignored_total",
        "Total sign requests skipped without a vote"
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}

// Helper functions to record metrics

pub fn record_swap_registered(tx_type: SwapTxType) {
    let label = match tx_type {
        SwapTxType::Swapin => "swapin",
        SwapTxType::Swapout => "swapout",
        SwapTxType::P2shSwapin => "p2sh_swapin",
        SwapTxType::RouterSwap => "router_swap",
    };
    SWAPS_REGISTERED.with_label_values(&[label]).inc();
}

pub fn record_api_request(method: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    API_REQUESTS.with_label_values(&[method, outcome]).inc();
}

pub fn record_sign_request() {
    SIGN_REQUESTS.inc();
}

pub fn record_sign_vote(vote: SignVote) {
    SIGN_VOTES.with_label_values(&[vote.as_str()]).inc();
}

pub fn record_sign_ignored() {
    SIGN_IGNORED.inc();
}
