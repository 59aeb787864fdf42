//! Swap persistence
//!
//! Typed store facade over the swap collections: registrations, results,
//! P2SH bindings, registered addresses and scan checkpoints. Two backends
//! implement it: PostgreSQL for deployments and an in-memory map for
//! development and tests. Identity invariants (one registration and at most
//! one result per swap key) are enforced by the backend, so concurrent
//! writers race on insert and the loser sees [`StoreError::Duplicate`].

mod memory;
mod postgres;

pub use memory::MemSwapStore;
pub use postgres::PgSwapStore;

use crate::error::VerifyError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("item is duplicate")]
    Duplicate,

    #[error("swap not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Kind of source-chain transaction a swap registration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapTxType {
    Swapin,
    Swapout,
    P2shSwapin,
    RouterSwap,
}

impl SwapTxType {
    pub fn as_i16(self) -> i16 {
        match self {
            SwapTxType::Swapin => 0,
            SwapTxType::Swapout => 1,
            SwapTxType::P2shSwapin => 2,
            SwapTxType::RouterSwap => 3,
        }
    }

    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            0 => Some(SwapTxType::Swapin),
            1 => Some(SwapTxType::Swapout),
            2 => Some(SwapTxType::P2shSwapin),
            3 => Some(SwapTxType::RouterSwap),
            _ => None,
        }
    }
}

/// Swap lifecycle status.
///
/// Forward path: `TxNotStable -> TxVerified -> Processing ->
/// MatchTxNotStable -> MatchTxStable`. Verification failures park the swap
/// in one of the error statuses; the retryable subset can be reset to
/// `TxNotStable` through the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapStatus {
    TxNotStable,
    TxVerified,
    TxWithWrongMemo,
    TxWithBigValue,
    TxSenderNotRegistered,
    MatchTxEmpty,
    MatchTxNotStable,
    MatchTxStable,
    TxWithWrongValue,
    TxIncompatible,
    BindAddrIsContract,
    RpcQueryError,
    TxSwapFailed,
    TxCanRecall,
    ManualMakeFail,
    Processing,
    TxVerifyFailed,
}

impl SwapStatus {
    pub fn as_i16(self) -> i16 {
        match self {
            SwapStatus::TxNotStable => 0,
            SwapStatus::TxVerified => 1,
            SwapStatus::TxWithWrongMemo => 2,
            SwapStatus::TxWithBigValue => 3,
            SwapStatus::TxSenderNotRegistered => 4,
            SwapStatus::MatchTxEmpty => 5,
            SwapStatus::MatchTxNotStable => 6,
            SwapStatus::MatchTxStable => 7,
            SwapStatus::TxWithWrongValue => 8,
            SwapStatus::TxIncompatible => 9,
            SwapStatus::BindAddrIsContract => 10,
            SwapStatus::RpcQueryError => 11,
            SwapStatus::TxSwapFailed => 12,
            SwapStatus::TxCanRecall => 13,
            SwapStatus::ManualMakeFail => 14,
            SwapStatus::Processing => 15,
            SwapStatus::TxVerifyFailed => 16,
        }
    }

    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            0 => Some(SwapStatus::TxNotStable),
            1 => Some(SwapStatus::TxVerified),
            2 => Some(SwapStatus::TxWithWrongMemo),
            3 => Some(SwapStatus::TxWithBigValue),
            4 => Some(SwapStatus::TxSenderNotRegistered),
            5 => Some(SwapStatus::MatchTxEmpty),
            6 => Some(SwapStatus::MatchTxNotStable),
            7 => Some(SwapStatus::MatchTxStable),
            8 => Some(SwapStatus::TxWithWrongValue),
            9 => Some(SwapStatus::TxIncompatible),
            10 => Some(SwapStatus::BindAddrIsContract),
            11 => Some(SwapStatus::RpcQueryError),
            12 => Some(SwapStatus::TxSwapFailed),
            13 => Some(SwapStatus::TxCanRecall),
            14 => Some(SwapStatus::ManualMakeFail),
            15 => Some(SwapStatus::Processing),
            16 => Some(SwapStatus::TxVerifyFailed),
            _ => None,
        }
    }

    /// Whether a parked swap may be reset to `TxNotStable` through the
    /// retry API. Only the non-terminal failure subset qualifies.
    pub fn can_retry(self) -> bool {
        matches!(
            self,
            SwapStatus::TxWithWrongMemo
                | SwapStatus::TxWithBigValue
                | SwapStatus::TxSenderNotRegistered
                | SwapStatus::TxWithWrongValue
                | SwapStatus::RpcQueryError
        )
    }
}

/// Map a verification outcome to the status a fresh registration gets.
pub fn status_from_verify_outcome(outcome: &Result<(), VerifyError>) -> SwapStatus {
    match outcome {
        Ok(()) => SwapStatus::TxNotStable,
        Err(VerifyError::TxNotStable) | Err(VerifyError::TxNotFound) => SwapStatus::TxNotStable,
        Err(VerifyError::TxWithWrongMemo) => SwapStatus::TxWithWrongMemo,
        Err(VerifyError::TxWithBigValue) => SwapStatus::TxWithBigValue,
        Err(VerifyError::TxSenderNotRegistered) => SwapStatus::TxSenderNotRegistered,
        Err(VerifyError::TxWithWrongValue) => SwapStatus::TxWithWrongValue,
        Err(VerifyError::TxIncompatible) => SwapStatus::TxIncompatible,
        Err(VerifyError::BindAddrIsContract) => SwapStatus::BindAddrIsContract,
        Err(VerifyError::RpcQuery(_)) => SwapStatus::RpcQueryError,
        Err(_) => SwapStatus::TxVerifyFailed,
    }
}

/// A registered swap awaiting (or parked before) execution.
///
/// Classic identity is `(pair_id, tx_id, bind)`; router identity is
/// `(from_chain_id, tx_id, log_index)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapRecord {
    pub pair_id: String,
    pub tx_id: String,
    pub tx_to: String,
    pub tx_type: SwapTxType,
    pub bind: String,
    pub status: SwapStatus,
    pub timestamp: i64,
    pub memo: String,

    // Router-only fields, defaulted for classic swaps.
    #[serde(default)]
    pub for_native: bool,
    #[serde(default)]
    pub for_underlying: bool,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub path: Vec<String>,
    #[serde(default)]
    pub amount_out_min: String,
    #[serde(default)]
    pub from_chain_id: String,
    #[serde(default)]
    pub to_chain_id: String,
    #[serde(default)]
    pub log_index: u32,
}

/// Post-execution record written by downstream executors; shares the swap
/// identity and adds the destination-chain outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapResultRecord {
    pub pair_id: String,
    pub tx_id: String,
    pub tx_to: String,
    pub tx_type: SwapTxType,
    pub bind: String,
    pub status: SwapStatus,
    pub timestamp: i64,
    pub memo: String,

    pub swap_tx: String,
    pub value: String,
    pub swap_height: u64,
    pub swap_time: i64,
    pub swap_nonce: u64,

    #[serde(default)]
    pub from_chain_id: String,
    #[serde(default)]
    pub to_chain_id: String,
    #[serde(default)]
    pub log_index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapStatistics {
    pub pair_id: String,
    pub swapin_count: u64,
    pub swapout_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct P2shAddressRecord {
    pub bind_address: String,
    pub p2sh_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredAddress {
    pub address: String,
    pub timestamp: i64,
}

/// Per-direction scan checkpoint maintained by the chain scanners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestScanInfo {
    pub is_src: bool,
    pub block_height: u64,
    pub timestamp: i64,
}

/// Typed persistence facade over the swap collections.
///
/// History queries: `offset` skips records, `limit > 0` returns up to
/// `limit` oldest-first, `limit < 0` returns up to `|limit|` newest-first.
#[async_trait]
pub trait SwapStore: Send + Sync {
    async fn add_swapin(&self, swap: &SwapRecord) -> StoreResult<()>;
    async fn add_swapout(&self, swap: &SwapRecord) -> StoreResult<()>;
    async fn add_router_swap(&self, swap: &SwapRecord) -> StoreResult<()>;

    async fn find_swapin(&self, tx_id: &str, pair_id: &str, bind: &str) -> StoreResult<SwapRecord>;
    async fn find_swapout(&self, tx_id: &str, pair_id: &str, bind: &str)
        -> StoreResult<SwapRecord>;
    async fn find_router_swap(
        &self,
        from_chain_id: &str,
        tx_id: &str,
        log_index: u32,
    ) -> StoreResult<SwapRecord>;

    async fn update_swapin_status(
        &self,
        tx_id: &str,
        pair_id: &str,
        bind: &str,
        status: SwapStatus,
        timestamp: i64,
        memo: Option<&str>,
    ) -> StoreResult<()>;
    async fn update_swapout_status(
        &self,
        tx_id: &str,
        pair_id: &str,
        bind: &str,
        status: SwapStatus,
        timestamp: i64,
        memo: Option<&str>,
    ) -> StoreResult<()>;

    async fn add_swapin_result(&self, result: &SwapResultRecord) -> StoreResult<()>;
    async fn add_swapout_result(&self, result: &SwapResultRecord) -> StoreResult<()>;
    async fn add_router_swap_result(&self, result: &SwapResultRecord) -> StoreResult<()>;

    async fn find_swapin_result(
        &self,
        tx_id: &str,
        pair_id: &str,
        bind: &str,
    ) -> StoreResult<SwapResultRecord>;
    async fn find_swapout_result(
        &self,
        tx_id: &str,
        pair_id: &str,
        bind: &str,
    ) -> StoreResult<SwapResultRecord>;
    async fn find_router_swap_result(
        &self,
        from_chain_id: &str,
        tx_id: &str,
        log_index: u32,
    ) -> StoreResult<SwapResultRecord>;

    /// `address` filters on bind; pass "all" to match every address.
    async fn find_swapin_results(
        &self,
        address: &str,
        pair_id: &str,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<SwapResultRecord>>;
    async fn find_swapout_results(
        &self,
        address: &str,
        pair_id: &str,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<SwapResultRecord>>;
    async fn find_router_swap_results(
        &self,
        from_chain_id: &str,
        address: &str,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<SwapResultRecord>>;

    async fn add_p2sh_address(&self, record: &P2shAddressRecord) -> StoreResult<()>;
    async fn find_p2sh_address(&self, bind_address: &str) -> StoreResult<P2shAddressRecord>;
    async fn find_p2sh_bind_address(&self, p2sh_address: &str) -> StoreResult<String>;

    async fn add_registered_address(&self, address: &str, timestamp: i64) -> StoreResult<()>;
    async fn find_registered_address(&self, address: &str) -> StoreResult<RegisteredAddress>;

    async fn get_latest_scan_info(&self, is_src: bool) -> StoreResult<LatestScanInfo>;
    async fn update_latest_scan_info(&self, is_src: bool, block_height: u64) -> StoreResult<()>;

    async fn get_swap_statistics(&self, pair_id: &str) -> StoreResult<SwapStatistics>;

    async fn health_check(&self) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VerifyError;

    #[test]
    fn status_roundtrip() {
        for v in 0..=16i16 {
            let status = SwapStatus::from_i16(v).unwrap();
            assert_eq!(status.as_i16(), v);
        }
        assert!(SwapStatus::from_i16(17).is_none());
    }

    #[test]
    fn retry_only_on_nonterminal_failures() {
        assert!(SwapStatus::TxWithWrongMemo.can_retry());
        assert!(SwapStatus::TxWithBigValue.can_retry());
        assert!(SwapStatus::TxSenderNotRegistered.can_retry());
        assert!(SwapStatus::TxWithWrongValue.can_retry());
        assert!(SwapStatus::RpcQueryError.can_retry());

        assert!(!SwapStatus::TxNotStable.can_retry());
        assert!(!SwapStatus::MatchTxStable.can_retry());
        assert!(!SwapStatus::TxSwapFailed.can_retry());
        assert!(!SwapStatus::Processing.can_retry());
    }

    #[test]
    fn verify_outcome_status_mapping() {
        assert_eq!(status_from_verify_outcome(&Ok(())), SwapStatus::TxNotStable);
        assert_eq!(
            status_from_verify_outcome(&Err(VerifyError::TxNotFound)),
            SwapStatus::TxNotStable
        );
        assert_eq!(
            status_from_verify_outcome(&Err(VerifyError::TxWithWrongMemo)),
            SwapStatus::TxWithWrongMemo
        );
        assert_eq!(
            status_from_verify_outcome(&Err(VerifyError::RpcQuery("boom".into()))),
            SwapStatus::RpcQueryError
        );
        assert_eq!(
            status_from_verify_outcome(&Err(VerifyError::MsgHashMismatch)),
            SwapStatus::TxVerifyFailed
        );
    }
}
