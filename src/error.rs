//! Error types for the spanbridge coordinator
//!
//! Verification failures carry an explicit kind so callers classify by
//! matching on the variant, never by comparing message strings.

use thiserror::Error;

/// Transaction verification failure kinds reported by chain bridges.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("tx not stable")]
    TxNotStable,

    #[error("tx not found")]
    TxNotFound,

    #[error("tx incompatible")]
    TxIncompatible,

    #[error("tx with wrong memo")]
    TxWithWrongMemo,

    #[error("tx with big value")]
    TxWithBigValue,

    #[error("tx with wrong value")]
    TxWithWrongValue,

    #[error("tx with wrong sender")]
    TxWithWrongSender,

    #[error("tx sender not registered")]
    TxSenderNotRegistered,

    #[error("bind address is contract")]
    BindAddrIsContract,

    #[error("rpc query error: {0}")]
    RpcQuery(String),

    #[error("tx to address mismatch")]
    WrongTxTo,

    #[error("tx id is not well formed")]
    MalformedTxId,

    #[error("tx receipt shows failure")]
    TxWithWrongReceipt,

    #[error("deposit log not found")]
    DepositLogNotFound,

    #[error("unknown pair id {0}")]
    UnknownPairId(String),

    #[error("no bridge for chain id {0}")]
    NoBridgeForChainId(String),

    #[error("router swap not supported")]
    RouterSwapNotSupported,

    #[error("bridge is not btc")]
    NoBtcBridge,

    #[error("msg hash mismatch")]
    MsgHashMismatch,

    #[error("wrong count of msg hashes")]
    WrongCountOfMsgHashes,

    #[error("build raw tx failed: {0}")]
    BuildTxFailed(String),

    #[error("wrong raw tx")]
    WrongRawTx,

    #[error("invalid address {0}")]
    InvalidAddress(String),
}

/// The single gate between "persist the swap with a memo" and "reject the
/// submission outright". A verification outcome passes when it succeeded or
/// failed in a way a later re-verification can resolve (or an operator can
/// pass manually); permanently-invalid and not-our-swap kinds are rejected.
pub fn should_register_swap(outcome: &Result<(), VerifyError>) -> bool {
    match outcome {
        Ok(()) => true,
        Err(err) => matches!(
            err,
            VerifyError::TxNotStable
                | VerifyError::TxNotFound
                | VerifyError::TxIncompatible
                | VerifyError::TxWithWrongMemo
                | VerifyError::TxWithBigValue
                | VerifyError::TxWithWrongValue
                | VerifyError::TxWithWrongSender
                | VerifyError::TxSenderNotRegistered
                | VerifyError::BindAddrIsContract
                | VerifyError::RpcQuery(_)
        ),
    }
}

/// JSON-RPC error surfaced to API callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::new(-32000, format!("rpcError: {}", err))
    }

    pub fn swap_cannot_retry() -> Self {
        Self::new(-32094, "swap can not retry")
    }

    pub fn token_pair_not_exist() -> Self {
        Self::new(-32095, "token pair not exist")
    }

    pub fn not_btc_bridge() -> Self {
        Self::new(-32096, "bridge is not btc")
    }

    pub fn verify_failed(prefix: &str, err: impl std::fmt::Display) -> Self {
        Self::new(-32099, format!("{} {}", prefix, err))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(-32601, format!("method {} not found", method))
    }

    pub fn invalid_params(err: impl std::fmt::Display) -> Self {
        Self::new(-32602, format!("invalid params: {}", err))
    }
}
