//! Threshold-sign subsystem client
//!
//! Thin JSON-RPC client for the signing group node running next to this
//! process. The coordinator only needs two calls: the list of sign
//! requests currently addressed to this node, and the accept call that
//! submits this node's vote.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MpcError {
    #[error("mpc transport error: {0}")]
    Transport(String),

    #[error("mpc rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
}

/// This node's vote on a sign request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignVote {
    Agree,
    Disagree,
}

impl SignVote {
    pub fn as_str(self) -> &'static str {
        match self {
            SignVote::Agree => "AGREE",
            SignVote::Disagree => "DISAGREE",
        }
    }
}

/// A pending sign request addressed to this node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInfoData {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Account")]
    pub account: String,
    #[serde(rename = "MsgHash", default)]
    pub msg_hash: Vec<String>,
    #[serde(rename = "MsgContext", default)]
    pub msg_context: Vec<String>,
}

#[async_trait]
pub trait SignClient: Send + Sync {
    /// Sign requests currently awaiting this node's vote.
    async fn get_cur_node_sign_info(&self) -> Result<Vec<SignInfoData>, MpcError>;

    /// Submit this node's vote for `key_id`.
    async fn do_accept_sign(
        &self,
        key_id: &str,
        vote: SignVote,
        msg_hash: &[String],
        msg_context: &[String],
    ) -> Result<String, MpcError>;
}

/// JSON-RPC 2.0 client against the group signing node.
pub struct MpcRpcClient {
    url: String,
    client: reqwest::Client,
}

impl MpcRpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, MpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response: serde_json::Value = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| MpcError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| MpcError::Transport(e.to_string()))?;

        if let Some(err) = response.get("error").filter(|e| !e.is_null()) {
            return Err(MpcError::Rpc {
                code: err["code"].as_i64().unwrap_or(0),
                message: err["message"].as_str().unwrap_or_default().to_string(),
            });
        }

        Ok(response.get("result").cloned().unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl SignClient for MpcRpcClient {
    async fn get_cur_node_sign_info(&self) -> Result<Vec<SignInfoData>, MpcError> {
        let result = self.call("mpc_getCurNodeSignInfo", json!([])).await?;
        if result.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(result).map_err(|e| MpcError::Transport(e.to_string()))
    }

    async fn do_accept_sign(
        &self,
        key_id: &str,
        vote: SignVote,
        msg_hash: &[String],
        msg_context: &[String],
    ) -> Result<String, MpcError> {
        let result = self
            .call(
                "mpc_acceptSign",
                json!([{
                    "Key": key_id,
                    "Accept": vote.as_str(),
                    "MsgHash": msg_hash,
                    "MsgContext": msg_context,
                }]),
            )
            .await?;
        Ok(result.as_str().unwrap_or_default().to_string())
    }
}
