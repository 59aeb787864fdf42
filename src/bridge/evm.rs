//! EVM chain adapter with multi-RPC failover
//!
//! Verification works off transaction receipts: a classic swapin is an
//! ERC-20 transfer into the pair's deposit address (or a native transfer
//! for coin pairs), a swapout is a burn log on the token contract, and a
//! router swap is one `LogAnySwapOut*` log per swap on the configured
//! router contract.
//!
//! `build_raw_transaction` returns the RLP signing payload of the unsigned
//! destination call; `verify_msg_hash` is keccak256 over exactly those
//! bytes, which is what makes independent reconstruction comparable
//! across quorum nodes.

use crate::bridge::{
    BridgeCapabilities, BuildTxArgs, ChainBridge, RawTx, RouterSwapper, SwapType,
    SwapVerification, TxStatus, TxSwapInfo,
};
use crate::config::{ChainConfig, PairConfig, TokenConfig};
use crate::error::VerifyError;

use anyhow::Result;
use async_trait::async_trait;
use ethers::abi::{self, ParamType, Token};
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::TransactionRequest;
use ethers::utils::keccak256;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

fn event_topic(signature: &str) -> H256 {
    H256::from(keccak256(signature.as_bytes()))
}

lazy_static! {
    /// ERC-20 Transfer(address,address,uint256)
    static ref TRANSFER_TOPIC: H256 = event_topic("Transfer(address,address,uint256)");
    /// LogSwapout(address,address,uint256) burn log on the bridged token
    static ref SWAPOUT_TOPIC: H256 = event_topic("LogSwapout(address,address,uint256)");
    /// Router swap out, direct delivery
    static ref ROUTER_SWAPOUT_TOPIC: H256 =
        event_topic("LogAnySwapOut(address,address,address,uint256,uint256,uint256)");
    /// Router swap out traded along a token path
    static ref ROUTER_TRADE_TOPIC: H256 = event_topic(
        "LogAnySwapTradeTokensForTokens(address[],address,address,uint256,uint256,uint256,uint256)"
    );
    /// Router swap out traded to the native coin
    static ref ROUTER_TRADE_NATIVE_TOPIC: H256 = event_topic(
        "LogAnySwapTradeTokensForNative(address[],address,address,uint256,uint256,uint256,uint256)"
    );
}

/// Gas and nonce extras the initiator picked for the destination tx; the
/// follower reuses them verbatim so reconstruction stays deterministic.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct EvmExtraArgs {
    #[serde(default)]
    pub gas_limit: Option<u64>,
    #[serde(default)]
    pub gas_price: Option<U256>,
    #[serde(default)]
    pub nonce: Option<u64>,
}

const DEFAULT_GAS_LIMIT: u64 = 90_000;

/// Round-robin pool over a chain's RPC endpoints. Every query starts one
/// endpoint further along and walks the remainder on failure, so a dead
/// endpoint costs one wasted attempt per round instead of stalling every
/// query behind it. Malformed URLs are configuration errors.
struct RpcPool {
    endpoints: Vec<Provider<Http>>,
    next_start: AtomicUsize,
}

impl RpcPool {
    fn from_urls(urls: &[String]) -> Result<Self> {
        let endpoints = urls
            .iter()
            .map(|url| {
                Provider::<Http>::try_from(url.as_str())
                    .map(|p| p.interval(Duration::from_millis(100)))
                    .map_err(|e| anyhow::anyhow!("Bad RPC URL {}: {}", url, e))
            })
            .collect::<Result<Vec<_>>>()?;
        if endpoints.is_empty() {
            anyhow::bail!("No RPC URLs configured");
        }
        Ok(Self {
            endpoints,
            next_start: AtomicUsize::new(0),
        })
    }

    /// Endpoints in this call's rotation order.
    fn rotation(&self) -> Vec<&Provider<Http>> {
        let len = self.endpoints.len();
        let start = self.next_start.fetch_add(1, Ordering::Relaxed) % len;
        (0..len).map(|i| &self.endpoints[(start + i) % len]).collect()
    }
}

pub struct EvmBridge {
    config: ChainConfig,
    pairs: HashMap<String, PairConfig>,
    /// This bridge observes the source side of its pairs (swapin deposits)
    /// as opposed to the destination side (swapout burns).
    is_src: bool,
    numeric_chain_id: u64,
    router_contract: Option<Address>,
    rpc: RpcPool,
}

impl EvmBridge {
    pub fn new(
        config: ChainConfig,
        pairs: HashMap<String, PairConfig>,
        is_src: bool,
    ) -> Result<Self> {
        let rpc = RpcPool::from_urls(&config.rpc_urls)
            .map_err(|e| anyhow::anyhow!("Chain {}: {}", config.chain_id, e))?;

        let numeric_chain_id = config
            .chain_id
            .parse::<u64>()
            .map_err(|_| anyhow::anyhow!("Chain id {} is not numeric", config.chain_id))?;

        let router_contract = match &config.router_contract {
            Some(addr) => Some(
                Address::from_str(addr)
                    .map_err(|e| anyhow::anyhow!("Bad router contract {}: {}", addr, e))?,
            ),
            None => None,
        };

        Ok(Self {
            config,
            pairs,
            is_src,
            numeric_chain_id,
            router_contract,
            rpc,
        })
    }

    async fn get_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>, VerifyError> {
        let mut last_err = String::from("no endpoints");
        for endpoint in self.rpc.rotation() {
            match endpoint.get_transaction_receipt(hash).await {
                Ok(receipt) => return Ok(receipt),
                Err(e) => {
                    debug!(chain = %self.config.chain_id, err = %e, "receipt query, rotating endpoint");
                    last_err = e.to_string();
                }
            }
        }
        Err(VerifyError::RpcQuery(last_err))
    }

    async fn latest_block(&self) -> Result<u64, VerifyError> {
        let mut last_err = String::from("no endpoints");
        for endpoint in self.rpc.rotation() {
            match endpoint.get_block_number().await {
                Ok(block) => return Ok(block.as_u64()),
                Err(e) => {
                    debug!(chain = %self.config.chain_id, err = %e, "head query, rotating endpoint");
                    last_err = e.to_string();
                }
            }
        }
        Err(VerifyError::RpcQuery(last_err))
    }

    fn token_side<'a>(&self, pair: &'a PairConfig) -> &'a TokenConfig {
        if self.is_src {
            &pair.src_token
        } else {
            &pair.dest_token
        }
    }

    /// Confirmation depth check against the chain's required depth.
    fn check_stability(
        &self,
        receipt_block: u64,
        latest: u64,
        allow_unstable: bool,
    ) -> Result<(), VerifyError> {
        if allow_unstable {
            return Ok(());
        }
        let confirmations = latest.saturating_sub(receipt_block) + 1;
        if confirmations < self.config.confirmation_blocks {
            return Err(VerifyError::TxNotStable);
        }
        Ok(())
    }

    fn check_value_bounds(token: &TokenConfig, value: U256) -> Result<(), VerifyError> {
        if let Some(max) = &token.maximum_swap {
            if let Ok(max) = U256::from_dec_str(max) {
                if value > max {
                    return Err(VerifyError::TxWithBigValue);
                }
            }
        }
        if let Some(min) = &token.minimum_swap {
            if let Ok(min) = U256::from_dec_str(min) {
                if value < min {
                    return Err(VerifyError::TxWithWrongValue);
                }
            }
        }
        Ok(())
    }

    /// Extract the swap deposit (swapin) or burn (swapout) from the receipt.
    fn extract_classic_swap(
        &self,
        token: &TokenConfig,
        receipt: &TransactionReceipt,
        info: &mut TxSwapInfo,
    ) -> Result<(), VerifyError> {
        let contract = token
            .contract_address
            .as_deref()
            .and_then(|a| Address::from_str(a).ok());

        let (wanted_topic, counterparty_topic_idx) = if self.is_src {
            // Swapin deposit: Transfer(from=user, to=deposit_address, value)
            (*TRANSFER_TOPIC, 1)
        } else {
            // Swapout burn: LogSwapout(account, bindaddr, amount)
            (*SWAPOUT_TOPIC, 2)
        };

        let deposit = token
            .deposit_address
            .as_deref()
            .and_then(|a| Address::from_str(a).ok());

        let contract = contract.ok_or(VerifyError::DepositLogNotFound)?;
        for log in &receipt.logs {
            if log.address != contract || log.topics.first() != Some(&wanted_topic) {
                continue;
            }
            if self.is_src {
                // Deposits must land on the configured deposit address.
                let to = log
                    .topics
                    .get(2)
                    .map(|t| Address::from_slice(&t.0[12..32]));
                if deposit.is_some() && to != deposit {
                    continue;
                }
            }
            let counterparty = log
                .topics
                .get(counterparty_topic_idx)
                .map(|t| Address::from_slice(&t.0[12..32]))
                .ok_or(VerifyError::DepositLogNotFound)?;
            if log.data.len() < 32 {
                return Err(VerifyError::TxIncompatible);
            }
            info.bind = format!("{:#x}", counterparty);
            info.value = U256::from_big_endian(&log.data[0..32]);
            return Ok(());
        }
        Err(VerifyError::DepositLogNotFound)
    }

    fn parse_router_log(&self, log: &Log) -> Option<TxSwapInfo> {
        let topic = log.topics.first()?;
        let mut info = TxSwapInfo {
            log_index: log.log_index.map(|i| i.as_u32()).unwrap_or_default(),
            from_chain_id: self.config.chain_id.clone(),
            tx_to: format!("{:#x}", log.address),
            ..Default::default()
        };

        if *topic == *ROUTER_SWAPOUT_TOPIC {
            // token/from/to indexed; data: amount, fromChainID, toChainID
            let token = Address::from_slice(&log.topics.get(1)?.0[12..32]);
            let bind = Address::from_slice(&log.topics.get(3)?.0[12..32]);
            let fields = abi::decode(
                &[ParamType::Uint(256), ParamType::Uint(256), ParamType::Uint(256)],
                &log.data,
            )
            .ok()?;
            info.token = format!("{:#x}", token);
            info.pair_id = info.token.clone();
            info.bind = format!("{:#x}", bind);
            info.value = fields[0].clone().into_uint()?;
            info.to_chain_id = fields[2].clone().into_uint()?.to_string();
            Some(info)
        } else if *topic == *ROUTER_TRADE_TOPIC || *topic == *ROUTER_TRADE_NATIVE_TOPIC {
            // from/to indexed; data: path, amountIn, amountOutMin, fromChainID, toChainID
            let bind = Address::from_slice(&log.topics.get(2)?.0[12..32]);
            let fields = abi::decode(
                &[
                    ParamType::Array(Box::new(ParamType::Address)),
                    ParamType::Uint(256),
                    ParamType::Uint(256),
                    ParamType::Uint(256),
                    ParamType::Uint(256),
                ],
                &log.data,
            )
            .ok()?;
            let path: Vec<String> = fields[0]
                .clone()
                .into_array()?
                .into_iter()
                .filter_map(|t| t.into_address())
                .map(|a| format!("{:#x}", a))
                .collect();
            info.token = path.first().cloned().unwrap_or_default();
            info.pair_id = info.token.clone();
            info.bind = format!("{:#x}", bind);
            info.path = path;
            info.value = fields[1].clone().into_uint()?;
            info.amount_out_min = fields[2].clone().into_uint()?;
            info.to_chain_id = fields[4].clone().into_uint()?.to_string();
            info.for_native = *topic == *ROUTER_TRADE_NATIVE_TOPIC;
            Some(info)
        } else {
            None
        }
    }

    /// All router swap logs of a transaction, stability already applied.
    async fn scan_router_logs(
        &self,
        tx_id: &str,
        allow_unstable: bool,
    ) -> Result<Vec<TxSwapInfo>, VerifyError> {
        let router = self.router_contract.ok_or(VerifyError::RouterSwapNotSupported)?;
        let hash = H256::from_str(tx_id).map_err(|_| VerifyError::MalformedTxId)?;
        let receipt = self.get_receipt(hash).await?.ok_or(VerifyError::TxNotFound)?;
        if receipt.status != Some(1u64.into()) {
            return Err(VerifyError::TxWithWrongReceipt);
        }
        let latest = self.latest_block().await?;
        self.check_stability(
            receipt.block_number.map(|b| b.as_u64()).unwrap_or(0),
            latest,
            allow_unstable,
        )?;

        let mut infos = Vec::new();
        for log in receipt.logs.iter().filter(|l| l.address == router) {
            if let Some(mut info) = self.parse_router_log(log) {
                info.tx_id = tx_id.to_string();
                infos.push(info);
            }
        }
        Ok(infos)
    }

    fn build_classic_calldata(&self, args: &BuildTxArgs) -> Result<(Address, Bytes), VerifyError> {
        let pair = self
            .pairs
            .get(&args.pair_id)
            .ok_or_else(|| VerifyError::UnknownPairId(args.pair_id.clone()))?;
        let token = self.token_side(pair);
        let contract = token
            .contract_address
            .as_deref()
            .and_then(|a| Address::from_str(a).ok())
            .ok_or_else(|| VerifyError::BuildTxFailed("pair has no token contract".into()))?;
        let bind = Address::from_str(&args.bind)
            .map_err(|_| VerifyError::InvalidAddress(args.bind.clone()))?;
        let swap_id = H256::from_str(&args.swap_id).map_err(|_| VerifyError::MalformedTxId)?;

        let data = match args.swap_type {
            // Mint the bridged token to the bind address.
            SwapType::Swapin => encode_call(
                "Swapin(bytes32,address,uint256)",
                &[
                    Token::FixedBytes(swap_id.as_bytes().to_vec()),
                    Token::Address(bind),
                    Token::Uint(args.origin_value),
                ],
            ),
            // Release the locked source asset back to the bind address.
            SwapType::Swapout => encode_call(
                "Swapout(bytes32,address,uint256)",
                &[
                    Token::FixedBytes(swap_id.as_bytes().to_vec()),
                    Token::Address(bind),
                    Token::Uint(args.origin_value),
                ],
            ),
            SwapType::RouterSwap => {
                return Err(VerifyError::BuildTxFailed(
                    "router swap built through router contract".into(),
                ))
            }
        };
        Ok((contract, data))
    }

    fn build_router_calldata(&self, args: &BuildTxArgs) -> Result<(Address, Bytes), VerifyError> {
        let router = self.router_contract.ok_or(VerifyError::RouterSwapNotSupported)?;
        let token = Address::from_str(&args.token)
            .map_err(|_| VerifyError::InvalidAddress(args.token.clone()))?;
        let bind = Address::from_str(&args.bind)
            .map_err(|_| VerifyError::InvalidAddress(args.bind.clone()))?;
        let swap_id = H256::from_str(&args.swap_id).map_err(|_| VerifyError::MalformedTxId)?;
        let from_chain = U256::from_dec_str(&args.from_chain_id)
            .map_err(|_| VerifyError::NoBridgeForChainId(args.from_chain_id.clone()))?;

        let base = vec![
            Token::FixedBytes(swap_id.as_bytes().to_vec()),
            Token::Address(token),
            Token::Address(bind),
            Token::Uint(args.origin_value),
            Token::Uint(from_chain),
        ];

        let data = if !args.path.is_empty() {
            let path: Vec<Token> = args
                .path
                .iter()
                .map(|p| {
                    Address::from_str(p)
                        .map(Token::Address)
                        .map_err(|_| VerifyError::InvalidAddress(p.clone()))
                })
                .collect::<Result<_, _>>()?;
            let sig = if args.for_native {
                "anySwapInExactTokensForNative(bytes32,uint256,uint256,address[],address,uint256)"
            } else {
                "anySwapInExactTokensForTokens(bytes32,uint256,uint256,address[],address,uint256)"
            };
            encode_call(
                sig,
                &[
                    Token::FixedBytes(swap_id.as_bytes().to_vec()),
                    Token::Uint(args.origin_value),
                    Token::Uint(args.amount_out_min),
                    Token::Array(path),
                    Token::Address(bind),
                    Token::Uint(from_chain),
                ],
            )
        } else if args.for_underlying {
            encode_call(
                "anySwapInUnderlying(bytes32,address,address,uint256,uint256)",
                &base,
            )
        } else {
            encode_call("anySwapInAuto(bytes32,address,address,uint256,uint256)", &base)
        };
        Ok((router, data))
    }
}

fn encode_call(signature: &str, tokens: &[Token]) -> Bytes {
    let mut data = keccak256(signature.as_bytes())[0..4].to_vec();
    data.extend(abi::encode(tokens));
    data.into()
}

#[async_trait]
impl ChainBridge for EvmBridge {
    fn chain_id(&self) -> &str {
        &self.config.chain_id
    }

    fn capabilities(&self) -> BridgeCapabilities {
        BridgeCapabilities { retryable_nonce: true }
    }

    async fn verify_transaction(
        &self,
        pair_id: &str,
        tx_id: &str,
        allow_unstable: bool,
    ) -> SwapVerification {
        let mut info = TxSwapInfo {
            pair_id: pair_id.to_string(),
            tx_id: tx_id.to_string(),
            ..Default::default()
        };

        let pair = match self.pairs.get(pair_id) {
            Some(pair) => pair,
            None => {
                return SwapVerification::failed(info, VerifyError::UnknownPairId(pair_id.into()))
            }
        };
        let token = self.token_side(pair);

        let hash = match H256::from_str(tx_id) {
            Ok(hash) => hash,
            Err(_) => return SwapVerification::failed(info, VerifyError::MalformedTxId),
        };

        let receipt = match self.get_receipt(hash).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => return SwapVerification::failed(info, VerifyError::TxNotFound),
            Err(err) => return SwapVerification::failed(info, err),
        };
        if receipt.status != Some(1u64.into()) {
            return SwapVerification::failed(info, VerifyError::TxWithWrongReceipt);
        }
        if let Some(to) = receipt.to {
            info.tx_to = format!("{:#x}", to);
        }

        if let Err(err) = self.extract_classic_swap(token, &receipt, &mut info) {
            return SwapVerification::failed(info, err);
        }

        let latest = match self.latest_block().await {
            Ok(latest) => latest,
            Err(err) => return SwapVerification::failed(info, err),
        };
        if let Err(err) = self.check_stability(
            receipt.block_number.map(|b| b.as_u64()).unwrap_or(0),
            latest,
            allow_unstable,
        ) {
            return SwapVerification::failed(info, err);
        }

        if let Err(err) = Self::check_value_bounds(token, info.value) {
            return SwapVerification::failed(info, err);
        }

        SwapVerification::ok(info)
    }

    async fn get_transaction_status(&self, tx_id: &str) -> Option<TxStatus> {
        let hash = H256::from_str(tx_id).ok()?;
        let receipt = self.get_receipt(hash).await.ok()??;
        let block_height = receipt.block_number.map(|b| b.as_u64()).unwrap_or(0);
        let latest = self.latest_block().await.ok()?;
        Some(TxStatus {
            block_height,
            confirmations: latest.saturating_sub(block_height) + 1,
        })
    }

    async fn build_raw_transaction(&self, args: &BuildTxArgs) -> Result<RawTx, VerifyError> {
        if args.from.is_empty() {
            return Err(VerifyError::BuildTxFailed("empty sender".into()));
        }
        let from = Address::from_str(&args.from)
            .map_err(|_| VerifyError::InvalidAddress(args.from.clone()))?;

        let (to, data) = match args.swap_type {
            SwapType::RouterSwap => self.build_router_calldata(args)?,
            _ => self.build_classic_calldata(args)?,
        };

        let extra: EvmExtraArgs = match &args.extra {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| VerifyError::BuildTxFailed(format!("bad extra args: {e}")))?,
            None => EvmExtraArgs::default(),
        };

        let tx = TransactionRequest::new()
            .from(from)
            .to(to)
            .data(data)
            .gas(extra.gas_limit.unwrap_or(DEFAULT_GAS_LIMIT))
            .gas_price(extra.gas_price.unwrap_or_default())
            .nonce(extra.nonce.unwrap_or_default())
            .chain_id(self.numeric_chain_id);
        let typed: TypedTransaction = tx.into();

        Ok(typed.rlp().to_vec())
    }

    fn verify_msg_hash(&self, raw_tx: &[u8], expected: &[String]) -> Result<(), VerifyError> {
        if expected.len() != 1 {
            return Err(VerifyError::WrongCountOfMsgHashes);
        }
        let sighash = keccak256(raw_tx);
        let wanted = expected[0].trim_start_matches("0x");
        let computed = hex::encode(sighash);
        if !computed.eq_ignore_ascii_case(wanted) {
            return Err(VerifyError::MsgHashMismatch);
        }
        Ok(())
    }

    fn is_valid_address(&self, address: &str) -> bool {
        Address::from_str(address).is_ok()
    }
}

#[async_trait]
impl RouterSwapper for EvmBridge {
    fn router_signer(&self) -> &str {
        self.config.router_signer.as_deref().unwrap_or_default()
    }

    async fn register_router_swap_tx(
        &self,
        tx_id: &str,
    ) -> Result<Vec<SwapVerification>, VerifyError> {
        // Registration accepts unstable transactions; a later stable
        // verification gates the actual signing.
        let infos = self.scan_router_logs(tx_id, true).await?;
        Ok(infos.into_iter().map(SwapVerification::ok).collect())
    }

    async fn verify_router_swap_tx(
        &self,
        tx_id: &str,
        log_index: u32,
        allow_unstable: bool,
    ) -> Result<TxSwapInfo, VerifyError> {
        let infos = self.scan_router_logs(tx_id, allow_unstable).await?;
        infos
            .into_iter()
            .find(|info| info.log_index == log_index)
            .ok_or(VerifyError::DepositLogNotFound)
    }
}
