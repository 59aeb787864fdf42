//! Configuration management for the spanbridge coordinator
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Default tracing filter; the RUST_LOG environment variable wins.
    #[serde(default)]
    pub log_filter: Option<String>,
    pub bridge: BridgeConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub mpc: MpcConfig,
    pub chains: HashMap<String, ChainConfig>,
    pub pairs: HashMap<String, PairConfig>,
}

/// Identity of this coordinator and its classic source/destination pair.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Identifier stamped into every sign request this deployment initiates.
    /// Sign requests carrying a different identifier are not ours.
    pub identifier: String,
    /// Key into `chains` for the classic source chain.
    pub src_chain: String,
    /// Key into `chains` for the classic destination chain.
    pub dest_chain: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Empty URL selects the in-memory store (development only).
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

/// Threshold-signing subsystem connection.
#[derive(Debug, Clone, Deserialize)]
pub struct MpcConfig {
    pub enabled: bool,
    #[serde(default)]
    pub rpc_url: String,
    /// Accounts allowed to initiate sign requests.
    #[serde(default)]
    pub initiators: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    Evm,
    Bitcoin,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Decimal chain identifier; keys the router bridge registry.
    pub chain_id: String,
    pub name: String,
    pub kind: ChainKind,
    pub rpc_urls: Vec<String>,
    pub confirmation_blocks: u64,
    /// Router contract address (EVM chains participating in router swaps).
    #[serde(default)]
    pub router_contract: Option<String>,
    /// Threshold-signer account used as sender for router destination txs.
    #[serde(default)]
    pub router_signer: Option<String>,
    /// bitcoind RPC credentials.
    #[serde(default)]
    pub rpc_user: Option<String>,
    #[serde(default)]
    pub rpc_password: Option<String>,
    /// Pair served by this chain (Bitcoin chains only).
    #[serde(default)]
    pub pair_id: Option<String>,
    pub enabled: bool,
}

/// A configured (source token, destination token) mapping.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PairConfig {
    pub pair_id: String,
    pub src_token: TokenConfig,
    pub dest_token: TokenConfig,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TokenConfig {
    pub symbol: String,
    pub decimals: u8,
    /// Token contract (None for native coins).
    #[serde(default)]
    pub contract_address: Option<String>,
    /// Address users deposit into on the source side.
    #[serde(default)]
    pub deposit_address: Option<String>,
    /// Threshold-signer account that sends the counterpart transaction.
    pub signer_address: String,
    /// Per-swap value bounds, decimal base-unit strings.
    #[serde(default)]
    pub maximum_swap: Option<String>,
    #[serde(default)]
    pub minimum_swap: Option<String>,
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("SPANBRIDGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.enabled_chains().is_empty() {
            anyhow::bail!("At least one chain must be enabled");
        }

        for name in [&self.bridge.src_chain, &self.bridge.dest_chain] {
            if !self.chains.contains_key(name) {
                anyhow::bail!("Bridge references unknown chain {}", name);
            }
        }

        for (name, chain) in &self.chains {
            if chain.enabled && chain.rpc_urls.is_empty() {
                anyhow::bail!("Chain {} has no RPC URLs configured", name);
            }
            if chain.router_contract.is_some() && chain.router_signer.is_none() {
                anyhow::bail!("Chain {} has a router contract but no router signer", name);
            }
            if chain.kind == ChainKind::Bitcoin {
                let pair_id = chain
                    .pair_id
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("Bitcoin chain {} declares no pair", name))?;
                if !self.pairs.contains_key(pair_id) {
                    anyhow::bail!("Bitcoin chain {} references unknown pair {}", name, pair_id);
                }
            }
        }

        for (key, pair) in &self.pairs {
            if pair.pair_id != *key {
                anyhow::bail!("Pair {} has mismatched pair_id {}", key, pair.pair_id);
            }
        }

        if self.mpc.enabled && self.mpc.rpc_url.is_empty() {
            anyhow::bail!("MPC is enabled but no rpc_url configured");
        }

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }

    /// Get chain config by decimal chain ID
    pub fn chain_by_id(&self, chain_id: &str) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }

    pub fn src_chain(&self) -> &ChainConfig {
        &self.chains[&self.bridge.src_chain]
    }

    pub fn dest_chain(&self) -> &ChainConfig {
        &self.chains[&self.bridge.dest_chain]
    }

    /// Get pair config by pair ID
    pub fn pair(&self, pair_id: &str) -> Option<&PairConfig> {
        self.pairs.get(pair_id)
    }

    pub fn all_pair_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pairs.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether the account is a configured sign-request initiator.
    pub fn is_initiator(&self, account: &str) -> bool {
        self.mpc
            .initiators
            .iter()
            .any(|a| a.eq_ignore_ascii_case(account))
    }

    /// Tracing filter to fall back on when RUST_LOG is unset.
    pub fn log_filter(&self) -> &str {
        self.log_filter
            .as_deref()
            .unwrap_or("info,spanbridge=debug,sqlx=warn")
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(
            result,
            "url = \"https://api.example.com/test_value/endpoint\""
        );
    }

    #[test]
    fn test_is_initiator_case_insensitive() {
        let settings = crate::testutil::test_settings();
        assert!(settings.is_initiator("0xInitiator"));
        assert!(settings.is_initiator("0xINITIATOR"));
        assert!(!settings.is_initiator("0xsomebody"));
    }
}
