use crate::constants::{CHAIN_BSC, CHAIN_ETHEREUM_MAINNET, CHAIN_GOERLI};
use crate::error::{AppError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Explorer URL templates. `{address}` and `{token}` are substituted.
#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerUrls {
    pub address: String,
    #[serde(default)]
    pub token_balance: Option<String>,
}

/// Static per-chain configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub rpc_urls: Vec<String>,
    pub rpc_call_retry_attempt: u32,
    #[serde(default)]
    pub eip1559_enabled: bool,
    pub currency_name: String,
    pub explorer: ExplorerUrls,
}

impl ChainConfig {
    pub fn address_url(&self, address: &str) -> String {
        self.explorer.address.replace("{address}", address)
    }

    /// Balance page for an address, optionally scoped to one token.
    pub fn balance_url(&self, address: &str, token: Option<&str>) -> String {
        match (token, &self.explorer.token_balance) {
            (Some(token), Some(template)) => template
                .replace("{token}", token)
                .replace("{address}", address),
            _ => self.address_url(address),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChainConfigFile {
    chains: Vec<ChainConfig>,
}

/// Fixed set of chains known to the process.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: Arc<HashMap<u64, ChainConfig>>,
}

impl ChainRegistry {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read chain config {}: {}", path.display(), e))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let file: ChainConfigFile = serde_json::from_str(raw)?;
        Self::new(file.chains)
    }

    pub fn new(chains: Vec<ChainConfig>) -> anyhow::Result<Self> {
        if chains.is_empty() {
            anyhow::bail!("Chain config contains no chains");
        }

        let mut by_id = HashMap::with_capacity(chains.len());
        for chain in chains {
            if chain.rpc_urls.is_empty() {
                anyhow::bail!("Chain {} has no RPC urls", chain.chain_id);
            }
            for rpc_url in &chain.rpc_urls {
                url::Url::parse(rpc_url).map_err(|e| {
                    anyhow::anyhow!("Chain {} has invalid RPC url {}: {}", chain.chain_id, rpc_url, e)
                })?;
            }
            if chain.rpc_call_retry_attempt == 0 {
                anyhow::bail!("Chain {} has zero RPC retry attempts", chain.chain_id);
            }
            let chain_id = chain.chain_id;
            if by_id.insert(chain_id, chain).is_some() {
                anyhow::bail!("Chain {} is configured twice", chain_id);
            }
        }

        Ok(Self {
            chains: Arc::new(by_id),
        })
    }

    pub fn get(&self, chain_id: u64) -> Result<&ChainConfig> {
        self.chains
            .get(&chain_id)
            .ok_or(AppError::UnknownChain(chain_id))
    }

    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.chains.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Mainnet, BSC and Goerli first, then everything else ascending.
    pub fn fee_chain_order(&self) -> Vec<u64> {
        let mut ids = self.chain_ids();
        ids.sort_by_key(|id| {
            let rank = match *id {
                CHAIN_ETHEREUM_MAINNET => 0,
                CHAIN_BSC => 1,
                CHAIN_GOERLI => 2,
                _ => 3,
            };
            (rank, *id)
        });
        ids
    }
}

#[cfg(test)]
pub(crate) fn test_chain(chain_id: u64, rpc_urls: &[&str], retries: u32, eip1559: bool) -> ChainConfig {
    ChainConfig {
        chain_id,
        rpc_urls: rpc_urls.iter().map(|u| u.to_string()).collect(),
        rpc_call_retry_attempt: retries,
        eip1559_enabled: eip1559,
        currency_name: "ETH".to_string(),
        explorer: ExplorerUrls {
            address: "https://explorer.test/address/{address}".to_string(),
            token_balance: Some("https://explorer.test/token/{token}?a={address}".to_string()),
        },
    }
}
