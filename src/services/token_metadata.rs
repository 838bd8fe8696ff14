use crate::chains::ChainRegistry;
use crate::error::{AppError, Result};
use crate::services::chain_client::{ChainClient, ChainClientFactory};
use ethers::types::Address;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

type TokenKey = (u64, Address);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenResolution {
    Token(TokenMetadata),
    /// `decimals()` answered zero. Never cached.
    NotAToken,
}

/// Memoized ERC-20 metadata, keyed by chain and token address.
///
/// Metadata is assumed immutable once deployed, so hits are permanent.
/// First-time resolution is serialized per key, not globally.
pub struct TokenMetadataCache {
    chains: ChainRegistry,
    clients: Arc<dyn ChainClientFactory>,
    cache: RwLock<HashMap<TokenKey, TokenMetadata>>,
    locks: RwLock<HashMap<TokenKey, Arc<Mutex<()>>>>,
}

impl TokenMetadataCache {
    pub fn new(chains: ChainRegistry, clients: Arc<dyn ChainClientFactory>) -> Self {
        Self {
            chains,
            clients,
            cache: RwLock::new(HashMap::new()),
            locks: RwLock::new(HashMap::new()),
        }
    }

    pub async fn resolve(&self, chain_id: u64, token: Address) -> Result<TokenResolution> {
        let key = (chain_id, token);
        if let Some(metadata) = self.cached(&key).await {
            return Ok(TokenResolution::Token(metadata));
        }

        let lock = self.lock_for(key).await;
        let _guard = lock.lock().await;
        if let Some(metadata) = self.cached(&key).await {
            return Ok(TokenResolution::Token(metadata));
        }

        // Only the first endpoint is asked; a failure here is not failed over.
        let chain = self.chains.get(chain_id)?;
        let endpoint = chain
            .rpc_urls
            .first()
            .ok_or(AppError::TokenInfoUnavailable)?;
        let resolution = async {
            let client = self.clients.connect(chain_id, endpoint)?;
            fetch_metadata(client.as_ref(), token).await
        }
        .await
        .map_err(|e| {
            tracing::warn!(
                "Token info lookup failed for {:?} on chain {} via {}: {}",
                token,
                chain_id,
                endpoint,
                e
            );
            AppError::TokenInfoUnavailable
        })?;

        if let TokenResolution::Token(metadata) = &resolution {
            self.cache.write().await.insert(key, metadata.clone());
            tracing::debug!(
                "Cached token {} ({}) on chain {}",
                metadata.symbol,
                metadata.decimals,
                chain_id
            );
        }

        Ok(resolution)
    }

    async fn cached(&self, key: &TokenKey) -> Option<TokenMetadata> {
        self.cache.read().await.get(key).cloned()
    }

    async fn lock_for(&self, key: TokenKey) -> Arc<Mutex<()>> {
        {
            let guard = self.locks.read().await;
            if let Some(lock) = guard.get(&key) {
                return lock.clone();
            }
        }

        let mut guard = self.locks.write().await;
        guard
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

async fn fetch_metadata(client: &dyn ChainClient, token: Address) -> Result<TokenResolution> {
    let decimals = client.token_decimals(token).await?;
    if decimals == 0 {
        return Ok(TokenResolution::NotAToken);
    }

    let name = client.token_name(token).await?;
    let symbol = client.token_symbol(token).await?;

    Ok(TokenResolution::Token(TokenMetadata {
        name,
        symbol,
        decimals,
    }))
}
