use crate::chains::{ChainConfig, ChainRegistry};
use crate::constants::NATIVE_COIN_DECIMALS;
use crate::error::{AppError, Result};
use crate::models::{AddressInfo, AssetType, BalanceResponse, NonceResponse, TokenInfo};
use crate::services::amount::format_balance;
use crate::services::chain_client::ChainClientFactory;
use crate::services::failover::EndpointFailover;
use crate::services::token_metadata::{TokenMetadataCache, TokenResolution};
use ethers::types::{Address, U256};
use ethers::utils::to_checksum;
use std::str::FromStr;
use std::sync::Arc;

/// Parses a 0x-prefixed hex address.
pub fn parse_address(value: &str) -> Result<Address> {
    Address::from_str(value.trim())
        .map_err(|_| AppError::BadRequest(format!("Invalid address: {}", value)))
}

/// Blank token addresses mean "native coin".
pub fn parse_token(value: Option<&str>) -> Result<Option<Address>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(token) => parse_address(token).map(Some),
    }
}

fn address_info(chain: &ChainConfig, address: Address, token: Option<Address>) -> AddressInfo {
    let lowercase = format!("{:#x}", address);
    let token = token.map(|t| format!("{:#x}", t));
    AddressInfo {
        address_checksum: to_checksum(&address, None),
        address_url: chain.address_url(&lowercase),
        address_url_token: chain.balance_url(&lowercase, token.as_deref()),
        address: lowercase,
    }
}

/// Balance and nonce lookups with endpoint failover.
pub struct BalanceService {
    chains: ChainRegistry,
    clients: Arc<dyn ChainClientFactory>,
    tokens: TokenMetadataCache,
    failover: EndpointFailover,
}

impl BalanceService {
    pub fn new(
        chains: ChainRegistry,
        clients: Arc<dyn ChainClientFactory>,
        failover: EndpointFailover,
    ) -> Self {
        let tokens = TokenMetadataCache::new(chains.clone(), clients.clone());
        Self {
            chains,
            clients,
            tokens,
            failover,
        }
    }

    pub async fn get_balance(
        &self,
        address: &str,
        token: Option<&str>,
        chain_id: u64,
    ) -> Result<BalanceResponse> {
        let chain = self.chains.get(chain_id)?;
        let owner = parse_address(address)?;
        let token = parse_token(token)?;

        tracing::info!(
            "Get value for address {:#x}. Token: {:?}. Chain Id: {}",
            owner,
            token,
            chain_id
        );

        let response = match token {
            None => self.native_balance(chain, owner).await?,
            Some(token) => self.token_balance(chain, owner, token).await?,
        };

        tracing::info!(
            "Get value for address {}. Token: {:?}. Chain Id: {} = {} ({})",
            response.address.address,
            token,
            chain_id,
            response.balance.pow_string,
            response.balance.wei_string
        );

        Ok(response)
    }

    pub async fn get_nonce(&self, address: &str, chain_id: u64) -> Result<NonceResponse> {
        let chain = self.chains.get(chain_id)?;
        let owner = parse_address(address)?;

        tracing::info!(
            "Get sent transaction count for address {:#x}. Chain Id: {}",
            owner,
            chain_id
        );

        let clients = &self.clients;
        let count = self
            .failover
            .run(&chain.rpc_urls, chain.rpc_call_retry_attempt, move |endpoint| async move {
                let client = clients.connect(chain_id, &endpoint)?;
                client.transaction_count(owner).await
            })
            .await?;

        if count > U256::from(u64::MAX) {
            return Err(AppError::Internal(format!(
                "Transaction count out of range: {}",
                count
            )));
        }

        Ok(NonceResponse {
            chain_id,
            address: address_info(chain, owner, None),
            nonce_id: count.as_u64(),
        })
    }

    async fn native_balance(&self, chain: &ChainConfig, owner: Address) -> Result<BalanceResponse> {
        let chain_id = chain.chain_id;
        let clients = &self.clients;
        let raw = self
            .failover
            .run(&chain.rpc_urls, chain.rpc_call_retry_attempt, move |endpoint| async move {
                let client = clients.connect(chain_id, &endpoint)?;
                client.native_balance(owner).await
            })
            .await?;

        Ok(BalanceResponse {
            chain_id,
            address: address_info(chain, owner, None),
            token: TokenInfo {
                name: chain.currency_name.clone(),
                symbol: chain.currency_name.clone(),
                decimals: NATIVE_COIN_DECIMALS,
                asset_type: AssetType::BaseCoin,
            },
            balance: format_balance(raw, NATIVE_COIN_DECIMALS),
        })
    }

    async fn token_balance(
        &self,
        chain: &ChainConfig,
        owner: Address,
        token: Address,
    ) -> Result<BalanceResponse> {
        let chain_id = chain.chain_id;
        let address = address_info(chain, owner, Some(token));

        let metadata = match self.tokens.resolve(chain_id, token).await? {
            TokenResolution::Token(metadata) => metadata,
            TokenResolution::NotAToken => {
                tracing::info!("Asset {:#x} not found on chain {}", token, chain_id);
                return Ok(BalanceResponse {
                    chain_id,
                    address,
                    token: TokenInfo::not_exist(),
                    balance: format_balance(U256::zero(), 0),
                });
            }
        };

        let clients = &self.clients;
        let raw = self
            .failover
            .run(&chain.rpc_urls, chain.rpc_call_retry_attempt, move |endpoint| async move {
                let client = clients.connect(chain_id, &endpoint)?;
                client.token_balance(token, owner).await
            })
            .await?;

        let decimals = u32::from(metadata.decimals);
        Ok(BalanceResponse {
            chain_id,
            address,
            token: TokenInfo {
                name: metadata.name,
                symbol: metadata.symbol,
                decimals,
                asset_type: AssetType::Erc20,
            },
            balance: format_balance(raw, decimals),
        })
    }
}
