use crate::error::{AppError, Result};
use async_trait::async_trait;
use ethers::{
    contract::ContractError,
    middleware::SignerMiddleware,
    providers::{Http, Middleware, MiddlewareError, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, H256, U256},
};
use rand::Rng;
use std::sync::Arc;

ethers::contract::abigen!(
    Erc20,
    r#"[
        function name() view returns (string)
        function symbol() view returns (string)
        function decimals() view returns (uint8)
        function balanceOf(address) view returns (uint256)
    ]"#
);

/// The parts of a block the fee estimator looks at.
#[derive(Debug, Clone)]
pub struct BlockSummary {
    pub number: u64,
    pub timestamp: i64,
    pub base_fee_per_gas: Option<U256>,
    pub transaction_hashes: Vec<H256>,
}

/// Read-only RPC access to one endpoint of one chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;
    async fn block_number(&self) -> Result<u64>;
    async fn block(&self, number: u64) -> Result<BlockSummary>;
    async fn effective_gas_price(&self, tx_hash: H256) -> Result<U256>;
    async fn native_balance(&self, address: Address) -> Result<U256>;
    async fn transaction_count(&self, address: Address) -> Result<U256>;
    async fn token_decimals(&self, token: Address) -> Result<u8>;
    async fn token_name(&self, token: Address) -> Result<String>;
    async fn token_symbol(&self, token: Address) -> Result<String>;
    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256>;
}

/// Builds a client for a given chain and endpoint url.
pub trait ChainClientFactory: Send + Sync {
    fn connect(&self, chain_id: u64, endpoint: &str) -> Result<Arc<dyn ChainClient>>;
}

// Keeps the JSON-RPC error code when the endpoint answered with one.
fn rpc_error<E: MiddlewareError>(err: E) -> AppError {
    middleware_error(&err)
}

fn middleware_error<E: MiddlewareError>(err: &E) -> AppError {
    match err.as_error_response() {
        Some(response) => AppError::RpcApi {
            message: response.message.clone(),
            code: Some(response.code),
        },
        None => AppError::BlockchainRPC(err.to_string()),
    }
}

type SignedProvider = SignerMiddleware<Provider<Http>, LocalWallet>;

fn contract_error(err: ContractError<SignedProvider>) -> AppError {
    if let Some(inner) = err.as_middleware_error() {
        return middleware_error(inner);
    }
    if err.is_revert() {
        return AppError::RpcApi {
            message: err.to_string(),
            code: None,
        };
    }
    AppError::BlockchainRPC(err.to_string())
}

pub struct EthersChainClient {
    client: Arc<SignedProvider>,
}

#[async_trait]
impl ChainClient for EthersChainClient {
    async fn chain_id(&self) -> Result<u64> {
        let chain_id = self.client.get_chainid().await.map_err(rpc_error)?;
        if chain_id > U256::from(u64::MAX) {
            return Err(AppError::BlockchainRPC(format!(
                "Chain id out of range: {}",
                chain_id
            )));
        }
        Ok(chain_id.as_u64())
    }

    async fn block_number(&self) -> Result<u64> {
        let number = self.client.get_block_number().await.map_err(rpc_error)?;
        Ok(number.as_u64())
    }

    async fn block(&self, number: u64) -> Result<BlockSummary> {
        let block = self
            .client
            .get_block(number)
            .await
            .map_err(rpc_error)?
            .ok_or_else(|| AppError::BlockchainRPC(format!("Block #{} not found", number)))?;

        if block.timestamp > U256::from(i64::MAX as u64) {
            return Err(AppError::BlockchainRPC(format!(
                "Block #{} has invalid timestamp",
                number
            )));
        }

        Ok(BlockSummary {
            number,
            timestamp: block.timestamp.as_u64() as i64,
            base_fee_per_gas: block.base_fee_per_gas,
            transaction_hashes: block.transactions,
        })
    }

    async fn effective_gas_price(&self, tx_hash: H256) -> Result<U256> {
        let receipt = self
            .client
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(rpc_error)?
            .ok_or_else(|| AppError::BlockchainRPC(format!("Receipt {:?} not found", tx_hash)))?;

        receipt.effective_gas_price.ok_or_else(|| {
            AppError::BlockchainRPC(format!("Receipt {:?} has no effective gas price", tx_hash))
        })
    }

    async fn native_balance(&self, address: Address) -> Result<U256> {
        self.client
            .get_balance(address, None)
            .await
            .map_err(rpc_error)
    }

    async fn transaction_count(&self, address: Address) -> Result<U256> {
        self.client
            .get_transaction_count(address, None)
            .await
            .map_err(rpc_error)
    }

    async fn token_decimals(&self, token: Address) -> Result<u8> {
        Erc20::new(token, self.client.clone())
            .decimals()
            .call()
            .await
            .map_err(contract_error)
    }

    async fn token_name(&self, token: Address) -> Result<String> {
        Erc20::new(token, self.client.clone())
            .name()
            .call()
            .await
            .map_err(contract_error)
    }

    async fn token_symbol(&self, token: Address) -> Result<String> {
        Erc20::new(token, self.client.clone())
            .symbol()
            .call()
            .await
            .map_err(contract_error)
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256> {
        Erc20::new(token, self.client.clone())
            .balance_of(owner)
            .call()
            .await
            .map_err(contract_error)
    }
}

/// Creates ethers HTTP clients bound to a throwaway signing key.
///
/// The key is generated once per process and never signs anything.
pub struct EthersClientFactory {
    wallet: LocalWallet,
}

impl EthersClientFactory {
    pub fn new() -> anyhow::Result<Self> {
        let mut key = [0u8; 32];
        rand::rng().fill(&mut key);
        let wallet = LocalWallet::from_bytes(&key)?;
        Ok(Self { wallet })
    }
}

impl ChainClientFactory for EthersClientFactory {
    fn connect(&self, chain_id: u64, endpoint: &str) -> Result<Arc<dyn ChainClient>> {
        let provider = Provider::<Http>::try_from(endpoint)
            .map_err(|e| AppError::Internal(format!("Invalid RPC URL {}: {}", endpoint, e)))?;
        let signer = self.wallet.clone().with_chain_id(chain_id);
        let client = SignerMiddleware::new(provider, signer);

        Ok(Arc::new(EthersChainClient {
            client: Arc::new(client),
        }))
    }
}


#[cfg(test)]
mod tests {
    use super::mock::*;
    use super::*;

    #[test]
    fn factory_rejects_invalid_url() {
        let factory = EthersClientFactory::new().expect("random key should be valid");
        assert!(factory.connect(1, "not a url").is_err());
    }

    #[test]
    fn factory_accepts_http_url() {
        let factory = EthersClientFactory::new().expect("random key should be valid");
        assert!(factory.connect(1, "http://localhost:8545").is_ok());
    }

    #[tokio::test]
    async fn mock_endpoint_serves_scripted_failures_then_succeeds() {
        let endpoint = MockEndpoint::new(1).failing(2);
        assert!(endpoint.chain_id().await.is_err());
        assert!(endpoint.chain_id().await.is_err());
        assert_eq!(endpoint.chain_id().await.expect("third call succeeds"), 1);
        assert_eq!(endpoint.calls("chain_id"), 3);
    }
}
