use crate::chains::ChainRegistry;
use crate::config::Config;
use crate::constants::{
    CHAIN_ETHEREUM_MAINNET, CHAIN_GOERLI, FEE_PERCENTILE_PER_MILLE, GWEI_SCALE,
    RECEIPT_FETCH_CONCURRENCY,
};
use crate::error::{AppError, Result};
use crate::models::PriorityFees;
use crate::services::chain_client::{BlockSummary, ChainClient, ChainClientFactory};
use ethers::types::U256;
use futures_util::{stream, StreamExt, TryStreamExt};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Static priority-fee suggestions in gwei.
pub fn priority_fees(chain_id: u64) -> PriorityFees {
    match chain_id {
        CHAIN_ETHEREUM_MAINNET => PriorityFees {
            low: Decimal::ONE,
            medium: Decimal::TWO,
            high: Decimal::new(5, 0),
        },
        CHAIN_GOERLI => PriorityFees {
            low: Decimal::new(1, GWEI_SCALE),
            medium: Decimal::new(1, GWEI_SCALE),
            high: Decimal::new(1, GWEI_SCALE),
        },
        _ => PriorityFees {
            low: Decimal::ZERO,
            medium: Decimal::ZERO,
            high: Decimal::ZERO,
        },
    }
}

/// Exact wei -> gwei conversion.
pub fn wei_to_gwei(wei: U256) -> Result<Decimal> {
    if wei > U256::from(u128::MAX) {
        return Err(AppError::Internal(format!("Fee out of range: {} wei", wei)));
    }
    let wei = i128::try_from(wei.as_u128())
        .map_err(|_| AppError::Internal(format!("Fee out of range: {} wei", wei)))?;
    Decimal::try_from_i128_with_scale(wei, GWEI_SCALE)
        .map(|gwei| gwei.normalize())
        .map_err(|e| AppError::Internal(format!("Fee out of range: {}", e)))
}

/// Nearest-rank 10th percentile, no interpolation. `None` for no samples.
pub fn percentile_fee(mut prices: Vec<U256>) -> Option<U256> {
    if prices.is_empty() {
        return None;
    }
    prices.sort_unstable();
    let rank = prices.len() * FEE_PERCENTILE_PER_MILLE / 1_000;
    prices.get(rank).copied()
}

/// One-endpoint, one-attempt gas fee estimation over the latest blocks.
pub struct FeeEstimator {
    chains: ChainRegistry,
    clients: Arc<dyn ChainClientFactory>,
    block_count: u64,
    stale_block_secs: i64,
    // Grows with the chain; blocks are never evicted.
    effective_fee_by_block: HashMap<u64, Mutex<HashMap<u64, Decimal>>>,
}

impl FeeEstimator {
    pub fn new(chains: ChainRegistry, clients: Arc<dyn ChainClientFactory>, config: &Config) -> Self {
        let effective_fee_by_block = chains
            .chain_ids()
            .into_iter()
            .map(|chain_id| (chain_id, Mutex::new(HashMap::new())))
            .collect();

        Self {
            chains,
            clients,
            block_count: config.fee_block_count.max(1),
            stale_block_secs: config.fee_stale_block_secs,
            effective_fee_by_block,
        }
    }

    /// Fee in gwei, or `None` when this endpoint should be skipped.
    pub async fn estimate(&self, chain_id: u64, endpoint: &str) -> Option<Decimal> {
        match self.try_estimate(chain_id, endpoint).await {
            Ok(fee) => fee,
            Err(e) => {
                tracing::warn!("Fee estimation via {} failed: {}", endpoint, e);
                None
            }
        }
    }

    async fn try_estimate(&self, chain_id: u64, endpoint: &str) -> Result<Option<Decimal>> {
        let chain = self.chains.get(chain_id)?;
        let client = self.clients.connect(chain_id, endpoint)?;

        let reported = client.chain_id().await?;
        if reported != chain_id {
            tracing::warn!(
                "RPC URL {} contain wrong chain #{}. Expected {}",
                endpoint,
                reported,
                chain_id
            );
            return Ok(None);
        }

        let latest = client.block_number().await?;
        let latest_block = client.block(latest).await?;
        let age = chrono::Utc::now().timestamp() - latest_block.timestamp;
        if age > self.stale_block_secs {
            tracing::warn!(
                "RPC URL {} is stale: block #{} is {}s old",
                endpoint,
                latest,
                age
            );
            return Ok(None);
        }

        let oldest = latest.saturating_sub(self.block_count - 1);
        let mut fees = Vec::with_capacity(self.block_count as usize);
        for number in (oldest..=latest).rev() {
            if let Some(fee) = self.memoized(chain_id, number) {
                fees.push(fee);
                continue;
            }

            let block = if number == latest {
                latest_block.clone()
            } else {
                client.block(number).await?
            };

            let fee = if chain.eip1559_enabled {
                base_fee_gwei(&block)?
            } else {
                let fee = legacy_fee_gwei(client.as_ref(), &block).await?;
                tracing::info!(
                    "Block #{} Chain {} has effective fee {} gwei",
                    number,
                    chain_id,
                    fee
                );
                fee
            };

            self.memoize(chain_id, number, fee);
            fees.push(fee);
        }

        Ok(fees.into_iter().max())
    }

    fn memoized(&self, chain_id: u64, block: u64) -> Option<Decimal> {
        let memo = self.effective_fee_by_block.get(&chain_id)?;
        let guard = memo.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.get(&block).copied()
    }

    fn memoize(&self, chain_id: u64, block: u64, fee: Decimal) {
        if let Some(memo) = self.effective_fee_by_block.get(&chain_id) {
            let mut guard = memo.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.insert(block, fee);
        }
    }
}

fn base_fee_gwei(block: &BlockSummary) -> Result<Decimal> {
    let base_fee = block.base_fee_per_gas.ok_or_else(|| {
        AppError::BlockchainRPC(format!("Block #{} has no base fee", block.number))
    })?;
    wei_to_gwei(base_fee)
}

// Transaction index 0 is excluded from the sample.
async fn legacy_fee_gwei(client: &dyn ChainClient, block: &BlockSummary) -> Result<Decimal> {
    let prices: Vec<U256> = stream::iter(block.transaction_hashes.iter().skip(1).copied())
        .map(|hash| client.effective_gas_price(hash))
        .buffer_unordered(RECEIPT_FETCH_CONCURRENCY)
        .try_collect()
        .await?;

    match percentile_fee(prices) {
        Some(wei) => wei_to_gwei(wei),
        None => Ok(Decimal::ZERO),
    }
}
