// src/api/mod.rs

pub mod balance;
pub mod fee;
pub mod health;
pub mod nonce;

use crate::config::Config;
use crate::services::{BalanceService, FeeService};
use std::sync::Arc;

// AppState definition
#[derive(Clone)]
pub struct AppState {
    pub balances: Arc<BalanceService>,
    pub fees: Arc<FeeService>,
    pub config: Config,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::AppState;
    use crate::chains::{test_chain, ChainRegistry};
    use crate::config::Config;
    use crate::services::chain_client::mock::MockClientFactory;
    use crate::services::{BalanceService, EndpointFailover, FeeService};
    use std::sync::Arc;

    /// Chains 1 (EIP-1559) and 56 (legacy), one endpoint each.
    pub fn state(factory: MockClientFactory) -> AppState {
        let chains = ChainRegistry::new(vec![
            test_chain(1, &["http://mainnet"], 2, true),
            test_chain(56, &["http://bsc"], 2, false),
        ])
        .expect("valid chains");
        let factory = Arc::new(factory);
        let config = Config {
            fee_refresh_interval_ms: 10,
            ..Config::default()
        };

        AppState {
            balances: Arc::new(BalanceService::new(
                chains.clone(),
                factory.clone(),
                EndpointFailover::default(),
            )),
            fees: Arc::new(FeeService::new(
                chains,
                factory,
                EndpointFailover::default(),
                &config,
            )),
            config,
        }
    }
}
