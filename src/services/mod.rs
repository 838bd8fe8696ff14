// All service modules
pub mod amount;
pub mod balance_service;
pub mod chain_client;
pub mod failover;
pub mod fee_estimator;
pub mod fee_service;
pub mod token_metadata;

// Re-export for convenience
pub use balance_service::BalanceService;
pub use chain_client::EthersClientFactory;
pub use failover::{EndpointFailover, RetryBackoff};
pub use fee_service::{FeeService, FeeState};

use std::sync::Arc;

/// Start all background services
pub fn start_background_services(fees: Arc<FeeService>) {
    tracing::info!("Starting background services...");

    // Start fee refresher
    let _refresher = fees.start_refresher();

    tracing::info!("All background services started");
}
