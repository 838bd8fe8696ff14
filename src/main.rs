use axum::http::HeaderValue;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod chains;
mod config;
mod constants;
mod error;
mod models;
mod services;

use chains::ChainRegistry;
use config::Config;
use services::{BalanceService, EndpointFailover, EthersClientFactory, FeeService, RetryBackoff};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "evm_balance_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Starting EVM balance API");
    tracing::info!("Environment: {}", config.environment);

    let chains = ChainRegistry::load(&config.chain_config_path)?;
    chains.get(config.default_chain_id).map_err(|_| {
        anyhow::anyhow!(
            "DEFAULT_CHAIN_ID {} is not in {}",
            config.default_chain_id,
            config.chain_config_path
        )
    })?;
    tracing::info!("Loaded chains: {:?}", chains.chain_ids());

    let clients = Arc::new(EthersClientFactory::new()?);
    let failover = EndpointFailover::new(RetryBackoff::from_config(&config));

    let balances = Arc::new(BalanceService::new(
        chains.clone(),
        clients.clone(),
        failover.clone(),
    ));
    let fees = Arc::new(FeeService::new(chains, clients, failover, &config));

    // Start background services
    services::start_background_services(fees.clone());

    let app_state = api::AppState {
        balances,
        fees,
        config: config.clone(),
    };

    // Build router
    let app = build_router(app_state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: api::AppState) -> Router {
    // CORS configuration
    let cors = cors_from_config(&state.config);

    Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        // Balances
        .route("/balance/{address}", get(api::balance::get_default_balance))
        .route("/balance/{first}/{second}", get(api::balance::get_balance_pair))
        .route(
            "/balance/{chain_id}/{address}/{token_address}",
            get(api::balance::get_balance),
        )
        // Nonces
        .route("/nonce/{address}", get(api::nonce::get_default_nonce))
        .route("/nonce/{chain_id}/{address}", get(api::nonce::get_nonce))
        // Fees
        .route("/fee/{chain_id}", get(api::fee::get_fee))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_from_config(config: &Config) -> CorsLayer {
    let raw = config.cors_allowed_origins.trim();
    if raw.is_empty() || raw == "*" {
        return CorsLayer::very_permissive();
    }

    let allowed: Vec<HeaderValue> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        tracing::warn!("No valid CORS origins parsed; falling back to permissive");
        return CorsLayer::very_permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
