use crate::constants::{
    DEFAULT_CHAIN_CONFIG_PATH, DEFAULT_CHAIN_ID, FEE_ACTIVITY_WINDOW_SECS, FEE_BLOCK_COUNT,
    FEE_CACHE_TTL_SECS, FEE_REFRESH_INTERVAL_MS, FEE_STALE_BLOCK_SECS, RPC_RETRY_BACKOFF_BASE_MS,
    RPC_RETRY_BACKOFF_MAX_MS,
};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Chains
    pub chain_config_path: String,
    pub default_chain_id: u64,

    // Fee cache
    pub fee_cache_ttl_secs: u64,
    pub fee_block_count: u64,
    pub fee_refresh_interval_ms: u64,
    pub fee_activity_window_secs: u64,
    pub fee_stale_block_secs: i64,
    pub fee_wait_timeout_secs: Option<u64>,

    // Endpoint retries
    pub rpc_retry_backoff_base_ms: u64,
    pub rpc_retry_backoff_max_ms: u64,
    pub rpc_retry_backoff_jitter: bool,

    // CORS
    pub cors_allowed_origins: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            environment: "development".to_string(),
            chain_config_path: DEFAULT_CHAIN_CONFIG_PATH.to_string(),
            default_chain_id: DEFAULT_CHAIN_ID,
            fee_cache_ttl_secs: FEE_CACHE_TTL_SECS,
            fee_block_count: FEE_BLOCK_COUNT,
            fee_refresh_interval_ms: FEE_REFRESH_INTERVAL_MS,
            fee_activity_window_secs: FEE_ACTIVITY_WINDOW_SECS,
            fee_stale_block_secs: FEE_STALE_BLOCK_SECS,
            fee_wait_timeout_secs: None,
            rpc_retry_backoff_base_ms: RPC_RETRY_BACKOFF_BASE_MS,
            rpc_retry_backoff_max_ms: RPC_RETRY_BACKOFF_MAX_MS,
            rpc_retry_backoff_jitter: false,
            cors_allowed_origins: "*".to_string(),
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let defaults = Config::default();

        Ok(Config {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: env::var("PORT")
                .unwrap_or_else(|_| defaults.port.to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),

            chain_config_path: env::var("CHAIN_CONFIG_PATH")
                .unwrap_or(defaults.chain_config_path),
            default_chain_id: env::var("DEFAULT_CHAIN_ID")
                .unwrap_or_else(|_| defaults.default_chain_id.to_string())
                .parse()?,

            fee_cache_ttl_secs: env::var("FEE_CACHE_TTL_SECS")
                .unwrap_or_else(|_| defaults.fee_cache_ttl_secs.to_string())
                .parse()?,
            fee_block_count: env::var("FEE_BLOCK_COUNT")
                .unwrap_or_else(|_| defaults.fee_block_count.to_string())
                .parse()?,
            fee_refresh_interval_ms: env::var("FEE_REFRESH_INTERVAL_MS")
                .unwrap_or_else(|_| defaults.fee_refresh_interval_ms.to_string())
                .parse()?,
            fee_activity_window_secs: env::var("FEE_ACTIVITY_WINDOW_SECS")
                .unwrap_or_else(|_| defaults.fee_activity_window_secs.to_string())
                .parse()?,
            fee_stale_block_secs: env::var("FEE_STALE_BLOCK_SECS")
                .unwrap_or_else(|_| defaults.fee_stale_block_secs.to_string())
                .parse()?,
            fee_wait_timeout_secs: optional_env("FEE_WAIT_TIMEOUT_SECS")?,

            rpc_retry_backoff_base_ms: env::var("RPC_RETRY_BACKOFF_BASE_MS")
                .unwrap_or_else(|_| defaults.rpc_retry_backoff_base_ms.to_string())
                .parse()?,
            rpc_retry_backoff_max_ms: env::var("RPC_RETRY_BACKOFF_MAX_MS")
                .unwrap_or_else(|_| defaults.rpc_retry_backoff_max_ms.to_string())
                .parse()?,
            rpc_retry_backoff_jitter: env_flag("RPC_RETRY_BACKOFF_JITTER", false),

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or(defaults.cors_allowed_origins),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chain_config_path.trim().is_empty() {
            anyhow::bail!("CHAIN_CONFIG_PATH is empty");
        }
        if self.fee_cache_ttl_secs == 0 {
            anyhow::bail!("FEE_CACHE_TTL_SECS must be > 0");
        }
        if self.fee_block_count == 0 {
            anyhow::bail!("FEE_BLOCK_COUNT must be > 0");
        }
        if self.fee_refresh_interval_ms == 0 {
            anyhow::bail!("FEE_REFRESH_INTERVAL_MS must be > 0");
        }
        if self.rpc_retry_backoff_max_ms < self.rpc_retry_backoff_base_ms {
            anyhow::bail!("RPC_RETRY_BACKOFF_MAX_MS must be >= RPC_RETRY_BACKOFF_BASE_MS");
        }

        if self.fee_activity_window_secs < self.fee_cache_ttl_secs {
            tracing::warn!("Fee activity window is shorter than the fee cache TTL");
        }
        if self.fee_wait_timeout_secs == Some(0) {
            tracing::warn!("FEE_WAIT_TIMEOUT_SECS=0 makes every uncached fee request fail");
        }
        if self.cors_allowed_origins.trim().is_empty() {
            tracing::warn!("CORS_ALLOWED_ORIGINS is empty; requests may be blocked");
        }

        Ok(())
    }

    pub fn fee_cache_ttl(&self) -> chrono::Duration {
        seconds(self.fee_cache_ttl_secs)
    }

    pub fn fee_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.fee_refresh_interval_ms)
    }

    pub fn fee_activity_window(&self) -> chrono::Duration {
        seconds(self.fee_activity_window_secs)
    }

    pub fn fee_wait_timeout(&self) -> Option<Duration> {
        self.fee_wait_timeout_secs.map(Duration::from_secs)
    }
}

// Unset or blank means `None`; anything else must parse.
fn optional_env<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", name, e)),
        _ => Ok(None),
    }
}

fn seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}
