/// Application constants

// Chains
pub const DEFAULT_CHAIN_ID: u64 = 1;
pub const CHAIN_ETHEREUM_MAINNET: u64 = 1;
pub const CHAIN_BSC: u64 = 56;
pub const CHAIN_GOERLI: u64 = 5;

// Native coin precision (not verified per chain)
pub const NATIVE_COIN_DECIMALS: u32 = 18;

// Units
pub const GWEI_SCALE: u32 = 9;

// Fee estimation
pub const FEE_CACHE_TTL_SECS: u64 = 60;
pub const FEE_BLOCK_COUNT: u64 = 5;
pub const FEE_PERCENTILE_PER_MILLE: usize = 100; // 10th percentile, nearest rank
pub const RECEIPT_FETCH_CONCURRENCY: usize = 16;
pub const FEE_STALE_BLOCK_SECS: i64 = 600; // 10 minutes

// Background fee refresher
pub const FEE_REFRESH_INTERVAL_MS: u64 = 1_000;
pub const FEE_ACTIVITY_WINDOW_SECS: u64 = 3_600; // 1 hour

// Endpoint retry backoff (zero keeps the immediate-retry behaviour)
pub const RPC_RETRY_BACKOFF_BASE_MS: u64 = 0;
pub const RPC_RETRY_BACKOFF_MAX_MS: u64 = 0;
pub const RPC_RETRY_BACKOFF_MAX_EXPONENT: u32 = 10;

// Config file
pub const DEFAULT_CHAIN_CONFIG_PATH: &str = "chains.json";
