use crate::config::Config;
use crate::constants::RPC_RETRY_BACKOFF_MAX_EXPONENT;
use crate::error::{AppError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Delay between failed attempts. The default is no delay at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryBackoff {
    pub base: Duration,
    pub max: Duration,
    pub jitter: bool,
}

impl RetryBackoff {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base: Duration::from_millis(config.rpc_retry_backoff_base_ms),
            max: Duration::from_millis(config.rpc_retry_backoff_max_ms),
            jitter: config.rpc_retry_backoff_jitter,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.base.is_zero()
    }

    /// Capped exponential delay for the given failure count (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        if self.is_zero() {
            return Duration::ZERO;
        }
        let exponent = failures.saturating_sub(1).min(RPC_RETRY_BACKOFF_MAX_EXPONENT);
        let delay = self.base.saturating_mul(1_u32 << exponent).min(self.max);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let jitter_ms = rand::rng().random_range(0..=delay.as_millis() as u64);
        (delay + Duration::from_millis(jitter_ms)).min(self.max)
    }

    async fn wait(&self, failures: u32) {
        let delay = self.delay_for(failures);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Runs a query against an ordered list of endpoints.
#[derive(Debug, Clone, Default)]
pub struct EndpointFailover {
    backoff: RetryBackoff,
}

impl EndpointFailover {
    pub fn new(backoff: RetryBackoff) -> Self {
        Self { backoff }
    }

    /// Tries every endpoint once, in order, with up to `retry_attempts`
    /// attempts each. Fails with `NoRpcSourceAvailable` when all are exhausted.
    pub async fn run<T, F, Fut>(
        &self,
        endpoints: &[String],
        retry_attempts: u32,
        mut query: F,
    ) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut failures = 0_u32;
        for endpoint in endpoints {
            let mut last_error = None;
            for _ in 0..retry_attempts {
                match query(endpoint.clone()).await {
                    Ok(value) => return Ok(value),
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        last_error = Some(e);
                        self.backoff.wait(failures).await;
                    }
                }
            }

            match last_error {
                Some(e) if e.is_api_level() => {
                    tracing::info!("Can not obtain information from {}. Error: {}", endpoint, e);
                }
                Some(e) => {
                    tracing::info!(
                        "Transport failure. Can not obtain information from {}. Error: {}",
                        endpoint,
                        e
                    );
                }
                None => {
                    tracing::info!("Skipping {}: no retry attempts configured", endpoint);
                }
            }
        }

        Err(AppError::NoRpcSourceAvailable)
    }

    /// Cycles through `endpoints` until `query` yields a value. Never gives up.
    pub async fn run_until_success<T, F, Fut>(&self, endpoints: &[String], mut query: F) -> T
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let mut passes = 0_u32;
        loop {
            for endpoint in endpoints {
                if let Some(value) = query(endpoint.clone()).await {
                    return value;
                }
            }
            passes = passes.saturating_add(1);
            if passes % 100 == 0 {
                tracing::warn!("No endpoint answered after {} passes", passes);
            }
            if self.backoff.is_zero() {
                tokio::task::yield_now().await;
            } else {
                self.backoff.wait(passes).await;
            }
        }
    }
}
