use crate::chains::ChainRegistry;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{FeeRecord, FeeResponse};
use crate::services::chain_client::ChainClientFactory;
use crate::services::failover::EndpointFailover;
use crate::services::fee_estimator::{priority_fees, FeeEstimator};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Per-chain fee state. A caller may only read a fee in `Fresh`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeeState {
    Stale(Option<FeeRecord>),
    Refreshing(Option<FeeRecord>),
    Fresh(FeeRecord),
}

impl FeeState {
    pub fn record(&self) -> Option<&FeeRecord> {
        match self {
            FeeState::Stale(record) | FeeState::Refreshing(record) => record.as_ref(),
            FeeState::Fresh(record) => Some(record),
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, FeeState::Fresh(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            FeeState::Stale(_) => "stale",
            FeeState::Refreshing(_) => "refreshing",
            FeeState::Fresh(_) => "fresh",
        }
    }
}

struct ChainFeeState {
    state: watch::Sender<FeeState>,
    last_requested: Mutex<Option<DateTime<Utc>>>,
    single_flight: tokio::sync::Mutex<()>,
    in_flight: Arc<AtomicBool>,
}

/// Held by a running refresh; clears the in-flight flag when dropped.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ChainFeeState {
    fn new() -> Self {
        let (state, _) = watch::channel(FeeState::Stale(None));
        Self {
            state,
            last_requested: Mutex::new(None),
            single_flight: tokio::sync::Mutex::new(()),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `None` when a refresh for this chain is already running.
    fn begin_refresh(&self) -> Option<InFlight> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| InFlight(self.in_flight.clone()))
    }

    fn snapshot(&self) -> FeeState {
        self.state.borrow().clone()
    }

    fn touch(&self, now: DateTime<Utc>) {
        let mut guard = self
            .last_requested
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(now);
    }

    fn is_active(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        let guard = self
            .last_requested
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        matches!(*guard, Some(at) if now - at <= window)
    }

    fn mark_stale(&self) {
        self.state.send_if_modified(|state| match state {
            FeeState::Stale(_) => false,
            FeeState::Refreshing(record) => {
                *state = FeeState::Stale(record.take());
                true
            }
            FeeState::Fresh(record) => {
                *state = FeeState::Stale(Some(record.clone()));
                true
            }
        });
    }

    fn mark_refreshing(&self) {
        self.state.send_if_modified(|state| {
            let record = state.record().cloned();
            *state = FeeState::Refreshing(record);
            true
        });
    }

    /// Re-opens the latch on the current record without recomputing it.
    fn reuse(&self) {
        self.state.send_if_modified(|state| match state {
            FeeState::Fresh(_) => false,
            _ => match state.record().cloned() {
                Some(record) => {
                    *state = FeeState::Fresh(record);
                    true
                }
                None => false,
            },
        });
    }

    fn publish(&self, record: FeeRecord) {
        self.state.send_replace(FeeState::Fresh(record));
    }
}

/// Cached, single-flight gas fee per configured chain, kept warm by a
/// background loop for chains that were asked about recently.
pub struct FeeService {
    chains: ChainRegistry,
    estimator: FeeEstimator,
    failover: EndpointFailover,
    states: HashMap<u64, ChainFeeState>,
    refresh_order: Vec<u64>,
    ttl: chrono::Duration,
    activity_window: chrono::Duration,
    refresh_interval: Duration,
    wait_timeout: Option<Duration>,
}

impl FeeService {
    pub fn new(
        chains: ChainRegistry,
        clients: Arc<dyn ChainClientFactory>,
        failover: EndpointFailover,
        config: &Config,
    ) -> Self {
        let refresh_order = chains.fee_chain_order();
        let states = refresh_order
            .iter()
            .map(|chain_id| (*chain_id, ChainFeeState::new()))
            .collect();

        Self {
            estimator: FeeEstimator::new(chains.clone(), clients, config),
            chains,
            failover,
            states,
            refresh_order,
            ttl: config.fee_cache_ttl(),
            activity_window: config.fee_activity_window(),
            refresh_interval: config.fee_refresh_interval(),
            wait_timeout: config.fee_wait_timeout(),
        }
    }

    /// Returns the cached fee, waiting for the refresher when there is none.
    ///
    /// With a wait timeout configured, the bound covers the queue on the
    /// chain's single-flight lock as well as the wait for a fresh record.
    pub async fn get_fee(&self, chain_id: u64) -> Result<FeeResponse> {
        let chain = self.chains.get(chain_id)?;
        let state = self
            .states
            .get(&chain_id)
            .ok_or(AppError::UnknownChain(chain_id))?;

        tracing::info!("Get fee for chain {}", chain_id);

        let fetch = async {
            let _flight = state.single_flight.lock().await;
            match state.snapshot() {
                FeeState::Fresh(record) => Ok(record),
                _ => {
                    state.touch(Utc::now());
                    wait_for_fresh(chain_id, state).await
                }
            }
        };

        let record = match self.wait_timeout {
            Some(limit) => tokio::time::timeout(limit, fetch)
                .await
                .map_err(|_| AppError::FeeUnavailable(chain_id))??,
            None => fetch.await?,
        };

        Ok(FeeResponse::new(
            &record,
            chain.eip1559_enabled,
            priority_fees(chain_id),
        ))
    }

    /// Snapshot of every chain's state, in refresh order.
    pub fn states(&self) -> Vec<(u64, FeeState)> {
        self.refresh_order
            .iter()
            .filter_map(|chain_id| {
                self.states
                    .get(chain_id)
                    .map(|state| (*chain_id, state.snapshot()))
            })
            .collect()
    }

    /// Start the background refresher.
    pub fn start_refresher(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Err(e) = self.refresh_once() {
                    tracing::error!("Error when processing fee update: {}", e);
                }

                tokio::time::sleep(self.refresh_interval).await;
            }
        })
    }

    /// One scheduler pass over every configured chain.
    ///
    /// Due chains are refreshed on their own tasks, so the pass returns
    /// without waiting for them. A chain whose refresh is still running is
    /// skipped. Returns the handles of the refreshes started by this pass.
    pub fn refresh_once(self: &Arc<Self>) -> Result<Vec<JoinHandle<()>>> {
        let now = Utc::now();
        let mut started = Vec::new();

        for chain_id in &self.refresh_order {
            let chain_id = *chain_id;
            let state = self
                .states
                .get(&chain_id)
                .ok_or(AppError::UnknownChain(chain_id))?;

            if !state.is_active(now, self.activity_window) {
                state.mark_stale();
                continue;
            }

            let snapshot = state.snapshot();
            if let Some(record) = snapshot.record() {
                if now - record.computed_at < self.ttl {
                    state.reuse();
                    continue;
                }
            }

            let Some(in_flight) = state.begin_refresh() else {
                tracing::debug!("Fee refresh for chain {} still running", chain_id);
                continue;
            };
            state.mark_refreshing();

            let service = Arc::clone(self);
            started.push(tokio::spawn(async move {
                let _in_flight = in_flight;
                if let Err(e) = service.refresh_chain(chain_id).await {
                    tracing::error!("Fee refresh for chain {} failed: {}", chain_id, e);
                }
            }));
        }

        Ok(started)
    }

    async fn refresh_chain(&self, chain_id: u64) -> Result<()> {
        let chain = self.chains.get(chain_id)?;
        let state = self
            .states
            .get(&chain_id)
            .ok_or(AppError::UnknownChain(chain_id))?;

        tracing::info!("Update fee for chain {}", chain_id);

        let estimator = &self.estimator;
        let fee_gwei = self
            .failover
            .run_until_success(&chain.rpc_urls, move |endpoint| async move {
                estimator.estimate(chain_id, &endpoint).await
            })
            .await;

        tracing::info!("Chain #{}. New fee = {} gwei", chain_id, fee_gwei);
        state.publish(FeeRecord {
            chain_id,
            fee_gwei,
            computed_at: Utc::now(),
        });

        Ok(())
    }

    #[cfg(test)]
    fn seed(&self, record: FeeRecord, last_requested: Option<DateTime<Utc>>) {
        if let Some(state) = self.states.get(&record.chain_id) {
            state.state.send_replace(FeeState::Stale(Some(record)));
            let mut guard = state
                .last_requested
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = last_requested;
        }
    }
}

async fn wait_for_fresh(chain_id: u64, state: &ChainFeeState) -> Result<FeeRecord> {
    let mut rx = state.state.subscribe();
    let record = rx
        .wait_for(FeeState::is_fresh)
        .await
        .map(|guard| guard.record().cloned())
        .map_err(|_| AppError::Internal(format!("Fee state for chain {} closed", chain_id)))?;

    record.ok_or(AppError::FeeUnavailable(chain_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::test_chain;
    use crate::services::chain_client::mock::{MockClientFactory, MockEndpoint};
    use rust_decimal::Decimal;

    const GWEI: u64 = 1_000_000_000;

    fn fee_endpoint(chain_id: u64) -> MockEndpoint {
        let ts = Utc::now().timestamp();
        MockEndpoint::new(chain_id)
            .with_block(20, ts, Some(3 * GWEI), &[])
            .with_block(19, ts, Some(8 * GWEI), &[])
            .with_block(18, ts, Some(2 * GWEI), &[])
            .with_block(17, ts, Some(GWEI), &[])
            .with_block(16, ts, Some(GWEI), &[])
    }

    /// Runs one scheduler pass and waits for the refreshes it started.
    async fn run_pass(service: &Arc<FeeService>) {
        for handle in service.refresh_once().expect("pass") {
            handle.await.expect("refresh task");
        }
    }

    fn legacy_endpoint(chain_id: u64) -> MockEndpoint {
        let ts = Utc::now().timestamp();
        (16..=20).fold(MockEndpoint::new(chain_id), |endpoint, number| {
            endpoint.with_block(number, ts, None, &[GWEI, 2 * GWEI])
        })
    }

    fn test_config() -> Config {
        Config {
            fee_refresh_interval_ms: 10,
            ..Config::default()
        }
    }

    fn service_with(
        factory: MockClientFactory,
        urls: &[&str],
        config: &Config,
    ) -> (Arc<FeeService>, Arc<MockClientFactory>) {
        let chains = ChainRegistry::new(vec![test_chain(1, urls, 1, true)]).expect("valid chains");
        let factory = Arc::new(factory);
        let service = Arc::new(FeeService::new(
            chains,
            factory.clone(),
            EndpointFailover::default(),
            config,
        ));
        (service, factory)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_a_single_refresh() {
        let (service, factory) = service_with(
            MockClientFactory::new().with_endpoint("http://a", fee_endpoint(1)),
            &["http://a"],
            &test_config(),
        );
        let refresher = service.clone().start_refresher();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.get_fee(1).await })
            })
            .collect();

        let mut responses = Vec::new();
        for handle in handles {
            responses.push(handle.await.expect("task joins").expect("fee"));
        }

        let first = responses[0].clone();
        assert!(responses.iter().all(|r| *r == first));
        assert_eq!(first.fee_gwei, Decimal::new(8, 0));
        assert_eq!(first.priority_high_gwei, Decimal::new(5, 0));
        assert!(first.eip1559_enabled);

        // further scheduler passes inside the TTL reuse the record
        tokio::time::sleep(Duration::from_millis(100)).await;
        let again = service.get_fee(1).await.expect("fee");
        assert_eq!(again, first);
        assert_eq!(factory.endpoint("http://a").calls("chain_id"), 1);

        refresher.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn dead_chain_does_not_stall_other_chains() {
        let chains = ChainRegistry::new(vec![
            test_chain(1, &["http://dead"], 1, true),
            test_chain(56, &["http://bsc"], 1, false),
        ])
        .expect("valid chains");
        let factory = Arc::new(
            MockClientFactory::new()
                .with_endpoint("http://dead", MockEndpoint::new(1).always_failing())
                .with_endpoint("http://bsc", legacy_endpoint(56)),
        );
        let config = Config {
            fee_cache_ttl_secs: 1,
            ..test_config()
        };
        let service = Arc::new(FeeService::new(
            chains,
            factory.clone(),
            EndpointFailover::default(),
            &config,
        ));
        let refresher = service.clone().start_refresher();

        let first = service.get_fee(56).await.expect("bsc fee");
        assert_eq!(first.fee_gwei, Decimal::new(2, 0));
        let first_computed_at = service.states()[1]
            .1
            .record()
            .map(|r| r.computed_at)
            .expect("bsc record");

        let stuck = {
            let service = service.clone();
            tokio::spawn(async move { service.get_fee(1).await })
        };

        tokio::time::sleep(Duration::from_millis(2_500)).await;

        let states = service.states();
        assert_eq!(states[0].0, 1);
        assert!(!states[0].1.is_fresh());
        assert_eq!(states[1].0, 56);
        let latest_computed_at = states[1]
            .1
            .record()
            .map(|r| r.computed_at)
            .expect("bsc record");
        assert!(latest_computed_at > first_computed_at);
        assert!(factory.endpoint("http://bsc").calls("chain_id") >= 2);
        assert!(factory.endpoint("http://dead").total_calls() > 0);

        let again = service.get_fee(56).await.expect("bsc fee");
        assert_eq!(again.fee_gwei, Decimal::new(2, 0));

        stuck.abort();
        refresher.abort();
    }

    #[tokio::test]
    async fn running_refresh_is_not_started_twice() {
        let (service, _) = service_with(
            MockClientFactory::new().with_endpoint("http://a", MockEndpoint::new(1).always_failing()),
            &["http://a"],
            &test_config(),
        );
        service.seed(
            FeeRecord {
                chain_id: 1,
                fee_gwei: Decimal::ONE,
                computed_at: Utc::now() - chrono::Duration::hours(1),
            },
            Some(Utc::now()),
        );

        let started = service.refresh_once().expect("pass");
        assert_eq!(started.len(), 1);
        let again = service.refresh_once().expect("pass");
        assert!(again.is_empty());
        assert_eq!(service.states()[0].1.label(), "refreshing");

        for handle in started {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn idle_chain_is_never_polled() {
        let (service, factory) = service_with(
            MockClientFactory::new().with_endpoint("http://a", fee_endpoint(1)),
            &["http://a"],
            &test_config(),
        );

        for _ in 0..3 {
            run_pass(&service).await;
        }

        assert_eq!(factory.endpoint("http://a").total_calls(), 0);
        assert_eq!(service.states(), vec![(1, FeeState::Stale(None))]);
    }

    #[tokio::test]
    async fn expired_record_is_recomputed_for_active_chain() {
        let (service, factory) = service_with(
            MockClientFactory::new().with_endpoint("http://a", fee_endpoint(1)),
            &["http://a"],
            &test_config(),
        );
        let old = FeeRecord {
            chain_id: 1,
            fee_gwei: Decimal::new(100, 0),
            computed_at: Utc::now() - chrono::Duration::seconds(120),
        };
        service.seed(old, Some(Utc::now()));

        run_pass(&service).await;

        let (_, state) = service.states().remove(0);
        let record = state.record().cloned().expect("record");
        assert!(state.is_fresh());
        assert_eq!(record.fee_gwei, Decimal::new(8, 0));
        assert_eq!(factory.endpoint("http://a").calls("chain_id"), 1);
    }

    #[tokio::test]
    async fn record_within_ttl_is_reused_without_rpc() {
        let (service, factory) = service_with(
            MockClientFactory::new().with_endpoint("http://a", fee_endpoint(1)),
            &["http://a"],
            &test_config(),
        );
        let recent = FeeRecord {
            chain_id: 1,
            fee_gwei: Decimal::new(42, 0),
            computed_at: Utc::now() - chrono::Duration::seconds(5),
        };
        service.seed(recent.clone(), Some(Utc::now()));

        run_pass(&service).await;

        assert_eq!(service.states(), vec![(1, FeeState::Fresh(recent))]);
        assert_eq!(factory.endpoint("http://a").total_calls(), 0);
        let response = service.get_fee(1).await.expect("fresh fee");
        assert_eq!(response.fee_gwei, Decimal::new(42, 0));
    }

    #[tokio::test]
    async fn inactive_chain_closes_the_latch() {
        let (service, _) = service_with(
            MockClientFactory::new().with_endpoint("http://a", fee_endpoint(1)),
            &["http://a"],
            &test_config(),
        );
        let recent = FeeRecord {
            chain_id: 1,
            fee_gwei: Decimal::new(42, 0),
            computed_at: Utc::now(),
        };
        service.seed(recent.clone(), Some(Utc::now()));
        run_pass(&service).await;
        assert!(service.states()[0].1.is_fresh());

        service.seed(recent.clone(), Some(Utc::now() - chrono::Duration::hours(2)));
        run_pass(&service).await;
        assert_eq!(service.states(), vec![(1, FeeState::Stale(Some(recent)))]);
    }

    #[tokio::test]
    async fn refresh_keeps_cycling_endpoints_until_one_answers() {
        let factory = MockClientFactory::new()
            .with_endpoint("http://a", MockEndpoint::new(1).always_failing())
            .with_endpoint("http://b", fee_endpoint(1).failing(2));
        let (service, factory) = service_with(factory, &["http://a", "http://b"], &test_config());
        service.seed(
            FeeRecord {
                chain_id: 1,
                fee_gwei: Decimal::ZERO,
                computed_at: Utc::now() - chrono::Duration::hours(1),
            },
            Some(Utc::now()),
        );

        run_pass(&service).await;

        let (_, state) = service.states().remove(0);
        assert_eq!(state.record().map(|r| r.fee_gwei), Some(Decimal::new(8, 0)));
        assert_eq!(factory.endpoint("http://a").calls("chain_id"), 3);
        assert_eq!(factory.endpoint("http://b").calls("chain_id"), 3);
    }

    #[tokio::test]
    async fn bounded_wait_times_out_without_refresher() {
        let config = Config {
            fee_wait_timeout_secs: Some(1),
            ..test_config()
        };
        let (service, _) = service_with(
            MockClientFactory::new().with_endpoint("http://a", fee_endpoint(1)),
            &["http://a"],
            &config,
        );

        let result = service.get_fee(1).await;
        assert!(matches!(result, Err(AppError::FeeUnavailable(1))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn wait_bound_applies_to_each_queued_caller() {
        let config = Config {
            fee_wait_timeout_secs: Some(1),
            ..test_config()
        };
        let (service, _) = service_with(
            MockClientFactory::new().with_endpoint("http://a", fee_endpoint(1)),
            &["http://a"],
            &config,
        );

        let started = std::time::Instant::now();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.get_fee(1).await })
            })
            .collect();
        for handle in handles {
            let result = handle.await.expect("task joins");
            assert!(matches!(result, Err(AppError::FeeUnavailable(1))));
        }

        assert!(started.elapsed() < Duration::from_millis(1_900));
    }

    #[tokio::test]
    async fn unknown_chain_fails_fast() {
        let (service, _) = service_with(MockClientFactory::new(), &["http://a"], &test_config());
        assert!(matches!(
            service.get_fee(77).await,
            Err(AppError::UnknownChain(77))
        ));
    }
}
