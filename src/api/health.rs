use super::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct ChainHealth {
    pub chain_id: u64,
    pub fee_state: String,
    pub fee_computed_at: Option<i64>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub chains: Vec<ChainHealth>,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let chains = state
        .fees
        .states()
        .into_iter()
        .map(|(chain_id, fee_state)| ChainHealth {
            chain_id,
            fee_state: fee_state.label().to_string(),
            fee_computed_at: fee_state.record().map(|r| r.computed_at.timestamp()),
        })
        .collect();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.config.environment.clone(),
        chains,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support;
    use crate::services::chain_client::mock::MockClientFactory;

    #[tokio::test]
    async fn reports_every_chain_as_stale_before_any_request() {
        let state = test_support::state(MockClientFactory::new());
        let Json(health) = health_check(State(state)).await;

        assert_eq!(health.status, "ok");
        let ids: Vec<u64> = health.chains.iter().map(|c| c.chain_id).collect();
        assert_eq!(ids, vec![1, 56]);
        assert!(health.chains.iter().all(|c| c.fee_state == "stale"));
        assert!(health.chains.iter().all(|c| c.fee_computed_at.is_none()));
    }
}
