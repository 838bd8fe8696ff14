use super::AppState;
use crate::{
    error::Result,
    models::{ApiResponse, NonceResponse},
};
use axum::{
    extract::{Path, State},
    Json,
};

/// GET /nonce/{address}
pub async fn get_default_nonce(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<ApiResponse<NonceResponse>>> {
    let response = state
        .balances
        .get_nonce(&address, state.config.default_chain_id)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

/// GET /nonce/{chain_id}/{address}
pub async fn get_nonce(
    State(state): State<AppState>,
    Path((chain_id, address)): Path<(u64, String)>,
) -> Result<Json<ApiResponse<NonceResponse>>> {
    let response = state.balances.get_nonce(&address, chain_id).await?;
    Ok(Json(ApiResponse::success(response)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support;
    use crate::error::AppError;
    use crate::services::chain_client::mock::{MockClientFactory, MockEndpoint};
    use ethers::types::Address;
    use std::str::FromStr;

    const OWNER: &str = "0x52908400098527886e0f7030069857d2e4169ee7";

    #[tokio::test]
    async fn nonce_on_explicit_chain() {
        let owner = Address::from_str(OWNER).expect("valid owner");
        let state = test_support::state(
            MockClientFactory::new()
                .with_endpoint("http://mainnet", MockEndpoint::new(1).with_nonce(owner, 3))
                .with_endpoint("http://bsc", MockEndpoint::new(56).with_nonce(owner, 17)),
        );

        let Json(default) = get_default_nonce(State(state.clone()), Path(OWNER.to_string()))
            .await
            .expect("nonce");
        let Json(bsc) = get_nonce(State(state), Path((56, OWNER.to_string())))
            .await
            .expect("nonce");

        assert_eq!(default.data.nonce_id, 3);
        assert_eq!(bsc.data.chain_id, 56);
        assert_eq!(bsc.data.nonce_id, 17);
    }

    #[tokio::test]
    async fn unconfigured_chain_is_reported() {
        let state = test_support::state(MockClientFactory::new());
        let result = get_nonce(State(state), Path((250, OWNER.to_string()))).await;
        assert!(matches!(result, Err(AppError::UnknownChain(250))));
    }
}
