use super::AppState;
use crate::{
    error::Result,
    models::{ApiResponse, BalanceResponse},
};
use axum::{
    extract::{Path, State},
    Json,
};

/// GET /balance/{address}
pub async fn get_default_balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<ApiResponse<BalanceResponse>>> {
    let response = state
        .balances
        .get_balance(&address, None, state.config.default_chain_id)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

/// GET /balance/{chain_id}/{address} or /balance/{address}/{token_address}
pub async fn get_balance_pair(
    State(state): State<AppState>,
    Path((first, second)): Path<(String, String)>,
) -> Result<Json<ApiResponse<BalanceResponse>>> {
    let response = match first.trim().parse::<u64>() {
        Ok(chain_id) => state.balances.get_balance(&second, None, chain_id).await?,
        Err(_) => {
            state
                .balances
                .get_balance(&first, Some(&second), state.config.default_chain_id)
                .await?
        }
    };
    Ok(Json(ApiResponse::success(response)))
}

/// GET /balance/{chain_id}/{address}/{token_address}
pub async fn get_balance(
    State(state): State<AppState>,
    Path((chain_id, address, token)): Path<(u64, String, String)>,
) -> Result<Json<ApiResponse<BalanceResponse>>> {
    let response = state
        .balances
        .get_balance(&address, Some(&token), chain_id)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}
