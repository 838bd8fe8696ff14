use super::AppState;
use crate::{
    error::Result,
    models::{ApiResponse, FeeResponse},
};
use axum::{
    extract::{Path, State},
    Json,
};

/// GET /fee/{chain_id}
///
/// Blocks until the background refresher has a fresh estimate for the chain.
pub async fn get_fee(
    State(state): State<AppState>,
    Path(chain_id): Path<u64>,
) -> Result<Json<ApiResponse<FeeResponse>>> {
    let response = state.fees.get_fee(chain_id).await?;
    Ok(Json(ApiResponse::success(response)))
}
