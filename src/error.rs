use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Blockchain RPC error: {0}")]
    BlockchainRPC(String),

    #[error("RPC API error (code {code:?}): {message}")]
    RpcApi { message: String, code: Option<i64> },

    #[error("Can't obtain information from any RPC urls")]
    NoRpcSourceAvailable,

    #[error("Can not obtain token information")]
    TokenInfoUnavailable,

    #[error("Unknown chain: {0}")]
    UnknownChain(u64),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Fee for chain {0} is not available yet")]
    FeeUnavailable(u64),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for failures reported by the endpoint itself rather than the transport.
    pub fn is_api_level(&self) -> bool {
        matches!(self, AppError::RpcApi { .. })
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::BadRequest(ref msg) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                msg.clone(),
            ),
            AppError::UnknownChain(chain_id) => (
                StatusCode::NOT_FOUND,
                "UNKNOWN_CHAIN",
                format!("Chain {} is not configured", chain_id),
            ),
            AppError::NoRpcSourceAvailable => (
                StatusCode::BAD_GATEWAY,
                "NO_RPC_SOURCE",
                self.to_string(),
            ),
            AppError::FeeUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "FEE_UNAVAILABLE",
                self.to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                self.to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
