// src/models/mod.rs
pub mod balance;
pub mod fee;
pub mod response;

pub use balance::{AddressInfo, AssetType, BalanceItem, BalanceResponse, NonceResponse, TokenInfo};
pub use fee::{FeeRecord, FeeResponse, PriorityFees};
pub use response::ApiResponse;
