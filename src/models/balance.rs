use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ==================== ADDRESS ====================
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressInfo {
    /// Lowercase hex address.
    pub address: String,
    /// EIP-55 mixed-case address.
    pub address_checksum: String,
    pub address_url: String,
    pub address_url_token: String,
}

// ==================== TOKEN ====================
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssetType {
    /// Token address does not point at a usable token.
    NotExist,
    /// Native coin of the chain.
    BaseCoin,
    #[serde(rename = "ERC20")]
    Erc20,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
    pub asset_type: AssetType,
}

impl TokenInfo {
    pub fn not_exist() -> Self {
        Self {
            name: String::new(),
            symbol: String::new(),
            decimals: 0,
            asset_type: AssetType::NotExist,
        }
    }
}

// ==================== BALANCE ====================
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceItem {
    /// Raw amount in the smallest unit, base 10, exact.
    pub wei_string: String,
    /// Raw amount as a bounded-precision decimal; `None` when out of range.
    pub wei_decimal: Option<Decimal>,
    /// Human amount, exact.
    pub pow_string: String,
    /// Human amount as a bounded-precision decimal; `None` when out of range.
    pub pow_decimal: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub chain_id: u64,
    pub address: AddressInfo,
    pub token: TokenInfo,
    pub balance: BalanceItem,
}

// ==================== NONCE ====================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceResponse {
    pub chain_id: u64,
    pub address: AddressInfo,
    pub nonce_id: u64,
}
