use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ==================== FEE ====================
/// Most recent fee estimate for one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeRecord {
    pub chain_id: u64,
    pub fee_gwei: Decimal,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityFees {
    pub low: Decimal,
    pub medium: Decimal,
    pub high: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeeResponse {
    pub chain_id: u64,
    pub fee_gwei: Decimal,
    /// Unix seconds of the estimate.
    pub update_time: i64,
    pub eip1559_enabled: bool,
    pub priority_low_gwei: Decimal,
    pub priority_medium_gwei: Decimal,
    pub priority_high_gwei: Decimal,
}

impl FeeResponse {
    pub fn new(record: &FeeRecord, eip1559_enabled: bool, priority: PriorityFees) -> Self {
        Self {
            chain_id: record.chain_id,
            fee_gwei: record.fee_gwei,
            update_time: record.computed_at.timestamp(),
            eip1559_enabled,
            priority_low_gwei: priority.low,
            priority_medium_gwei: priority.medium,
            priority_high_gwei: priority.high,
        }
    }
}
