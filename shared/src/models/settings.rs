//! Alert threshold settings

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Thresholds read once per posting transaction and handed to alert evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertThresholds {
    /// Materials whose total on-hand falls below this are low on stock
    pub global_min_qty: Decimal,
    /// Look-ahead window for expiring batches
    pub expiry_days: i64,
    /// Trailing window without shipments; 0 disables slow-moving alerts
    pub slow_days: i64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            global_min_qty: Decimal::ZERO,
            expiry_days: 30,
            slow_days: 0,
        }
    }
}

impl AlertThresholds {
    pub fn slow_moving_enabled(&self) -> bool {
        self.slow_days > 0
    }
}
