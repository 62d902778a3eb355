//! Validation utilities for ledger requests
//!
//! These rules cannot be expressed as `validator` attributes on request payloads, so services
//! apply them before any mutation.

use rust_decimal::Decimal;

use crate::models::AlertThresholds;
use crate::types::BatchPolicy;

/// Longest idempotency key accepted by the guard
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 200;

/// Longest order code
pub const MAX_ORDER_CODE_LEN: usize = 64;

/// Decimal places kept by the `NUMERIC(18, 4)` quantity columns
pub const QTY_SCALE: u32 = 4;

/// Longest alert look-back or look-ahead window, in days
pub const MAX_ALERT_DAYS: i64 = 36_500;

/// Largest magnitude a `NUMERIC(18, 4)` column holds
pub fn max_storable_qty() -> Decimal {
    Decimal::new(999_999_999_999_999_999, QTY_SCALE)
}

/// Quantities must survive storage unrounded, or stock and its movements drift apart.
pub fn validate_storable(qty: Decimal) -> Result<(), &'static str> {
    if qty.normalize().scale() > QTY_SCALE {
        return Err("Quantity must have at most 4 decimal places");
    }
    if qty.abs() > max_storable_qty() {
        return Err("Quantity is too large");
    }
    Ok(())
}

// ============================================================================
// Order Validations
// ============================================================================

/// Validate an order code: 1-64 characters, no whitespace
pub fn validate_order_code(code: &str) -> Result<(), &'static str> {
    if code.is_empty() {
        return Err("Order code is required");
    }
    if code.chars().count() > MAX_ORDER_CODE_LEN {
        return Err("Order code must be at most 64 characters");
    }
    if code.chars().any(char::is_whitespace) {
        return Err("Order code must not contain whitespace");
    }
    Ok(())
}

/// An order must carry at least one line
pub fn validate_item_count(count: usize) -> Result<(), &'static str> {
    if count == 0 {
        return Err("Order must have at least one item");
    }
    Ok(())
}

/// Line and transfer quantities are strictly positive
pub fn validate_quantity(qty: Decimal) -> Result<(), &'static str> {
    if qty <= Decimal::ZERO {
        return Err("Quantity must be greater than zero");
    }
    validate_storable(qty)
}

/// A SPECIFIED line must name the batch it draws from
pub fn validate_batch_selection(
    policy: BatchPolicy,
    batch_no: Option<&str>,
) -> Result<(), &'static str> {
    match (policy, batch_no.map(str::trim)) {
        (BatchPolicy::Specified, None) | (BatchPolicy::Specified, Some("")) => {
            Err("Batch number is required when batch policy is SPECIFIED")
        }
        _ => Ok(()),
    }
}

// ============================================================================
// Stock Validations
// ============================================================================

/// Adjustments set an absolute quantity, which cannot be negative
pub fn validate_target_qty(qty: Decimal) -> Result<(), &'static str> {
    if qty < Decimal::ZERO {
        return Err("Target quantity cannot be negative");
    }
    validate_storable(qty)
}

/// Unit prices are optional, non-negative and share the quantity column type
pub fn validate_unit_price(price: Decimal) -> Result<(), &'static str> {
    if price < Decimal::ZERO {
        return Err("Unit price cannot be negative");
    }
    validate_storable(price)
}

/// Validate alert thresholds before they are stored
pub fn validate_thresholds(thresholds: &AlertThresholds) -> Result<(), &'static str> {
    if thresholds.global_min_qty < Decimal::ZERO {
        return Err("Minimum quantity cannot be negative");
    }
    validate_storable(thresholds.global_min_qty)?;
    if !(0..=MAX_ALERT_DAYS).contains(&thresholds.expiry_days) {
        return Err("Expiry window must be between 0 and 36500 days");
    }
    if !(0..=MAX_ALERT_DAYS).contains(&thresholds.slow_days) {
        return Err("Slow-moving window must be between 0 and 36500 days");
    }
    Ok(())
}

// ============================================================================
// Request Validations
// ============================================================================

pub fn validate_idempotency_key(key: &str) -> Result<(), &'static str> {
    if key.trim().is_empty() {
        return Err("Idempotency key cannot be blank");
    }
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err("Idempotency key must be at most 200 characters");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_order_code() {
        assert!(validate_order_code("IB-2024-0001").is_ok());
        assert!(validate_order_code("").is_err());
        assert!(validate_order_code("IB 1").is_err());
        assert!(validate_order_code(&"X".repeat(65)).is_err());
        assert!(validate_order_code(&"X".repeat(64)).is_ok());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(Decimal::new(1, 4)).is_ok());
        assert!(validate_quantity(Decimal::ZERO).is_err());
        assert!(validate_quantity(Decimal::from(-3)).is_err());
    }

    #[test]
    fn test_quantity_finer_than_storage_is_rejected() {
        // 0.00005 would round to 0.0001 in one column and vanish in another
        assert!(validate_quantity(Decimal::new(5, 5)).is_err());
        // 0.00001 would round to zero on insert
        assert!(validate_quantity(Decimal::new(1, 5)).is_err());
        assert!(validate_target_qty(Decimal::new(123_456, 5)).is_err());
        // trailing zeros do not count as precision
        assert!(validate_quantity(Decimal::new(1_500_000, 6)).is_ok());
        assert!(validate_target_qty(Decimal::new(12_345, 4)).is_ok());
    }

    #[test]
    fn test_quantity_outside_column_range_is_rejected() {
        assert!(validate_quantity(max_storable_qty()).is_ok());
        assert!(validate_quantity(max_storable_qty() + Decimal::ONE).is_err());
        assert!(validate_target_qty(Decimal::from(100_000_000_000_000i64)).is_err());
        assert!(validate_unit_price(Decimal::new(-1, 0)).is_err());
        assert!(validate_unit_price(Decimal::new(2_550, 2)).is_ok());
    }

    #[test]
    fn test_specified_policy_needs_batch() {
        assert!(validate_batch_selection(BatchPolicy::Specified, Some("B1")).is_ok());
        assert!(validate_batch_selection(BatchPolicy::Specified, None).is_err());
        assert!(validate_batch_selection(BatchPolicy::Specified, Some("  ")).is_err());
        assert!(validate_batch_selection(BatchPolicy::System, None).is_ok());
    }

    #[test]
    fn test_target_qty_may_be_zero() {
        assert!(validate_target_qty(Decimal::ZERO).is_ok());
        assert!(validate_target_qty(Decimal::from(-1)).is_err());
    }

    #[test]
    fn test_item_count() {
        assert!(validate_item_count(0).is_err());
        assert!(validate_item_count(1).is_ok());
    }

    #[test]
    fn test_thresholds() {
        assert!(validate_thresholds(&AlertThresholds::default()).is_ok());
        let bad = AlertThresholds {
            slow_days: -1,
            ..AlertThresholds::default()
        };
        assert!(validate_thresholds(&bad).is_err());
    }

    #[test]
    fn test_threshold_windows_are_capped() {
        let far = AlertThresholds {
            expiry_days: 200_000_000,
            ..AlertThresholds::default()
        };
        assert!(validate_thresholds(&far).is_err());

        let slow = AlertThresholds {
            slow_days: MAX_ALERT_DAYS + 1,
            ..AlertThresholds::default()
        };
        assert!(validate_thresholds(&slow).is_err());

        let edge = AlertThresholds {
            expiry_days: MAX_ALERT_DAYS,
            slow_days: MAX_ALERT_DAYS,
            ..AlertThresholds::default()
        };
        assert!(validate_thresholds(&edge).is_ok());

        let fine = AlertThresholds {
            global_min_qty: Decimal::new(1, 6),
            ..AlertThresholds::default()
        };
        assert!(validate_thresholds(&fine).is_err());
    }

    #[test]
    fn test_idempotency_key_length() {
        assert!(validate_idempotency_key("abc").is_ok());
        assert!(validate_idempotency_key(" ").is_err());
        assert!(validate_idempotency_key(&"k".repeat(200)).is_ok());
        assert!(validate_idempotency_key(&"k".repeat(201)).is_err());
    }
}
