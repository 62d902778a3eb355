//! Threshold alert evaluation
//!
//! Evaluation is a pure function of a stock snapshot, the set of recently shipped materials and
//! the alert thresholds. The backend persists the resulting drafts; an unread notification with
//! the same dedup key suppresses the insert, so re-running an evaluation never duplicates alerts.

use std::collections::{BTreeMap, HashSet};

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::AlertThresholds;
use crate::types::NotificationKind;

/// One stock row as seen by the alert sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockSnapshot {
    pub material_id: Uuid,
    pub material_code: String,
    pub batch_no: String,
    pub exp_date: Option<NaiveDate>,
    pub qty_on_hand: Decimal,
}

/// A notification waiting to be raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDraft {
    pub kind: NotificationKind,
    pub dedup_key: String,
    pub title: String,
    pub message: String,
}

/// Which posting produced a success notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostedOrder {
    Inbound,
    Outbound,
}

impl PostedOrder {
    fn key_part(&self) -> &'static str {
        match self {
            PostedOrder::Inbound => "inbound",
            PostedOrder::Outbound => "outbound",
        }
    }
}

/// Success notification for a posted order
pub fn posted_notification(order: PostedOrder, code: &str) -> NotificationDraft {
    let (title, message) = match order {
        PostedOrder::Inbound => (
            "Inbound posted".to_string(),
            format!("Inbound order {} was put away", code),
        ),
        PostedOrder::Outbound => (
            "Outbound posted".to_string(),
            format!("Outbound order {} was picked", code),
        ),
    };
    NotificationDraft {
        kind: NotificationKind::Success,
        dedup_key: format!("posted:{}:{}", order.key_part(), code),
        title,
        message,
    }
}

/// Materials whose summed on-hand is below the global minimum
pub fn low_stock(
    rows: &[StockSnapshot],
    thresholds: &AlertThresholds,
    today: NaiveDate,
) -> Vec<NotificationDraft> {
    let mut totals: BTreeMap<&str, Decimal> = BTreeMap::new();
    for row in rows {
        *totals.entry(row.material_code.as_str()).or_default() += row.qty_on_hand;
    }

    totals
        .into_iter()
        .filter(|(_, total)| *total < thresholds.global_min_qty)
        .map(|(code, total)| NotificationDraft {
            kind: NotificationKind::LowStock,
            dedup_key: format!("low_stock:{}:{}", code, today),
            title: format!("Low stock: {}", code),
            message: format!(
                "Material {} has {} on hand, below the minimum of {}",
                code, total, thresholds.global_min_qty
            ),
        })
        .collect()
}

/// Batches with stock that expire within the warning window, or already have
pub fn near_expiry(
    rows: &[StockSnapshot],
    thresholds: &AlertThresholds,
    today: NaiveDate,
) -> Vec<NotificationDraft> {
    // A window past the calendar's end has no horizon: every dated batch is due.
    let horizon = Duration::try_days(thresholds.expiry_days)
        .and_then(|window| today.checked_add_signed(window));

    let mut due: Vec<&StockSnapshot> = rows
        .iter()
        .filter(|r| r.qty_on_hand > Decimal::ZERO)
        .filter(|r| r.exp_date.map_or(false, |exp| horizon.map_or(true, |h| exp <= h)))
        .collect();
    due.sort_by(|a, b| {
        (a.exp_date, &a.material_code, &a.batch_no).cmp(&(b.exp_date, &b.material_code, &b.batch_no))
    });

    due.into_iter()
        .filter_map(|r| {
            let exp = r.exp_date?;
            let message = if exp < today {
                format!(
                    "Batch '{}' of {} expired on {}",
                    r.batch_no, r.material_code, exp
                )
            } else {
                format!(
                    "Batch '{}' of {} expires on {}",
                    r.batch_no, r.material_code, exp
                )
            };
            Some(NotificationDraft {
                kind: NotificationKind::NearExpiry,
                dedup_key: format!("near_expiry:{}:{}:{}", r.material_code, r.batch_no, exp),
                title: format!("Near expiry: {}", r.material_code),
                message,
            })
        })
        .collect()
}

/// Materials with stock that nothing has shipped in the trailing window
pub fn slow_moving(
    rows: &[StockSnapshot],
    recently_shipped: &HashSet<Uuid>,
    thresholds: &AlertThresholds,
    today: NaiveDate,
) -> Vec<NotificationDraft> {
    if !thresholds.slow_moving_enabled() {
        return Vec::new();
    }

    let stocked: BTreeMap<&str, Uuid> = rows
        .iter()
        .filter(|r| r.qty_on_hand > Decimal::ZERO)
        .map(|r| (r.material_code.as_str(), r.material_id))
        .collect();

    stocked
        .into_iter()
        .filter(|(_, id)| !recently_shipped.contains(id))
        .map(|(code, _)| NotificationDraft {
            kind: NotificationKind::SlowMoving,
            dedup_key: format!("slow_moving:{}:{}", code, today),
            title: format!("Slow moving: {}", code),
            message: format!(
                "Material {} has not shipped in the last {} days",
                code, thresholds.slow_days
            ),
        })
        .collect()
}

/// Run every pass and drop repeated dedup keys.
pub fn evaluate(
    rows: &[StockSnapshot],
    recently_shipped: &HashSet<Uuid>,
    thresholds: &AlertThresholds,
    today: NaiveDate,
) -> Vec<NotificationDraft> {
    let mut seen = HashSet::new();
    low_stock(rows, thresholds, today)
        .into_iter()
        .chain(near_expiry(rows, thresholds, today))
        .chain(slow_moving(rows, recently_shipped, thresholds, today))
        .filter(|draft| seen.insert(draft.dedup_key.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn snap(id: u128, code: &str, batch: &str, exp: Option<&str>, qty: i64) -> StockSnapshot {
        StockSnapshot {
            material_id: Uuid::from_u128(id),
            material_code: code.to_string(),
            batch_no: batch.to_string(),
            exp_date: exp.map(date),
            qty_on_hand: Decimal::from(qty),
        }
    }

    fn thresholds(min: i64, expiry_days: i64, slow_days: i64) -> AlertThresholds {
        AlertThresholds {
            global_min_qty: Decimal::from(min),
            expiry_days,
            slow_days,
        }
    }

    #[test]
    fn test_low_stock_sums_across_rows() {
        let rows = vec![
            snap(1, "M1", "B1", None, 4),
            snap(1, "M1", "B2", None, 4),
            snap(2, "M2", "", None, 3),
        ];
        let today = date("2024-03-01");
        let drafts = low_stock(&rows, &thresholds(5, 30, 0), today);

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].dedup_key, "low_stock:M2:2024-03-01");
        assert_eq!(drafts[0].title, "Low stock: M2");
    }

    #[test]
    fn test_zero_minimum_never_alerts() {
        let rows = vec![snap(1, "M1", "", None, 0)];
        assert!(low_stock(&rows, &AlertThresholds::default(), date("2024-03-01")).is_empty());
    }

    #[test]
    fn test_near_expiry_window_includes_boundary_and_expired() {
        let rows = vec![
            snap(1, "M1", "OLD", Some("2024-02-01"), 1),
            snap(1, "M1", "EDGE", Some("2024-03-11"), 1),
            snap(1, "M1", "LATE", Some("2024-03-12"), 1),
            snap(1, "M1", "NONE", None, 1),
            snap(1, "M1", "EMPTY", Some("2024-03-02"), 0),
        ];
        let drafts = near_expiry(&rows, &thresholds(0, 10, 0), date("2024-03-01"));
        let keys: Vec<_> = drafts.iter().map(|d| d.dedup_key.as_str()).collect();

        assert_eq!(
            keys,
            vec![
                "near_expiry:M1:OLD:2024-02-01",
                "near_expiry:M1:EDGE:2024-03-11"
            ]
        );
        assert!(drafts[0].message.contains("expired"));
    }

    #[test]
    fn test_near_expiry_window_beyond_calendar_does_not_panic() {
        let rows = vec![
            snap(1, "M1", "FAR", Some("2200-01-01"), 1),
            snap(1, "M1", "NONE", None, 1),
        ];
        for window in [200_000_000, i64::MAX] {
            let drafts = near_expiry(&rows, &thresholds(0, window, 0), date("2024-03-01"));
            let keys: Vec<_> = drafts.iter().map(|d| d.dedup_key.as_str()).collect();
            assert_eq!(keys, vec!["near_expiry:M1:FAR:2200-01-01"]);
        }
    }

    #[test]
    fn test_slow_moving_disabled_by_default() {
        let rows = vec![snap(1, "M1", "", None, 10)];
        let drafts = slow_moving(
            &rows,
            &HashSet::new(),
            &AlertThresholds::default(),
            date("2024-03-01"),
        );
        assert!(drafts.is_empty());
    }

    #[test]
    fn test_slow_moving_skips_recently_shipped_materials() {
        let rows = vec![
            snap(1, "M1", "", None, 10),
            snap(2, "M2", "", None, 10),
            snap(3, "M3", "", None, 0),
        ];
        let shipped: HashSet<Uuid> = [Uuid::from_u128(1)].into_iter().collect();
        let drafts = slow_moving(&rows, &shipped, &thresholds(0, 30, 14), date("2024-03-01"));

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].dedup_key, "slow_moving:M2:2024-03-01");
    }

    #[test]
    fn test_evaluate_emits_each_key_once() {
        // Same batch spread over two locations
        let rows = vec![
            snap(1, "M1", "B1", Some("2024-03-05"), 2),
            snap(1, "M1", "B1", Some("2024-03-05"), 3),
        ];
        let drafts = evaluate(&rows, &HashSet::new(), &thresholds(0, 30, 0), date("2024-03-01"));
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].kind, NotificationKind::NearExpiry);
    }

    #[test]
    fn test_evaluate_is_stable_across_runs() {
        let rows = vec![
            snap(1, "M1", "B1", Some("2024-03-05"), 2),
            snap(2, "M2", "", None, 1),
        ];
        let t = thresholds(5, 30, 7);
        let today = date("2024-03-01");
        let first = evaluate(&rows, &HashSet::new(), &t, today);
        let second = evaluate(&rows, &HashSet::new(), &t, today);
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }

    #[test]
    fn test_posted_notification_keys() {
        let draft = posted_notification(PostedOrder::Outbound, "OB-7");
        assert_eq!(draft.kind, NotificationKind::Success);
        assert_eq!(draft.dedup_key, "posted:outbound:OB-7");
    }
}
