//! Stock ledger value types: movement entries, adjustments and reconciliation

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::SourceType;

/// Granularity at which the movement log reconciles with on-hand stock.
///
/// Locations are not part of the key: a batch split over several locations of one warehouse
/// reconciles against the sum of those rows.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerKey {
    pub material_id: Uuid,
    pub warehouse_id: Uuid,
    pub batch_no: String,
}

/// A movement log entry that has not been written yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementDraft {
    pub warehouse_id: Uuid,
    pub material_id: Uuid,
    pub batch_no: String,
    /// Signed: positive credits, negative debits
    pub qty_change: Decimal,
    pub source_type: SourceType,
    pub source_code: Option<String>,
}

impl MovementDraft {
    pub fn key(&self) -> LedgerKey {
        LedgerKey {
            material_id: self.material_id,
            warehouse_id: self.warehouse_id,
            batch_no: self.batch_no.clone(),
        }
    }
}

/// Before/after snapshot of a manual correction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentPlan {
    pub before_qty: Decimal,
    pub after_qty: Decimal,
    pub delta: Decimal,
}

impl AdjustmentPlan {
    /// Adjustments set on-hand to an absolute target.
    pub fn new(before_qty: Decimal, target_qty: Decimal) -> Self {
        Self {
            before_qty,
            after_qty: target_qty,
            delta: target_qty - before_qty,
        }
    }

    /// The single ledger entry for this adjustment, if the quantity actually changed.
    pub fn movement(&self, key: &LedgerKey, adjustment_id: Uuid) -> Option<MovementDraft> {
        if self.delta.is_zero() {
            return None;
        }
        Some(MovementDraft {
            warehouse_id: key.warehouse_id,
            material_id: key.material_id,
            batch_no: key.batch_no.clone(),
            qty_change: self.delta,
            source_type: SourceType::Adjust,
            source_code: Some(adjustment_id.to_string()),
        })
    }
}

/// A ledger key whose movement total disagrees with its on-hand total
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discrepancy {
    #[serde(flatten)]
    pub key: LedgerKey,
    pub on_hand: Decimal,
    pub ledger_total: Decimal,
}

/// Compare summed on-hand quantities with summed movement deltas per ledger key.
///
/// Keys absent from one side count as zero there. Results are ordered by key.
pub fn find_discrepancies<I, J>(on_hand: I, ledger: J) -> Vec<Discrepancy>
where
    I: IntoIterator<Item = (LedgerKey, Decimal)>,
    J: IntoIterator<Item = (LedgerKey, Decimal)>,
{
    let mut totals: BTreeMap<LedgerKey, (Decimal, Decimal)> = BTreeMap::new();
    for (key, qty) in on_hand {
        totals.entry(key).or_default().0 += qty;
    }
    for (key, qty) in ledger {
        totals.entry(key).or_default().1 += qty;
    }

    totals
        .into_iter()
        .filter(|(_, (stock, moves))| stock != moves)
        .map(|(key, (on_hand, ledger_total))| Discrepancy {
            key,
            on_hand,
            ledger_total,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(batch: &str) -> LedgerKey {
        LedgerKey {
            material_id: Uuid::nil(),
            warehouse_id: Uuid::nil(),
            batch_no: batch.to_string(),
        }
    }

    #[test]
    fn test_adjustment_down() {
        let plan = AdjustmentPlan::new(Decimal::from(20), Decimal::from(15));
        assert_eq!(plan.before_qty, Decimal::from(20));
        assert_eq!(plan.after_qty, Decimal::from(15));
        assert_eq!(plan.delta, Decimal::from(-5));

        let id = Uuid::new_v4();
        let movement = plan.movement(&key("B1"), id).unwrap();
        assert_eq!(movement.qty_change, Decimal::from(-5));
        assert_eq!(movement.source_type, SourceType::Adjust);
        assert_eq!(movement.source_code, Some(id.to_string()));
    }

    #[test]
    fn test_adjustment_without_change_writes_no_movement() {
        let plan = AdjustmentPlan::new(Decimal::from(7), Decimal::from(7));
        assert!(plan.movement(&key(""), Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_balanced_ledger_has_no_discrepancies() {
        let on_hand = vec![(key("B1"), Decimal::from(3)), (key("B1"), Decimal::from(2))];
        let ledger = vec![
            (key("B1"), Decimal::from(10)),
            (key("B1"), Decimal::from(-5)),
        ];
        assert!(find_discrepancies(on_hand, ledger).is_empty());
    }

    #[test]
    fn test_missing_side_counts_as_zero() {
        let found = find_discrepancies(
            vec![(key("B1"), Decimal::from(4))],
            vec![(key("B2"), Decimal::from(1))],
        );
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].key.batch_no, "B1");
        assert_eq!(found[0].ledger_total, Decimal::ZERO);
        assert_eq!(found[1].on_hand, Decimal::ZERO);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// A sequence of adjustments is always mirrored by its movements
            #[test]
            fn prop_adjustments_reconcile(targets in prop::collection::vec(0i64..500, 1..20)) {
                let k = key("B1");
                let mut on_hand = Decimal::ZERO;
                let mut ledger = Vec::new();
                for target in targets {
                    let plan = AdjustmentPlan::new(on_hand, Decimal::from(target));
                    on_hand = plan.after_qty;
                    if let Some(m) = plan.movement(&k, Uuid::new_v4()) {
                        ledger.push((m.key(), m.qty_change));
                    }
                }
                prop_assert!(find_discrepancies(vec![(k, on_hand)], ledger).is_empty());
            }

            /// Any drift between the two sides is reported for exactly that key
            #[test]
            fn prop_drift_is_reported(qty in 1i64..1000, drift in 1i64..50) {
                let found = find_discrepancies(
                    vec![(key("B1"), Decimal::from(qty + drift)), (key("B2"), Decimal::from(qty))],
                    vec![(key("B1"), Decimal::from(qty)), (key("B2"), Decimal::from(qty))],
                );
                prop_assert_eq!(found.len(), 1);
                prop_assert_eq!(found[0].on_hand - found[0].ledger_total, Decimal::from(drift));
            }
        }
    }
}
