//! Ledger consistency properties
//!
//! Replays random sequences of receipts, picks and corrections against an in-memory stock
//! table, writing movements the way the posting services do, and checks:
//! - Property 1: the movement log always reconciles with on-hand stock
//! - Property 2: a pick that cannot be filled leaves stock untouched
//! - Property 3: on-hand quantities never go negative through picks

use std::collections::HashMap;

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use shared::{
    find_discrepancies, AdjustmentPlan, AllocationPlanner, Candidate, LedgerKey, LineRequest,
    MovementDraft, SourceType,
};

#[derive(Debug, Clone)]
enum Op {
    Receive { batch: usize, qty: u32, exp_day: Option<u32> },
    Pick { qty: u32 },
    Adjust { batch: usize, target: u32 },
}

const BATCHES: [&str; 3] = ["B-01", "B-02", "B-03"];

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..BATCHES.len(), 1u32..50, proptest::option::of(0u32..60))
            .prop_map(|(batch, qty, exp_day)| Op::Receive { batch, qty, exp_day }),
        (1u32..80).prop_map(|qty| Op::Pick { qty }),
        (0..BATCHES.len(), 0u32..40).prop_map(|(batch, target)| Op::Adjust { batch, target }),
    ]
}

struct Ledger {
    material_id: Uuid,
    warehouse_id: Uuid,
    rows: HashMap<Uuid, Candidate>,
    movements: Vec<MovementDraft>,
}

impl Ledger {
    fn new() -> Self {
        Self {
            material_id: Uuid::new_v4(),
            warehouse_id: Uuid::new_v4(),
            rows: HashMap::new(),
            movements: Vec::new(),
        }
    }

    fn row_for(&mut self, batch_no: &str) -> &mut Candidate {
        let existing = self
            .rows
            .values()
            .find(|r| r.batch_no == batch_no)
            .map(|r| r.row_id);
        let row_id = existing.unwrap_or_else(Uuid::new_v4);
        let (material_id, warehouse_id) = (self.material_id, self.warehouse_id);
        self.rows.entry(row_id).or_insert_with(|| Candidate {
            row_id,
            material_id,
            warehouse_id,
            location_id: None,
            batch_no: batch_no.to_string(),
            mfg_date: None,
            exp_date: None,
            qty_on_hand: Decimal::ZERO,
        })
    }

    fn receive(&mut self, batch_no: &str, qty: Decimal, exp_date: Option<NaiveDate>) {
        let row = self.row_for(batch_no);
        row.qty_on_hand += qty;
        if row.exp_date.is_none() {
            row.exp_date = exp_date;
        }
        let draft = MovementDraft {
            warehouse_id: row.warehouse_id,
            material_id: row.material_id,
            batch_no: row.batch_no.clone(),
            qty_change: qty,
            source_type: SourceType::Inbound,
            source_code: Some("IN".to_string()),
        };
        self.movements.push(draft);
    }

    fn pick(&mut self, qty: Decimal) -> bool {
        let mut planner = AllocationPlanner::new(self.rows.values().cloned());
        let line = LineRequest::system(self.material_id, qty);
        let Ok(allocations) = planner.plan_all([&line]) else {
            return false;
        };
        for allocation in &allocations {
            if let Some(row) = self.rows.get_mut(&allocation.row_id) {
                row.qty_on_hand -= allocation.qty;
            }
            self.movements
                .push(allocation.debit_movement(SourceType::Outbound, Some("OUT")));
        }
        true
    }

    fn adjust(&mut self, batch_no: &str, target: Decimal) {
        let row = self.row_for(batch_no);
        let plan = AdjustmentPlan::new(row.qty_on_hand, target);
        row.qty_on_hand = plan.after_qty;
        let key = LedgerKey {
            material_id: row.material_id,
            warehouse_id: row.warehouse_id,
            batch_no: row.batch_no.clone(),
        };
        if let Some(movement) = plan.movement(&key, Uuid::new_v4()) {
            self.movements.push(movement);
        }
    }

    fn on_hand(&self) -> Vec<(LedgerKey, Decimal)> {
        self.rows
            .values()
            .map(|r| {
                (
                    LedgerKey {
                        material_id: r.material_id,
                        warehouse_id: r.warehouse_id,
                        batch_no: r.batch_no.clone(),
                    },
                    r.qty_on_hand,
                )
            })
            .collect()
    }

    fn ledger(&self) -> Vec<(LedgerKey, Decimal)> {
        self.movements.iter().map(|m| (m.key(), m.qty_change)).collect()
    }

    fn total(&self) -> Decimal {
        self.rows.values().map(|r| r.qty_on_hand).sum()
    }

    fn apply(&mut self, op: &Op) -> bool {
        let base = NaiveDate::from_ymd_opt(2026, 1, 1).expect("valid date");
        match *op {
            Op::Receive { batch, qty, exp_day } => {
                let exp = exp_day.map(|d| base + chrono::Duration::days(i64::from(d)));
                self.receive(BATCHES[batch], Decimal::from(qty), exp);
                true
            }
            Op::Pick { qty } => self.pick(Decimal::from(qty)),
            Op::Adjust { batch, target } => {
                self.adjust(BATCHES[batch], Decimal::from(target));
                true
            }
        }
    }
}

proptest! {
    /// Property 1: every stock change is mirrored by exactly one signed movement
    #[test]
    fn prop_movements_reconcile_with_stock(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut ledger = Ledger::new();
        for op in &ops {
            ledger.apply(op);
        }

        let discrepancies = find_discrepancies(ledger.on_hand(), ledger.ledger());
        prop_assert!(discrepancies.is_empty(), "{:?}", discrepancies);
    }

    /// Property 2: a rejected pick writes nothing
    #[test]
    fn prop_rejected_pick_is_atomic(
        ops in prop::collection::vec(op_strategy(), 0..20),
        extra in 1u32..100,
    ) {
        let mut ledger = Ledger::new();
        for op in &ops {
            ledger.apply(op);
        }

        let before_total = ledger.total();
        let before_moves = ledger.movements.len();
        let too_much = before_total + Decimal::from(extra);

        prop_assert!(!ledger.pick(too_much));
        prop_assert_eq!(ledger.total(), before_total);
        prop_assert_eq!(ledger.movements.len(), before_moves);
    }

    /// Property 3: picks never overdraw a row
    #[test]
    fn prop_picks_never_go_negative(
        receipts in prop::collection::vec((0..BATCHES.len(), 1u32..50), 1..10),
        picks in prop::collection::vec(1u32..60, 1..10),
    ) {
        let mut ledger = Ledger::new();
        for (batch, qty) in receipts {
            ledger.receive(BATCHES[batch], Decimal::from(qty), None);
        }
        for qty in picks {
            let before = ledger.total();
            let filled = ledger.pick(Decimal::from(qty));
            prop_assert_eq!(filled, before >= Decimal::from(qty));
            for row in ledger.rows.values() {
                prop_assert!(row.qty_on_hand >= Decimal::ZERO);
            }
        }
    }
}

#[test]
fn test_pick_follows_earliest_expiry() {
    let mut ledger = Ledger::new();
    let early = NaiveDate::from_ymd_opt(2026, 3, 1);
    let late = NaiveDate::from_ymd_opt(2026, 9, 1);
    ledger.receive("B-LATE", Decimal::from(10), late);
    ledger.receive("B-EARLY", Decimal::from(5), early);
    ledger.receive("B-UNDATED", Decimal::from(10), None);

    assert!(ledger.pick(Decimal::from(12)));

    let debited: Vec<(String, Decimal)> = ledger
        .movements
        .iter()
        .filter(|m| m.source_type == SourceType::Outbound)
        .map(|m| (m.batch_no.clone(), m.qty_change))
        .collect();
    assert_eq!(
        debited,
        vec![
            ("B-EARLY".to_string(), Decimal::from(-5)),
            ("B-LATE".to_string(), Decimal::from(-7)),
        ]
    );
}
