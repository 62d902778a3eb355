//! Batch allocation for outbound picks and transfers
//!
//! The planner works on an in-memory copy of the stock rows a transaction has locked. Lines
//! are planned one after another against that copy, so two lines drawing on the same batch see
//! each other's consumption. Nothing is written until every line of an order has been planned;
//! a [`Shortfall`] on any line means the whole order must be abandoned.
//!
//! FEFO ordering is: expiry date ascending with undated stock last, then batch number
//! ascending. Rows with no positive on-hand quantity are never debited by FEFO.

use std::cmp::Ordering;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::MovementDraft;
use crate::types::{BatchPolicy, SourceType};

/// A locked stock row offered to the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub row_id: Uuid,
    pub material_id: Uuid,
    pub warehouse_id: Uuid,
    pub location_id: Option<Uuid>,
    pub batch_no: String,
    pub mfg_date: Option<NaiveDate>,
    pub exp_date: Option<NaiveDate>,
    pub qty_on_hand: Decimal,
}

/// Quantity to take from one stock row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub row_id: Uuid,
    pub material_id: Uuid,
    pub warehouse_id: Uuid,
    pub location_id: Option<Uuid>,
    pub batch_no: String,
    pub mfg_date: Option<NaiveDate>,
    pub exp_date: Option<NaiveDate>,
    pub qty: Decimal,
}

impl Allocation {
    fn from_candidate(row: &Candidate, qty: Decimal) -> Self {
        Self {
            row_id: row.row_id,
            material_id: row.material_id,
            warehouse_id: row.warehouse_id,
            location_id: row.location_id,
            batch_no: row.batch_no.clone(),
            mfg_date: row.mfg_date,
            exp_date: row.exp_date,
            qty,
        }
    }

    /// Ledger entry for taking this quantity out of its row
    pub fn debit_movement(&self, source_type: SourceType, source_code: Option<&str>) -> MovementDraft {
        MovementDraft {
            warehouse_id: self.warehouse_id,
            material_id: self.material_id,
            batch_no: self.batch_no.clone(),
            qty_change: -self.qty,
            source_type,
            source_code: source_code.map(str::to_string),
        }
    }

    /// Ledger entry for putting this quantity into the same batch of another warehouse
    pub fn credit_movement(
        &self,
        warehouse_id: Uuid,
        source_type: SourceType,
        source_code: Option<&str>,
    ) -> MovementDraft {
        MovementDraft {
            warehouse_id,
            material_id: self.material_id,
            batch_no: self.batch_no.clone(),
            qty_change: self.qty,
            source_type,
            source_code: source_code.map(str::to_string),
        }
    }
}

/// A line the planner could not satisfy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("insufficient stock for material {material_id}{}: requested {requested}, available {available}",
    batch_suffix(.batch_no))]
pub struct Shortfall {
    pub material_id: Uuid,
    pub batch_no: Option<String>,
    pub requested: Decimal,
    pub available: Decimal,
}

fn batch_suffix(batch_no: &Option<String>) -> String {
    batch_no
        .as_ref()
        .map(|b| format!(" batch '{}'", b))
        .unwrap_or_default()
}

/// One line of an outbound order (or a transfer) as seen by the planner
#[derive(Debug, Clone, PartialEq)]
pub struct LineRequest {
    pub material_id: Uuid,
    pub qty: Decimal,
    pub policy: BatchPolicy,
    pub batch_no: Option<String>,
}

impl LineRequest {
    pub fn system(material_id: Uuid, qty: Decimal) -> Self {
        Self {
            material_id,
            qty,
            policy: BatchPolicy::System,
            batch_no: None,
        }
    }

    pub fn specified(material_id: Uuid, qty: Decimal, batch_no: impl Into<String>) -> Self {
        Self {
            material_id,
            qty,
            policy: BatchPolicy::Specified,
            batch_no: Some(batch_no.into()),
        }
    }
}

/// FEFO comparison: earliest expiry first, undated last, then batch number.
pub fn fefo_order(a: &Candidate, b: &Candidate) -> Ordering {
    let by_expiry = match (a.exp_date, b.exp_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_expiry
        .then_with(|| a.batch_no.cmp(&b.batch_no))
        .then_with(|| a.location_id.cmp(&b.location_id))
        .then_with(|| a.row_id.cmp(&b.row_id))
}

/// Working copy of the candidate rows of one transaction
#[derive(Debug, Clone, Default)]
pub struct AllocationPlanner {
    rows: Vec<Candidate>,
}

impl AllocationPlanner {
    pub fn new(rows: impl IntoIterator<Item = Candidate>) -> Self {
        let mut planner = Self::default();
        planner.add_rows(rows);
        planner
    }

    /// Offer more locked rows; rows already known are ignored.
    pub fn add_rows(&mut self, rows: impl IntoIterator<Item = Candidate>) {
        for row in rows {
            if !self.rows.iter().any(|r| r.row_id == row.row_id) {
                self.rows.push(row);
            }
        }
        self.rows.sort_by(fefo_order);
    }

    pub fn rows(&self) -> &[Candidate] {
        &self.rows
    }

    /// Positive on-hand still unplanned for a material
    pub fn available(&self, material_id: Uuid) -> Decimal {
        self.rows
            .iter()
            .filter(|r| r.material_id == material_id && r.qty_on_hand > Decimal::ZERO)
            .map(|r| r.qty_on_hand)
            .sum()
    }

    /// Plan a single line. On error the working copy is left untouched.
    pub fn plan_line(&mut self, line: &LineRequest) -> Result<Vec<Allocation>, Shortfall> {
        if line.qty <= Decimal::ZERO {
            return Ok(Vec::new());
        }
        match (line.policy, line.batch_no.as_deref()) {
            (BatchPolicy::Specified, Some(batch_no)) => {
                self.plan_specified(line.material_id, batch_no, line.qty)
            }
            // A specified line without a batch is rejected by validation before planning;
            // the empty batch is the closest meaning if one slips through.
            (BatchPolicy::Specified, None) => self.plan_specified(line.material_id, "", line.qty),
            (BatchPolicy::System, _) => self.plan_fefo(line.material_id, line.qty),
        }
    }

    /// Plan every line in order, stopping at the first shortfall.
    ///
    /// After an error the planner reflects the lines planned before the failing one and must
    /// be discarded together with the enclosing transaction.
    pub fn plan_all<'a>(
        &mut self,
        lines: impl IntoIterator<Item = &'a LineRequest>,
    ) -> Result<Vec<Allocation>, Shortfall> {
        let mut planned = Vec::new();
        for line in lines {
            planned.extend(self.plan_line(line)?);
        }
        Ok(planned)
    }

    fn plan_fefo(&mut self, material_id: Uuid, qty: Decimal) -> Result<Vec<Allocation>, Shortfall> {
        let mut remaining = qty;
        let mut takes = Vec::new();

        for (idx, row) in self.rows.iter().enumerate() {
            if remaining <= Decimal::ZERO {
                break;
            }
            if row.material_id != material_id || row.qty_on_hand <= Decimal::ZERO {
                continue;
            }
            let take = row.qty_on_hand.min(remaining);
            takes.push((idx, take));
            remaining -= take;
        }

        if remaining > Decimal::ZERO {
            return Err(Shortfall {
                material_id,
                batch_no: None,
                requested: qty,
                available: self.available(material_id),
            });
        }

        Ok(self.commit(takes))
    }

    fn plan_specified(
        &mut self,
        material_id: Uuid,
        batch_no: &str,
        qty: Decimal,
    ) -> Result<Vec<Allocation>, Shortfall> {
        // Several rows can share a batch when it is spread over locations; take the fullest.
        let chosen = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.material_id == material_id && r.batch_no == batch_no)
            .fold(None::<(usize, Decimal)>, |best, (idx, r)| match best {
                Some((_, best_qty)) if best_qty >= r.qty_on_hand => best,
                _ => Some((idx, r.qty_on_hand)),
            });

        match chosen {
            Some((idx, on_hand)) if on_hand >= qty => Ok(self.commit(vec![(idx, qty)])),
            other => Err(Shortfall {
                material_id,
                batch_no: Some(batch_no.to_string()),
                requested: qty,
                available: other.map(|(_, q)| q.max(Decimal::ZERO)).unwrap_or_default(),
            }),
        }
    }

    fn commit(&mut self, takes: Vec<(usize, Decimal)>) -> Vec<Allocation> {
        takes
            .into_iter()
            .map(|(idx, take)| {
                let row = &mut self.rows[idx];
                row.qty_on_hand -= take;
                Allocation::from_candidate(row, take)
            })
            .collect()
    }
}

/// Sum of planned quantities
pub fn allocated_total(allocations: &[Allocation]) -> Decimal {
    allocations.iter().map(|a| a.qty).sum()
}
