//! Direct stock operations and ledger read models

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use shared::{
    allocated_total, find_discrepancies, validate_quantity, validate_target_qty, AdjustmentPlan,
    AlertThresholds, AllocationPlanner, Discrepancy, LedgerKey, LineRequest, SourceType,
};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::ledger::{self, Destination, MovementLog};
use crate::services::{alert, catalog, settings};

const DEFAULT_MOVEMENT_LIMIT: i64 = 100;
const MAX_MOVEMENT_LIMIT: i64 = 1000;

/// Stock service for adjustments, transfers and ledger queries
#[derive(Clone)]
pub struct StockService {
    db: PgPool,
    config: Arc<Config>,
}

/// Input for an absolute stock correction
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdjustInput {
    #[validate(length(min = 1, max = 64))]
    pub material_code: String,
    #[validate(length(min = 1, max = 64))]
    pub warehouse_code: String,
    #[validate(length(max = 64))]
    pub batch_no: Option<String>,
    pub target_qty: Decimal,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Adjustment record
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Adjustment {
    pub id: Uuid,
    pub material_id: Uuid,
    pub warehouse_id: Uuid,
    pub batch_no: String,
    pub before_qty: Decimal,
    pub after_qty: Decimal,
    pub delta: Decimal,
    pub reason: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for moving stock between warehouses
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TransferInput {
    #[validate(length(min = 1, max = 64))]
    pub material_code: String,
    pub qty: Decimal,
    #[validate(length(min = 1, max = 64))]
    pub from_warehouse_code: String,
    #[validate(length(max = 64))]
    pub from_batch_no: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub to_warehouse_code: String,
    #[validate(length(max = 64))]
    pub to_location_code: Option<String>,
}

/// One batch moved by a transfer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferMove {
    pub batch_no: String,
    pub exp_date: Option<NaiveDate>,
    pub qty: Decimal,
    pub to_row_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    /// Written as the source code of every movement of this transfer
    pub reference: String,
    pub material_code: String,
    pub qty: Decimal,
    pub from_warehouse_code: String,
    pub to_warehouse_code: String,
    pub to_location_code: Option<String>,
    pub moves: Vec<TransferMove>,
}

/// Filters for the stock snapshot
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockQuery {
    pub material_code: Option<String>,
    pub warehouse_code: Option<String>,
    #[serde(default)]
    pub include_empty: bool,
}

/// Stock row with codes resolved
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StockView {
    pub id: Uuid,
    pub material_id: Uuid,
    pub material_code: String,
    pub warehouse_id: Uuid,
    pub warehouse_code: String,
    pub location_code: Option<String>,
    pub batch_no: String,
    pub mfg_date: Option<NaiveDate>,
    pub exp_date: Option<NaiveDate>,
    pub qty_on_hand: Decimal,
    pub qty_allocated: Decimal,
    pub qty_in_transit: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Filters for the movement log
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementQuery {
    pub material_code: Option<String>,
    pub warehouse_code: Option<String>,
    pub source_type: Option<SourceType>,
    pub limit: Option<i64>,
}

impl MovementQuery {
    fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_MOVEMENT_LIMIT)
            .clamp(1, MAX_MOVEMENT_LIMIT)
    }
}

#[derive(Debug, FromRow)]
struct LedgerTotalRow {
    material_id: Uuid,
    warehouse_id: Uuid,
    batch_no: String,
    total: Decimal,
}

impl LedgerTotalRow {
    fn into_pair(self) -> (LedgerKey, Decimal) {
        (
            LedgerKey {
                material_id: self.material_id,
                warehouse_id: self.warehouse_id,
                batch_no: self.batch_no,
            },
            self.total,
        )
    }
}

/// A same-warehouse move only makes sense into a named location
fn check_transfer_route(
    from_warehouse: &str,
    to_warehouse: &str,
    to_location: Option<&str>,
) -> AppResult<()> {
    let has_location = to_location.map_or(false, |l| !l.trim().is_empty());
    if from_warehouse == to_warehouse && !has_location {
        return Err(AppError::validation(
            "toLocationCode",
            "A transfer within one warehouse needs a destination location",
        ));
    }
    Ok(())
}

impl StockService {
    pub fn new(db: PgPool, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    fn fallback_thresholds(&self) -> AlertThresholds {
        AlertThresholds::from(&self.config.alerts)
    }

    /// Set on-hand of one batch to an absolute quantity
    pub async fn adjust(&self, input: AdjustInput, created_by: Option<String>) -> AppResult<Adjustment> {
        input.validate()?;
        validate_target_qty(input.target_qty)
            .map_err(|msg| AppError::validation("targetQty", msg))?;

        let mut tx = self.db.begin().await?;
        let material = catalog::material_by_code(&mut tx, &input.material_code).await?;
        let warehouse = catalog::warehouse_by_code(&mut tx, &input.warehouse_code).await?;
        let batch_no = input.batch_no.as_deref().unwrap_or("").trim().to_string();

        let row = ledger::lock_destination(
            &mut tx,
            &Destination {
                material_id: material.id,
                warehouse_id: warehouse.id,
                batch_no: batch_no.clone(),
                location_id: None,
                mfg_date: None,
                exp_date: None,
                backfill_location: false,
            },
        )
        .await?;

        let plan = AdjustmentPlan::new(row.qty_on_hand, input.target_qty);
        ledger::set_row_qty(&mut tx, row.id, plan.after_qty).await?;

        let adjustment = sqlx::query_as::<_, Adjustment>(
            r#"
            INSERT INTO adjustments (id, material_id, warehouse_id, batch_no, before_qty, after_qty, delta, reason, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, material_id, warehouse_id, batch_no, before_qty, after_qty, delta, reason,
                      created_by, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(material.id)
        .bind(warehouse.id)
        .bind(&batch_no)
        .bind(plan.before_qty)
        .bind(plan.after_qty)
        .bind(plan.delta)
        .bind(&input.reason)
        .bind(&created_by)
        .fetch_one(&mut *tx)
        .await?;

        let key = LedgerKey {
            material_id: material.id,
            warehouse_id: warehouse.id,
            batch_no,
        };
        let movements = match plan.movement(&key, adjustment.id) {
            Some(draft) => {
                ledger::append_movement(&mut tx, &draft).await?;
                1
            }
            None => 0,
        };

        let thresholds = settings::load_thresholds(&mut tx, &self.fallback_thresholds()).await?;
        alert::recalculate(&mut tx, &thresholds).await?;
        tx.commit().await?;

        tracing::info!(
            adjustment = %adjustment.id,
            material = %material.code,
            warehouse = %warehouse.code,
            delta = %plan.delta,
            movements,
            "Stock adjusted"
        );
        Ok(adjustment)
    }

    /// Move stock between warehouses, batch for batch
    pub async fn transfer(&self, input: TransferInput) -> AppResult<TransferResult> {
        input.validate()?;
        validate_quantity(input.qty).map_err(|msg| AppError::validation("qty", msg))?;
        check_transfer_route(
            &input.from_warehouse_code,
            &input.to_warehouse_code,
            input.to_location_code.as_deref(),
        )?;

        let mut tx = self.db.begin().await?;
        let material = catalog::material_by_code(&mut tx, &input.material_code).await?;
        let from = catalog::warehouse_by_code(&mut tx, &input.from_warehouse_code).await?;
        let to = catalog::warehouse_by_code(&mut tx, &input.to_warehouse_code).await?;

        let location = match input.to_location_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => catalog::location_in_warehouse(&mut tx, to.id, code).await?,
            _ => None,
        };
        let same_warehouse = from.id == to.id;
        if same_warehouse && location.is_none() {
            return Err(AppError::validation(
                "toLocationCode",
                "Destination location does not exist in the warehouse",
            ));
        }

        let line = match input.from_batch_no.as_deref().map(str::trim) {
            Some(batch) if !batch.is_empty() => LineRequest::specified(material.id, input.qty, batch),
            _ => LineRequest::system(material.id, input.qty),
        };

        // Source and destination rows are locked together so opposing transfers queue up.
        let locked = ledger::lock_keys(&mut tx, &[(material.id, from.id), (material.id, to.id)]).await?;
        let mut planner = AllocationPlanner::new(
            locked
                .iter()
                .filter(|row| row.warehouse_id == from.id)
                .map(ledger::StockRow::candidate),
        );
        let allocations = planner.plan_line(&line).map_err(|s| {
            AppError::InsufficientStock(format!(
                "{} has {} available in {}, {} requested",
                material.code, s.available, from.code, s.requested
            ))
        })?;

        let reference = Uuid::new_v4().to_string();
        let mut moves = Vec::with_capacity(allocations.len());

        for allocation in &allocations {
            ledger::debit_row(&mut tx, allocation.row_id, allocation.qty).await?;
            ledger::append_movement(
                &mut tx,
                &allocation.debit_movement(SourceType::Transfer, Some(&reference)),
            )
            .await?;
        }

        for allocation in &allocations {
            let dest = ledger::lock_destination(
                &mut tx,
                &Destination {
                    material_id: material.id,
                    warehouse_id: to.id,
                    batch_no: allocation.batch_no.clone(),
                    location_id: location.as_ref().map(|l| l.id),
                    mfg_date: allocation.mfg_date,
                    exp_date: allocation.exp_date,
                    // Within one warehouse the location-less row may be the source itself
                    backfill_location: !same_warehouse,
                },
            )
            .await?;

            ledger::credit_row(&mut tx, dest.id, allocation.qty, allocation.mfg_date, allocation.exp_date)
                .await?;
            ledger::append_movement(
                &mut tx,
                &allocation.credit_movement(to.id, SourceType::Transfer, Some(&reference)),
            )
            .await?;

            moves.push(TransferMove {
                batch_no: allocation.batch_no.clone(),
                exp_date: allocation.exp_date,
                qty: allocation.qty,
                to_row_id: dest.id,
            });
        }

        let thresholds = settings::load_thresholds(&mut tx, &self.fallback_thresholds()).await?;
        alert::recalculate(&mut tx, &thresholds).await?;
        tx.commit().await?;

        tracing::info!(
            reference = %reference,
            material = %material.code,
            from = %from.code,
            to = %to.code,
            qty = %allocated_total(&allocations),
            movements = moves.len() * 2,
            "Stock transferred"
        );

        Ok(TransferResult {
            reference,
            material_code: material.code,
            qty: input.qty,
            from_warehouse_code: from.code,
            to_warehouse_code: to.code,
            to_location_code: location.map(|l| l.code),
            moves,
        })
    }

    /// Current stock rows; rows at zero are hidden unless `include_empty`
    pub async fn list_stock(&self, query: StockQuery) -> AppResult<Vec<StockView>> {
        let rows = sqlx::query_as::<_, StockView>(
            r#"
            SELECT s.id, s.material_id, m.code AS material_code, s.warehouse_id,
                   w.code AS warehouse_code, l.code AS location_code, s.batch_no, s.mfg_date,
                   s.exp_date, s.qty_on_hand, s.qty_allocated, s.qty_in_transit, s.updated_at
            FROM stock_rows s
            JOIN materials m ON m.id = s.material_id
            JOIN warehouses w ON w.id = s.warehouse_id
            LEFT JOIN locations l ON l.id = s.location_id
            WHERE ($1::text IS NULL OR m.code = $1)
              AND ($2::text IS NULL OR w.code = $2)
              AND ($3 OR s.qty_on_hand <> 0)
            ORDER BY m.code, w.code, s.exp_date ASC NULLS LAST, s.batch_no
            "#,
        )
        .bind(&query.material_code)
        .bind(&query.warehouse_code)
        .bind(query.include_empty)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    /// Movement log, newest first
    pub async fn list_movements(&self, query: MovementQuery) -> AppResult<Vec<MovementLog>> {
        let entries = sqlx::query_as::<_, MovementLog>(
            r#"
            SELECT g.id, g.created_at, g.warehouse_id, g.material_id, g.batch_no, g.qty_change,
                   g.source_type, g.source_code
            FROM movement_logs g
            LEFT JOIN materials m ON m.id = g.material_id
            LEFT JOIN warehouses w ON w.id = g.warehouse_id
            WHERE ($1::text IS NULL OR m.code = $1)
              AND ($2::text IS NULL OR w.code = $2)
              AND ($3::text IS NULL OR g.source_type = $3)
            ORDER BY g.created_at DESC, g.id
            LIMIT $4
            "#,
        )
        .bind(&query.material_code)
        .bind(&query.warehouse_code)
        .bind(query.source_type.map(|s| s.as_str()))
        .bind(query.effective_limit())
        .fetch_all(&self.db)
        .await?;

        Ok(entries)
    }

    /// Ledger keys whose movement total differs from on-hand
    pub async fn reconciliation(&self) -> AppResult<Vec<Discrepancy>> {
        let on_hand = sqlx::query_as::<_, LedgerTotalRow>(
            r#"
            SELECT material_id, warehouse_id, batch_no, SUM(qty_on_hand) AS total
            FROM stock_rows
            GROUP BY material_id, warehouse_id, batch_no
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let ledger_totals = sqlx::query_as::<_, LedgerTotalRow>(
            r#"
            SELECT material_id, warehouse_id, batch_no, SUM(qty_change) AS total
            FROM movement_logs
            GROUP BY material_id, warehouse_id, batch_no
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let found = find_discrepancies(
            on_hand.into_iter().map(LedgerTotalRow::into_pair),
            ledger_totals.into_iter().map(LedgerTotalRow::into_pair),
        );
        if !found.is_empty() {
            tracing::warn!(count = found.len(), "Stock ledger out of balance");
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_warehouse_needs_location() {
        assert!(check_transfer_route("MAIN", "MAIN", None).is_err());
        assert!(check_transfer_route("MAIN", "MAIN", Some(" ")).is_err());
        assert!(check_transfer_route("MAIN", "MAIN", Some("A-01")).is_ok());
        assert!(check_transfer_route("MAIN", "WH2", None).is_ok());
    }

    #[test]
    fn test_movement_limit_is_clamped() {
        let query = MovementQuery {
            limit: Some(50_000),
            ..MovementQuery::default()
        };
        assert_eq!(query.effective_limit(), MAX_MOVEMENT_LIMIT);
        assert_eq!(MovementQuery::default().effective_limit(), DEFAULT_MOVEMENT_LIMIT);
        let zero = MovementQuery {
            limit: Some(0),
            ..MovementQuery::default()
        };
        assert_eq!(zero.effective_limit(), 1);
    }
}
