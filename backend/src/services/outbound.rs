//! Outbound orders: draft, approve, pick, cancel
//!
//! Picking locks every candidate row of the order's materials, plans all lines against an
//! in-memory copy of those rows, and only then debits stock. A line that cannot be satisfied
//! fails the order before any row is written.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use shared::{
    allocated_total, posted_notification, validate_batch_selection, validate_item_count,
    validate_order_code, validate_quantity, Allocation, AllocationPlanner, AlertThresholds,
    BatchPolicy, LineRequest, OrderAction, OrderStatus, OutboundStatus, PostedOrder, Shortfall,
    SourceType,
};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::catalog::{self, Warehouse};
use crate::services::inbound::duplicate_or;
use crate::services::{alert, ledger, notification, settings};

/// Outbound order service
#[derive(Clone)]
pub struct OutboundService {
    db: PgPool,
    config: Arc<Config>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundOrder {
    pub id: Uuid,
    pub code: String,
    pub purpose: Option<String>,
    pub warehouse_code: Option<String>,
    pub status: OutboundStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OutboundItem>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OutboundItem {
    pub id: Uuid,
    pub line_no: i32,
    pub material_id: Uuid,
    pub material_code: String,
    pub qty: Decimal,
    pub batch_policy: String,
    pub batch_no: Option<String>,
}

impl OutboundItem {
    fn line_request(&self) -> AppResult<LineRequest> {
        let policy: BatchPolicy = self
            .batch_policy
            .parse()
            .map_err(|e: shared::ParseEnumError| AppError::Internal(e.to_string()))?;
        Ok(LineRequest {
            material_id: self.material_id,
            qty: self.qty,
            policy,
            batch_no: self.batch_no.clone(),
        })
    }
}

/// A picked order together with the batches it consumed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickResult {
    pub order: OutboundOrder,
    pub warehouse_code: String,
    pub allocations: Vec<Allocation>,
}

#[derive(Debug, FromRow)]
struct OutboundOrderRow {
    id: Uuid,
    code: String,
    purpose: Option<String>,
    warehouse_code: Option<String>,
    status: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OutboundOrderRow {
    fn status(&self) -> AppResult<OutboundStatus> {
        self.status
            .parse()
            .map_err(|e: shared::ParseEnumError| AppError::Internal(e.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OutboundItemInput {
    #[validate(length(min = 1, max = 64))]
    pub material_code: String,
    pub qty: Decimal,
    #[serde(default)]
    pub batch_policy: BatchPolicy,
    #[validate(length(max = 64))]
    pub batch_no: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOutboundInput {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[validate(length(max = 200))]
    pub purpose: Option<String>,
    #[validate(length(max = 64))]
    pub warehouse_code: Option<String>,
    #[validate]
    pub items: Vec<OutboundItemInput>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceOutboundInput {
    #[validate(length(max = 200))]
    pub purpose: Option<String>,
    #[validate(length(max = 64))]
    pub warehouse_code: Option<String>,
    #[validate]
    pub items: Vec<OutboundItemInput>,
}

fn check_items(items: &[OutboundItemInput]) -> AppResult<()> {
    validate_item_count(items.len()).map_err(|msg| AppError::validation("items", msg))?;
    for (idx, item) in items.iter().enumerate() {
        validate_quantity(item.qty)
            .map_err(|msg| AppError::validation(format!("items[{}].qty", idx), msg))?;
        validate_batch_selection(item.batch_policy, item.batch_no.as_deref())
            .map_err(|msg| AppError::validation(format!("items[{}].batchNo", idx), msg))?;
    }
    Ok(())
}

fn validate_create(input: &CreateOutboundInput) -> AppResult<()> {
    input.validate()?;
    validate_order_code(&input.code).map_err(|msg| AppError::validation("code", msg))?;
    check_items(&input.items)
}

/// Name the material by code rather than id
fn shortfall_error(shortfall: Shortfall, items: &[OutboundItem]) -> AppError {
    let material = items
        .iter()
        .find(|i| i.material_id == shortfall.material_id)
        .map(|i| i.material_code.clone())
        .unwrap_or_else(|| shortfall.material_id.to_string());

    let message = match &shortfall.batch_no {
        Some(batch) => format!(
            "Batch '{}' of {} has {} on hand, {} requested",
            batch, material, shortfall.available, shortfall.requested
        ),
        None => format!(
            "{} has {} available, {} requested",
            material, shortfall.available, shortfall.requested
        ),
    };
    AppError::InsufficientStock(message)
}

impl OutboundService {
    pub fn new(db: PgPool, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    pub async fn create_draft(&self, input: CreateOutboundInput) -> AppResult<OutboundOrder> {
        validate_create(&input)?;

        let mut tx = self.db.begin().await?;
        let order_id = insert_order(&mut tx, &input, OutboundStatus::Draft).await?;
        insert_items(&mut tx, order_id, &input.items).await?;
        let order = load_order(&mut tx, &input.code).await?;
        tx.commit().await?;

        tracing::info!(code = %order.code, items = order.items.len(), "Outbound draft created");
        Ok(order)
    }

    /// Create and pick in one step; the order ends PICKED
    pub async fn create_immediate(&self, input: CreateOutboundInput) -> AppResult<PickResult> {
        validate_create(&input)?;

        let mut tx = self.db.begin().await?;
        let order_id = insert_order(&mut tx, &input, OutboundStatus::Picked).await?;
        insert_items(&mut tx, order_id, &input.items).await?;
        let order = load_order(&mut tx, &input.code).await?;

        let warehouse = catalog::resolve_warehouse(
            &mut tx,
            None,
            order.warehouse_code.as_deref(),
            &self.config.inventory.default_warehouse_code,
        )
        .await?;
        let allocations = self.post(&mut tx, &order, &warehouse).await?;
        tx.commit().await?;

        tracing::info!(
            code = %order.code,
            warehouse = %warehouse.code,
            movements = allocations.len(),
            qty = %allocated_total(&allocations),
            "Outbound picked immediately"
        );
        Ok(PickResult {
            order,
            warehouse_code: warehouse.code,
            allocations,
        })
    }

    pub async fn replace_draft(&self, code: &str, input: ReplaceOutboundInput) -> AppResult<OutboundOrder> {
        input.validate()?;
        check_items(&input.items)?;

        let mut tx = self.db.begin().await?;
        let row = lock_order(&mut tx, code).await?;
        row.status()?.apply(OrderAction::Edit)?;

        sqlx::query("DELETE FROM outbound_items WHERE order_id = $1")
            .bind(row.id)
            .execute(&mut *tx)
            .await?;
        insert_items(&mut tx, row.id, &input.items).await?;

        sqlx::query(
            r#"
            UPDATE outbound_orders
            SET purpose = COALESCE($2, purpose),
                warehouse_code = COALESCE($3, warehouse_code),
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(row.id)
        .bind(&input.purpose)
        .bind(&input.warehouse_code)
        .execute(&mut *tx)
        .await?;

        let order = load_order(&mut tx, code).await?;
        tx.commit().await?;
        Ok(order)
    }

    pub async fn approve(&self, code: &str, expected_version: Option<i64>) -> AppResult<OutboundOrder> {
        let mut tx = self.db.begin().await?;
        let row = lock_order(&mut tx, code).await?;

        if let Some(expected) = expected_version {
            if expected != row.version {
                tracing::warn!(code, expected, actual = row.version, "Stale outbound approval");
                return Err(AppError::VersionConflict {
                    expected,
                    actual: row.version,
                });
            }
        }

        let next = row.status()?.apply(OrderAction::Approve)?.status();
        update_status(&mut tx, row.id, next).await?;

        let order = load_order(&mut tx, code).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// APPROVED -> PICKED, debiting stock batch by batch
    pub async fn pick(&self, code: &str, warehouse_code: Option<&str>) -> AppResult<PickResult> {
        let mut tx = self.db.begin().await?;
        let row = lock_order(&mut tx, code).await?;
        let next = row.status()?.apply(OrderAction::Post)?.status();

        let warehouse = catalog::resolve_warehouse(
            &mut tx,
            warehouse_code,
            row.warehouse_code.as_deref(),
            &self.config.inventory.default_warehouse_code,
        )
        .await?;

        let order = load_order(&mut tx, code).await?;
        let allocations = self.post(&mut tx, &order, &warehouse).await?;
        update_status(&mut tx, row.id, next).await?;

        let order = load_order(&mut tx, code).await?;
        tx.commit().await?;

        tracing::info!(
            code,
            warehouse = %warehouse.code,
            movements = allocations.len(),
            qty = %allocated_total(&allocations),
            "Outbound picked"
        );
        Ok(PickResult {
            order,
            warehouse_code: warehouse.code,
            allocations,
        })
    }

    pub async fn cancel(&self, code: &str) -> AppResult<OutboundOrder> {
        let mut tx = self.db.begin().await?;
        let row = lock_order(&mut tx, code).await?;

        let change = row.status()?.apply(OrderAction::Cancel)?;
        if change.is_change() {
            update_status(&mut tx, row.id, change.status()).await?;
        } else {
            tracing::debug!(code, "Outbound already cancelled");
        }

        let order = load_order(&mut tx, code).await?;
        tx.commit().await?;
        Ok(order)
    }

    pub async fn get(&self, code: &str) -> AppResult<OutboundOrder> {
        let mut conn = self.db.acquire().await?;
        load_order(&mut conn, code).await
    }

    pub async fn list(&self) -> AppResult<Vec<OutboundOrder>> {
        let mut conn = self.db.acquire().await?;
        let codes: Vec<(String,)> =
            sqlx::query_as("SELECT code FROM outbound_orders ORDER BY created_at DESC, code LIMIT 200")
                .fetch_all(&mut *conn)
                .await?;

        let mut orders = Vec::with_capacity(codes.len());
        for (code,) in codes {
            orders.push(load_order(&mut conn, &code).await?);
        }
        Ok(orders)
    }

    /// Plan every line, then debit and log each allocation.
    async fn post(
        &self,
        conn: &mut PgConnection,
        order: &OutboundOrder,
        warehouse: &Warehouse,
    ) -> AppResult<Vec<Allocation>> {
        let lines = order
            .items
            .iter()
            .map(OutboundItem::line_request)
            .collect::<AppResult<Vec<_>>>()?;
        let material_ids: Vec<Uuid> = lines.iter().map(|l| l.material_id).collect();

        let candidates = ledger::lock_candidates(conn, warehouse.id, &material_ids).await?;
        let mut planner = AllocationPlanner::new(candidates);
        let allocations = planner
            .plan_all(&lines)
            .map_err(|s| shortfall_error(s, &order.items))?;

        for allocation in &allocations {
            ledger::debit_row(conn, allocation.row_id, allocation.qty).await?;
            ledger::append_movement(
                conn,
                &allocation.debit_movement(SourceType::Outbound, Some(&order.code)),
            )
            .await?;
        }

        notification::raise(conn, &posted_notification(PostedOrder::Outbound, &order.code)).await?;
        let fallback = AlertThresholds::from(&self.config.alerts);
        let thresholds = settings::load_thresholds(conn, &fallback).await?;
        alert::recalculate(conn, &thresholds).await?;

        Ok(allocations)
    }
}

async fn insert_order(
    conn: &mut PgConnection,
    input: &CreateOutboundInput,
    status: OutboundStatus,
) -> AppResult<Uuid> {
    let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM outbound_orders WHERE code = $1")
        .bind(&input.code)
        .fetch_optional(&mut *conn)
        .await?;
    if exists.is_some() {
        return Err(AppError::DuplicateCode(input.code.clone()));
    }

    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO outbound_orders (id, code, purpose, warehouse_code, status)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&input.code)
    .bind(&input.purpose)
    .bind(&input.warehouse_code)
    .bind(status.as_str())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| duplicate_or(e, &input.code))?;

    Ok(id)
}

async fn insert_items(
    conn: &mut PgConnection,
    order_id: Uuid,
    items: &[OutboundItemInput],
) -> AppResult<()> {
    let codes: Vec<&str> = items.iter().map(|i| i.material_code.as_str()).collect();
    let materials = catalog::materials_by_codes(conn, &codes).await?;

    for (idx, item) in items.iter().enumerate() {
        let material = materials
            .get(&item.material_code)
            .ok_or_else(|| AppError::MaterialNotFound(item.material_code.clone()))?;

        // The batch only matters for SPECIFIED lines
        let batch_no = match item.batch_policy {
            BatchPolicy::Specified => item.batch_no.as_deref().map(str::trim),
            BatchPolicy::System => None,
        };

        sqlx::query(
            r#"
            INSERT INTO outbound_items (id, order_id, line_no, material_id, qty, batch_policy, batch_no)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order_id)
        .bind(idx as i32 + 1)
        .bind(material.id)
        .bind(item.qty)
        .bind(item.batch_policy.as_str())
        .bind(batch_no)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn lock_order(conn: &mut PgConnection, code: &str) -> AppResult<OutboundOrderRow> {
    sqlx::query_as::<_, OutboundOrderRow>(
        r#"
        SELECT id, code, purpose, warehouse_code, status, version, created_at, updated_at
        FROM outbound_orders
        WHERE code = $1
        FOR UPDATE
        "#,
    )
    .bind(code)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::OrderNotFound(code.to_string()))
}

async fn update_status(conn: &mut PgConnection, order_id: Uuid, status: OutboundStatus) -> AppResult<()> {
    sqlx::query(
        "UPDATE outbound_orders SET status = $2, version = version + 1, updated_at = NOW() WHERE id = $1",
    )
    .bind(order_id)
    .bind(status.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn load_order(conn: &mut PgConnection, code: &str) -> AppResult<OutboundOrder> {
    let row = sqlx::query_as::<_, OutboundOrderRow>(
        r#"
        SELECT id, code, purpose, warehouse_code, status, version, created_at, updated_at
        FROM outbound_orders
        WHERE code = $1
        "#,
    )
    .bind(code)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::OrderNotFound(code.to_string()))?;

    let items = sqlx::query_as::<_, OutboundItem>(
        r#"
        SELECT i.id, i.line_no, i.material_id, m.code AS material_code, i.qty, i.batch_policy,
               i.batch_no
        FROM outbound_items i
        JOIN materials m ON m.id = i.material_id
        WHERE i.order_id = $1
        ORDER BY i.line_no
        "#,
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(OutboundOrder {
        status: row.status()?,
        id: row.id,
        code: row.code,
        purpose: row.purpose,
        warehouse_code: row.warehouse_code,
        version: row.version,
        created_at: row.created_at,
        updated_at: row.updated_at,
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(code: &str, id: u128) -> OutboundItem {
        OutboundItem {
            id: Uuid::new_v4(),
            line_no: 1,
            material_id: Uuid::from_u128(id),
            material_code: code.to_string(),
            qty: Decimal::from(5),
            batch_policy: "SYSTEM".to_string(),
            batch_no: None,
        }
    }

    #[test]
    fn test_shortfall_names_material_code() {
        let err = shortfall_error(
            Shortfall {
                material_id: Uuid::from_u128(7),
                batch_no: None,
                requested: Decimal::from(5),
                available: Decimal::from(2),
            },
            &[item("RM-7", 7)],
        );
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");
        assert!(err.to_string().contains("RM-7"));
    }

    #[test]
    fn test_specified_line_without_batch_is_rejected() {
        let items = vec![OutboundItemInput {
            material_code: "RM-1".to_string(),
            qty: Decimal::ONE,
            batch_policy: BatchPolicy::Specified,
            batch_no: None,
        }];
        let err = check_items(&items).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_stored_policy_becomes_line_request() {
        let mut stored = item("RM-1", 1);
        stored.batch_policy = "SPECIFIED".to_string();
        stored.batch_no = Some("B1".to_string());
        let line = stored.line_request().unwrap();
        assert_eq!(line.policy, BatchPolicy::Specified);
        assert_eq!(line.batch_no.as_deref(), Some("B1"));
    }
}
