//! Inbound orders: draft, approve, putaway, cancel
//!
//! Putaway is the only step that touches stock. It credits one row per item and writes one
//! movement entry per credit, then raises the success notification and re-runs alerting, all on
//! one transaction.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use shared::{
    posted_notification, validate_item_count, validate_order_code, validate_quantity,
    validate_unit_price, AlertThresholds, InboundStatus, MovementDraft, OrderAction, OrderStatus,
    PostedOrder, SourceType,
};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::catalog::{self, Warehouse};
use crate::services::ledger::{self, Destination};
use crate::services::{alert, notification, settings};

/// Inbound order service
#[derive(Clone)]
pub struct InboundService {
    db: PgPool,
    config: Arc<Config>,
}

/// Inbound order with its items
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundOrder {
    pub id: Uuid,
    pub code: String,
    pub source_type: String,
    pub supplier: Option<String>,
    pub arrive_date: Option<NaiveDate>,
    pub warehouse_code: Option<String>,
    pub status: InboundStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<InboundItem>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InboundItem {
    pub id: Uuid,
    pub line_no: i32,
    pub material_id: Uuid,
    pub material_code: String,
    pub qty: Decimal,
    pub batch_no: String,
    pub mfg_date: Option<NaiveDate>,
    pub exp_date: Option<NaiveDate>,
    pub uprice: Option<Decimal>,
}

#[derive(Debug, FromRow)]
struct InboundOrderRow {
    id: Uuid,
    code: String,
    source_type: String,
    supplier: Option<String>,
    arrive_date: Option<NaiveDate>,
    warehouse_code: Option<String>,
    status: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InboundOrderRow {
    fn status(&self) -> AppResult<InboundStatus> {
        self.status
            .parse()
            .map_err(|e: shared::ParseEnumError| AppError::Internal(e.to_string()))
    }
}

/// One line of an inbound order
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InboundItemInput {
    #[validate(length(min = 1, max = 64))]
    pub material_code: String,
    pub qty: Decimal,
    #[validate(length(max = 64))]
    pub batch_no: Option<String>,
    pub mfg_date: Option<NaiveDate>,
    pub exp_date: Option<NaiveDate>,
    pub uprice: Option<Decimal>,
}

/// Input for creating an inbound order
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInboundInput {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[serde(default = "default_source_type")]
    #[validate(length(min = 1, max = 32))]
    pub source_type: String,
    #[validate(length(max = 200))]
    pub supplier: Option<String>,
    pub arrive_date: Option<NaiveDate>,
    #[validate(length(max = 64))]
    pub warehouse_code: Option<String>,
    #[validate]
    pub items: Vec<InboundItemInput>,
}

/// Input for replacing a draft; items are replaced wholesale, header fields only when given
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceInboundInput {
    #[validate(length(max = 200))]
    pub supplier: Option<String>,
    pub arrive_date: Option<NaiveDate>,
    #[validate(length(max = 64))]
    pub warehouse_code: Option<String>,
    #[validate]
    pub items: Vec<InboundItemInput>,
}

fn default_source_type() -> String {
    "PURCHASE".to_string()
}

/// Apply the domain rules `validator` attributes cannot express.
fn check_items(items: &[InboundItemInput]) -> AppResult<()> {
    validate_item_count(items.len()).map_err(|msg| AppError::validation("items", msg))?;
    for (idx, item) in items.iter().enumerate() {
        validate_quantity(item.qty)
            .map_err(|msg| AppError::validation(format!("items[{}].qty", idx), msg))?;
        if let Some(price) = item.uprice {
            validate_unit_price(price)
                .map_err(|msg| AppError::validation(format!("items[{}].uprice", idx), msg))?;
        }
    }
    Ok(())
}

impl InboundService {
    pub fn new(db: PgPool, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    fn fallback_thresholds(&self) -> AlertThresholds {
        AlertThresholds::from(&self.config.alerts)
    }

    /// Create an order in DRAFT
    pub async fn create_draft(&self, input: CreateInboundInput) -> AppResult<InboundOrder> {
        validate_create(&input)?;

        let mut tx = self.db.begin().await?;
        let order_id = insert_order(&mut tx, &input, InboundStatus::Draft).await?;
        insert_items(&mut tx, order_id, &input.items).await?;
        let order = load_order(&mut tx, &input.code).await?;
        tx.commit().await?;

        tracing::info!(code = %order.code, items = order.items.len(), "Inbound draft created");
        Ok(order)
    }

    /// Create, approve and post in one step. The order stays APPROVED.
    pub async fn create_immediate(&self, input: CreateInboundInput) -> AppResult<InboundOrder> {
        validate_create(&input)?;

        let mut tx = self.db.begin().await?;
        let order_id = insert_order(&mut tx, &input, InboundStatus::Approved).await?;
        insert_items(&mut tx, order_id, &input.items).await?;
        let order = load_order(&mut tx, &input.code).await?;

        let warehouse = catalog::resolve_warehouse(
            &mut tx,
            None,
            order.warehouse_code.as_deref(),
            &self.config.inventory.default_warehouse_code,
        )
        .await?;
        let movements = self.post(&mut tx, &order, &warehouse).await?;
        tx.commit().await?;

        tracing::info!(
            code = %order.code,
            warehouse = %warehouse.code,
            movements,
            "Inbound posted immediately"
        );
        Ok(order)
    }

    /// Replace the items (and optionally header fields) of a draft
    pub async fn replace_draft(&self, code: &str, input: ReplaceInboundInput) -> AppResult<InboundOrder> {
        input.validate()?;
        check_items(&input.items)?;

        let mut tx = self.db.begin().await?;
        let row = lock_order(&mut tx, code).await?;
        row.status()?.apply(OrderAction::Edit)?;

        sqlx::query("DELETE FROM inbound_items WHERE order_id = $1")
            .bind(row.id)
            .execute(&mut *tx)
            .await?;
        insert_items(&mut tx, row.id, &input.items).await?;

        sqlx::query(
            r#"
            UPDATE inbound_orders
            SET supplier = COALESCE($2, supplier),
                arrive_date = COALESCE($3, arrive_date),
                warehouse_code = COALESCE($4, warehouse_code),
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(row.id)
        .bind(&input.supplier)
        .bind(input.arrive_date)
        .bind(&input.warehouse_code)
        .execute(&mut *tx)
        .await?;

        let order = load_order(&mut tx, code).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// DRAFT -> APPROVED, optionally guarded by the version the caller last saw
    pub async fn approve(&self, code: &str, expected_version: Option<i64>) -> AppResult<InboundOrder> {
        let mut tx = self.db.begin().await?;
        let row = lock_order(&mut tx, code).await?;

        if let Some(expected) = expected_version {
            if expected != row.version {
                tracing::warn!(code, expected, actual = row.version, "Stale inbound approval");
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

    /// APPROVED -> PUTAWAY, crediting stock
    pub async fn putaway(&self, code: &str, warehouse_code: Option<&str>) -> AppResult<InboundOrder> {
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
        let movements = self.post(&mut tx, &order, &warehouse).await?;
        update_status(&mut tx, row.id, next).await?;

        let order = load_order(&mut tx, code).await?;
        tx.commit().await?;

        tracing::info!(code, warehouse = %warehouse.code, movements, "Inbound put away");
        Ok(order)
    }

    /// Cancel a DRAFT or APPROVED order; cancelling twice is a no-op
    pub async fn cancel(&self, code: &str) -> AppResult<InboundOrder> {
        let mut tx = self.db.begin().await?;
        let row = lock_order(&mut tx, code).await?;

        let change = row.status()?.apply(OrderAction::Cancel)?;
        if change.is_change() {
            update_status(&mut tx, row.id, change.status()).await?;
        } else {
            tracing::debug!(code, "Inbound already cancelled");
        }

        let order = load_order(&mut tx, code).await?;
        tx.commit().await?;
        Ok(order)
    }

    pub async fn get(&self, code: &str) -> AppResult<InboundOrder> {
        let mut conn = self.db.acquire().await?;
        load_order(&mut conn, code).await
    }

    pub async fn list(&self) -> AppResult<Vec<InboundOrder>> {
        let mut conn = self.db.acquire().await?;
        let codes: Vec<(String,)> =
            sqlx::query_as("SELECT code FROM inbound_orders ORDER BY created_at DESC, code LIMIT 200")
                .fetch_all(&mut *conn)
                .await?;

        let mut orders = Vec::with_capacity(codes.len());
        for (code,) in codes {
            orders.push(load_order(&mut conn, &code).await?);
        }
        Ok(orders)
    }

    /// Credit every item into `warehouse`, raise the success notice and re-run alerts.
    async fn post(
        &self,
        conn: &mut PgConnection,
        order: &InboundOrder,
        warehouse: &Warehouse,
    ) -> AppResult<usize> {
        let keys: Vec<(Uuid, Uuid)> = order
            .items
            .iter()
            .map(|item| (item.material_id, warehouse.id))
            .collect();
        ledger::lock_keys(conn, &keys).await?;

        // New bins are opened in the same canonical order as the locks above.
        let mut items: Vec<&InboundItem> = order.items.iter().collect();
        items.sort_by(|a, b| (a.material_id, &a.batch_no).cmp(&(b.material_id, &b.batch_no)));

        for item in items {
            let row = ledger::lock_destination(
                conn,
                &Destination {
                    material_id: item.material_id,
                    warehouse_id: warehouse.id,
                    batch_no: item.batch_no.clone(),
                    location_id: None,
                    mfg_date: item.mfg_date,
                    exp_date: item.exp_date,
                    backfill_location: false,
                },
            )
            .await?;

            ledger::credit_row(conn, row.id, item.qty, item.mfg_date, item.exp_date).await?;
            ledger::append_movement(
                conn,
                &MovementDraft {
                    warehouse_id: warehouse.id,
                    material_id: item.material_id,
                    batch_no: item.batch_no.clone(),
                    qty_change: item.qty,
                    source_type: SourceType::Inbound,
                    source_code: Some(order.code.clone()),
                },
            )
            .await?;
        }

        notification::raise(conn, &posted_notification(PostedOrder::Inbound, &order.code)).await?;
        let thresholds = settings::load_thresholds(conn, &self.fallback_thresholds()).await?;
        alert::recalculate(conn, &thresholds).await?;

        Ok(order.items.len())
    }
}

fn validate_create(input: &CreateInboundInput) -> AppResult<()> {
    input.validate()?;
    validate_order_code(&input.code).map_err(|msg| AppError::validation("code", msg))?;
    check_items(&input.items)
}

async fn insert_order(
    conn: &mut PgConnection,
    input: &CreateInboundInput,
    status: InboundStatus,
) -> AppResult<Uuid> {
    let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM inbound_orders WHERE code = $1")
        .bind(&input.code)
        .fetch_optional(&mut *conn)
        .await?;
    if exists.is_some() {
        return Err(AppError::DuplicateCode(input.code.clone()));
    }

    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO inbound_orders (id, code, source_type, supplier, arrive_date, warehouse_code, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&input.code)
    .bind(&input.source_type)
    .bind(&input.supplier)
    .bind(input.arrive_date)
    .bind(&input.warehouse_code)
    .bind(status.as_str())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| duplicate_or(e, &input.code))?;

    Ok(id)
}

/// A racing insert of the same code surfaces as a unique violation
pub(crate) fn duplicate_or(err: sqlx::Error, code: &str) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return AppError::DuplicateCode(code.to_string());
        }
    }
    AppError::DatabaseError(err)
}

async fn insert_items(
    conn: &mut PgConnection,
    order_id: Uuid,
    items: &[InboundItemInput],
) -> AppResult<()> {
    let codes: Vec<&str> = items.iter().map(|i| i.material_code.as_str()).collect();
    let materials = catalog::materials_by_codes(conn, &codes).await?;

    for (idx, item) in items.iter().enumerate() {
        let material = materials
            .get(&item.material_code)
            .ok_or_else(|| AppError::MaterialNotFound(item.material_code.clone()))?;

        sqlx::query(
            r#"
            INSERT INTO inbound_items (id, order_id, line_no, material_id, qty, batch_no, mfg_date, exp_date, uprice)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order_id)
        .bind(idx as i32 + 1)
        .bind(material.id)
        .bind(item.qty)
        .bind(item.batch_no.as_deref().unwrap_or("").trim())
        .bind(item.mfg_date)
        .bind(item.exp_date)
        .bind(item.uprice)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn lock_order(conn: &mut PgConnection, code: &str) -> AppResult<InboundOrderRow> {
    sqlx::query_as::<_, InboundOrderRow>(
        r#"
        SELECT id, code, source_type, supplier, arrive_date, warehouse_code, status, version,
               created_at, updated_at
        FROM inbound_orders
        WHERE code = $1
        FOR UPDATE
        "#,
    )
    .bind(code)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::OrderNotFound(code.to_string()))
}

async fn update_status(conn: &mut PgConnection, order_id: Uuid, status: InboundStatus) -> AppResult<()> {
    sqlx::query(
        "UPDATE inbound_orders SET status = $2, version = version + 1, updated_at = NOW() WHERE id = $1",
    )
    .bind(order_id)
    .bind(status.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn load_order(conn: &mut PgConnection, code: &str) -> AppResult<InboundOrder> {
    let row = sqlx::query_as::<_, InboundOrderRow>(
        r#"
        SELECT id, code, source_type, supplier, arrive_date, warehouse_code, status, version,
               created_at, updated_at
        FROM inbound_orders
        WHERE code = $1
        "#,
    )
    .bind(code)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::OrderNotFound(code.to_string()))?;

    let items = sqlx::query_as::<_, InboundItem>(
        r#"
        SELECT i.id, i.line_no, i.material_id, m.code AS material_code, i.qty, i.batch_no,
               i.mfg_date, i.exp_date, i.uprice
        FROM inbound_items i
        JOIN materials m ON m.id = i.material_id
        WHERE i.order_id = $1
        ORDER BY i.line_no
        "#,
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(InboundOrder {
        status: row.status()?,
        id: row.id,
        code: row.code,
        source_type: row.source_type,
        supplier: row.supplier,
        arrive_date: row.arrive_date,
        warehouse_code: row.warehouse_code,
        version: row.version,
        created_at: row.created_at,
        updated_at: row.updated_at,
        items,
    })
}
