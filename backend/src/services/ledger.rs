//! Stock rows and the movement log
//!
//! Every helper here runs on the caller's transaction. Rows are always read `FOR UPDATE`
//! before they are changed, and every quantity change is paired with one movement entry by
//! the calling service before it commits.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use shared::{Candidate, MovementDraft};

use crate::error::AppResult;

/// A stock row as stored
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StockRow {
    pub id: Uuid,
    pub material_id: Uuid,
    pub warehouse_id: Uuid,
    pub location_id: Option<Uuid>,
    pub batch_no: String,
    pub mfg_date: Option<NaiveDate>,
    pub exp_date: Option<NaiveDate>,
    pub qty_on_hand: Decimal,
    pub qty_allocated: Decimal,
    pub qty_in_transit: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl StockRow {
    pub fn candidate(&self) -> Candidate {
        Candidate {
            row_id: self.id,
            material_id: self.material_id,
            warehouse_id: self.warehouse_id,
            location_id: self.location_id,
            batch_no: self.batch_no.clone(),
            mfg_date: self.mfg_date,
            exp_date: self.exp_date,
            qty_on_hand: self.qty_on_hand,
        }
    }
}

/// A movement log entry as stored
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MovementLog {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub warehouse_id: Uuid,
    pub material_id: Uuid,
    pub batch_no: String,
    pub qty_change: Decimal,
    pub source_type: String,
    pub source_code: Option<String>,
}

/// Where credited stock should land
#[derive(Debug, Clone)]
pub struct Destination {
    pub material_id: Uuid,
    pub warehouse_id: Uuid,
    pub batch_no: String,
    pub location_id: Option<Uuid>,
    pub mfg_date: Option<NaiveDate>,
    pub exp_date: Option<NaiveDate>,
    /// Give an existing location-less row the requested location instead of opening a new bin
    pub backfill_location: bool,
}

/// Lock every existing row of each `(material, warehouse)` pair.
///
/// Pairs are visited in ascending `(material_id, warehouse_id)` order and rows in id order.
/// Every posting path takes its row locks through here, so two transactions touching the same
/// pairs always queue in the same sequence.
pub async fn lock_keys(conn: &mut PgConnection, keys: &[(Uuid, Uuid)]) -> AppResult<Vec<StockRow>> {
    let mut keys = keys.to_vec();
    sort_lock_keys(&mut keys);

    let mut locked = Vec::new();
    for (material_id, warehouse_id) in keys {
        let rows = sqlx::query_as::<_, StockRow>(
            r#"
            SELECT id, material_id, warehouse_id, location_id, batch_no, mfg_date, exp_date,
                   qty_on_hand, qty_allocated, qty_in_transit, updated_at
            FROM stock_rows
            WHERE material_id = $1 AND warehouse_id = $2
            ORDER BY id ASC
            FOR UPDATE
            "#,
        )
        .bind(material_id)
        .bind(warehouse_id)
        .fetch_all(&mut *conn)
        .await?;

        locked.extend(rows);
    }

    Ok(locked)
}

/// Canonical lock order: ascending material, then warehouse, without repeats
pub fn sort_lock_keys(keys: &mut Vec<(Uuid, Uuid)>) {
    keys.sort();
    keys.dedup();
}

/// Lock every row of the given materials in one warehouse as allocation candidates.
///
/// The planner applies FEFO ordering itself; rows come back in lock order.
pub async fn lock_candidates(
    conn: &mut PgConnection,
    warehouse_id: Uuid,
    material_ids: &[Uuid],
) -> AppResult<Vec<Candidate>> {
    let keys: Vec<(Uuid, Uuid)> = material_ids.iter().map(|m| (*m, warehouse_id)).collect();
    let rows = lock_keys(conn, &keys).await?;
    Ok(rows.iter().map(StockRow::candidate).collect())
}

/// Find or create the row that receives a credit, locked for update.
///
/// Without a location, any existing row of the batch is reused, location-less first. With a
/// location, the exact bin is preferred; failing that a location-less row is back-filled when
/// allowed, and otherwise a new bin is opened.
pub async fn lock_destination(conn: &mut PgConnection, dest: &Destination) -> AppResult<StockRow> {
    let Some(location_id) = dest.location_id else {
        if let Some(row) = lock_any_in_batch(conn, dest).await? {
            return Ok(row);
        }
        return lock_or_create_bin(conn, dest, None).await;
    };

    if let Some(row) = lock_bin(conn, dest, Some(location_id)).await? {
        return Ok(row);
    }

    if dest.backfill_location {
        if let Some(row) = lock_bin(conn, dest, None).await? {
            let row = sqlx::query_as::<_, StockRow>(
                r#"
                UPDATE stock_rows
                SET location_id = $2, updated_at = NOW()
                WHERE id = $1 AND location_id IS NULL
                RETURNING id, material_id, warehouse_id, location_id, batch_no, mfg_date, exp_date,
                          qty_on_hand, qty_allocated, qty_in_transit, updated_at
                "#,
            )
            .bind(row.id)
            .bind(location_id)
            .fetch_one(&mut *conn)
            .await?;
            tracing::debug!(row_id = %row.id, location_id = %location_id, "Back-filled stock row location");
            return Ok(row);
        }
    }

    lock_or_create_bin(conn, dest, Some(location_id)).await
}

async fn lock_any_in_batch(conn: &mut PgConnection, dest: &Destination) -> AppResult<Option<StockRow>> {
    let row = sqlx::query_as::<_, StockRow>(
        r#"
        SELECT id, material_id, warehouse_id, location_id, batch_no, mfg_date, exp_date,
               qty_on_hand, qty_allocated, qty_in_transit, updated_at
        FROM stock_rows
        WHERE material_id = $1 AND warehouse_id = $2 AND batch_no = $3
        ORDER BY location_id ASC NULLS FIRST
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(dest.material_id)
    .bind(dest.warehouse_id)
    .bind(&dest.batch_no)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row)
}

async fn lock_bin(
    conn: &mut PgConnection,
    dest: &Destination,
    location_id: Option<Uuid>,
) -> AppResult<Option<StockRow>> {
    let row = sqlx::query_as::<_, StockRow>(
        r#"
        SELECT id, material_id, warehouse_id, location_id, batch_no, mfg_date, exp_date,
               qty_on_hand, qty_allocated, qty_in_transit, updated_at
        FROM stock_rows
        WHERE material_id = $1 AND warehouse_id = $2
          AND location_id IS NOT DISTINCT FROM $3 AND batch_no = $4
        FOR UPDATE
        "#,
    )
    .bind(dest.material_id)
    .bind(dest.warehouse_id)
    .bind(location_id)
    .bind(&dest.batch_no)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row)
}

async fn lock_or_create_bin(
    conn: &mut PgConnection,
    dest: &Destination,
    location_id: Option<Uuid>,
) -> AppResult<StockRow> {
    // A concurrent creator wins the insert; the select below then locks its row.
    sqlx::query(
        r#"
        INSERT INTO stock_rows (id, material_id, warehouse_id, location_id, batch_no, mfg_date, exp_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT ON CONSTRAINT uq_stock_bin DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(dest.material_id)
    .bind(dest.warehouse_id)
    .bind(location_id)
    .bind(&dest.batch_no)
    .bind(dest.mfg_date)
    .bind(dest.exp_date)
    .execute(&mut *conn)
    .await?;

    let row = lock_bin(conn, dest, location_id).await?;
    row.ok_or_else(|| {
        crate::error::AppError::Internal(format!(
            "stock row for batch '{}' vanished after insert",
            dest.batch_no
        ))
    })
}

/// Add to on-hand, filling in dates the row does not know yet.
pub async fn credit_row(
    conn: &mut PgConnection,
    row_id: Uuid,
    qty: Decimal,
    mfg_date: Option<NaiveDate>,
    exp_date: Option<NaiveDate>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE stock_rows
        SET qty_on_hand = qty_on_hand + $2,
            mfg_date = COALESCE(mfg_date, $3),
            exp_date = COALESCE(exp_date, $4),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(row_id)
    .bind(qty)
    .bind(mfg_date)
    .bind(exp_date)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn debit_row(conn: &mut PgConnection, row_id: Uuid, qty: Decimal) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE stock_rows
        SET qty_on_hand = qty_on_hand - $2, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(row_id)
    .bind(qty)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Overwrite on-hand with an absolute quantity
pub async fn set_row_qty(conn: &mut PgConnection, row_id: Uuid, qty: Decimal) -> AppResult<()> {
    sqlx::query("UPDATE stock_rows SET qty_on_hand = $2, updated_at = NOW() WHERE id = $1")
        .bind(row_id)
        .bind(qty)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Append one entry to the movement log
pub async fn append_movement(conn: &mut PgConnection, draft: &MovementDraft) -> AppResult<MovementLog> {
    let entry = sqlx::query_as::<_, MovementLog>(
        r#"
        INSERT INTO movement_logs (id, warehouse_id, material_id, batch_no, qty_change, source_type, source_code)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, created_at, warehouse_id, material_id, batch_no, qty_change, source_type, source_code
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(draft.warehouse_id)
    .bind(draft.material_id)
    .bind(&draft.batch_no)
    .bind(draft.qty_change)
    .bind(draft.source_type.as_str())
    .bind(&draft.source_code)
    .fetch_one(&mut *conn)
    .await?;

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposing_transfers_lock_in_same_order() {
        let material = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let mut a_to_b = vec![(material, a), (material, b)];
        let mut b_to_a = vec![(material, b), (material, a)];
        sort_lock_keys(&mut a_to_b);
        sort_lock_keys(&mut b_to_a);

        assert_eq!(a_to_b, b_to_a);
    }

    #[test]
    fn test_putaways_with_swapped_items_lock_in_same_order() {
        let warehouse = Uuid::new_v4();
        let (x, y) = (Uuid::new_v4(), Uuid::new_v4());

        let mut first = vec![(x, warehouse), (y, warehouse), (x, warehouse)];
        let mut second = vec![(y, warehouse), (x, warehouse)];
        sort_lock_keys(&mut first);
        sort_lock_keys(&mut second);

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
