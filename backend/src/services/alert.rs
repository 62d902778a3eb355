//! Alert recalculation over the whole stock table

use std::collections::HashSet;

use chrono::Utc;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use shared::{evaluate, AlertThresholds, StockSnapshot};

use crate::error::AppResult;
use crate::services::notification;

#[derive(Debug, FromRow)]
struct SnapshotRow {
    material_id: Uuid,
    material_code: String,
    batch_no: String,
    exp_date: Option<chrono::NaiveDate>,
    qty_on_hand: rust_decimal::Decimal,
}

/// Re-scan stock against `thresholds` and raise whatever is not already unread.
///
/// Runs on the caller's transaction so the alerts commit together with the stock change that
/// caused them. Returns how many notifications were written.
pub async fn recalculate(conn: &mut PgConnection, thresholds: &AlertThresholds) -> AppResult<usize> {
    let rows = sqlx::query_as::<_, SnapshotRow>(
        r#"
        SELECT s.material_id, m.code AS material_code, s.batch_no, s.exp_date, s.qty_on_hand
        FROM stock_rows s
        JOIN materials m ON m.id = s.material_id
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    let snapshot: Vec<StockSnapshot> = rows
        .into_iter()
        .map(|r| StockSnapshot {
            material_id: r.material_id,
            material_code: r.material_code,
            batch_no: r.batch_no,
            exp_date: r.exp_date,
            qty_on_hand: r.qty_on_hand,
        })
        .collect();

    let shipped = if thresholds.slow_moving_enabled() {
        recently_shipped(conn, thresholds.slow_days).await?
    } else {
        HashSet::new()
    };

    let today = Utc::now().date_naive();
    let mut raised = 0;
    for draft in evaluate(&snapshot, &shipped, thresholds, today) {
        if notification::raise(conn, &draft).await? {
            raised += 1;
        }
    }

    if raised > 0 {
        tracing::debug!(raised, "Raised stock alerts");
    }
    Ok(raised)
}

/// Materials on an outbound line of a live order created within the window
async fn recently_shipped(conn: &mut PgConnection, days: i64) -> AppResult<HashSet<Uuid>> {
    let ids: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT oi.material_id
        FROM outbound_items oi
        JOIN outbound_orders o ON o.id = oi.order_id
        WHERE o.status <> 'CANCELLED'
          AND o.created_at >= NOW() - ($1::bigint * INTERVAL '1 day')
        "#,
    )
    .bind(days)
    .fetch_all(&mut *conn)
    .await?;

    Ok(ids.into_iter().map(|(id,)| id).collect())
}
