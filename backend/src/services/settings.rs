//! Alert threshold store

use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{FromRow, PgConnection, PgPool};

use shared::{validate_thresholds, AlertThresholds};

use crate::error::{AppError, AppResult};
use crate::services::alert;

#[derive(Clone)]
pub struct SettingsService {
    db: PgPool,
    fallback: AlertThresholds,
}

#[derive(Debug, FromRow)]
struct AlertSettingsRow {
    global_min_qty: Decimal,
    expiry_days: i64,
    slow_days: i64,
}

/// Input for replacing the alert thresholds
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateThresholdsInput {
    pub global_min_qty: Decimal,
    pub expiry_days: i64,
    pub slow_days: i64,
}

/// Read the stored thresholds, or the configured fallback when none are stored.
pub async fn load_thresholds(
    conn: &mut PgConnection,
    fallback: &AlertThresholds,
) -> AppResult<AlertThresholds> {
    let row = sqlx::query_as::<_, AlertSettingsRow>(
        "SELECT global_min_qty, expiry_days, slow_days FROM alert_settings WHERE id = 1",
    )
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row
        .map(|r| AlertThresholds {
            global_min_qty: r.global_min_qty,
            expiry_days: r.expiry_days,
            slow_days: r.slow_days,
        })
        .unwrap_or_else(|| fallback.clone()))
}

impl SettingsService {
    pub fn new(db: PgPool, fallback: AlertThresholds) -> Self {
        Self { db, fallback }
    }

    pub async fn get(&self) -> AppResult<AlertThresholds> {
        let mut conn = self.db.acquire().await?;
        load_thresholds(&mut conn, &self.fallback).await
    }

    /// Store new thresholds and re-run the alert sweep with them.
    pub async fn update(&self, input: UpdateThresholdsInput) -> AppResult<AlertThresholds> {
        let thresholds = AlertThresholds {
            global_min_qty: input.global_min_qty,
            expiry_days: input.expiry_days,
            slow_days: input.slow_days,
        };
        validate_thresholds(&thresholds).map_err(|msg| AppError::Validation {
            field: None,
            message: msg.to_string(),
        })?;

        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO alert_settings (id, global_min_qty, expiry_days, slow_days, updated_at)
            VALUES (1, $1, $2, $3, NOW())
            ON CONFLICT (id) DO UPDATE
            SET global_min_qty = EXCLUDED.global_min_qty,
                expiry_days = EXCLUDED.expiry_days,
                slow_days = EXCLUDED.slow_days,
                updated_at = NOW()
            "#,
        )
        .bind(thresholds.global_min_qty)
        .bind(thresholds.expiry_days)
        .bind(thresholds.slow_days)
        .execute(&mut *tx)
        .await?;

        let raised = alert::recalculate(&mut tx, &thresholds).await?;
        tx.commit().await?;

        tracing::info!(raised, "Alert thresholds updated");
        Ok(thresholds)
    }
}
