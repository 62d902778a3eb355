//! Read-only lookups of materials, warehouses and locations by code

use std::collections::HashMap;

use serde::Serialize;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub uom: String,
    pub is_batch: bool,
    pub shelf_life_days: Option<i32>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Warehouse {
    pub id: Uuid,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: Uuid,
    pub warehouse_id: Uuid,
    pub code: String,
}

pub async fn material_by_code(conn: &mut PgConnection, code: &str) -> AppResult<Material> {
    sqlx::query_as::<_, Material>(
        "SELECT id, code, name, uom, is_batch, shelf_life_days, enabled FROM materials WHERE code = $1",
    )
    .bind(code)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::MaterialNotFound(code.to_string()))
}

/// Resolve every code, failing on the first unknown one in input order.
pub async fn materials_by_codes(
    conn: &mut PgConnection,
    codes: &[&str],
) -> AppResult<HashMap<String, Material>> {
    let wanted: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
    let found = sqlx::query_as::<_, Material>(
        "SELECT id, code, name, uom, is_batch, shelf_life_days, enabled FROM materials WHERE code = ANY($1)",
    )
    .bind(&wanted)
    .fetch_all(&mut *conn)
    .await?;

    let by_code: HashMap<String, Material> =
        found.into_iter().map(|m| (m.code.clone(), m)).collect();

    if let Some(missing) = codes.iter().find(|c| !by_code.contains_key(**c)) {
        return Err(AppError::MaterialNotFound(missing.to_string()));
    }

    Ok(by_code)
}

pub async fn warehouse_by_code(conn: &mut PgConnection, code: &str) -> AppResult<Warehouse> {
    sqlx::query_as::<_, Warehouse>("SELECT id, code, name FROM warehouses WHERE code = $1")
        .bind(code)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::WarehouseNotFound(code.to_string()))
}

/// A location only counts when it belongs to the given warehouse.
pub async fn location_in_warehouse(
    conn: &mut PgConnection,
    warehouse_id: Uuid,
    code: &str,
) -> AppResult<Option<Location>> {
    let location = sqlx::query_as::<_, Location>(
        "SELECT id, warehouse_id, code FROM locations WHERE warehouse_id = $1 AND code = $2",
    )
    .bind(warehouse_id)
    .bind(code)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(location)
}

/// Choose the warehouse code a posting applies to: request, then order, then the default.
pub fn posting_warehouse_code<'a>(
    requested: Option<&'a str>,
    stored: Option<&'a str>,
    default: &'a str,
) -> &'a str {
    [requested, stored]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|code| !code.is_empty())
        .unwrap_or(default)
}

pub async fn resolve_warehouse(
    conn: &mut PgConnection,
    requested: Option<&str>,
    stored: Option<&str>,
    default: &str,
) -> AppResult<Warehouse> {
    let code = posting_warehouse_code(requested, stored, default);
    if code.is_empty() {
        return Err(AppError::WarehouseNotFound(String::new()));
    }
    warehouse_by_code(conn, code).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_code_wins() {
        assert_eq!(posting_warehouse_code(Some("WH2"), Some("WH1"), "MAIN"), "WH2");
    }

    #[test]
    fn test_order_code_before_default() {
        assert_eq!(posting_warehouse_code(None, Some("WH1"), "MAIN"), "WH1");
        assert_eq!(posting_warehouse_code(Some("  "), Some("WH1"), "MAIN"), "WH1");
    }

    #[test]
    fn test_default_when_nothing_given() {
        assert_eq!(posting_warehouse_code(None, None, "MAIN"), "MAIN");
        assert_eq!(posting_warehouse_code(Some(""), Some(""), "MAIN"), "MAIN");
    }
}
