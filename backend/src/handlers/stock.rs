//! Stock ledger HTTP handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use shared::Discrepancy;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::ledger::MovementLog;
use crate::services::stock::{
    AdjustInput, Adjustment, MovementQuery, StockQuery, StockView, TransferInput, TransferResult,
};
use crate::services::StockService;
use crate::AppState;

fn service(state: &AppState) -> StockService {
    StockService::new(state.db.clone(), state.config.clone())
}

pub async fn list_stock(
    State(state): State<AppState>,
    Query(query): Query<StockQuery>,
) -> AppResult<Json<Vec<StockView>>> {
    let rows = service(&state).list_stock(query).await?;
    Ok(Json(rows))
}

pub async fn list_movements(
    State(state): State<AppState>,
    Query(query): Query<MovementQuery>,
) -> AppResult<Json<Vec<MovementLog>>> {
    let logs = service(&state).list_movements(query).await?;
    Ok(Json(logs))
}

/// Stock keys whose on-hand total disagrees with their movement history
pub async fn reconcile_stock(State(state): State<AppState>) -> AppResult<Json<Vec<Discrepancy>>> {
    let discrepancies = service(&state).reconciliation().await?;
    Ok(Json(discrepancies))
}

/// Set a batch to an absolute quantity, recording who asked for it
pub async fn adjust_stock(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<AdjustInput>,
) -> AppResult<(StatusCode, Json<Adjustment>)> {
    let adjustment = service(&state).adjust(input, Some(user.subject)).await?;
    Ok((StatusCode::CREATED, Json(adjustment)))
}

pub async fn transfer_stock(
    State(state): State<AppState>,
    Json(input): Json<TransferInput>,
) -> AppResult<(StatusCode, Json<TransferResult>)> {
    let result = service(&state).transfer(input).await?;
    Ok((StatusCode::CREATED, Json(result)))
}
