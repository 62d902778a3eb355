//! Outbound order HTTP handlers

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::error::AppResult;
use crate::handlers::{expected_version, PostInput};
use crate::services::outbound::{CreateOutboundInput, OutboundOrder, PickResult, ReplaceOutboundInput};
use crate::services::OutboundService;
use crate::AppState;

fn service(state: &AppState) -> OutboundService {
    OutboundService::new(state.db.clone(), state.config.clone())
}

pub async fn list_outbound(State(state): State<AppState>) -> AppResult<Json<Vec<OutboundOrder>>> {
    let orders = service(&state).list().await?;
    Ok(Json(orders))
}

pub async fn get_outbound(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> AppResult<Json<OutboundOrder>> {
    let order = service(&state).get(&code).await?;
    Ok(Json(order))
}

pub async fn create_outbound(
    State(state): State<AppState>,
    Json(input): Json<CreateOutboundInput>,
) -> AppResult<(StatusCode, Json<OutboundOrder>)> {
    let order = service(&state).create_draft(input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Create an outbound order and pick it straight away
pub async fn create_outbound_immediate(
    State(state): State<AppState>,
    Json(input): Json<CreateOutboundInput>,
) -> AppResult<(StatusCode, Json<PickResult>)> {
    let result = service(&state).create_immediate(input).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

pub async fn replace_outbound(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(input): Json<ReplaceOutboundInput>,
) -> AppResult<Json<OutboundOrder>> {
    let order = service(&state).replace_draft(&code, input).await?;
    Ok(Json(order))
}

pub async fn approve_outbound(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<OutboundOrder>> {
    let version = expected_version(&headers)?;
    let order = service(&state).approve(&code, version).await?;
    Ok(Json(order))
}

/// Allocate and debit stock for an approved outbound order
pub async fn pick_outbound(
    State(state): State<AppState>,
    Path(code): Path<String>,
    body: Option<Json<PostInput>>,
) -> AppResult<Json<PickResult>> {
    let input = body.map(|Json(b)| b).unwrap_or_default();
    let result = service(&state)
        .pick(&code, input.warehouse_code.as_deref())
        .await?;
    Ok(Json(result))
}

pub async fn cancel_outbound(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> AppResult<Json<OutboundOrder>> {
    let order = service(&state).cancel(&code).await?;
    Ok(Json(order))
}
