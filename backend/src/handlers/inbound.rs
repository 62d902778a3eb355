//! Inbound order HTTP handlers

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::error::AppResult;
use crate::handlers::{expected_version, PostInput};
use crate::services::inbound::{CreateInboundInput, InboundOrder, ReplaceInboundInput};
use crate::services::InboundService;
use crate::AppState;

fn service(state: &AppState) -> InboundService {
    InboundService::new(state.db.clone(), state.config.clone())
}

pub async fn list_inbound(State(state): State<AppState>) -> AppResult<Json<Vec<InboundOrder>>> {
    let orders = service(&state).list().await?;
    Ok(Json(orders))
}

pub async fn get_inbound(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> AppResult<Json<InboundOrder>> {
    let order = service(&state).get(&code).await?;
    Ok(Json(order))
}

/// Create a draft inbound order
pub async fn create_inbound(
    State(state): State<AppState>,
    Json(input): Json<CreateInboundInput>,
) -> AppResult<(StatusCode, Json<InboundOrder>)> {
    let order = service(&state).create_draft(input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Create and post an inbound order in one step
pub async fn create_inbound_immediate(
    State(state): State<AppState>,
    Json(input): Json<CreateInboundInput>,
) -> AppResult<(StatusCode, Json<InboundOrder>)> {
    let order = service(&state).create_immediate(input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn replace_inbound(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(input): Json<ReplaceInboundInput>,
) -> AppResult<Json<InboundOrder>> {
    let order = service(&state).replace_draft(&code, input).await?;
    Ok(Json(order))
}

pub async fn approve_inbound(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<InboundOrder>> {
    let version = expected_version(&headers)?;
    let order = service(&state).approve(&code, version).await?;
    Ok(Json(order))
}

/// Post an approved inbound order into stock
pub async fn putaway_inbound(
    State(state): State<AppState>,
    Path(code): Path<String>,
    body: Option<Json<PostInput>>,
) -> AppResult<Json<InboundOrder>> {
    let input = body.map(|Json(b)| b).unwrap_or_default();
    let order = service(&state)
        .putaway(&code, input.warehouse_code.as_deref())
        .await?;
    Ok(Json(order))
}

pub async fn cancel_inbound(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> AppResult<Json<InboundOrder>> {
    let order = service(&state).cancel(&code).await?;
    Ok(Json(order))
}
