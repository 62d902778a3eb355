//! Alert threshold handlers

use axum::{extract::State, Json};

use shared::AlertThresholds;

use crate::error::AppResult;
use crate::services::settings::UpdateThresholdsInput;
use crate::services::SettingsService;
use crate::AppState;

fn service(state: &AppState) -> SettingsService {
    SettingsService::new(state.db.clone(), AlertThresholds::from(&state.config.alerts))
}

pub async fn get_alert_settings(State(state): State<AppState>) -> AppResult<Json<AlertThresholds>> {
    let thresholds = service(&state).get().await?;
    Ok(Json(thresholds))
}

/// Replace the thresholds and re-evaluate alerts against current stock
pub async fn update_alert_settings(
    State(state): State<AppState>,
    Json(input): Json<UpdateThresholdsInput>,
) -> AppResult<Json<AlertThresholds>> {
    let thresholds = service(&state).update(input).await?;
    Ok(Json(thresholds))
}
