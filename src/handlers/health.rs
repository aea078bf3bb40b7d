use axum::{extract::State, Json};
use serde::Serialize;

use crate::models::alert::{AlertCooldownState, AlertKind, AlertPhase, ChannelKind};
use crate::models::quote::now_millis;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPhases {
    pub domestic_window: AlertPhase,
    pub international_window: AlertPhase,
    pub analysis: AlertPhase,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: i64,
    /// Age of the latest stored quote; `None` when nothing is cached
    pub cache_age_ms: Option<u64>,
    pub cache_fresh: bool,
    pub acquisition_in_flight: bool,
    pub retained_days: Vec<chrono::NaiveDate>,
    pub alert_cooldown: AlertCooldownState,
    pub alert_phases: AlertPhases,
    pub retry_queue_len: usize,
    pub configured_channels: Vec<ChannelKind>,
    pub database: bool,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let latest = state.store.read_latest().await;
    let now = now_millis();
    let engine = &state.alert_engine;

    Json(HealthResponse {
        status: "ok",
        timestamp: now,
        cache_age_ms: latest.age().map(|a| a.as_millis() as u64),
        cache_fresh: matches!(latest, crate::services::price_store::LatestRead::Fresh { .. }),
        acquisition_in_flight: state.coordinator.is_in_flight(),
        retained_days: state.store.retained_dates(),
        alert_cooldown: engine.cooldown_state(),
        alert_phases: AlertPhases {
            domestic_window: engine.phase(AlertKind::DomesticWindow, now),
            international_window: engine.phase(AlertKind::InternationalWindow, now),
            analysis: engine.phase(AlertKind::Analysis, now),
        },
        retry_queue_len: state.dispatcher.retry_queue_len(),
        configured_channels: state.dispatcher.configured_channels(),
        database: state.db.is_some(),
    })
}
