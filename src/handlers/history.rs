//! Gold price history handler
//!
//! GET /api/gold/history returns one point per calendar day. Authentic
//! points come from the daily aggregate table and the store's retained
//! days; everything else is interpolated and flagged.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::Duration;
use tracing::{info, warn};

use crate::models::history::{HistoryQuery, HistoryRange, HistoryResponse};
use crate::models::quote::now_millis;
use crate::models::response::ErrorResponse;
use crate::services::daily_closes::{build_history, closes_between, DayClose};
use crate::AppState;

/// GET /api/gold/history
///
/// # Query Parameters
/// - `range`: 1m, 3m, 6m, 1y (default: 1m)
///
/// # Response
/// - 200: day-bucketed series
/// - 400: invalid range
pub async fn get_gold_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, (StatusCode, Json<ErrorResponse>)> {
    let range = HistoryRange::from_str(&query.range).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("Invalid range '{}'. Use 1m, 3m, 6m or 1y", query.range),
            }),
        )
    })?;

    let end = state.config.store.market_date(now_millis());
    let start = end - Duration::days(range.days() - 1);

    let mut closes: Vec<DayClose> = Vec::new();
    if let Some(db) = &state.db {
        match closes_between(db, start, end).await {
            Ok(rows) => closes.extend(rows),
            Err(e) => warn!(error = %e, "Failed to load gold daily closes, using retained days only"),
        }
    }

    // Retained days go last so they win over the persisted aggregate
    closes.extend(
        state
            .store
            .retained_dates()
            .into_iter()
            .filter(|d| *d >= start && *d <= end)
            .filter_map(|d| state.store.read_daily_stats(d))
            .map(|stats| DayClose::from_stats(&stats)),
    );

    let history = build_history(range, end, &closes);
    info!(
        range = range.as_str(),
        authentic = history.authentic_days,
        approximated = history.approximated_days,
        "Built gold price history"
    );

    Ok(Json(history))
}
