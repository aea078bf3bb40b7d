//! Gold price read endpoint
//!
//! GET /api/gold/price serves the latest combined quote. A fresh cached
//! quote is returned as-is; otherwise a new acquisition runs, and if that
//! fails the last stored quote is served as stale while its TTL lasts.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, error, info, warn};

use crate::error::AcquisitionError;
use crate::models::response::{DatedQuoteResponse, ErrorResponse, PriceQuery, QuoteResponse};
use crate::services::daily_closes::find_daily_close;
use crate::services::price_store::LatestRead;
use crate::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Fresh store hit, new acquisition, or stale fallback, in that order
pub async fn current_quote(state: &AppState, refresh: bool) -> Result<QuoteResponse, AcquisitionError> {
    if !refresh {
        if let LatestRead::Fresh { quote, age } = state.store.read_latest().await {
            debug!(age_ms = age.as_millis() as u64, "Serving gold quote from cache");
            return Ok(QuoteResponse::new(quote, true, false, age.as_millis() as u64));
        }
    }

    match state.coordinator.acquire().await {
        Ok(quote) => Ok(QuoteResponse::new(quote, false, false, 0)),
        Err(e) => match state.store.read_latest().await {
            LatestRead::Fresh { quote, age } | LatestRead::Stale { quote, age } => {
                warn!(error = %e, age_ms = age.as_millis() as u64, "Acquisition failed, serving stored quote");
                let stale = age >= state.config.store.freshness;
                Ok(QuoteResponse::new(quote, true, stale, age.as_millis() as u64))
            }
            LatestRead::Miss => Err(e),
        },
    }
}

/// GET /api/gold/price
///
/// # Query Parameters
/// - `refresh`: bypass cache freshness
/// - `analysis`: embed indicators and signals for both markets
/// - `date`: YYYY-MM-DD, closing snapshot of a prior day
///
/// # Response
/// - 200: quote (or dated close when `date` is given)
/// - 400: malformed date
/// - 404: no data for the requested date
/// - 503: no fresh or stale-within-TTL quote available
pub async fn get_gold_price(
    State(state): State<AppState>,
    Query(query): Query<PriceQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(date) = query.date.as_deref() {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
            api_error(
                StatusCode::BAD_REQUEST,
                format!("Invalid date '{}'. Expected YYYY-MM-DD", date),
            )
        })?;
        let dated = dated_close(&state, date).await?;
        return to_json(&dated);
    }

    let mut response = current_quote(&state, query.refresh).await.map_err(|e| {
        error!(error = %e, "No gold quote available");
        api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
    })?;

    if query.analysis {
        response.analysis = Some(state.analyzer.analyze(Some(&response.quote)));
    }

    to_json(&response)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Json<serde_json::Value>, ApiError> {
    serde_json::to_value(value)
        .map(Json)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Retained intraday data first, then the long-term aggregate
async fn dated_close(state: &AppState, date: NaiveDate) -> Result<DatedQuoteResponse, ApiError> {
    let history = state.store.read_history(date);
    let stats = state.store.read_daily_stats(date);

    if !history.is_empty() || stats.is_some() {
        let last = history.last();
        return Ok(DatedQuoteResponse {
            date,
            domestic_close: stats
                .as_ref()
                .and_then(|s| s.domestic.as_ref().map(|m| m.close))
                .or_else(|| last.and_then(|e| e.domestic_price)),
            international_close: stats
                .as_ref()
                .and_then(|s| s.international.as_ref().map(|m| m.close))
                .or_else(|| last.and_then(|e| e.international_price)),
            close_timestamp: last.map(|e| e.timestamp).or(stats.as_ref().map(|s| s.last_update)),
            stats,
            source: "history".to_string(),
        });
    }

    if let Some(db) = &state.db {
        let row = find_daily_close(db, date).await.map_err(|e| {
            error!(date = %date, error = %e, "Database error loading gold daily close");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
        })?;

        if let Some(row) = row {
            info!(date = %date, "Serving gold close from daily aggregate");
            return Ok(DatedQuoteResponse {
                date,
                domestic_close: row.domestic_close.and_then(|d| d.to_f64()),
                international_close: row.international_close.and_then(|d| d.to_f64()),
                close_timestamp: Some(row.last_update.timestamp_millis()),
                stats: None,
                source: "daily_closes".to_string(),
            });
        }
    }

    Err(api_error(
        StatusCode::NOT_FOUND,
        format!("No gold price data for {}", date),
    ))
}
