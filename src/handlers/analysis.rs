use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::models::analysis::{AnalysisQuery, FullAnalysis, SignalSummary};
use crate::models::response::ErrorResponse;
use crate::services::alert_engine::FiredAlert;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub action: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<FullAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signals: Option<Vec<SignalSummary>>,
    /// Alerts fired by `notify=true`; always empty otherwise
    pub alerts: Vec<FiredAlert>,
}

/// GET /api/gold/analysis
///
/// Read-only unless `notify=true`, which runs the alert engine against the
/// latest stored quote (subject to the usual cooldown and daily cap). A quote
/// the sync job already evaluated is not evaluated again.
pub async fn get_gold_analysis(
    State(state): State<AppState>,
    Query(query): Query<AnalysisQuery>,
) -> Result<Json<AnalysisResponse>, (StatusCode, Json<ErrorResponse>)> {
    let action = query.action.to_lowercase();
    if action != "full" && action != "signal" {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("Invalid action '{}'. Use full or signal", query.action),
            }),
        ));
    }

    let latest = state.store.read_latest().await;
    let quote = latest.quote().cloned();
    let analysis = state.analyzer.analyze(quote.as_ref());

    let alerts = match (&quote, query.notify) {
        (Some(quote), true) => {
            let fired = state.alert_engine.evaluate(quote).await;
            info!(fired = fired.len(), "Analysis request ran alert evaluation");
            fired
        }
        _ => Vec::new(),
    };

    let timestamp = analysis.timestamp;
    let (analysis, signals) = if action == "signal" {
        let summaries: Vec<SignalSummary> = [analysis.domestic.as_ref(), analysis.international.as_ref()]
            .into_iter()
            .flatten()
            .map(SignalSummary::from)
            .collect();
        (None, Some(summaries))
    } else {
        (Some(analysis), None)
    };

    Ok(Json(AnalysisResponse {
        action,
        timestamp,
        analysis,
        signals,
        alerts,
    }))
}
