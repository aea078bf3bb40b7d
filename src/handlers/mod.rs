use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub mod analysis;
pub mod health;
pub mod history;
pub mod quote;
pub mod stream;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/gold/price", get(quote::get_gold_price))
        .route("/api/gold/stream", get(stream::gold_price_websocket))
        .route("/api/gold/history", get(history::get_gold_history))
        .route("/api/gold/analysis", get(analysis::get_gold_analysis))
        .route("/api/gold/alerts/test", post(alert_test::send_test_alert))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
