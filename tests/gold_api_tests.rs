mod common;

use axum::http::StatusCode;
use chrono::{Duration as ChronoDuration, NaiveDate};
use serde_json::json;
use std::time::Duration;

use gold_price_backend::jobs::{gold_price_sync, history_retention};
use gold_price_backend::models::history::HistoryEntry;
use gold_price_backend::models::quote::{now_millis, CombinedQuote, PriceSnapshot, TROY_OUNCE_GRAMS};

use crate::common::{
    build_test_app, build_test_app_with, get_json, post_json, test_config, MockQuoteProvider,
    DOMESTIC_PRICE, FX_RATE, INTERNATIONAL_PRICE,
};

#[tokio::test]
async fn test_health_reports_state_summary() {
    let app = build_test_app();

    let (status, json) = get_json(app.router(), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["cacheAgeMs"].is_null());
    assert_eq!(json["retryQueueLen"], 0);
    assert_eq!(json["configuredChannels"].as_array().unwrap().len(), 3);
    assert_eq!(json["alertPhases"]["domesticWindow"], "idle");
    assert_eq!(json["alertCooldown"]["dailyAlertCount"], 0);
}

#[tokio::test]
async fn test_price_acquires_then_serves_from_cache() {
    let app = build_test_app();

    let (status, first) = get_json(app.router(), "/api/gold/price").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], true);
    assert_eq!(first["cached"], false);
    assert_eq!(first["domestic"]["price"], DOMESTIC_PRICE);
    assert_eq!(first["international"]["price"], INTERNATIONAL_PRICE);
    assert_eq!(first["domesticProvenance"], "live");
    assert_eq!(first["exchangeRate"], FX_RATE);

    let (status, second) = get_json(app.router(), "/api/gold/price").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["cached"], true);
    assert_eq!(second["stale"], false);
    assert_eq!(app.domestic.calls(), 1);

    let (_, refreshed) = get_json(app.router(), "/api/gold/price?refresh=true").await;
    assert_eq!(refreshed["cached"], false);
    assert_eq!(app.domestic.calls(), 2);
}

#[tokio::test]
async fn test_price_derives_missing_domestic_from_international() {
    let app = build_test_app_with(
        test_config(),
        MockQuoteProvider::failing(),
        MockQuoteProvider::new(INTERNATIONAL_PRICE),
    );

    let (status, json) = get_json(app.router(), "/api/gold/price").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["domesticProvenance"], "calculated");
    assert_eq!(json["internationalProvenance"], "live");
    let expected = INTERNATIONAL_PRICE * FX_RATE / TROY_OUNCE_GRAMS;
    let domestic = json["domestic"]["price"].as_f64().unwrap();
    assert!((domestic - expected).abs() < 1e-6);
    assert!(json["domestic"]["source"].as_str().unwrap().starts_with("Calculated-"));
}

#[tokio::test]
async fn test_price_unavailable_without_any_data() {
    let app = build_test_app_with(
        test_config(),
        MockQuoteProvider::failing(),
        MockQuoteProvider::failing(),
    );

    let (status, json) = get_json(app.router(), "/api/gold/price").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json["error"].as_str().unwrap().contains("unavailable"));
}

#[tokio::test]
async fn test_price_serves_stale_quote_when_acquisition_fails() {
    let mut config = test_config();
    config.store.freshness = Duration::ZERO;
    let app = build_test_app_with(config, MockQuoteProvider::failing(), MockQuoteProvider::failing());

    let ts = now_millis();
    let quote = CombinedQuote::new(
        ts,
        FX_RATE,
        "FixedFx",
        Some(PriceSnapshot::from_parts(675.0, 0.0, 0.0, 0.0, 0.0, "Sina-gds_AUTD", ts)),
        Some(PriceSnapshot::from_parts(2940.0, 0.0, 0.0, 0.0, 0.0, "Sina-hf_XAU", ts)),
    );
    app.state.store.write_latest(&quote).await;

    let (status, json) = get_json(app.router(), "/api/gold/price").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["stale"], true);
    assert_eq!(json["cached"], true);
    assert_eq!(json["domestic"]["price"], 675.0);
}

#[tokio::test]
async fn test_price_with_analysis_embeds_both_markets() {
    let app = build_test_app();

    let (status, json) = get_json(app.router(), "/api/gold/price?analysis=true").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["analysis"]["domestic"]["currentPrice"], DOMESTIC_PRICE);
    assert!(json["analysis"]["international"]["signal"]["recommendation"].is_string());
}

#[tokio::test]
async fn test_price_for_date_validation() {
    let app = build_test_app();

    let (status, _) = get_json(app.router(), "/api/gold/price?date=16-10-2026").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = get_json(app.router(), "/api/gold/price?date=2020-01-01").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("2020-01-01"));
}

#[tokio::test]
async fn test_price_for_retained_date_returns_close() {
    let app = build_test_app();
    let (status, _) = get_json(app.router(), "/api/gold/price").await;
    assert_eq!(status, StatusCode::OK);

    let today = app.state.config.store.market_date(now_millis());
    let uri = format!("/api/gold/price?date={}", today.format("%Y-%m-%d"));
    let (status, json) = get_json(app.router(), &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["source"], "history");
    assert_eq!(json["domesticClose"], DOMESTIC_PRICE);
    assert_eq!(json["internationalClose"], INTERNATIONAL_PRICE);
}

#[tokio::test]
async fn test_history_rejects_unknown_range() {
    let app = build_test_app();

    let (status, json) = get_json(app.router(), "/api/gold/history?range=2y").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("2y"));
}

#[tokio::test]
async fn test_history_without_data_is_empty() {
    let app = build_test_app();

    let (status, json) = get_json(app.router(), "/api/gold/history").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["range"], "1m");
    assert!(json["points"].as_array().unwrap().is_empty());
    assert_eq!(json["approximated"], false);
}

#[tokio::test]
async fn test_history_marks_retained_day_authentic() {
    let app = build_test_app();
    let (status, _) = get_json(app.router(), "/api/gold/price").await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = get_json(app.router(), "/api/gold/history?range=3m").await;

    assert_eq!(status, StatusCode::OK);
    let points = json["points"].as_array().unwrap();
    assert_eq!(points.len(), 90);
    assert_eq!(json["authenticDays"], 1);
    assert_eq!(json["approximatedDays"], 89);
    assert_eq!(json["approximated"], true);

    let last = points.last().unwrap();
    assert_eq!(last["authentic"], true);
    assert_eq!(last["domesticPrice"], DOMESTIC_PRICE);
    assert_eq!(points[0]["authentic"], false);
}

#[tokio::test]
async fn test_analysis_rejects_unknown_action() {
    let app = build_test_app();

    let (status, _) = get_json(app.router(), "/api/gold/analysis?action=predict").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analysis_signal_is_read_only() {
    let app = build_test_app();
    let (status, _) = get_json(app.router(), "/api/gold/price").await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = get_json(app.router(), "/api/gold/analysis?action=signal").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["action"], "signal");
    assert!(json.get("analysis").is_none());
    let signals = json["signals"].as_array().unwrap();
    assert_eq!(signals.len(), 2);
    assert!(signals[0]["recommendation"].is_string());
    assert!(json["alerts"].as_array().unwrap().is_empty());
    assert_eq!(app.state.alert_engine.cooldown_state().daily_alert_count, 0);
}

#[tokio::test]
async fn test_analysis_full_without_history() {
    let app = build_test_app();

    let (status, json) = get_json(app.router(), "/api/gold/analysis").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["action"], "full");
    assert!(json["analysis"]["domestic"].is_null());
    assert!(json["analysis"]["international"].is_null());
}

#[tokio::test]
async fn test_alert_test_dispatches_selected_channel_only() {
    let app = build_test_app();

    let (status, json) = post_json(
        app.router(),
        "/api/gold/alerts/test",
        json!({ "channel": "webhook" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    let results = json["report"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["channel"], "webhook");
    assert_eq!(results[0]["status"], "sent");
    assert_eq!(app.webhook.sent(), 1);
    assert_eq!(app.email.sent(), 0);
    assert_eq!(app.push.sent(), 0);

    let cooldown = app.state.alert_engine.cooldown_state();
    assert_eq!(cooldown.daily_alert_count, 0);
    assert!(cooldown.last_alert_timestamp.is_none());
}

#[tokio::test]
async fn test_alert_test_defaults_to_all_channels() {
    let app = build_test_app();

    let (status, json) = post_json(app.router(), "/api/gold/alerts/test", json!({})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["report"]["results"].as_array().unwrap().len(), 3);
    assert_eq!(app.email.sent() + app.webhook.sent() + app.push.sent(), 3);
}

#[tokio::test]
async fn test_sync_cycle_retries_whole_acquisition() {
    let app = build_test_app();
    app.domestic.fail_first(1);
    app.international.fail_first(1);

    let outcome = gold_price_sync::run_cycle(&app.state).await.unwrap();

    assert_eq!(outcome.attempts, 2);
    assert!(outcome.quote.success);
    assert_eq!(outcome.alerts_fired, 0);
    assert!(!outcome.close_persisted);
    assert!(app.state.store.read_latest().await.quote().is_some());
}

#[tokio::test]
async fn test_sync_cycle_gives_up_after_bounded_attempts() {
    let app = build_test_app_with(
        test_config(),
        MockQuoteProvider::failing(),
        MockQuoteProvider::failing(),
    );

    let result = gold_price_sync::run_cycle(&app.state).await;

    assert!(result.is_err());
    assert_eq!(app.domestic.calls(), 3);
}

#[tokio::test]
async fn test_retention_purges_days_outside_window() {
    let app = build_test_app();
    let today = app.state.config.store.market_date(now_millis());
    let old: NaiveDate = today - ChronoDuration::days(10);

    let entry = HistoryEntry {
        timestamp: 1,
        domestic_price: Some(670.0),
        international_price: None,
        domestic_change_pct: None,
        international_change_pct: None,
    };
    assert!(app.state.store.append_history(old, entry.clone()));
    assert!(app.state.store.append_history(today, HistoryEntry { timestamp: 2, ..entry }));

    let dropped = history_retention::purge_expired(&app.state);

    assert_eq!(dropped, 1);
    assert_eq!(app.state.store.retained_dates(), vec![today]);
}
