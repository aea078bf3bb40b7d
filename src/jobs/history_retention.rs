//! History Retention Job
//!
//! Drops intraday history and daily stats older than the retention window
//! from the in-memory price store. Runs hourly by default.

use chrono::{Duration, NaiveDate};
use tokio::time::interval;
use tracing::{debug, info};

use crate::models::quote::now_millis;
use crate::AppState;

/// First day kept when today is `today`
pub fn retention_cutoff(today: NaiveDate, retention_days: i64) -> NaiveDate {
    today - Duration::days(retention_days.max(1) - 1)
}

/// Purge once; returns the number of days dropped
pub fn purge_expired(state: &AppState) -> usize {
    let store_config = &state.config.store;
    let today = store_config.market_date(now_millis());
    let cutoff = retention_cutoff(today, store_config.retention_days);
    state.store.purge_before(cutoff)
}

pub async fn start_history_retention_job(state: AppState) {
    tokio::spawn(async move {
        let mut ticker = interval(state.config.scheduler.retention_interval);
        info!(
            retention_days = state.config.store.retention_days,
            "History retention job started"
        );

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, stopping history retention job");
                    break;
                }
                _ = ticker.tick() => {
                    let dropped = purge_expired(&state);
                    if dropped > 0 {
                        info!(days = dropped, "Purged expired price history");
                    } else {
                        debug!("No expired price history to purge");
                    }
                }
            }
        }
    });
}
