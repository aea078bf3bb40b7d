//! Gold Price Sync Job
//!
//! Periodically acquires a fresh quote for both markets, runs the alert
//! engine against it and, when a database is configured, upserts the day's
//! aggregate into gold_daily_closes.
//! Supports graceful shutdown via SIGTERM/SIGINT signals.

use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::error::AcquisitionError;
use crate::models::quote::CombinedQuote;
use crate::services::daily_closes::upsert_daily_close;
use crate::AppState;

/// Result of one successful cycle
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub quote: CombinedQuote,
    pub attempts: u32,
    pub alerts_fired: usize,
    pub close_persisted: bool,
}

/// Acquire with bounded whole-cycle retries, then alert and persist
pub async fn run_cycle(state: &AppState) -> Result<CycleOutcome, AcquisitionError> {
    let scheduler = &state.config.scheduler;
    let attempts = scheduler.cycle_attempts.max(1);

    let mut attempt = 0;
    let quote = loop {
        attempt += 1;
        match state.coordinator.acquire().await {
            Ok(quote) => break quote,
            Err(e) if attempt < attempts => {
                warn!(attempt = attempt, error = %e, "Gold price acquisition failed, retrying");
                sleep(scheduler.retry_delay).await;
            }
            Err(e) => return Err(e),
        }
    };

    let fired = state.alert_engine.evaluate(&quote).await;

    let mut close_persisted = false;
    if let Some(db) = &state.db {
        let date = state.config.store.market_date(quote.timestamp);
        if let Some(stats) = state.store.read_daily_stats(date) {
            match upsert_daily_close(db, &stats).await {
                Ok(()) => close_persisted = true,
                Err(e) => error!(date = %date, error = %e, "Failed to persist gold daily close"),
            }
        }
    }

    Ok(CycleOutcome {
        quote,
        attempts: attempt,
        alerts_fired: fired.len(),
        close_persisted,
    })
}

/// Start the gold price sync job
///
/// Spawns a background task that runs [`run_cycle`] every
/// `SYNC_INTERVAL_SECS` (default: 60) until a shutdown signal arrives.
pub async fn start_gold_price_sync_job(state: AppState) {
    tokio::spawn(async move {
        let sync_interval = state.config.scheduler.sync_interval;
        info!(
            interval_secs = sync_interval.as_secs(),
            attempts = state.config.scheduler.cycle_attempts,
            persist = state.db.is_some(),
            "Gold price sync job started"
        );

        let mut ticker = interval(sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, stopping gold price sync job gracefully");
                    break;
                }
                _ = ticker.tick() => {
                    match run_cycle(&state).await {
                        Ok(outcome) => {
                            info!(
                                domestic = ?outcome.quote.domestic.as_ref().map(|s| s.price),
                                international = ?outcome.quote.international.as_ref().map(|s| s.price),
                                fx = outcome.quote.exchange_rate,
                                attempts = outcome.attempts,
                                alerts = outcome.alerts_fired,
                                persisted = outcome.close_persisted,
                                "Gold price sync completed"
                            );
                        }
                        Err(e) => {
                            error!(error = %e, "Gold price sync failed after all retries");
                            // Next interval will retry
                        }
                    }
                }
            }
        }

        info!("Gold price sync job stopped");
    });
}
