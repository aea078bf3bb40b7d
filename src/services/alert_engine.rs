//! Sliding-window threshold alerts with a global cooldown and daily cap
//!
//! Each alert kind moves Idle -> Triggered -> CoolingDown -> Idle. The
//! cooldown timer and daily count are shared by every kind: one fire
//! silences all of them until the cooldown elapses.

use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{AlertConfig, StoreConfig};
use crate::models::alert::{
    AlertCooldownState, AlertDirection, AlertEvent, AlertKind, AlertPhase, AlertType,
    DispatchReport, Severity,
};
use crate::models::analysis::{MarketAnalysis, Recommendation, TradingSignal};
use crate::models::quote::{CombinedQuote, Market};
use crate::services::market_analysis::{observed_price, MarketAnalyzer};
use crate::services::notifier::NotificationDispatcher;

/// An alert that passed cooldown and daily cap checks and was dispatched
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiredAlert {
    pub event: AlertEvent,
    pub report: DispatchReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Suppression {
    Direction,
    Cooldown,
    DailyCap,
}

struct EngineState {
    cooldown: AlertCooldownState,
    phases: HashMap<AlertKind, AlertPhase>,
    last_evaluated: Option<i64>,
}

/// Window check for one market: fires when `max - min >= threshold`
///
/// Direction is down when the latest price is the window minimum, up when it
/// is the maximum, volatile otherwise. Returns `None` below two points.
pub fn detect_window(
    market: Market,
    window: &[f64],
    threshold: f64,
    timestamp: i64,
) -> Option<AlertEvent> {
    if window.len() < 2 {
        return None;
    }

    let current = *window.last()?;
    let max = window.iter().copied().fold(f64::MIN, f64::max);
    let min = window.iter().copied().fold(f64::MAX, f64::min);
    let range = max - min;

    if range < threshold {
        return None;
    }

    let direction = if current <= min {
        AlertDirection::Down
    } else if current >= max {
        AlertDirection::Up
    } else {
        AlertDirection::Volatile
    };

    Some(AlertEvent {
        alert_type: AlertType::Window,
        market,
        name: format!("{} price window alert", market.display_name()),
        current,
        max,
        min,
        range,
        direction,
        severity: Severity::for_range(range, threshold),
        timestamp,
    })
}

pub struct AlertEngine {
    config: AlertConfig,
    store_config: StoreConfig,
    analyzer: MarketAnalyzer,
    dispatcher: Arc<NotificationDispatcher>,
    state: Mutex<EngineState>,
}

impl AlertEngine {
    pub fn new(
        config: AlertConfig,
        store_config: StoreConfig,
        analyzer: MarketAnalyzer,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            config,
            store_config,
            analyzer,
            dispatcher,
            state: Mutex::new(EngineState {
                cooldown: AlertCooldownState {
                    last_alert_timestamp: None,
                    daily_alert_count: 0,
                    day: NaiveDate::MIN,
                },
                phases: HashMap::new(),
                last_evaluated: None,
            }),
        }
    }

    pub fn cooldown_state(&self) -> AlertCooldownState {
        self.state.lock().cooldown
    }

    /// Current phase of `kind` as of `now_ms`
    pub fn phase(&self, kind: AlertKind, now_ms: i64) -> AlertPhase {
        let state = self.state.lock();
        match state.phases.get(&kind).copied().unwrap_or(AlertPhase::Idle) {
            AlertPhase::CoolingDown if !self.in_cooldown(&state.cooldown, now_ms) => {
                AlertPhase::Idle
            }
            phase => phase,
        }
    }

    fn in_cooldown(&self, cooldown: &AlertCooldownState, now_ms: i64) -> bool {
        cooldown
            .last_alert_timestamp
            .is_some_and(|last| now_ms - last < self.config.cooldown.as_millis() as i64)
    }

    /// Evaluate the rolling window ending at `quote`; call after the quote has been written
    ///
    /// Each quote is evaluated at most once: a quote not newer than the last
    /// evaluated one is skipped.
    pub async fn evaluate(&self, quote: &CombinedQuote) -> Vec<FiredAlert> {
        let now = quote.timestamp;
        {
            let mut state = self.state.lock();
            if state.last_evaluated.is_some_and(|last| now <= last) {
                tracing::debug!(timestamp = now, "quote already evaluated, skipping alerts");
                return Vec::new();
            }
            state.last_evaluated = Some(now);
        }

        let mut candidates = Vec::new();

        for market in Market::ALL {
            let prices = self
                .analyzer
                .recent_prices(market, now, self.config.window_size);
            let start = prices.len().saturating_sub(self.config.window_size);
            if let Some(event) =
                detect_window(market, &prices[start..], self.config.threshold(market), now)
            {
                candidates.push((event, None));
            }
        }

        if self.config.analysis_enabled {
            for market in Market::ALL {
                let price = observed_price(quote, market);
                let Some(analysis) = self.analyzer.analyze_market(market, price, now) else {
                    continue;
                };
                if let Some(event) = self.analysis_event(&analysis, now) {
                    candidates.push((event, Some(analysis.signal)));
                }
            }
        }

        let mut fired = Vec::new();
        for (event, signal) in candidates {
            match self.try_reserve(&event, now) {
                Ok(()) => {
                    let context = match signal {
                        Some(signal) => Some(signal),
                        None => self
                            .analyzer
                            .analyze_market(event.market, Some(event.current), now)
                            .map(|a| a.signal),
                    };
                    let report = self.dispatcher.dispatch(&event, context.as_ref()).await;
                    self.state
                        .lock()
                        .phases
                        .insert(event.kind(), AlertPhase::CoolingDown);
                    fired.push(FiredAlert { event, report });
                }
                Err(reason) => {
                    tracing::debug!(alert = %event.name, ?reason, "alert suppressed");
                }
            }
        }

        fired
    }

    fn analysis_event(&self, analysis: &MarketAnalysis, timestamp: i64) -> Option<AlertEvent> {
        let signal: &TradingSignal = &analysis.signal;
        if !signal.is_strong_signal || signal.confidence < self.config.analysis_min_confidence {
            return None;
        }

        let series = self.analyzer.series(analysis.market, timestamp);
        let start = series.len().saturating_sub(self.config.window_size);
        let window = &series[start..];
        let max = window.iter().copied().fold(analysis.current_price, f64::max);
        let min = window.iter().copied().fold(analysis.current_price, f64::min);

        let direction = match signal.recommendation {
            Recommendation::StrongBuy => AlertDirection::Down,
            _ => AlertDirection::Up,
        };

        Some(AlertEvent {
            alert_type: AlertType::Analysis,
            market: analysis.market,
            name: format!(
                "{} {} signal",
                analysis.market.display_name(),
                signal.recommendation
            ),
            current: analysis.current_price,
            max,
            min,
            range: max - min,
            direction,
            severity: Severity::Warning,
            timestamp,
        })
    }

    /// Check direction, cooldown and daily cap, then claim the slot in one step
    fn try_reserve(&self, event: &AlertEvent, now_ms: i64) -> Result<(), Suppression> {
        if event.alert_type == AlertType::Window
            && event.direction == AlertDirection::Up
            && !self.config.alert_on_rise
        {
            return Err(Suppression::Direction);
        }

        let today = self.store_config.market_date(now_ms);
        let mut state = self.state.lock();

        if state.cooldown.day != today {
            state.cooldown.day = today;
            state.cooldown.daily_alert_count = 0;
        }

        if self.in_cooldown(&state.cooldown, now_ms) {
            return Err(Suppression::Cooldown);
        }
        if state.cooldown.daily_alert_count >= self.config.daily_cap {
            tracing::warn!(cap = self.config.daily_cap, "daily alert cap reached");
            return Err(Suppression::DailyCap);
        }

        state.cooldown.last_alert_timestamp = Some(now_ms);
        state.cooldown.daily_alert_count += 1;
        state.phases.insert(event.kind(), AlertPhase::Triggered);

        tracing::info!(
            alert = %event.name,
            market = %event.market,
            range = event.range,
            direction = event.direction.as_str(),
            count = state.cooldown.daily_alert_count,
            "alert fired"
        );
        Ok(())
    }
}
