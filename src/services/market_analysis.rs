use std::sync::Arc;

use crate::config::{AppConfig, IndicatorConfig, SignalWeights, StoreConfig, TrendConfig};
use crate::models::analysis::{FullAnalysis, MarketAnalysis};
use crate::models::quote::{now_millis, CombinedQuote, Market, Provenance};
use crate::services::indicators::compute_indicator_set;
use crate::services::price_store::PriceStore;
use crate::services::signal_scorer;

/// The quote's price for `market` unless it is a static placeholder
///
/// Placeholders never stand in for the current price; analysis falls back to
/// the last recorded price instead.
pub fn observed_price(quote: &CombinedQuote, market: Market) -> Option<f64> {
    quote
        .snapshot(market)
        .filter(|s| s.provenance() != Provenance::Synthetic)
        .map(|s| s.price)
}

/// Builds indicator sets and trading signals from the store's retained history
#[derive(Clone)]
pub struct MarketAnalyzer {
    store: Arc<dyn PriceStore>,
    store_config: StoreConfig,
    indicators: IndicatorConfig,
    trend: TrendConfig,
    weights: SignalWeights,
}

impl MarketAnalyzer {
    pub fn new(store: Arc<dyn PriceStore>, config: &AppConfig) -> Self {
        Self {
            store,
            store_config: config.store.clone(),
            indicators: config.indicators.clone(),
            trend: config.trend.clone(),
            weights: config.signal_weights.clone(),
        }
    }

    /// Price series ending at `timestamp_ms`'s market day
    ///
    /// Earlier retained days are prepended while the series is shorter than
    /// `min_series_points`.
    pub fn series(&self, market: Market, timestamp_ms: i64) -> Vec<f64> {
        self.recent_prices(market, timestamp_ms, self.indicators.min_series_points)
    }

    /// Recorded prices up to `timestamp_ms`'s market day, reaching back into
    /// earlier retained days until at least `min_points` are collected
    pub fn recent_prices(&self, market: Market, timestamp_ms: i64, min_points: usize) -> Vec<f64> {
        let today = self.store_config.market_date(timestamp_ms);
        let mut series = self.store.read_history(today).prices(market);

        let earlier: Vec<_> = self
            .store
            .retained_dates()
            .into_iter()
            .filter(|d| *d < today)
            .rev()
            .collect();

        for date in earlier {
            if series.len() >= min_points {
                break;
            }
            let mut day = self.store.read_history(date).prices(market);
            day.extend(series);
            series = day;
        }

        series
    }

    /// `None` when there is no history at all for the market
    pub fn analyze_market(
        &self,
        market: Market,
        current_price: Option<f64>,
        timestamp_ms: i64,
    ) -> Option<MarketAnalysis> {
        let series = self.series(market, timestamp_ms);
        let current_price = current_price.or_else(|| series.last().copied())?;

        let indicators = compute_indicator_set(&series, &self.indicators, &self.trend);
        let signal = signal_scorer::score(current_price, &indicators, &self.weights);

        Some(MarketAnalysis {
            market,
            current_price,
            indicators,
            signal,
        })
    }

    /// Both markets, priced at `quote` when given
    pub fn analyze(&self, quote: Option<&CombinedQuote>) -> FullAnalysis {
        let timestamp = quote.map(|q| q.timestamp).unwrap_or_else(now_millis);
        let price = |market: Market| quote.and_then(|q| observed_price(q, market));

        FullAnalysis {
            timestamp,
            domestic: self.analyze_market(Market::Domestic, price(Market::Domestic), timestamp),
            international: self.analyze_market(
                Market::International,
                price(Market::International),
                timestamp,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::history::HistoryEntry;
    use crate::models::quote::PriceSnapshot;
    use crate::services::price_store::MemoryPriceStore;
    use chrono::Duration as ChronoDuration;

    fn entry(ts: i64, domestic: f64) -> HistoryEntry {
        HistoryEntry {
            timestamp: ts,
            domestic_price: Some(domestic),
            international_price: None,
            domestic_change_pct: None,
            international_change_pct: None,
        }
    }

    #[test]
    fn test_series_prepends_earlier_days() {
        let config = AppConfig::defaults();
        let store = Arc::new(MemoryPriceStore::new(&config.store));
        let analyzer = MarketAnalyzer::new(store.clone(), &config);

        let now = now_millis();
        let today = config.store.market_date(now);
        let yesterday = today - ChronoDuration::days(1);

        for i in 0..30 {
            store.append_history(yesterday, entry(i, 600.0 + i as f64));
        }
        for i in 0..10 {
            store.append_history(today, entry(100 + i, 700.0 + i as f64));
        }

        let series = analyzer.series(Market::Domestic, now);
        assert_eq!(series.len(), 40);
        assert_eq!(series[0], 600.0);
        assert_eq!(*series.last().unwrap(), 709.0);
        assert!(analyzer.series(Market::International, now).is_empty());
    }

    #[test]
    fn test_analyze_without_history() {
        let config = AppConfig::defaults();
        let store = Arc::new(MemoryPriceStore::new(&config.store));
        let analyzer = MarketAnalyzer::new(store, &config);

        let analysis = analyzer.analyze(None);
        assert!(analysis.domestic.is_none());
        assert!(analysis.international.is_none());
    }

    #[test]
    fn test_analyze_market_uses_quote_price() {
        let config = AppConfig::defaults();
        let store = Arc::new(MemoryPriceStore::new(&config.store));
        let analyzer = MarketAnalyzer::new(store.clone(), &config);

        let now = now_millis();
        let today = config.store.market_date(now);
        for i in 0..5 {
            store.append_history(today, entry(i, 680.0));
        }

        let analysis = analyzer
            .analyze_market(Market::Domestic, Some(690.0), now)
            .unwrap();
        assert_eq!(analysis.current_price, 690.0);
        assert_eq!(analysis.indicators.points, 5);
        assert!(analysis.indicators.rsi.is_none());
    }

    #[test]
    fn test_placeholder_price_does_not_drive_analysis() {
        let config = AppConfig::defaults();
        let store = Arc::new(MemoryPriceStore::new(&config.store));
        let analyzer = MarketAnalyzer::new(store.clone(), &config);

        let now = now_millis();
        let today = config.store.market_date(now);
        for i in 0..35 {
            let price = if i % 2 == 0 { 680.5 } else { 679.5 };
            store.append_history(today, entry(i, price));
        }

        let placeholder = PriceSnapshot::from_parts(560.0, 0.0, 0.0, 0.0, 0.0, "Fallback-Static", now);
        let quote = CombinedQuote::new(now, 7.2, "test", Some(placeholder), None);

        let analysis = analyzer.analyze(Some(&quote));
        let domestic = analysis.domestic.unwrap();
        assert_eq!(domestic.current_price, 680.5);
        assert!(
            domestic
                .signal
                .signals
                .iter()
                .all(|s| !s.reason.contains("560")),
            "placeholder price leaked into signal rationale"
        );
        assert_eq!(observed_price(&quote, Market::Domestic), None);
    }

    #[test]
    fn test_recent_prices_reaches_back_for_window() {
        let config = AppConfig::defaults();
        let store = Arc::new(MemoryPriceStore::new(&config.store));
        let analyzer = MarketAnalyzer::new(store.clone(), &config);

        let now = now_millis();
        let today = config.store.market_date(now);
        let yesterday = today - ChronoDuration::days(1);
        store.append_history(yesterday, entry(1, 682.0));
        store.append_history(yesterday, entry(2, 679.0));
        store.append_history(today, entry(3, 673.0));

        assert_eq!(analyzer.recent_prices(Market::Domestic, now, 3), vec![682.0, 679.0, 673.0]);
        assert_eq!(analyzer.recent_prices(Market::Domestic, now, 1), vec![673.0]);
    }
}
