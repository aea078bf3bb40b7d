//! Intraday history, daily aggregate and long-range history models

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::quote::{CombinedQuote, Market, PriceSnapshot};

/// One intraday history row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub timestamp: i64,
    pub domestic_price: Option<f64>,
    pub international_price: Option<f64>,
    pub domestic_change_pct: Option<f64>,
    pub international_change_pct: Option<f64>,
}

impl HistoryEntry {
    pub fn from_quote(quote: &CombinedQuote) -> Self {
        Self {
            timestamp: quote.timestamp,
            domestic_price: quote.domestic.as_ref().map(|s| s.price),
            international_price: quote.international.as_ref().map(|s| s.price),
            domestic_change_pct: quote.domestic.as_ref().map(|s| s.change_percent),
            international_change_pct: quote.international.as_ref().map(|s| s.change_percent),
        }
    }

    pub fn price(&self, market: Market) -> Option<f64> {
        match market {
            Market::Domestic => self.domestic_price,
            Market::International => self.international_price,
        }
    }
}

/// Append-only intraday history for one calendar day
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyHistory {
    pub date: Option<NaiveDate>,
    pub entries: Vec<HistoryEntry>,
}

impl DailyHistory {
    /// Chronological price series for one market, skipping rows without that market
    pub fn prices(&self, market: Market) -> Vec<f64> {
        self.entries.iter().filter_map(|e| e.price(market)).collect()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Running per-market aggregate for one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDayStats {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub change: f64,
    pub change_percent: f64,
    pub source: String,
}

impl MarketDayStats {
    fn start(snapshot: &PriceSnapshot) -> Self {
        Self {
            open: snapshot.price,
            high: snapshot.price,
            low: snapshot.price,
            close: snapshot.price,
            change: 0.0,
            change_percent: 0.0,
            source: snapshot.source.clone(),
        }
    }

    fn apply(&mut self, snapshot: &PriceSnapshot) {
        self.high = self.high.max(snapshot.price);
        self.low = self.low.min(snapshot.price);
        self.close = snapshot.price;
        self.change = snapshot.price - self.open;
        self.change_percent = if self.open > 0.0 {
            self.change / self.open * 100.0
        } else {
            0.0
        };
        self.source = snapshot.source.clone();
    }
}

/// Per-day aggregate derived incrementally from each quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub date: NaiveDate,
    pub domestic: Option<MarketDayStats>,
    pub international: Option<MarketDayStats>,
    pub update_count: u32,
    pub last_update: i64,
}

impl DailyStats {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            domestic: None,
            international: None,
            update_count: 0,
            last_update: 0,
        }
    }

    /// Fold one quote into the running extrema without rescanning history
    pub fn apply(&mut self, quote: &CombinedQuote) {
        for market in Market::ALL {
            let Some(snapshot) = quote.snapshot(market) else {
                continue;
            };
            let slot = match market {
                Market::Domestic => &mut self.domestic,
                Market::International => &mut self.international,
            };
            match slot {
                Some(stats) => stats.apply(snapshot),
                None => *slot = Some(MarketDayStats::start(snapshot)),
            }
        }
        self.update_count += 1;
        self.last_update = self.last_update.max(quote.timestamp);
    }

    pub fn market(&self, market: Market) -> Option<&MarketDayStats> {
        match market {
            Market::Domestic => self.domestic.as_ref(),
            Market::International => self.international.as_ref(),
        }
    }
}

/// Range accepted by the history endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryRange {
    #[serde(rename = "1m")]
    OneMonth,
    #[serde(rename = "3m")]
    ThreeMonths,
    #[serde(rename = "6m")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
}

impl HistoryRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryRange::OneMonth => "1m",
            HistoryRange::ThreeMonths => "3m",
            HistoryRange::SixMonths => "6m",
            HistoryRange::OneYear => "1y",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(HistoryRange::OneMonth),
            "3m" => Some(HistoryRange::ThreeMonths),
            "6m" => Some(HistoryRange::SixMonths),
            "1y" => Some(HistoryRange::OneYear),
            _ => None,
        }
    }

    pub fn days(&self) -> i64 {
        match self {
            HistoryRange::OneMonth => 30,
            HistoryRange::ThreeMonths => 90,
            HistoryRange::SixMonths => 180,
            HistoryRange::OneYear => 365,
        }
    }
}

/// Query parameters for the history endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    /// 1m, 3m, 6m, 1y (defaults to 1m)
    #[serde(default = "default_range")]
    pub range: String,
}

fn default_range() -> String {
    "1m".to_string()
}

/// One day in the history response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDayPoint {
    pub date: NaiveDate,
    /// `None` only when the market has no recorded close anywhere in the range
    pub domestic_price: Option<f64>,
    pub international_price: Option<f64>,
    /// False when either value was interpolated or extended
    pub authentic: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub range: String,
    pub points: Vec<HistoryDayPoint>,
    pub authentic_days: usize,
    pub approximated_days: usize,
    pub approximated: bool,
}
