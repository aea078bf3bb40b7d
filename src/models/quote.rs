//! Price snapshot and combined quote models
//!
//! Domestic prices are CNY per gram, international prices are USD per troy ounce.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Grams per troy ounce, used for domestic/international conversion
pub const TROY_OUNCE_GRAMS: f64 = 31.1035;

/// Source prefix for a snapshot served from the last-good cache
pub const CACHED_PREFIX: &str = "Cached-";
/// Source prefix for a snapshot derived from the other market via FX
pub const CALCULATED_PREFIX: &str = "Calculated-";
/// Source prefix for a static placeholder value
pub const FALLBACK_PREFIX: &str = "Fallback-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Domestic,
    International,
}

impl Market {
    pub const ALL: [Market; 2] = [Market::Domestic, Market::International];

    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Domestic => "domestic",
            Market::International => "international",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Market::Domestic => "CNY/g",
            Market::International => "USD/oz",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Market::Domestic => "Domestic gold",
            Market::International => "International gold",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a snapshot's price actually came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Live,
    Cached,
    Calculated,
    Synthetic,
}

impl Provenance {
    pub fn from_source(source: &str) -> Self {
        if source.starts_with(FALLBACK_PREFIX) {
            Provenance::Synthetic
        } else if source.starts_with(CACHED_PREFIX) {
            Provenance::Cached
        } else if source.starts_with(CALCULATED_PREFIX) {
            Provenance::Calculated
        } else {
            Provenance::Live
        }
    }
}

/// A single recorded price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: f64,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
}

/// Point-in-time price record for one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub change: f64,
    pub change_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    pub source: String,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
}

impl PriceSnapshot {
    /// Build a snapshot from last/open/high/low and the previous close
    pub fn from_parts(
        price: f64,
        open: f64,
        high: f64,
        low: f64,
        previous_close: f64,
        source: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        let change = if previous_close > 0.0 { price - previous_close } else { 0.0 };
        let change_percent = if previous_close > 0.0 {
            change / previous_close * 100.0
        } else {
            0.0
        };

        Self {
            price,
            open: if open > 0.0 { open } else { price },
            high: if high > 0.0 { high.max(price) } else { price },
            low: if low > 0.0 { low.min(price) } else { price },
            change,
            change_percent,
            volume: None,
            source: source.into(),
            timestamp,
        }
    }

    pub fn provenance(&self) -> Provenance {
        Provenance::from_source(&self.source)
    }

    pub fn is_live(&self) -> bool {
        self.provenance() == Provenance::Live
    }

    /// Copy of this snapshot re-tagged with a provenance prefix
    pub fn retagged(&self, prefix: &str) -> Self {
        let base = self
            .source
            .trim_start_matches(CACHED_PREFIX)
            .trim_start_matches(CALCULATED_PREFIX)
            .trim_start_matches(FALLBACK_PREFIX);
        Self {
            source: format!("{}{}", prefix, base),
            ..self.clone()
        }
    }

    /// Scale every price field by `factor`; `change_percent` is unit-free and kept
    pub fn converted(&self, factor: f64, source: String) -> Self {
        Self {
            price: self.price * factor,
            open: self.open * factor,
            high: self.high * factor,
            low: self.low * factor,
            change: self.change * factor,
            change_percent: self.change_percent,
            volume: None,
            source,
            timestamp: self.timestamp,
        }
    }

    pub fn point(&self) -> PricePoint {
        PricePoint {
            price: self.price,
            timestamp: self.timestamp,
        }
    }
}

/// The unit written to the price store on every acquisition cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedQuote {
    /// True only when both markets are present
    pub success: bool,
    pub timestamp: i64,
    /// USD -> CNY
    pub exchange_rate: f64,
    pub exchange_rate_source: String,
    pub domestic: Option<PriceSnapshot>,
    pub international: Option<PriceSnapshot>,
}

impl CombinedQuote {
    pub fn new(
        timestamp: i64,
        exchange_rate: f64,
        exchange_rate_source: impl Into<String>,
        domestic: Option<PriceSnapshot>,
        international: Option<PriceSnapshot>,
    ) -> Self {
        Self {
            success: domestic.is_some() && international.is_some(),
            timestamp,
            exchange_rate,
            exchange_rate_source: exchange_rate_source.into(),
            domestic,
            international,
        }
    }

    pub fn snapshot(&self, market: Market) -> Option<&PriceSnapshot> {
        match market {
            Market::Domestic => self.domestic.as_ref(),
            Market::International => self.international.as_ref(),
        }
    }
}

/// Convert an international USD/oz price into CNY/g
pub fn international_to_domestic(price_usd_oz: f64, fx_rate: f64) -> f64 {
    price_usd_oz * fx_rate / TROY_OUNCE_GRAMS
}

/// Convert a domestic CNY/g price into USD/oz
pub fn domestic_to_international(price_cny_g: f64, fx_rate: f64) -> f64 {
    if fx_rate <= 0.0 {
        return 0.0;
    }
    price_cny_g * TROY_OUNCE_GRAMS / fx_rate
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
