//! Read-endpoint request/response models

use serde::{Deserialize, Serialize};

use crate::models::analysis::FullAnalysis;
use crate::models::history::DailyStats;
use crate::models::quote::{CombinedQuote, Provenance};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Query parameters for GET /api/gold/price
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceQuery {
    /// Force a fresh acquisition regardless of cache age
    #[serde(default)]
    pub refresh: bool,
    /// Embed indicators and signals for both markets
    #[serde(default)]
    pub analysis: bool,
    /// YYYY-MM-DD: closing snapshot of a prior (retained) day
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    #[serde(flatten)]
    pub quote: CombinedQuote,
    /// Served from the store without a new acquisition
    pub cached: bool,
    /// Older than the freshness window; served because no fresh data was available
    pub stale: bool,
    pub cache_age_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domestic_provenance: Option<Provenance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub international_provenance: Option<Provenance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<FullAnalysis>,
}

impl QuoteResponse {
    pub fn new(quote: CombinedQuote, cached: bool, stale: bool, cache_age_ms: u64) -> Self {
        let domestic_provenance = quote.domestic.as_ref().map(|s| s.provenance());
        let international_provenance = quote.international.as_ref().map(|s| s.provenance());
        Self {
            quote,
            cached,
            stale,
            cache_age_ms,
            domestic_provenance,
            international_provenance,
            analysis: None,
        }
    }
}

/// Closing snapshot of a prior day
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatedQuoteResponse {
    pub date: chrono::NaiveDate,
    pub domestic_close: Option<f64>,
    pub international_close: Option<f64>,
    pub close_timestamp: Option<i64>,
    pub stats: Option<DailyStats>,
    /// "history" for retained intraday data, "daily_closes" for the long-term aggregate
    pub source: String,
}
