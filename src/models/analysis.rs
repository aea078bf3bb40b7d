//! Technical-analysis models: indicator outputs, trend classification and trading signals
//!
//! Every indicator field is an `Option`: `None` means "not enough history",
//! which the signal scorer excludes instead of treating as zero.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::quote::Market;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
    /// Histogram one period earlier, when there is enough history for it
    pub previous_histogram: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bollinger {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// `None` when the bands collapse (flat prices)
    pub percent_b: Option<f64>,
    pub bandwidth: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportResistance {
    /// Nearest first
    pub support: Vec<f64>,
    /// Nearest first
    pub resistance: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volatility {
    pub std_dev: f64,
    /// Standard deviation as a percentage of the mean
    pub coefficient_of_variation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MovingAverages {
    pub sma5: Option<f64>,
    pub sma10: Option<f64>,
    pub sma20: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExponentialAverages {
    pub ema12: Option<f64>,
    pub ema26: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    WeakUp,
    Sideways,
    WeakDown,
    Down,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::WeakUp => "weak_up",
            Trend::Sideways => "sideways",
            Trend::WeakDown => "weak_down",
            Trend::Down => "down",
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Trend::Up | Trend::Down)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendLevel {
    ExtremeBearish,
    StrongBearish,
    Bearish,
    Neutral,
    Bullish,
    StrongBullish,
    ExtremeBullish,
}

impl TrendLevel {
    /// 0 for neutral, 1..=3 for increasing strength in either direction
    pub fn tier(&self) -> u8 {
        match self {
            TrendLevel::Neutral => 0,
            TrendLevel::Bullish | TrendLevel::Bearish => 1,
            TrendLevel::StrongBullish | TrendLevel::StrongBearish => 2,
            TrendLevel::ExtremeBullish | TrendLevel::ExtremeBearish => 3,
        }
    }

    pub fn is_bullish(&self) -> bool {
        matches!(
            self,
            TrendLevel::Bullish | TrendLevel::StrongBullish | TrendLevel::ExtremeBullish
        )
    }

    pub fn is_bearish(&self) -> bool {
        matches!(
            self,
            TrendLevel::Bearish | TrendLevel::StrongBearish | TrendLevel::ExtremeBearish
        )
    }
}

/// Output of the trend classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendAnalysis {
    pub trend: Trend,
    pub level: TrendLevel,
    /// Absolute cumulative percentage change over the dominant streak
    pub strength: f64,
    /// 0.0 ..= 1.0
    pub confidence: f64,
    pub up_streak: usize,
    pub down_streak: usize,
    pub up_periods: usize,
    pub down_periods: usize,
    /// Signed cumulative percentage change over the dominant streak
    pub streak_change_pct: f64,
}

/// All indicators for one market, recomputed on demand and never persisted
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSet {
    pub points: usize,
    pub rsi: Option<f64>,
    pub macd: Option<Macd>,
    pub bollinger: Option<Bollinger>,
    pub sma: MovingAverages,
    pub ema: ExponentialAverages,
    pub trend: Option<TrendAnalysis>,
    pub volatility: Option<Volatility>,
    pub support_resistance: Option<SupportResistance>,
    /// Percentage change over the most recent period
    pub last_change_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Rsi,
    Macd,
    Bollinger,
    SupportResistance,
    Trend,
    PriceChange,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Rsi => "RSI",
            SignalSource::Macd => "MACD",
            SignalSource::Bollinger => "Bollinger",
            SignalSource::SupportResistance => "Support/Resistance",
            SignalSource::Trend => "Trend",
            SignalSource::PriceChange => "Price change",
        }
    }
}

/// One indicator's vote, with the raw value and a human-readable rationale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub indicator: SignalSource,
    pub side: SignalSide,
    pub weight: f64,
    pub value: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::StrongBuy => "strong buy",
            Recommendation::Buy => "buy",
            Recommendation::Hold => "hold/watch",
            Recommendation::Sell => "sell",
            Recommendation::StrongSell => "strong sell",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Output of the signal scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingSignal {
    pub signals: Vec<Signal>,
    pub buy_score: f64,
    pub sell_score: f64,
    pub net_score: f64,
    pub recommendation: Recommendation,
    pub risk_level: RiskLevel,
    /// 0 ..= 100
    pub confidence: f64,
    pub is_buy_signal: bool,
    pub is_strong_signal: bool,
}

impl TradingSignal {
    /// Highest-weight contributors first
    pub fn top_signals(&self, n: usize) -> Vec<&Signal> {
        let mut sorted: Vec<&Signal> = self.signals.iter().collect();
        sorted.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
        sorted.truncate(n);
        sorted
    }
}

/// Indicators plus signal for one market
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketAnalysis {
    pub market: Market,
    pub current_price: f64,
    pub indicators: IndicatorSet,
    pub signal: TradingSignal,
}

/// Condensed view returned by the signal-only action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalSummary {
    pub market: Market,
    pub current_price: f64,
    pub recommendation: Recommendation,
    pub buy_score: f64,
    pub sell_score: f64,
    pub net_score: f64,
    pub confidence: f64,
    pub is_buy_signal: bool,
    pub is_strong_signal: bool,
}

impl From<&MarketAnalysis> for SignalSummary {
    fn from(analysis: &MarketAnalysis) -> Self {
        Self {
            market: analysis.market,
            current_price: analysis.current_price,
            recommendation: analysis.signal.recommendation,
            buy_score: analysis.signal.buy_score,
            sell_score: analysis.signal.sell_score,
            net_score: analysis.signal.net_score,
            confidence: analysis.signal.confidence,
            is_buy_signal: analysis.signal.is_buy_signal,
            is_strong_signal: analysis.signal.is_strong_signal,
        }
    }
}

/// Both markets; either side is absent when the store has no history for it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullAnalysis {
    pub timestamp: i64,
    pub domestic: Option<MarketAnalysis>,
    pub international: Option<MarketAnalysis>,
}

impl FullAnalysis {
    pub fn market(&self, market: Market) -> Option<&MarketAnalysis> {
        match market {
            Market::Domestic => self.domestic.as_ref(),
            Market::International => self.international.as_ref(),
        }
    }
}

/// Query parameters for the analysis endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisQuery {
    /// "full" (default) or "signal"
    #[serde(default = "default_action")]
    pub action: String,
    /// Run the alert engine against the latest quote
    #[serde(default)]
    pub notify: bool,
}

fn default_action() -> String {
    "full".to_string()
}
