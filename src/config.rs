//! Service configuration
//!
//! Every knob is read from the environment (after `.env` is loaded by
//! `dotenvy` in `main`) and falls back to a named default. Heuristic
//! thresholds and weights live here as data so they can be tuned without
//! touching the scoring code.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

// Server
pub const ENV_BIND_ADDR: &str = "BIND_ADDR";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

// Price sources
pub const ENV_SOURCE_TIMEOUT_MS: &str = "SOURCE_TIMEOUT_MS";
pub const ENV_SOURCE_MAX_ATTEMPTS: &str = "SOURCE_MAX_ATTEMPTS";
pub const ENV_SOURCE_BACKOFF_BASE_MS: &str = "SOURCE_BACKOFF_BASE_MS";
pub const ENV_SOURCE_USER_AGENTS: &str = "SOURCE_USER_AGENTS";
pub const ENV_SOURCE_CACHE_FRESHNESS_SECS: &str = "SOURCE_CACHE_FRESHNESS_SECS";
pub const ENV_SOURCE_SYNTHETIC_FALLBACK: &str = "SOURCE_SYNTHETIC_FALLBACK";
pub const ENV_SYNTHETIC_DOMESTIC_PRICE: &str = "SYNTHETIC_DOMESTIC_PRICE";
pub const ENV_SYNTHETIC_INTERNATIONAL_PRICE: &str = "SYNTHETIC_INTERNATIONAL_PRICE";
pub const ENV_DEFAULT_FX_RATE: &str = "DEFAULT_FX_RATE";
pub const ENV_SINA_QUOTE_URL: &str = "SINA_QUOTE_URL";
pub const ENV_DOMESTIC_SYMBOL: &str = "DOMESTIC_SYMBOL";
pub const ENV_INTERNATIONAL_SYMBOL: &str = "INTERNATIONAL_SYMBOL";
pub const ENV_GOLD_API_URL: &str = "GOLD_API_URL";
pub const ENV_FX_API_URL: &str = "FX_API_URL";

const DEFAULT_SOURCE_TIMEOUT_MS: u64 = 8000;
const DEFAULT_SOURCE_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_SOURCE_BACKOFF_BASE_MS: u64 = 500;
const DEFAULT_SOURCE_CACHE_FRESHNESS_SECS: u64 = 3600;
const DEFAULT_SYNTHETIC_DOMESTIC_PRICE: f64 = 560.0;
const DEFAULT_SYNTHETIC_INTERNATIONAL_PRICE: f64 = 2400.0;
const DEFAULT_FX_RATE: f64 = 7.2;
const DEFAULT_SINA_QUOTE_URL: &str = "https://hq.sinajs.cn/list=";
const DEFAULT_DOMESTIC_SYMBOL: &str = "gds_AUTD";
const DEFAULT_INTERNATIONAL_SYMBOL: &str = "hf_XAU";
const DEFAULT_GOLD_API_URL: &str = "https://api.gold-api.com/price/XAU";
const DEFAULT_FX_API_URL: &str = "https://open.er-api.com/v6/latest/USD";
const DEFAULT_USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148",
];

// Store
pub const ENV_PRICE_FRESHNESS_SECS: &str = "PRICE_FRESHNESS_SECS";
pub const ENV_LATEST_TTL_SECS: &str = "LATEST_TTL_SECS";
pub const ENV_HISTORY_CAP: &str = "HISTORY_CAP";
pub const ENV_HISTORY_RETENTION_DAYS: &str = "HISTORY_RETENTION_DAYS";
pub const ENV_MARKET_UTC_OFFSET_HOURS: &str = "MARKET_UTC_OFFSET_HOURS";

const DEFAULT_PRICE_FRESHNESS_SECS: u64 = 30;
const DEFAULT_LATEST_TTL_SECS: u64 = 3600;
const DEFAULT_HISTORY_CAP: usize = 1440;
const DEFAULT_HISTORY_RETENTION_DAYS: i64 = 3;
const DEFAULT_MARKET_UTC_OFFSET_HOURS: i32 = 8;

// Acquisition
pub const ENV_ACQUISITION_WAIT_MS: &str = "ACQUISITION_WAIT_MS";
const DEFAULT_ACQUISITION_WAIT_MS: u64 = 2000;

// Signal weights
pub const ENV_SIGNAL_WEIGHTS_PATH: &str = "SIGNAL_WEIGHTS_PATH";

// Alerts
pub const ENV_ALERT_DOMESTIC_THRESHOLD: &str = "ALERT_DOMESTIC_THRESHOLD";
pub const ENV_ALERT_INTERNATIONAL_THRESHOLD: &str = "ALERT_INTERNATIONAL_THRESHOLD";
pub const ENV_ALERT_WINDOW_SIZE: &str = "ALERT_WINDOW_SIZE";
pub const ENV_ALERT_COOLDOWN_SECS: &str = "ALERT_COOLDOWN_SECS";
pub const ENV_ALERT_DAILY_CAP: &str = "ALERT_DAILY_CAP";
pub const ENV_ALERT_ON_RISE: &str = "ALERT_ON_RISE";
pub const ENV_ALERT_ANALYSIS_ENABLED: &str = "ALERT_ANALYSIS_ENABLED";
pub const ENV_ALERT_ANALYSIS_MIN_CONFIDENCE: &str = "ALERT_ANALYSIS_MIN_CONFIDENCE";

const DEFAULT_ALERT_DOMESTIC_THRESHOLD: f64 = 5.0;
const DEFAULT_ALERT_INTERNATIONAL_THRESHOLD: f64 = 20.0;
const DEFAULT_ALERT_WINDOW_SIZE: usize = 5;
const DEFAULT_ALERT_COOLDOWN_SECS: u64 = 1800;
const DEFAULT_ALERT_DAILY_CAP: u32 = 20;
const DEFAULT_ALERT_ANALYSIS_MIN_CONFIDENCE: f64 = 60.0;

// Notification channels
pub const ENV_EMAIL_API_URL: &str = "EMAIL_API_URL";
pub const ENV_EMAIL_API_KEY: &str = "EMAIL_API_KEY";
pub const ENV_EMAIL_FROM: &str = "EMAIL_FROM";
pub const ENV_EMAIL_TO: &str = "EMAIL_TO";
pub const ENV_WEBHOOK_URL: &str = "WEBHOOK_URL";
pub const ENV_PUSH_API_URL: &str = "PUSH_API_URL";
pub const ENV_PUSH_TOKEN: &str = "PUSH_TOKEN";
pub const ENV_CHANNEL_TIMEOUT_MS: &str = "CHANNEL_TIMEOUT_MS";
pub const ENV_RETRY_QUEUE_CAP: &str = "RETRY_QUEUE_CAP";

const DEFAULT_EMAIL_API_URL: &str = "https://api.resend.com/emails";
const DEFAULT_PUSH_API_URL: &str = "https://www.pushplus.plus/send";
const DEFAULT_CHANNEL_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_RETRY_QUEUE_CAP: usize = 50;

// Scheduler
pub const ENV_SYNC_INTERVAL_SECS: &str = "GOLD_SYNC_INTERVAL_SECS";
pub const ENV_SYNC_CYCLE_ATTEMPTS: &str = "GOLD_SYNC_CYCLE_ATTEMPTS";
pub const ENV_SYNC_RETRY_DELAY_SECS: &str = "GOLD_SYNC_RETRY_DELAY_SECS";
pub const ENV_STREAM_INTERVAL_SECS: &str = "STREAM_INTERVAL_SECS";
pub const ENV_RETENTION_INTERVAL_SECS: &str = "RETENTION_INTERVAL_SECS";

const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;
const DEFAULT_SYNC_CYCLE_ATTEMPTS: u32 = 3;
const DEFAULT_SYNC_RETRY_DELAY_SECS: u64 = 5;
const DEFAULT_STREAM_INTERVAL_SECS: u64 = 30;
const DEFAULT_RETENTION_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub sources: SourceConfig,
    pub store: StoreConfig,
    pub acquisition: AcquisitionConfig,
    pub indicators: IndicatorConfig,
    pub trend: TrendConfig,
    pub signal_weights: SignalWeights,
    pub alerts: AlertConfig,
    pub channels: ChannelConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Long-term daily closes are only persisted when this is set
    pub database_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub user_agents: Vec<String>,
    /// A cached snapshot older than this is not used as a fallback
    pub cache_freshness: Duration,
    pub synthetic_fallback: bool,
    pub synthetic_domestic_price: f64,
    pub synthetic_international_price: f64,
    pub default_fx_rate: f64,
    pub sina_quote_url: String,
    pub domestic_symbol: String,
    pub international_symbol: String,
    pub gold_api_url: String,
    pub fx_api_url: String,
}

impl SourceConfig {
    /// Exponential backoff: base * 2^attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn user_agent(&self, attempt: u32) -> &str {
        if self.user_agents.is_empty() {
            return "gold-price-backend";
        }
        &self.user_agents[attempt as usize % self.user_agents.len()]
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Cached quotes younger than this are served without a new acquisition
    pub freshness: Duration,
    /// Quotes older than this are gone from the store (bounded staleness)
    pub latest_ttl: Duration,
    pub history_cap: usize,
    pub retention_days: i64,
    pub utc_offset_hours: i32,
}

impl StoreConfig {
    pub fn market_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }

    /// Calendar date (market-local) of a millisecond timestamp
    pub fn market_date(&self, timestamp_ms: i64) -> NaiveDate {
        let utc = DateTime::from_timestamp_millis(timestamp_ms).unwrap_or_else(Utc::now);
        utc.with_timezone(&self.market_offset()).date_naive()
    }
}

#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Upper bound a concurrent caller waits on the in-flight acquisition
    pub inflight_wait: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub bollinger_period: usize,
    pub bollinger_k: f64,
    pub volatility_period: usize,
    /// Window scanned for 5-point local extrema
    pub sr_lookback: usize,
    /// Analysis prepends earlier retained days until the series has this many points
    pub min_series_points: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            bollinger_period: 20,
            bollinger_k: 2.0,
            volatility_period: 20,
            sr_lookback: 20,
            min_series_points: 35,
        }
    }
}

/// Trend classifier thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Number of recent period changes classified up/flat/down
    pub lookback: usize,
    /// Number of recent period changes scanned for streaks
    pub extended_lookback: usize,
    /// A change must exceed this (percent) to count as up or down
    pub change_threshold_pct: f64,
    /// Streak length that confirms a trend
    pub confirm_streak: usize,
    /// Minimum count of up (or down) periods for a confirmed trend
    pub min_directional_periods: usize,
    /// Cumulative streak change (percent) for bullish / strong / extreme
    pub level_thresholds: [f64; 3],
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            lookback: 8,
            extended_lookback: 12,
            change_threshold_pct: 0.3,
            confirm_streak: 3,
            min_directional_periods: 3,
            level_thresholds: [0.5, 1.0, 2.0],
        }
    }
}

/// Weights and thresholds of the signal scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub rsi_oversold: f64,
    pub rsi_extreme_oversold: f64,
    pub rsi_overbought: f64,
    pub rsi_extreme_overbought: f64,
    pub rsi_weight: f64,
    pub rsi_extreme_weight: f64,

    pub macd_weight: f64,
    /// Added when the histogram moves further from zero
    pub macd_momentum_boost: f64,

    pub bollinger_weight: f64,
    /// Price within this percent of a band counts as touching it
    pub bollinger_proximity_pct: f64,

    pub support_resistance_weight: f64,
    pub support_resistance_proximity_pct: f64,

    /// Indexed by trend tier: bullish/bearish, strong, extreme
    pub trend_weights: [f64; 3],

    pub price_change_weight: f64,
    /// Single-period change (percent) that counts as a large move
    pub price_change_threshold_pct: f64,

    /// Coefficient of variation (percent) above which confidence is reduced
    pub volatility_threshold_pct: f64,
    pub volatility_confidence_factor: f64,

    pub buy_threshold: f64,
    pub strong_buy_threshold: f64,
    pub sell_threshold: f64,
    pub strong_sell_threshold: f64,
    /// Strong signals also need the winning score to exceed the other by this ratio
    pub strong_dominance_ratio: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            rsi_oversold: 30.0,
            rsi_extreme_oversold: 20.0,
            rsi_overbought: 70.0,
            rsi_extreme_overbought: 80.0,
            rsi_weight: 1.0,
            rsi_extreme_weight: 1.5,
            macd_weight: 1.0,
            macd_momentum_boost: 0.5,
            bollinger_weight: 1.0,
            bollinger_proximity_pct: 0.5,
            support_resistance_weight: 0.8,
            support_resistance_proximity_pct: 2.0,
            trend_weights: [0.5, 1.0, 1.5],
            price_change_weight: 1.0,
            price_change_threshold_pct: 1.0,
            volatility_threshold_pct: 1.5,
            volatility_confidence_factor: 0.8,
            buy_threshold: 1.5,
            strong_buy_threshold: 3.0,
            sell_threshold: 1.5,
            strong_sell_threshold: 3.0,
            strong_dominance_ratio: 1.5,
        }
    }
}

impl SignalWeights {
    /// Load a JSON weights table; missing fields keep their defaults
    pub fn from_json_file(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::WeightsFile {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::WeightsFile {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub domestic_threshold: f64,
    pub international_threshold: f64,
    pub window_size: usize,
    pub cooldown: Duration,
    pub daily_cap: u32,
    pub alert_on_rise: bool,
    pub analysis_enabled: bool,
    pub analysis_min_confidence: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            domestic_threshold: DEFAULT_ALERT_DOMESTIC_THRESHOLD,
            international_threshold: DEFAULT_ALERT_INTERNATIONAL_THRESHOLD,
            window_size: DEFAULT_ALERT_WINDOW_SIZE,
            cooldown: Duration::from_secs(DEFAULT_ALERT_COOLDOWN_SECS),
            daily_cap: DEFAULT_ALERT_DAILY_CAP,
            alert_on_rise: false,
            analysis_enabled: true,
            analysis_min_confidence: DEFAULT_ALERT_ANALYSIS_MIN_CONFIDENCE,
        }
    }
}

impl AlertConfig {
    pub fn threshold(&self, market: crate::models::quote::Market) -> f64 {
        match market {
            crate::models::quote::Market::Domestic => self.domestic_threshold,
            crate::models::quote::Market::International => self.international_threshold,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChannelConfig {
    pub email_api_url: String,
    pub email_api_key: Option<String>,
    pub email_from: Option<String>,
    pub email_to: Option<String>,
    pub webhook_url: Option<String>,
    pub push_api_url: String,
    pub push_token: Option<String>,
    pub timeout: Duration,
    pub retry_queue_cap: usize,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub sync_interval: Duration,
    pub cycle_attempts: u32,
    pub retry_delay: Duration,
    pub stream_interval: Duration,
    pub retention_interval: Duration,
}

impl AppConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup: &lookup };

        let user_agents = match env.string(ENV_SOURCE_USER_AGENTS) {
            Some(raw) => raw
                .split('|')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
        };

        let signal_weights = match env.string(ENV_SIGNAL_WEIGHTS_PATH) {
            Some(path) => SignalWeights::from_json_file(&path)?,
            None => SignalWeights::default(),
        };

        Ok(Self {
            server: ServerConfig {
                bind_addr: env
                    .string(ENV_BIND_ADDR)
                    .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
                database_url: env.string(ENV_DATABASE_URL),
            },
            sources: SourceConfig {
                timeout: Duration::from_millis(env.parse(ENV_SOURCE_TIMEOUT_MS, DEFAULT_SOURCE_TIMEOUT_MS)?),
                max_attempts: env.parse(ENV_SOURCE_MAX_ATTEMPTS, DEFAULT_SOURCE_MAX_ATTEMPTS)?.max(1),
                backoff_base: Duration::from_millis(
                    env.parse(ENV_SOURCE_BACKOFF_BASE_MS, DEFAULT_SOURCE_BACKOFF_BASE_MS)?,
                ),
                user_agents,
                cache_freshness: Duration::from_secs(
                    env.parse(ENV_SOURCE_CACHE_FRESHNESS_SECS, DEFAULT_SOURCE_CACHE_FRESHNESS_SECS)?,
                ),
                synthetic_fallback: env.flag(ENV_SOURCE_SYNTHETIC_FALLBACK, true)?,
                synthetic_domestic_price: env
                    .parse(ENV_SYNTHETIC_DOMESTIC_PRICE, DEFAULT_SYNTHETIC_DOMESTIC_PRICE)?,
                synthetic_international_price: env.parse(
                    ENV_SYNTHETIC_INTERNATIONAL_PRICE,
                    DEFAULT_SYNTHETIC_INTERNATIONAL_PRICE,
                )?,
                default_fx_rate: env.parse(ENV_DEFAULT_FX_RATE, DEFAULT_FX_RATE)?,
                sina_quote_url: env
                    .string(ENV_SINA_QUOTE_URL)
                    .unwrap_or_else(|| DEFAULT_SINA_QUOTE_URL.to_string()),
                domestic_symbol: env
                    .string(ENV_DOMESTIC_SYMBOL)
                    .unwrap_or_else(|| DEFAULT_DOMESTIC_SYMBOL.to_string()),
                international_symbol: env
                    .string(ENV_INTERNATIONAL_SYMBOL)
                    .unwrap_or_else(|| DEFAULT_INTERNATIONAL_SYMBOL.to_string()),
                gold_api_url: env
                    .string(ENV_GOLD_API_URL)
                    .unwrap_or_else(|| DEFAULT_GOLD_API_URL.to_string()),
                fx_api_url: env
                    .string(ENV_FX_API_URL)
                    .unwrap_or_else(|| DEFAULT_FX_API_URL.to_string()),
            },
            store: StoreConfig {
                freshness: Duration::from_secs(env.parse(ENV_PRICE_FRESHNESS_SECS, DEFAULT_PRICE_FRESHNESS_SECS)?),
                latest_ttl: Duration::from_secs(env.parse(ENV_LATEST_TTL_SECS, DEFAULT_LATEST_TTL_SECS)?),
                history_cap: env.parse(ENV_HISTORY_CAP, DEFAULT_HISTORY_CAP)?.max(1),
                retention_days: env.parse(ENV_HISTORY_RETENTION_DAYS, DEFAULT_HISTORY_RETENTION_DAYS)?,
                utc_offset_hours: env.parse(ENV_MARKET_UTC_OFFSET_HOURS, DEFAULT_MARKET_UTC_OFFSET_HOURS)?,
            },
            acquisition: AcquisitionConfig {
                inflight_wait: Duration::from_millis(
                    env.parse(ENV_ACQUISITION_WAIT_MS, DEFAULT_ACQUISITION_WAIT_MS)?,
                ),
            },
            indicators: IndicatorConfig::default(),
            trend: TrendConfig::default(),
            signal_weights,
            alerts: AlertConfig {
                domestic_threshold: env
                    .parse(ENV_ALERT_DOMESTIC_THRESHOLD, DEFAULT_ALERT_DOMESTIC_THRESHOLD)?,
                international_threshold: env.parse(
                    ENV_ALERT_INTERNATIONAL_THRESHOLD,
                    DEFAULT_ALERT_INTERNATIONAL_THRESHOLD,
                )?,
                window_size: env.parse(ENV_ALERT_WINDOW_SIZE, DEFAULT_ALERT_WINDOW_SIZE)?.max(2),
                cooldown: Duration::from_secs(env.parse(ENV_ALERT_COOLDOWN_SECS, DEFAULT_ALERT_COOLDOWN_SECS)?),
                daily_cap: env.parse(ENV_ALERT_DAILY_CAP, DEFAULT_ALERT_DAILY_CAP)?,
                alert_on_rise: env.flag(ENV_ALERT_ON_RISE, false)?,
                analysis_enabled: env.flag(ENV_ALERT_ANALYSIS_ENABLED, true)?,
                analysis_min_confidence: env.parse(
                    ENV_ALERT_ANALYSIS_MIN_CONFIDENCE,
                    DEFAULT_ALERT_ANALYSIS_MIN_CONFIDENCE,
                )?,
            },
            channels: ChannelConfig {
                email_api_url: env
                    .string(ENV_EMAIL_API_URL)
                    .unwrap_or_else(|| DEFAULT_EMAIL_API_URL.to_string()),
                email_api_key: env.string(ENV_EMAIL_API_KEY),
                email_from: env.string(ENV_EMAIL_FROM),
                email_to: env.string(ENV_EMAIL_TO),
                webhook_url: env.string(ENV_WEBHOOK_URL),
                push_api_url: env
                    .string(ENV_PUSH_API_URL)
                    .unwrap_or_else(|| DEFAULT_PUSH_API_URL.to_string()),
                push_token: env.string(ENV_PUSH_TOKEN),
                timeout: Duration::from_millis(env.parse(ENV_CHANNEL_TIMEOUT_MS, DEFAULT_CHANNEL_TIMEOUT_MS)?),
                retry_queue_cap: env.parse(ENV_RETRY_QUEUE_CAP, DEFAULT_RETRY_QUEUE_CAP)?.max(1),
            },
            scheduler: SchedulerConfig {
                sync_interval: Duration::from_secs(env.parse(ENV_SYNC_INTERVAL_SECS, DEFAULT_SYNC_INTERVAL_SECS)?.max(1)),
                cycle_attempts: env.parse(ENV_SYNC_CYCLE_ATTEMPTS, DEFAULT_SYNC_CYCLE_ATTEMPTS)?.max(1),
                retry_delay: Duration::from_secs(env.parse(ENV_SYNC_RETRY_DELAY_SECS, DEFAULT_SYNC_RETRY_DELAY_SECS)?),
                stream_interval: Duration::from_secs(
                    env.parse(ENV_STREAM_INTERVAL_SECS, DEFAULT_STREAM_INTERVAL_SECS)?.max(1),
                ),
                retention_interval: Duration::from_secs(
                    env.parse(ENV_RETENTION_INTERVAL_SECS, DEFAULT_RETENTION_INTERVAL_SECS)?.max(1),
                ),
            },
        })
    }

    /// Defaults with no environment at all
    pub fn defaults() -> Self {
        let empty: HashMap<String, String> = HashMap::new();
        match Self::from_lookup(|key| empty.get(key).cloned()) {
            Ok(config) => config,
            Err(_) => unreachable!("defaults never fail to parse"),
        }
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(key) {
            None => Ok(default),
            Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.string(key) {
            None => Ok(default),
            Some(raw) => match raw.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid {
                    key,
                    value: raw,
                    reason: "expected a boolean".to_string(),
                }),
            },
        }
    }
}
