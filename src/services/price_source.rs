//! Upstream price providers and the retrying source adapters around them
//!
//! A [`PriceSourceAdapter`] owns one market. `fetch_live` applies the per-call
//! timeout, bounded retry with exponential backoff and user-agent/provider
//! rotation. When that fails the adapter can still answer from its last-good
//! cache (tagged `Cached-`) or a static placeholder (tagged `Fallback-`).

use async_trait::async_trait;
use lazy_static::lazy_static;
use moka::future::Cache;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::models::quote::{now_millis, Market, PriceSnapshot, CACHED_PREFIX, FALLBACK_PREFIX};

const SINA_REFERER: &str = "https://finance.sina.com.cn";
const FX_CACHE_KEY: &str = "USD/CNY";

lazy_static! {
    static ref SINA_QUOTE_REGEX: Regex =
        Regex::new(r#"var hq_str_([A-Za-z0-9_]+)="([^"]*)""#).unwrap();
}

/// One upstream source of quotes for a single market
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_quote(&self, user_agent: &str) -> Result<PriceSnapshot, SourceError>;
}

/// One upstream source of the USD -> CNY rate
#[async_trait]
pub trait FxRateProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_rate(&self, user_agent: &str) -> Result<f64, SourceError>;
}

fn http_client() -> Client {
    Client::builder()
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
        .unwrap_or_default()
}

async fn get_checked(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, SourceError> {
    let response = request
        .send()
        .await
        .map_err(|e| SourceError::request(provider, e))?;

    if !response.status().is_success() {
        return Err(SourceError::Http {
            provider: provider.to_string(),
            status: response.status().as_u16(),
        });
    }

    Ok(response)
}

/// Sina text quote feed: `var hq_str_<SYM>="f0,f1,...";`
pub struct SinaQuoteProvider {
    client: Client,
    base_url: String,
    symbol: String,
    name: String,
}

impl SinaQuoteProvider {
    pub fn new(base_url: &str, symbol: &str) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.to_string(),
            symbol: symbol.to_string(),
            name: format!("Sina-{}", symbol),
        }
    }
}

/// Extract the quote for `symbol` from a Sina feed body
///
/// Fields: 0 last, 4 high, 5 low, 7 previous close, 8 open.
pub fn parse_sina_quote(
    provider: &str,
    symbol: &str,
    body: &str,
    timestamp: i64,
) -> Result<PriceSnapshot, SourceError> {
    let fields = SINA_QUOTE_REGEX
        .captures_iter(body)
        .find(|caps| &caps[1] == symbol)
        .map(|caps| caps[2].to_string())
        .ok_or_else(|| SourceError::malformed(provider, format!("no quote line for {}", symbol)))?;

    let values: Vec<&str> = fields.split(',').collect();
    let field = |idx: usize| -> f64 {
        values
            .get(idx)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    };

    let price = field(0);
    if price <= 0.0 {
        return Err(SourceError::malformed(
            provider,
            format!("empty or non-positive price in {:?}", fields),
        ));
    }

    Ok(PriceSnapshot::from_parts(
        price,
        field(8),
        field(4),
        field(5),
        field(7),
        provider,
        timestamp,
    ))
}

#[async_trait]
impl QuoteProvider for SinaQuoteProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_quote(&self, user_agent: &str) -> Result<PriceSnapshot, SourceError> {
        let url = format!("{}{}", self.base_url, self.symbol);
        let request = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .header(reqwest::header::REFERER, SINA_REFERER);

        let body = get_checked(&self.name, request)
            .await?
            .text()
            .await
            .map_err(|e| SourceError::request(&self.name, e))?;

        parse_sina_quote(&self.name, &self.symbol, &body, now_millis())
    }
}

#[derive(Debug, Deserialize)]
struct GoldApiResponse {
    price: f64,
}

/// JSON spot price feed for international gold (USD/oz)
pub struct GoldApiProvider {
    client: Client,
    url: String,
}

impl GoldApiProvider {
    pub fn new(url: &str) -> Self {
        Self {
            client: http_client(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl QuoteProvider for GoldApiProvider {
    fn name(&self) -> &str {
        "GoldApi"
    }

    async fn fetch_quote(&self, user_agent: &str) -> Result<PriceSnapshot, SourceError> {
        let request = self
            .client
            .get(&self.url)
            .header(reqwest::header::USER_AGENT, user_agent);

        let body: GoldApiResponse = get_checked(self.name(), request)
            .await?
            .json()
            .await
            .map_err(|e| SourceError::malformed(self.name(), e.to_string()))?;

        if !body.price.is_finite() || body.price <= 0.0 {
            return Err(SourceError::malformed(
                self.name(),
                format!("price {}", body.price),
            ));
        }

        // spot-only feed: no session open/high/low
        Ok(PriceSnapshot::from_parts(
            body.price,
            0.0,
            0.0,
            0.0,
            0.0,
            self.name(),
            now_millis(),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct ErApiResponse {
    rates: std::collections::HashMap<String, f64>,
}

/// open.er-api.com USD base rates
pub struct ErApiFxProvider {
    client: Client,
    url: String,
}

impl ErApiFxProvider {
    pub fn new(url: &str) -> Self {
        Self {
            client: http_client(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl FxRateProvider for ErApiFxProvider {
    fn name(&self) -> &str {
        "ErApi"
    }

    async fn fetch_rate(&self, user_agent: &str) -> Result<f64, SourceError> {
        let request = self
            .client
            .get(&self.url)
            .header(reqwest::header::USER_AGENT, user_agent);

        let body: ErApiResponse = get_checked(self.name(), request)
            .await?
            .json()
            .await
            .map_err(|e| SourceError::malformed(self.name(), e.to_string()))?;

        body.rates
            .get("CNY")
            .copied()
            .filter(|r| r.is_finite() && *r > 0.0)
            .ok_or_else(|| SourceError::malformed(self.name(), "missing CNY rate"))
    }
}

/// Run `call` with a per-attempt timeout, retrying with exponential backoff
///
/// `call` receives the attempt index so callers can rotate providers and user agents.
async fn with_retry<T, F, Fut>(
    label: &str,
    config: &SourceConfig,
    mut call: F,
) -> Result<T, SourceError>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, SourceError>>,
{
    let mut last_error = SourceError::NoProvider(label.to_string());

    for attempt in 0..config.max_attempts {
        let result = match tokio::time::timeout(config.timeout, call(attempt)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout {
                provider: label.to_string(),
                after_ms: config.timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::debug!(source = label, attempt, error = %e, "upstream attempt failed");
                last_error = e;
            }
        }

        if attempt + 1 < config.max_attempts {
            let delay = config.delay_for_attempt(attempt);
            tracing::warn!(
                "Retry {}/{} for {}. Waiting {:?}",
                attempt + 1,
                config.max_attempts,
                label,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    Err(SourceError::Exhausted {
        label: label.to_string(),
        attempts: config.max_attempts,
        last: Box::new(last_error),
    })
}

/// Fetches one market through a rotating provider pool
#[derive(Clone)]
pub struct PriceSourceAdapter {
    market: Market,
    providers: Vec<Arc<dyn QuoteProvider>>,
    config: SourceConfig,
    last_good: Arc<Cache<Market, PriceSnapshot>>,
}

impl PriceSourceAdapter {
    pub fn new(market: Market, providers: Vec<Arc<dyn QuoteProvider>>, config: SourceConfig) -> Self {
        let last_good = Cache::builder()
            .max_capacity(1)
            .time_to_live(config.cache_freshness)
            .build();

        Self {
            market,
            providers,
            config,
            last_good: Arc::new(last_good),
        }
    }

    /// Default Sina (+ gold-api for international) provider chain for `market`
    pub fn from_config(market: Market, config: &SourceConfig) -> Self {
        let providers: Vec<Arc<dyn QuoteProvider>> = match market {
            Market::Domestic => vec![Arc::new(SinaQuoteProvider::new(
                &config.sina_quote_url,
                &config.domestic_symbol,
            )) as Arc<dyn QuoteProvider>],
            Market::International => vec![
                Arc::new(SinaQuoteProvider::new(
                    &config.sina_quote_url,
                    &config.international_symbol,
                )) as Arc<dyn QuoteProvider>,
                Arc::new(GoldApiProvider::new(&config.gold_api_url)),
            ],
        };
        Self::new(market, providers, config.clone())
    }

    pub fn market(&self) -> Market {
        self.market
    }

    /// Live quote only: timeout, retry, rotation. Records the result as last-good.
    pub async fn fetch_live(&self) -> Result<PriceSnapshot, SourceError> {
        if self.providers.is_empty() {
            return Err(SourceError::NoProvider(self.market.to_string()));
        }

        let snapshot = with_retry(self.market.as_str(), &self.config, |attempt| {
            let provider = self.providers[attempt as usize % self.providers.len()].clone();
            let user_agent = self.config.user_agent(attempt).to_string();
            async move {
                let snapshot = provider.fetch_quote(&user_agent).await?;
                if !snapshot.price.is_finite() || snapshot.price <= 0.0 {
                    return Err(SourceError::malformed(
                        provider.name(),
                        format!("price {}", snapshot.price),
                    ));
                }
                Ok(snapshot)
            }
        })
        .await?;

        self.last_good.insert(self.market, snapshot.clone()).await;
        Ok(snapshot)
    }

    /// Last good live snapshot within the freshness bound, tagged `Cached-`
    pub async fn cached(&self) -> Option<PriceSnapshot> {
        self.last_good
            .get(&self.market)
            .await
            .map(|s| s.retagged(CACHED_PREFIX))
    }

    /// Static placeholder tagged `Fallback-`, when enabled
    pub fn synthetic(&self) -> Option<PriceSnapshot> {
        if !self.config.synthetic_fallback {
            return None;
        }
        let price = match self.market {
            Market::Domestic => self.config.synthetic_domestic_price,
            Market::International => self.config.synthetic_international_price,
        };
        Some(PriceSnapshot::from_parts(
            price,
            price,
            price,
            price,
            price,
            format!("{}Static", FALLBACK_PREFIX),
            now_millis(),
        ))
    }

    /// Cached, then synthetic
    pub async fn fallback(&self) -> Result<PriceSnapshot, SourceError> {
        if let Some(snapshot) = self.cached().await {
            tracing::warn!(market = %self.market, source = %snapshot.source, "serving cached snapshot");
            return Ok(snapshot);
        }
        if let Some(snapshot) = self.synthetic() {
            tracing::warn!(market = %self.market, "serving synthetic placeholder");
            return Ok(snapshot);
        }
        Err(SourceError::NoFallback(self.market))
    }

    /// Live quote, falling back to cached or synthetic data on persistent failure
    pub async fn fetch(&self) -> Result<PriceSnapshot, SourceError> {
        match self.fetch_live().await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                tracing::warn!(market = %self.market, error = %e, "live fetch failed, falling back");
                self.fallback().await
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FxRate {
    pub rate: f64,
    pub source: String,
}

impl FxRate {
    /// Neither live nor cached: the configured default stands in
    pub fn is_default(&self) -> bool {
        self.source.starts_with(FALLBACK_PREFIX)
    }
}

/// USD -> CNY rate with last-good cache and a configured default
#[derive(Clone)]
pub struct FxSourceAdapter {
    providers: Vec<Arc<dyn FxRateProvider>>,
    config: SourceConfig,
    last_good: Arc<Cache<&'static str, FxRate>>,
}

impl FxSourceAdapter {
    pub fn new(providers: Vec<Arc<dyn FxRateProvider>>, config: SourceConfig) -> Self {
        let last_good = Cache::builder()
            .max_capacity(1)
            .time_to_live(config.cache_freshness)
            .build();

        Self {
            providers,
            config,
            last_good: Arc::new(last_good),
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(
            vec![Arc::new(ErApiFxProvider::new(&config.fx_api_url))],
            config.clone(),
        )
    }

    /// Never fails: live, then cached, then the configured default rate
    pub async fn fetch(&self) -> FxRate {
        if !self.providers.is_empty() {
            let live = with_retry("fx", &self.config, |attempt| {
                let provider = self.providers[attempt as usize % self.providers.len()].clone();
                let user_agent = self.config.user_agent(attempt).to_string();
                async move {
                    let rate = provider.fetch_rate(&user_agent).await?;
                    Ok(FxRate {
                        rate,
                        source: provider.name().to_string(),
                    })
                }
            })
            .await;

            match live {
                Ok(fx) => {
                    self.last_good.insert(FX_CACHE_KEY, fx.clone()).await;
                    return fx;
                }
                Err(e) => tracing::warn!(error = %e, "FX rate fetch failed"),
            }
        }

        if let Some(cached) = self.last_good.get(FX_CACHE_KEY).await {
            return FxRate {
                rate: cached.rate,
                source: format!("{}{}", CACHED_PREFIX, cached.source),
            };
        }

        FxRate {
            rate: self.config.default_fx_rate,
            source: format!("{}Default", FALLBACK_PREFIX),
        }
    }
}

/// Zero-backoff source config for adapter tests
#[cfg(test)]
pub(crate) fn test_source_config() -> SourceConfig {
    let mut config = crate::config::AppConfig::defaults().sources;
    config.backoff_base = std::time::Duration::ZERO;
    config.timeout = std::time::Duration::from_millis(200);
    config
}
