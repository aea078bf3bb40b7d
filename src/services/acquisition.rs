//! Acquisition coordinator: concurrent fetch of both markets and the FX rate,
//! FX-derived fill-in for a missing market, and process-wide single-flight.
//!
//! At most one acquisition runs at a time. The first caller spawns it as a
//! detached task and publishes the result on a `watch` channel; concurrent
//! callers subscribe to the same channel and wait (bounded) for that result.
//! Because the work runs in its own task, a caller going away never cancels
//! an acquisition other callers are waiting on.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::{AppConfig, StoreConfig};
use crate::error::AcquisitionError;
use crate::models::history::HistoryEntry;
use crate::models::quote::{
    domestic_to_international, international_to_domestic, now_millis, CombinedQuote, Market,
    PriceSnapshot, Provenance, CALCULATED_PREFIX, TROY_OUNCE_GRAMS,
};
use crate::services::price_source::{FxRate, FxSourceAdapter, PriceSourceAdapter};
use crate::services::price_store::PriceStore;

type AcquisitionResult = Result<CombinedQuote, AcquisitionError>;
type InFlightSlot = Arc<Mutex<Option<watch::Receiver<Option<AcquisitionResult>>>>>;

/// Clears the in-flight slot when the acquisition task ends, including on panic
struct InFlightGuard(InFlightSlot);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

#[derive(Clone)]
pub struct AcquisitionCoordinator {
    domestic: PriceSourceAdapter,
    international: PriceSourceAdapter,
    fx: FxSourceAdapter,
    store: Arc<dyn PriceStore>,
    store_config: StoreConfig,
    inflight_wait: Duration,
    inflight: InFlightSlot,
}

impl AcquisitionCoordinator {
    pub fn new(
        domestic: PriceSourceAdapter,
        international: PriceSourceAdapter,
        fx: FxSourceAdapter,
        store: Arc<dyn PriceStore>,
        store_config: StoreConfig,
        inflight_wait: Duration,
    ) -> Self {
        Self {
            domestic,
            international,
            fx,
            store,
            store_config,
            inflight_wait,
            inflight: Arc::new(Mutex::new(None)),
        }
    }

    /// Coordinator over the default upstream providers
    pub fn from_config(config: &AppConfig, store: Arc<dyn PriceStore>) -> Self {
        Self::new(
            PriceSourceAdapter::from_config(Market::Domestic, &config.sources),
            PriceSourceAdapter::from_config(Market::International, &config.sources),
            FxSourceAdapter::from_config(&config.sources),
            store,
            config.store.clone(),
            config.acquisition.inflight_wait,
        )
    }

    pub fn is_in_flight(&self) -> bool {
        self.inflight.lock().is_some()
    }

    /// Fetch, reconcile and store a fresh quote, or join the acquisition already running
    pub async fn acquire(&self) -> AcquisitionResult {
        let (mut rx, leader) = {
            let mut slot = self.inflight.lock();
            match slot.as_ref() {
                Some(rx) => (rx.clone(), false),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx.clone());

                    let this = self.clone();
                    tokio::spawn(async move {
                        let _guard = InFlightGuard(this.inflight.clone());
                        let result = this.run().await;
                        let _ = tx.send(Some(result));
                    });
                    (rx, true)
                }
            }
        };

        if !leader {
            tracing::debug!("joining in-flight acquisition");
        }

        let outcome = if leader {
            rx.wait_for(|v| v.is_some()).await
        } else {
            match tokio::time::timeout(self.inflight_wait, rx.wait_for(|v| v.is_some())).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(AcquisitionError::InFlightTimeout(
                        self.inflight_wait.as_millis() as u64,
                    ));
                }
            }
        };

        match outcome {
            Ok(value) => match &*value {
                Some(result) => result.clone(),
                None => Err(AcquisitionError::Aborted),
            },
            Err(_) => Err(AcquisitionError::Aborted),
        }
    }

    async fn run(&self) -> AcquisitionResult {
        let (domestic_live, international_live, fx) = tokio::join!(
            self.domestic.fetch_live(),
            self.international.fetch_live(),
            self.fx.fetch(),
        );

        let mut domestic = match domestic_live {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(market = %Market::Domestic, error = %e, "live fetch failed");
                None
            }
        };
        let mut international = match international_live {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(market = %Market::International, error = %e, "live fetch failed");
                None
            }
        };

        // derive from the other market's live quote before touching stale fallbacks
        fill_derived(&mut domestic, &mut international, &fx);

        if domestic.is_none() {
            domestic = self.domestic.fallback().await.ok();
        }
        if international.is_none() {
            international = self.international.fallback().await.ok();
        }

        fill_derived(&mut domestic, &mut international, &fx);

        if domestic.is_none() && international.is_none() {
            tracing::error!("acquisition failed: no price for either market");
            return Err(AcquisitionError::BothMarketsUnavailable);
        }

        let quote = CombinedQuote::new(now_millis(), fx.rate, fx.source, domestic, international);
        self.write_through(&quote).await;

        tracing::info!(
            success = quote.success,
            domestic = ?quote.domestic.as_ref().map(|s| (s.price, s.source.as_str())),
            international = ?quote.international.as_ref().map(|s| (s.price, s.source.as_str())),
            fx = quote.exchange_rate,
            "acquired gold quote"
        );

        Ok(quote)
    }

    async fn write_through(&self, quote: &CombinedQuote) {
        self.store.write_latest(quote).await;

        // placeholder prices would register as price moves in history and stats
        let observed = without_synthetic(quote);
        if observed.domestic.is_none() && observed.international.is_none() {
            return;
        }

        let date = self.store_config.market_date(quote.timestamp);
        self.store
            .append_history(date, HistoryEntry::from_quote(&observed));
        self.store.update_daily_stats(date, &observed);
    }
}

/// Domestic CNY/g from international USD/oz, tagged as calculated
pub fn derive_domestic(international: &PriceSnapshot, fx_rate: f64) -> PriceSnapshot {
    let tagged = international.retagged(CALCULATED_PREFIX);
    let factor = international_to_domestic(1.0, fx_rate);
    tagged.converted(factor, tagged.source.clone())
}

/// International USD/oz from domestic CNY/g, tagged as calculated
pub fn derive_international(domestic: &PriceSnapshot, fx_rate: f64) -> PriceSnapshot {
    let tagged = domestic.retagged(CALCULATED_PREFIX);
    let factor = domestic_to_international(1.0, fx_rate);
    tagged.converted(factor, tagged.source.clone())
}

fn fill_derived(
    domestic: &mut Option<PriceSnapshot>,
    international: &mut Option<PriceSnapshot>,
    fx: &FxRate,
) {
    let fx_rate = fx.rate;
    if !fx_rate.is_finite() || fx_rate <= 0.0 {
        return;
    }
    if fx.is_default() && (domestic.is_none() != international.is_none()) {
        tracing::warn!(source = %fx.source, "no usable FX rate, not deriving missing market");
        return;
    }

    match (domestic.as_ref(), international.as_ref()) {
        (None, Some(intl)) if intl.provenance() != Provenance::Synthetic => {
            tracing::warn!(
                fx_rate,
                ounce_grams = TROY_OUNCE_GRAMS,
                "deriving domestic price from international"
            );
            *domestic = Some(derive_domestic(intl, fx_rate));
        }
        (Some(dom), None) if dom.provenance() != Provenance::Synthetic => {
            tracing::warn!(fx_rate, "deriving international price from domestic");
            *international = Some(derive_international(dom, fx_rate));
        }
        _ => {}
    }
}

fn without_synthetic(quote: &CombinedQuote) -> CombinedQuote {
    let keep = |s: &Option<PriceSnapshot>| {
        s.as_ref()
            .filter(|s| s.provenance() != Provenance::Synthetic)
            .cloned()
    };
    CombinedQuote::new(
        quote.timestamp,
        quote.exchange_rate,
        quote.exchange_rate_source.clone(),
        keep(&quote.domestic),
        keep(&quote.international),
    )
}
