#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use gold_price_backend::config::AppConfig;
use gold_price_backend::error::{DispatchError, SourceError};
use gold_price_backend::handlers;
use gold_price_backend::models::alert::ChannelKind;
use gold_price_backend::models::quote::{now_millis, Market, PriceSnapshot};
use gold_price_backend::services::acquisition::AcquisitionCoordinator;
use gold_price_backend::services::notifier::{AlertMessage, NotificationChannel, NotificationDispatcher};
use gold_price_backend::services::price_source::{
    FxRateProvider, FxSourceAdapter, PriceSourceAdapter, QuoteProvider,
};
use gold_price_backend::services::price_store::{MemoryPriceStore, PriceStore};
use gold_price_backend::AppState;

pub const DOMESTIC_PRICE: f64 = 680.0;
pub const INTERNATIONAL_PRICE: f64 = 2950.0;
pub const FX_RATE: f64 = 7.2;

/// Quote provider whose price and failure mode can be changed mid-test
pub struct MockQuoteProvider {
    price: f64,
    failing: AtomicBool,
    /// Fail this many calls before answering
    fail_first: AtomicUsize,
    pub calls: AtomicUsize,
}

impl MockQuoteProvider {
    pub fn new(price: f64) -> Arc<Self> {
        Arc::new(Self {
            price,
            failing: AtomicBool::new(false),
            fail_first: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        let provider = Self::new(0.0);
        provider.set_failing(true);
        provider
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fail_first(&self, n: usize) {
        self.fail_first.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteProvider for MockQuoteProvider {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn fetch_quote(&self, _user_agent: &str) -> Result<PriceSnapshot, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let pending = self.fail_first.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_first.store(pending - 1, Ordering::SeqCst);
            return Err(SourceError::Http {
                provider: "Mock".to_string(),
                status: 502,
            });
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Http {
                provider: "Mock".to_string(),
                status: 503,
            });
        }

        Ok(PriceSnapshot::from_parts(
            self.price,
            self.price,
            self.price,
            self.price,
            self.price,
            "Mock",
            now_millis(),
        ))
    }
}

pub struct FixedFx(pub f64);

#[async_trait]
impl FxRateProvider for FixedFx {
    fn name(&self) -> &str {
        "FixedFx"
    }

    async fn fetch_rate(&self, _user_agent: &str) -> Result<f64, SourceError> {
        Ok(self.0)
    }
}

/// Notification channel that records sends instead of calling out
pub struct RecordingChannel {
    kind: ChannelKind,
    configured: bool,
    fail: bool,
    pub sent: AtomicUsize,
}

impl RecordingChannel {
    pub fn new(kind: ChannelKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            configured: true,
            fail: false,
            sent: AtomicUsize::new(0),
        })
    }

    pub fn failing(kind: ChannelKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            configured: true,
            fail: true,
            sent: AtomicUsize::new(0),
        })
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn send(&self, _message: &AlertMessage) -> Result<(), DispatchError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DispatchError::Http {
                channel: self.kind,
                status: 500,
                body: "boom".to_string(),
            });
        }
        Ok(())
    }
}

/// Defaults tuned for tests: one attempt per source, no backoff, no placeholders
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::defaults();
    config.sources.max_attempts = 1;
    config.sources.backoff_base = Duration::ZERO;
    config.sources.timeout = Duration::from_millis(500);
    config.sources.synthetic_fallback = false;
    config.scheduler.retry_delay = Duration::ZERO;
    config.scheduler.cycle_attempts = 3;
    config.acquisition.inflight_wait = Duration::from_secs(2);
    config
}

pub struct TestApp {
    pub state: AppState,
    pub domestic: Arc<MockQuoteProvider>,
    pub international: Arc<MockQuoteProvider>,
    pub email: Arc<RecordingChannel>,
    pub webhook: Arc<RecordingChannel>,
    pub push: Arc<RecordingChannel>,
}

impl TestApp {
    pub fn router(&self) -> Router {
        handlers::router(self.state.clone())
    }
}

pub fn build_test_app_with(
    config: AppConfig,
    domestic: Arc<MockQuoteProvider>,
    international: Arc<MockQuoteProvider>,
) -> TestApp {
    let store: Arc<dyn PriceStore> = Arc::new(MemoryPriceStore::new(&config.store));

    let coordinator = AcquisitionCoordinator::new(
        PriceSourceAdapter::new(
            Market::Domestic,
            vec![domestic.clone() as Arc<dyn QuoteProvider>],
            config.sources.clone(),
        ),
        PriceSourceAdapter::new(
            Market::International,
            vec![international.clone() as Arc<dyn QuoteProvider>],
            config.sources.clone(),
        ),
        FxSourceAdapter::new(
            vec![Arc::new(FixedFx(FX_RATE)) as Arc<dyn FxRateProvider>],
            config.sources.clone(),
        ),
        store.clone(),
        config.store.clone(),
        config.acquisition.inflight_wait,
    );

    let email = RecordingChannel::new(ChannelKind::Email);
    let webhook = RecordingChannel::new(ChannelKind::Webhook);
    let push = RecordingChannel::new(ChannelKind::Push);
    let dispatcher = Arc::new(NotificationDispatcher::new(
        vec![
            email.clone() as Arc<dyn NotificationChannel>,
            webhook.clone() as Arc<dyn NotificationChannel>,
            push.clone() as Arc<dyn NotificationChannel>,
        ],
        Duration::from_secs(1),
        16,
    ));

    let state = AppState::assemble(config, None, store, coordinator, dispatcher);

    TestApp {
        state,
        domestic,
        international,
        email,
        webhook,
        push,
    }
}

pub fn build_test_app() -> TestApp {
    build_test_app_with(
        test_config(),
        MockQuoteProvider::new(DOMESTIC_PRICE),
        MockQuoteProvider::new(INTERNATIONAL_PRICE),
    )
}

pub async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read_json(response).await
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read_json(response).await
}

async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}
