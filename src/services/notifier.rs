//! Multi-channel alert delivery
//!
//! Channels are invoked concurrently and independently. A failed send is
//! recorded in a bounded retry queue instead of being retried inline.

use async_trait::async_trait;
use chrono::DateTime;
use futures_util::future::join_all;
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ChannelConfig;
use crate::error::DispatchError;
use crate::models::alert::{
    AlertEvent, ChannelKind, ChannelResult, ChannelSelector, ChannelStatus, DispatchReport,
    FailedDelivery,
};
use crate::models::analysis::TradingSignal;
use crate::models::quote::now_millis;

const TOP_SIGNALS: usize = 3;

/// Human-readable payload shared by every channel
#[derive(Debug, Clone, PartialEq)]
pub struct AlertMessage {
    pub title: String,
    pub body: String,
}

impl AlertMessage {
    pub fn compose(event: &AlertEvent, context: Option<&TradingSignal>) -> Self {
        let unit = event.market.unit();
        let title = format!(
            "[{:?}] {}: {} {:.2} {}",
            event.severity,
            event.name,
            event.direction.as_str(),
            event.range,
            unit
        );

        let mut lines = vec![
            event.name.clone(),
            format!("Current: {:.2} {}", event.current, unit),
            format!("Max: {:.2} {}", event.max, unit),
            format!("Min: {:.2} {}", event.min, unit),
            format!(
                "Range: {:.2} {} ({})",
                event.range,
                unit,
                event.direction.as_str()
            ),
        ];

        if let Some(time) = DateTime::from_timestamp_millis(event.timestamp) {
            lines.push(format!("Time: {}", time.to_rfc3339()));
        }

        if let Some(signal) = context {
            lines.push(String::new());
            lines.push(format!(
                "Recommendation: {} (confidence {:.0}%, buy {:.1} / sell {:.1})",
                signal.recommendation, signal.confidence, signal.buy_score, signal.sell_score
            ));
            let top = signal.top_signals(TOP_SIGNALS);
            if !top.is_empty() {
                lines.push("Top signals:".to_string());
                for s in top {
                    lines.push(format!("- {}: {}", s.indicator.as_str(), s.reason));
                }
            }
        }

        Self {
            title,
            body: lines.join("\n"),
        }
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// False when credentials or endpoints are missing
    fn is_configured(&self) -> bool;

    async fn send(&self, message: &AlertMessage) -> Result<(), DispatchError>;
}

async fn post_json(
    channel: ChannelKind,
    request: reqwest::RequestBuilder,
    payload: serde_json::Value,
) -> Result<(), DispatchError> {
    let response = request
        .json(&payload)
        .send()
        .await
        .map_err(|e| DispatchError::Request {
            channel,
            message: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(DispatchError::Http {
            channel,
            status: status.as_u16(),
            body,
        });
    }
    Ok(())
}

/// Transactional email over an HTTP API (bearer key)
pub struct EmailChannel {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

impl EmailChannel {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.email_api_url.clone(),
            api_key: config.email_api_key.clone(),
            from: config.email_from.clone(),
            to: config.email_to.clone(),
        }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.from.is_some() && self.to.is_some()
    }

    async fn send(&self, message: &AlertMessage) -> Result<(), DispatchError> {
        let (Some(key), Some(from), Some(to)) = (&self.api_key, &self.from, &self.to) else {
            return Err(DispatchError::NotConfigured(self.kind()));
        };

        let request = self.client.post(&self.api_url).bearer_auth(key);
        let payload = json!({
            "from": from,
            "to": [to],
            "subject": message.title,
            "text": message.body,
        });
        post_json(self.kind(), request, payload).await
    }
}

/// Chat-style incoming webhook
pub struct WebhookChannel {
    client: Client,
    url: Option<String>,
}

impl WebhookChannel {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            client: Client::new(),
            url: config.webhook_url.clone(),
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    async fn send(&self, message: &AlertMessage) -> Result<(), DispatchError> {
        let Some(url) = &self.url else {
            return Err(DispatchError::NotConfigured(self.kind()));
        };

        let payload = json!({
            "msgtype": "text",
            "text": { "content": format!("{}\n\n{}", message.title, message.body) },
        });
        post_json(self.kind(), self.client.post(url), payload).await
    }
}

/// Token-authenticated push API
pub struct PushChannel {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl PushChannel {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.push_api_url.clone(),
            token: config.push_token.clone(),
        }
    }
}

#[async_trait]
impl NotificationChannel for PushChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Push
    }

    fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    async fn send(&self, message: &AlertMessage) -> Result<(), DispatchError> {
        let Some(token) = &self.token else {
            return Err(DispatchError::NotConfigured(self.kind()));
        };

        let payload = json!({
            "token": token,
            "title": message.title,
            "content": message.body,
            "template": "txt",
        });
        post_json(self.kind(), self.client.post(&self.api_url), payload).await
    }
}

pub struct NotificationDispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
    timeout: Duration,
    retry_queue: Mutex<VecDeque<FailedDelivery>>,
    retry_cap: usize,
}

impl NotificationDispatcher {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>, timeout: Duration, retry_cap: usize) -> Self {
        Self {
            channels,
            timeout,
            retry_queue: Mutex::new(VecDeque::new()),
            retry_cap: retry_cap.max(1),
        }
    }

    /// Email, webhook and push channels from configuration
    pub fn from_config(config: &ChannelConfig) -> Self {
        let channels: Vec<Arc<dyn NotificationChannel>> = vec![
            Arc::new(EmailChannel::new(config)) as Arc<dyn NotificationChannel>,
            Arc::new(WebhookChannel::new(config)),
            Arc::new(PushChannel::new(config)),
        ];
        Self::new(channels, config.timeout, config.retry_queue_cap)
    }

    pub fn configured_channels(&self) -> Vec<ChannelKind> {
        self.channels
            .iter()
            .filter(|c| c.is_configured())
            .map(|c| c.kind())
            .collect()
    }

    pub async fn dispatch(&self, event: &AlertEvent, context: Option<&TradingSignal>) -> DispatchReport {
        self.dispatch_to(ChannelSelector::All, event, context).await
    }

    /// Send to every selected channel concurrently; one channel never blocks another
    pub async fn dispatch_to(
        &self,
        selector: ChannelSelector,
        event: &AlertEvent,
        context: Option<&TradingSignal>,
    ) -> DispatchReport {
        let message = AlertMessage::compose(event, context);

        let sends = self
            .channels
            .iter()
            .filter(|c| selector.matches(c.kind()))
            .map(|channel| self.send_one(channel.clone(), &message));

        let results = join_all(sends).await;

        for result in &results {
            if let (ChannelStatus::Failed, Some(error)) = (result.status, &result.error) {
                self.enqueue_failure(FailedDelivery {
                    channel: result.channel,
                    alert_name: event.name.clone(),
                    title: message.title.clone(),
                    body: message.body.clone(),
                    error: error.clone(),
                    timestamp: now_millis(),
                });
            }
        }

        let report = DispatchReport { results };
        tracing::info!(
            alert = %event.name,
            sent = report.sent_count(),
            channels = report.results.len(),
            "alert dispatched"
        );
        report
    }

    async fn send_one(&self, channel: Arc<dyn NotificationChannel>, message: &AlertMessage) -> ChannelResult {
        let kind = channel.kind();
        if !channel.is_configured() {
            tracing::debug!(channel = %kind, "channel not configured, skipping");
            return ChannelResult {
                channel: kind,
                status: ChannelStatus::NotConfigured,
                error: None,
            };
        }

        let outcome = match tokio::time::timeout(self.timeout, channel.send(message)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(DispatchError::Timeout {
                channel: kind,
                after_ms: self.timeout.as_millis() as u64,
            }),
        };

        match outcome {
            Ok(()) => ChannelResult {
                channel: kind,
                status: ChannelStatus::Sent,
                error: None,
            },
            Err(DispatchError::NotConfigured(_)) => ChannelResult {
                channel: kind,
                status: ChannelStatus::NotConfigured,
                error: None,
            },
            Err(e) => {
                tracing::warn!(channel = %kind, error = %e, "alert delivery failed");
                ChannelResult {
                    channel: kind,
                    status: ChannelStatus::Failed,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn enqueue_failure(&self, failure: FailedDelivery) {
        let mut queue = self.retry_queue.lock();
        queue.push_back(failure);
        while queue.len() > self.retry_cap {
            queue.pop_front();
        }
    }

    pub fn retry_queue_len(&self) -> usize {
        self.retry_queue.lock().len()
    }

    /// Snapshot of queued failures, oldest first
    pub fn failed_deliveries(&self) -> Vec<FailedDelivery> {
        self.retry_queue.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::alert::{AlertDirection, AlertType, Severity};
    use crate::models::analysis::{Recommendation, RiskLevel, Signal, SignalSide, SignalSource};
    use crate::models::quote::Market;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockChannel {
        kind: ChannelKind,
        configured: bool,
        fail: bool,
        sends: AtomicUsize,
    }

    impl MockChannel {
        fn new(kind: ChannelKind, configured: bool, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                kind,
                configured,
                fail,
                sends: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl NotificationChannel for MockChannel {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn send(&self, _message: &AlertMessage) -> Result<(), DispatchError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(DispatchError::Http {
                    channel: self.kind,
                    status: 500,
                    body: "boom".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn event() -> AlertEvent {
        AlertEvent {
            alert_type: AlertType::Window,
            market: Market::Domestic,
            name: "Domestic gold price window alert".to_string(),
            current: 673.0,
            max: 682.0,
            min: 673.0,
            range: 9.0,
            direction: AlertDirection::Down,
            severity: Severity::Warning,
            timestamp: 1_760_000_000_000,
        }
    }

    fn signal() -> TradingSignal {
        let mk = |indicator, weight: f64, reason: &str| Signal {
            indicator,
            side: SignalSide::Buy,
            weight,
            value: 0.0,
            reason: reason.to_string(),
        };
        TradingSignal {
            signals: vec![
                mk(SignalSource::PriceChange, 1.0, "Sharp drop"),
                mk(SignalSource::Rsi, 1.5, "RSI 15.0 is extremely oversold (< 20)"),
                mk(SignalSource::SupportResistance, 0.8, "Near support"),
                mk(SignalSource::Macd, 1.2, "MACD cross"),
            ],
            buy_score: 4.5,
            sell_score: 0.0,
            net_score: 4.5,
            recommendation: Recommendation::StrongBuy,
            risk_level: RiskLevel::Low,
            confidence: 80.0,
            is_buy_signal: true,
            is_strong_signal: true,
        }
    }

    fn dispatcher(channels: &[&Arc<MockChannel>], cap: usize) -> NotificationDispatcher {
        let channels = channels
            .iter()
            .map(|c| (*c).clone() as Arc<dyn NotificationChannel>)
            .collect();
        NotificationDispatcher::new(channels, Duration::from_secs(1), cap)
    }

    #[tokio::test]
    async fn test_failing_email_does_not_block_other_channels() {
        let email = MockChannel::new(ChannelKind::Email, true, true);
        let webhook = MockChannel::new(ChannelKind::Webhook, true, false);
        let push = MockChannel::new(ChannelKind::Push, true, false);
        let d = dispatcher(&[&email, &webhook, &push], 50);

        let report = d.dispatch(&event(), None).await;

        assert_eq!(report.result(ChannelKind::Email).unwrap().status, ChannelStatus::Failed);
        assert_eq!(report.result(ChannelKind::Webhook).unwrap().status, ChannelStatus::Sent);
        assert_eq!(report.result(ChannelKind::Push).unwrap().status, ChannelStatus::Sent);
        assert_eq!(webhook.sends.load(Ordering::SeqCst), 1);
        assert_eq!(push.sends.load(Ordering::SeqCst), 1);
        assert_eq!(d.retry_queue_len(), 1);
        assert_eq!(d.failed_deliveries()[0].channel, ChannelKind::Email);
    }

    #[tokio::test]
    async fn test_unconfigured_channel_is_skipped_visibly() {
        let email = MockChannel::new(ChannelKind::Email, false, false);
        let d = dispatcher(&[&email], 50);

        let report = d.dispatch(&event(), None).await;
        let result = report.result(ChannelKind::Email).unwrap();
        assert_eq!(result.status, ChannelStatus::NotConfigured);
        assert_eq!(email.sends.load(Ordering::SeqCst), 0);
        assert_eq!(d.retry_queue_len(), 0);
        assert!(d.configured_channels().is_empty());
    }

    #[tokio::test]
    async fn test_selector_limits_channels() {
        let email = MockChannel::new(ChannelKind::Email, true, false);
        let push = MockChannel::new(ChannelKind::Push, true, false);
        let d = dispatcher(&[&email, &push], 50);

        let report = d.dispatch_to(ChannelSelector::Push, &event(), None).await;
        assert_eq!(report.results.len(), 1);
        assert_eq!(email.sends.load(Ordering::SeqCst), 0);
        assert_eq!(push.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_queue_evicts_oldest() {
        let email = MockChannel::new(ChannelKind::Email, true, true);
        let d = dispatcher(&[&email], 2);

        for i in 0..3 {
            let mut e = event();
            e.name = format!("alert {}", i);
            d.dispatch(&e, None).await;
        }

        let names: Vec<String> = d.failed_deliveries().into_iter().map(|f| f.alert_name).collect();
        assert_eq!(names, vec!["alert 1", "alert 2"]);
    }

    #[test]
    fn test_message_includes_units_and_top_signals() {
        let message = AlertMessage::compose(&event(), Some(&signal()));
        assert!(message.body.contains("Current: 673.00 CNY/g"));
        assert!(message.body.contains("Range: 9.00 CNY/g (down)"));
        assert!(message.body.contains("Recommendation: strong buy"));
        assert!(message.body.contains("- RSI: RSI 15.0 is extremely oversold"));
        assert!(message.body.contains("- MACD"));
        assert!(message.body.contains("- Price change"));
        // only the top 3 by weight
        assert!(!message.body.contains("Near support"));
        assert!(message.title.contains("down 9.00 CNY/g"));
    }

    #[test]
    fn test_message_without_context() {
        let message = AlertMessage::compose(&event(), None);
        assert!(!message.body.contains("Recommendation"));
        assert!(message.body.starts_with("Domestic gold price window alert"));
    }
}
