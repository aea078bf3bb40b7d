//! Alert events, channel selection and dispatch results

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::quote::Market;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Window,
    Analysis,
}

/// Alert types tracked by the engine's state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    DomesticWindow,
    InternationalWindow,
    Analysis,
}

impl AlertKind {
    pub fn window(market: Market) -> Self {
        match market {
            Market::Domestic => AlertKind::DomesticWindow,
            Market::International => AlertKind::InternationalWindow,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertDirection {
    Up,
    Down,
    Volatile,
}

impl AlertDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertDirection::Up => "up",
            AlertDirection::Down => "down",
            AlertDirection::Volatile => "volatile",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Graded by how far the range overshoots the threshold
    pub fn for_range(range: f64, threshold: f64) -> Self {
        if threshold <= 0.0 {
            return Severity::Info;
        }
        let ratio = range / threshold;
        if ratio >= 2.0 {
            Severity::Critical
        } else if ratio >= 1.5 {
            Severity::Warning
        } else {
            Severity::Info
        }
    }
}

/// A fired threshold trigger, consumed immediately by the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub market: Market,
    pub name: String,
    pub current: f64,
    pub max: f64,
    pub min: f64,
    pub range: f64,
    pub direction: AlertDirection,
    pub severity: Severity,
    pub timestamp: i64,
}

impl AlertEvent {
    pub fn kind(&self) -> AlertKind {
        match self.alert_type {
            AlertType::Window => AlertKind::window(self.market),
            AlertType::Analysis => AlertKind::Analysis,
        }
    }
}

/// Global cooldown and daily cap shared by every alert type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertCooldownState {
    pub last_alert_timestamp: Option<i64>,
    pub daily_alert_count: u32,
    pub day: chrono::NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPhase {
    Idle,
    Triggered,
    CoolingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Webhook,
    Push,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Webhook => "webhook",
            ChannelKind::Push => "push",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelSelector {
    Email,
    Webhook,
    Push,
    All,
}

impl ChannelSelector {
    pub fn matches(&self, kind: ChannelKind) -> bool {
        match self {
            ChannelSelector::All => true,
            ChannelSelector::Email => kind == ChannelKind::Email,
            ChannelSelector::Webhook => kind == ChannelKind::Webhook,
            ChannelSelector::Push => kind == ChannelKind::Push,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Sent,
    Failed,
    NotConfigured,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelResult {
    pub channel: ChannelKind,
    pub status: ChannelStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub results: Vec<ChannelResult>,
}

impl DispatchReport {
    pub fn sent_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == ChannelStatus::Sent)
            .count()
    }

    pub fn result(&self, channel: ChannelKind) -> Option<&ChannelResult> {
        self.results.iter().find(|r| r.channel == channel)
    }
}

/// A failed channel send kept for a later redelivery job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedDelivery {
    pub channel: ChannelKind,
    pub alert_name: String,
    pub title: String,
    pub body: String,
    pub error: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertTestRequest {
    #[serde(default = "default_selector")]
    pub channel: ChannelSelector,
}

fn default_selector() -> ChannelSelector {
    ChannelSelector::All
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertTestResponse {
    pub success: bool,
    pub event: AlertEvent,
    pub report: DispatchReport,
}
