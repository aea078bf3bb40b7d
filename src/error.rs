//! Error taxonomy for price acquisition, notification and configuration.
//!
//! Indicator unavailability is not represented here: indicators return
//! `Option::None` when there is not enough history.

use thiserror::Error;

use crate::models::alert::ChannelKind;
use crate::models::quote::Market;

/// A single upstream fetch failed, timed out or returned malformed data.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("{provider} timed out after {after_ms}ms")]
    Timeout { provider: String, after_ms: u64 },

    #[error("{provider} returned HTTP {status}")]
    Http { provider: String, status: u16 },

    #[error("{provider} request failed: {message}")]
    Request { provider: String, message: String },

    #[error("{provider} returned malformed data: {detail}")]
    Malformed { provider: String, detail: String },

    #[error("no provider configured for {0}")]
    NoProvider(String),

    #[error("{label} unavailable after {attempts} attempts: {last}")]
    Exhausted {
        label: String,
        attempts: u32,
        last: Box<SourceError>,
    },

    #[error("no live, cached or synthetic price for {0}")]
    NoFallback(Market),
}

impl SourceError {
    pub fn request(provider: &str, err: reqwest::Error) -> Self {
        SourceError::Request {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }

    pub fn malformed(provider: &str, detail: impl Into<String>) -> Self {
        SourceError::Malformed {
            provider: provider.to_string(),
            detail: detail.into(),
        }
    }
}

/// Acquisition-level failures, surfaced to the read path and the scheduler.
#[derive(Debug, Clone, Error)]
pub enum AcquisitionError {
    #[error("both domestic and international prices are unavailable")]
    BothMarketsUnavailable,

    #[error("timed out after {0}ms waiting for the in-flight acquisition")]
    InFlightTimeout(u64),

    #[error("in-flight acquisition ended without a result")]
    Aborted,
}

/// Delivery failure on one notification channel.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("{0} channel is not configured")]
    NotConfigured(ChannelKind),

    #[error("{channel} returned HTTP {status}: {body}")]
    Http {
        channel: ChannelKind,
        status: u16,
        body: String,
    },

    #[error("{channel} request failed: {message}")]
    Request { channel: ChannelKind, message: String },

    #[error("{channel} timed out after {after_ms}ms")]
    Timeout { channel: ChannelKind, after_ms: u64 },
}

/// Invalid configuration value read from the environment or a weights file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read signal weights from {path}: {reason}")]
    WeightsFile { path: String, reason: String },
}
