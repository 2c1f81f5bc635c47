use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::OrderStatus;

/// Why the broker refused to complete an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Canceled,
    Margin,
    PolicyRejected,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Canceled => write!(f, "canceled"),
            RejectReason::Margin => write!(f, "margin"),
            RejectReason::PolicyRejected => write!(f, "rejected by broker policy"),
        }
    }
}

/// Errors raised by the trendbot core.
///
/// None of these are fatal: a failed page leaves a partial series, a rejected
/// order leaves the strategy where it was, and a warm-up miss is simply "no
/// decision" for that bar.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    #[error("malformed page: {reason}")]
    MalformedPage { reason: String },

    #[error("order rejected: {reason}")]
    OrderRejected { reason: RejectReason },

    #[error("duplicate fill for order {order_id}")]
    DuplicateFill { order_id: Uuid },

    #[error("insufficient warm-up: have {have} bars, need {needed}")]
    InsufficientWarmup { have: usize, needed: usize },

    #[error("fill for order {order_id} does not match the position: {reason}")]
    UnexpectedFill { order_id: Uuid, reason: String },

    #[error("invalid order transition {from:?} -> {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("bar at {timestamp} is not after the previous bar at {previous}")]
    OutOfOrderBar {
        timestamp: DateTime<Utc>,
        previous: DateTime<Utc>,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn source_unavailable(reason: impl Into<String>) -> Self {
        Error::SourceUnavailable {
            reason: reason.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedPage {
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::malformed(e.to_string())
        } else {
            Error::source_unavailable(e.to_string())
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
