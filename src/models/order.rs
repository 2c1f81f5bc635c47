use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::ExitReason;
use crate::error::{Error, RejectReason, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderIntent {
    Entry,
    Exit,
}

/// Order lifecycle as reported by the broker.
///
/// `Submitted -> Accepted -> Completed | Canceled | MarginRejected | Rejected`.
/// A broker may also refuse straight from `Submitted`. Terminal states never
/// change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Submitted,
    Accepted,
    Completed,
    Canceled,
    MarginRejected,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Submitted | OrderStatus::Accepted)
    }

    /// The rejection reason for the three refusal outcomes
    pub fn rejection(&self) -> Option<RejectReason> {
        match self {
            OrderStatus::Canceled => Some(RejectReason::Canceled),
            OrderStatus::MarginRejected => Some(RejectReason::Margin),
            OrderStatus::Rejected => Some(RejectReason::PolicyRejected),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Submitted, Accepted) => true,
            (Submitted, Canceled | MarginRejected | Rejected) => true,
            (Accepted, Completed | Canceled | MarginRejected | Rejected) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub side: Side,
    pub size: f64,
    pub intent: OrderIntent,
    pub status: OrderStatus,
    pub exit_reason: Option<ExitReason>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn entry(side: Side, size: f64, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            side,
            size,
            intent: OrderIntent::Entry,
            status: OrderStatus::Submitted,
            exit_reason: None,
            created_at,
        }
    }

    pub fn exit(side: Side, size: f64, reason: ExitReason, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            side,
            size,
            intent: OrderIntent::Exit,
            status: OrderStatus::Submitted,
            exit_reason: Some(reason),
            created_at,
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Move to `next`, returning the updated order
    pub fn transition(mut self, next: OrderStatus) -> Result<Order> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(self)
    }
}

/// Execution report for a completed order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: Uuid,
    pub price: f64,
    pub size: f64,
    pub commission: f64,
    pub timestamp: DateTime<Utc>,
}
