use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Candle, Fill, Order, OrderStatus};

/// Notifications a broker sends back about submitted orders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BrokerEvent {
    OrderStatus {
        order_id: Uuid,
        status: OrderStatus,
        timestamp: DateTime<Utc>,
    },
    Filled(Fill),
    /// A round trip finished on the broker's books
    TradeClosed {
        order_id: Uuid,
        pnl: f64,
        pnl_with_commission: f64,
        timestamp: DateTime<Utc>,
    },
}

impl BrokerEvent {
    pub fn order_id(&self) -> Uuid {
        match self {
            BrokerEvent::OrderStatus { order_id, .. } => *order_id,
            BrokerEvent::Filled(fill) => fill.order_id,
            BrokerEvent::TradeClosed { order_id, .. } => *order_id,
        }
    }
}

/// Where orders go. Events are pulled, never pushed, so the caller
/// controls the order in which the engine sees them.
pub trait Broker {
    /// Accept an order for execution and return its id
    fn submit(&mut self, order: &Order) -> Uuid;

    /// Advance to a new bar; returns everything that happened on it
    fn on_bar(&mut self, candle: &Candle) -> Vec<BrokerEvent>;

    /// Events produced outside `on_bar`, e.g. acknowledgements of `submit`
    fn drain_events(&mut self) -> Vec<BrokerEvent>;

    /// Orders submitted but not yet in a terminal state
    fn open_orders(&self) -> usize;
}
