// Trading strategy module
pub mod signals;
pub mod tunnel;

use chrono::{DateTime, Utc};

use crate::models::{Candle, Direction, ExitReason, Order, Position};
use crate::Result;

pub use signals::{entry_signal, exit_check, ExitLevels};
pub use tunnel::TunnelStrategy;

/// Everything a strategy may look at for one bar
#[derive(Debug, Clone, Copy)]
pub struct BarContext<'a> {
    pub candle: &'a Candle,
    /// `None` until the fast EMA has seen enough bars
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    /// Bars consumed so far, this one included
    pub bars_seen: usize,
    pub position: &'a Position,
    /// An earlier order has not reached a terminal state yet
    pub has_pending_order: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Enter {
        direction: Direction,
        size: f64,
    },
    Exit {
        direction: Direction,
        size: f64,
        reason: ExitReason,
    },
    Hold,
}

impl Action {
    /// The broker order for this action, `None` for `Hold`
    pub fn to_order(&self, at: DateTime<Utc>) -> Option<Order> {
        match *self {
            Action::Enter { direction, size } => Some(Order::entry(direction.entry_side(), size, at)),
            Action::Exit {
                direction,
                size,
                reason,
            } => Some(Order::exit(direction.exit_side(), size, reason, at)),
            Action::Hold => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub action: Action,
    pub reason: String,
}

impl Decision {
    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            action: Action::Hold,
            reason: reason.into(),
        }
    }
}

/// Base trait for bar-by-bar trading strategies
pub trait Strategy: Send + Sync {
    /// Decide what to do on this bar.
    ///
    /// Returns `Error::InsufficientWarmup` when the indicators cannot support
    /// a decision yet.
    fn decide(&self, ctx: &BarContext<'_>) -> Result<Decision>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum bars before the first decision is possible
    fn min_candles_required(&self) -> usize;
}
