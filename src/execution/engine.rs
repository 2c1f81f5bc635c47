use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::StrategyConfig;
use crate::error::Error;
use crate::execution::broker::BrokerEvent;
use crate::execution::ledger::{FillOutcome, PositionLedger};
use crate::indicators::Ema;
use crate::models::{Candle, Fill, Order, OrderStatus, Position, Trade};
use crate::strategy::{BarContext, Strategy, TunnelStrategy};
use crate::Result;

/// Running counters, mostly for the backtest report
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EngineStats {
    pub bars_processed: usize,
    pub warmup_bars: usize,
    pub out_of_order_bars: usize,
    pub orders_submitted: usize,
    pub orders_completed: usize,
    pub orders_rejected: usize,
    pub duplicate_fills: usize,
}

/// Bar-driven strategy state: indicators, the ledger and the one order that
/// may be in flight.
///
/// Feed bars with [`on_bar`](Self::on_bar) and broker notifications with
/// [`handle_event`](Self::handle_event). The engine never talks to a broker
/// itself; it hands back the order to submit.
pub struct StrategyEngine<S = TunnelStrategy> {
    strategy: S,
    fast: Ema,
    slow: Ema,
    bars_seen: usize,
    last_bar: Option<DateTime<Utc>>,
    ledger: PositionLedger,
    // Unsettled orders only; the ledger remembers which ids were filled
    orders: HashMap<Uuid, Order>,
    pending: Option<Uuid>,
    stats: EngineStats,
}

impl StrategyEngine<TunnelStrategy> {
    pub fn tunnel(config: StrategyConfig) -> Self {
        let (fast, slow) = (config.ema_fast_period, config.ema_slow_period);
        Self::new(TunnelStrategy::new(config), fast, slow)
    }
}

impl<S: Strategy> StrategyEngine<S> {
    pub fn new(strategy: S, fast_period: usize, slow_period: usize) -> Self {
        Self {
            strategy,
            fast: Ema::new(fast_period),
            slow: Ema::new(slow_period),
            bars_seen: 0,
            last_bar: None,
            ledger: PositionLedger::new(),
            orders: HashMap::new(),
            pending: None,
            stats: EngineStats::default(),
        }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn position(&self) -> &Position {
        self.ledger.position()
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn ema_fast(&self) -> Option<f64> {
        self.fast.value()
    }

    pub fn ema_slow(&self) -> Option<f64> {
        self.slow.value()
    }

    pub fn pending_order(&self) -> Option<&Order> {
        self.pending.and_then(|id| self.orders.get(&id))
    }

    /// An order still in flight; settled and rejected orders are dropped
    pub fn order(&self, id: Uuid) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// Consume the next bar and return the order to submit, if any.
    ///
    /// Errors are all "no decision" for this bar: `OutOfOrderBar` when the
    /// bar does not move time forward (it is skipped entirely) and
    /// `InsufficientWarmup` while the EMAs fill up.
    pub fn on_bar(&mut self, candle: &Candle) -> Result<Option<Order>> {
        if let Some(previous) = self.last_bar {
            if candle.timestamp <= previous {
                self.stats.out_of_order_bars += 1;
                tracing::warn!(
                    "Skipping bar at {}: not after previous bar at {}",
                    candle.timestamp,
                    previous
                );
                return Err(Error::OutOfOrderBar {
                    timestamp: candle.timestamp,
                    previous,
                });
            }
        }

        self.last_bar = Some(candle.timestamp);
        self.bars_seen += 1;
        self.stats.bars_processed += 1;

        let ema_fast = self.fast.update(candle.close);
        let ema_slow = self.slow.update(candle.close);

        let ctx = BarContext {
            candle,
            ema_fast,
            ema_slow,
            bars_seen: self.bars_seen,
            position: self.ledger.position(),
            has_pending_order: self.pending.is_some(),
        };

        let decision = match self.strategy.decide(&ctx) {
            Ok(decision) => decision,
            Err(e) => {
                if matches!(e, Error::InsufficientWarmup { .. }) {
                    self.stats.warmup_bars += 1;
                }
                return Err(e);
            }
        };

        let Some(order) = decision.action.to_order(candle.timestamp) else {
            tracing::trace!("Hold at {}: {}", candle.timestamp, decision.reason);
            return Ok(None);
        };

        tracing::info!(
            "{} {:.4} ({:?}) at {}: {}",
            order.side,
            order.size,
            order.intent,
            candle.timestamp,
            decision.reason
        );

        self.pending = Some(order.id);
        self.orders.insert(order.id, order.clone());
        self.stats.orders_submitted += 1;

        Ok(Some(order))
    }

    /// Dispatch one broker notification. Returns the trade when a fill
    /// closes the position.
    pub fn handle_event(&mut self, event: BrokerEvent) -> Result<Option<Trade>> {
        match event {
            BrokerEvent::OrderStatus {
                order_id,
                status,
                timestamp,
            } => self.on_order_status(order_id, status, timestamp),
            BrokerEvent::Filled(fill) => self.on_fill(&fill),
            BrokerEvent::TradeClosed {
                order_id,
                pnl,
                pnl_with_commission,
                ..
            } => self.on_trade_closed(order_id, pnl, pnl_with_commission),
        }
    }

    fn on_order_status(
        &mut self,
        order_id: Uuid,
        status: OrderStatus,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<Trade>> {
        let Some(order) = self.orders.get_mut(&order_id) else {
            if self.ledger.has_applied(order_id) {
                tracing::debug!("Status {:?} for settled order {}", status, order_id);
            } else {
                tracing::warn!("Status {:?} for unknown order {}", status, order_id);
            }
            return Ok(None);
        };

        // Repeated notification
        if order.status == status {
            return Ok(None);
        }

        *order = order.clone().transition(status).map_err(|e| {
            tracing::warn!("Order {}: {}", order_id, e);
            e
        })?;

        match status {
            OrderStatus::Accepted => {
                tracing::debug!("Order {} accepted at {}", order_id, timestamp);
                Ok(None)
            }
            OrderStatus::Completed => {
                self.stats.orders_completed += 1;
                if !self.settle(order_id) {
                    tracing::debug!("Order {} completed at {}, fill not yet received", order_id, timestamp);
                }
                Ok(None)
            }
            _ => match status.rejection() {
                Some(reason) => {
                    self.orders.remove(&order_id);
                    if self.pending == Some(order_id) {
                        self.pending = None;
                    }
                    self.stats.orders_rejected += 1;
                    tracing::warn!(
                        "Order {} {} at {}, position unchanged",
                        order_id,
                        reason,
                        timestamp
                    );
                    Err(Error::OrderRejected { reason })
                }
                None => Ok(None),
            },
        }
    }

    fn on_fill(&mut self, fill: &Fill) -> Result<Option<Trade>> {
        if self.ledger.has_applied(fill.order_id) {
            self.stats.duplicate_fills += 1;
            let e = Error::DuplicateFill {
                order_id: fill.order_id,
            };
            tracing::warn!("Ignoring {}", e);
            return Err(e);
        }

        // Rejected orders are dropped on rejection, so a late fill lands here too
        let Some(order) = self.orders.get(&fill.order_id) else {
            return Err(Error::UnexpectedFill {
                order_id: fill.order_id,
                reason: "no open order with this id".to_string(),
            });
        };

        let trade = match self.ledger.apply_fill(order, fill)? {
            FillOutcome::Opened(_) => None,
            FillOutcome::Closed(trade) => Some(trade),
        };
        self.settle(fill.order_id);
        Ok(trade)
    }

    /// Release an order once it is both `Completed` and applied to the
    /// ledger; notifications may arrive in either order. Returns whether the
    /// order was settled.
    fn settle(&mut self, order_id: Uuid) -> bool {
        let completed = self
            .orders
            .get(&order_id)
            .is_some_and(|o| o.status == OrderStatus::Completed);
        if !completed || !self.ledger.has_applied(order_id) {
            return false;
        }

        self.orders.remove(&order_id);
        if self.pending == Some(order_id) {
            self.pending = None;
        }
        true
    }

    fn on_trade_closed(
        &mut self,
        order_id: Uuid,
        pnl: f64,
        pnl_with_commission: f64,
    ) -> Result<Option<Trade>> {
        tracing::info!(
            "TRADE CLOSED by {}: gross {:.4}, net {:.4}",
            order_id,
            pnl,
            pnl_with_commission
        );

        if let Some(trade) = self.ledger.trades().last() {
            if (trade.net_pnl - pnl_with_commission).abs() > 1e-6 {
                tracing::warn!(
                    "Broker net P&L {:.6} differs from ledger {:.6}",
                    pnl_with_commission,
                    trade.net_pnl
                );
            }
        }

        Ok(None)
    }
}
