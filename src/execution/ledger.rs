use std::collections::HashSet;
use uuid::Uuid;

use crate::error::Error;
use crate::models::{Direction, Fill, Order, OrderIntent, Position, Trade};
use crate::Result;

/// What a fill did to the ledger
#[derive(Debug, Clone, PartialEq)]
pub enum FillOutcome {
    Opened(Position),
    Closed(Trade),
}

/// Single-position book: turns fills into a position and closed trades.
///
/// Fills are applied at most once per order id; a replayed fill is refused
/// with `DuplicateFill` and leaves everything untouched.
#[derive(Debug, Clone, Default)]
pub struct PositionLedger {
    position: Position,
    entry_commission: f64,
    applied: HashSet<Uuid>,
    trades: Vec<Trade>,
    realized_pnl: f64,
    commission_paid: f64,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Sum of net P&L over closed trades
    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn commission_paid(&self) -> f64 {
        self.commission_paid
    }

    /// Commission already paid to open the current position
    pub fn open_commission(&self) -> f64 {
        self.entry_commission
    }

    /// Mark-to-market P&L of the open position, net of its entry commission
    pub fn unrealized_pnl(&self, mark_price: f64) -> f64 {
        if self.position.is_flat() {
            return 0.0;
        }
        self.position.unrealized_pnl(mark_price) - self.entry_commission
    }

    pub fn has_applied(&self, order_id: Uuid) -> bool {
        self.applied.contains(&order_id)
    }

    /// Apply a completed order's fill
    pub fn apply_fill(&mut self, order: &Order, fill: &Fill) -> Result<FillOutcome> {
        if self.applied.contains(&fill.order_id) {
            return Err(Error::DuplicateFill {
                order_id: fill.order_id,
            });
        }
        if fill.order_id != order.id {
            return Err(unexpected(fill, format!("fill belongs to a different order than {}", order.id)));
        }

        let outcome = match (order.intent, self.position.direction()) {
            (OrderIntent::Entry, None) => self.open(order, fill)?,
            (OrderIntent::Exit, Some(direction)) => self.close(direction, order, fill)?,
            (OrderIntent::Entry, Some(direction)) => {
                return Err(unexpected(fill, format!("entry while already {:?}", direction)));
            }
            (OrderIntent::Exit, None) => {
                return Err(unexpected(fill, "exit while flat"));
            }
        };

        self.applied.insert(fill.order_id);
        self.commission_paid += fill.commission;
        Ok(outcome)
    }

    fn open(&mut self, order: &Order, fill: &Fill) -> Result<FillOutcome> {
        if fill.size <= 0.0 || !fill.price.is_finite() || fill.price <= 0.0 {
            return Err(unexpected(
                fill,
                format!("cannot open with size {} at {}", fill.size, fill.price),
            ));
        }

        let direction = match order.side {
            crate::models::Side::Buy => Direction::Long,
            crate::models::Side::Sell => Direction::Short,
        };

        self.position = Position::open(direction, fill.price, fill.size, fill.timestamp);
        self.entry_commission = fill.commission;

        tracing::info!(
            "Opened {:?} {:.4} @ ${:.4} (commission ${:.4})",
            direction,
            fill.size,
            fill.price,
            fill.commission
        );

        Ok(FillOutcome::Opened(self.position))
    }

    fn close(&mut self, direction: Direction, order: &Order, fill: &Fill) -> Result<FillOutcome> {
        if order.side != direction.exit_side() {
            return Err(unexpected(
                fill,
                format!("{} does not close a {:?} position", order.side, direction),
            ));
        }

        let size = self.position.size;
        if (fill.size - size).abs() > f64::EPSILON * size.max(1.0) {
            tracing::warn!(
                "Exit fill size {} differs from position size {}, closing the whole position",
                fill.size,
                size
            );
        }

        let gross_pnl = (fill.price - self.position.entry_price) * size * direction.sign();
        let commission = self.entry_commission + fill.commission;
        let trade = Trade {
            direction,
            entry_price: self.position.entry_price,
            exit_price: fill.price,
            size,
            gross_pnl,
            commission,
            net_pnl: gross_pnl - commission,
            opened_at: self.position.opened_at.unwrap_or(fill.timestamp),
            closed_at: fill.timestamp,
            exit_reason: order.exit_reason,
        };

        self.realized_pnl += trade.net_pnl;
        self.position = Position::flat();
        self.entry_commission = 0.0;
        self.trades.push(trade.clone());

        tracing::info!(
            "Closed {:?} @ ${:.4} ({}): gross ${:.4}, net ${:.4}, realized total ${:.4}",
            direction,
            fill.price,
            order
                .exit_reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "manual".to_string()),
            trade.gross_pnl,
            trade.net_pnl,
            self.realized_pnl
        );

        Ok(FillOutcome::Closed(trade))
    }
}

fn unexpected(fill: &Fill, reason: impl Into<String>) -> Error {
    Error::UnexpectedFill {
        order_id: fill.order_id,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExitReason, Side};
    use approx::assert_relative_eq;
    use chrono::{Duration, Utc};

    fn fill_for(order: &Order, price: f64, commission: f64) -> Fill {
        Fill {
            order_id: order.id,
            price,
            size: order.size,
            commission,
            timestamp: order.created_at + Duration::hours(1),
        }
    }

    #[test]
    fn test_open_then_close_long() {
        let mut ledger = PositionLedger::new();
        let entry = Order::entry(Side::Buy, 2.0, Utc::now());
        let outcome = ledger.apply_fill(&entry, &fill_for(&entry, 100.0, 0.2)).unwrap();

        assert!(matches!(outcome, FillOutcome::Opened(p) if p.entry_price == 100.0));
        assert_eq!(ledger.position().direction(), Some(Direction::Long));
        // (105 - 100) * 2 less the 0.2 paid on entry
        assert_relative_eq!(ledger.unrealized_pnl(105.0), 9.8, epsilon = 1e-9);
        assert_relative_eq!(ledger.open_commission(), 0.2, epsilon = 1e-9);

        let exit = Order::exit(Side::Sell, 2.0, ExitReason::TakeProfit, Utc::now());
        let outcome = ledger.apply_fill(&exit, &fill_for(&exit, 102.0, 0.204)).unwrap();

        let FillOutcome::Closed(trade) = outcome else {
            panic!("expected a closed trade");
        };
        assert_relative_eq!(trade.gross_pnl, 4.0, epsilon = 1e-9);
        assert_relative_eq!(trade.commission, 0.404, epsilon = 1e-9);
        assert_relative_eq!(trade.net_pnl, 3.596, epsilon = 1e-9);
        assert_eq!(trade.exit_reason, Some(ExitReason::TakeProfit));
        assert!(ledger.position().is_flat());
        assert_eq!(ledger.position().size, 0.0);
        assert_relative_eq!(ledger.realized_pnl(), 3.596, epsilon = 1e-9);
        assert_eq!(ledger.trades().len(), 1);
        assert_eq!(ledger.unrealized_pnl(200.0), 0.0);
        assert_eq!(ledger.open_commission(), 0.0);
    }

    #[test]
    fn test_short_pnl_sign() {
        let mut ledger = PositionLedger::new();
        let entry = Order::entry(Side::Sell, 1.0, Utc::now());
        ledger.apply_fill(&entry, &fill_for(&entry, 100.0, 0.0)).unwrap();

        let exit = Order::exit(Side::Buy, 1.0, ExitReason::StopLoss, Utc::now());
        let FillOutcome::Closed(trade) = ledger.apply_fill(&exit, &fill_for(&exit, 101.0, 0.0)).unwrap()
        else {
            panic!("expected a closed trade");
        };

        assert_relative_eq!(trade.gross_pnl, -1.0, epsilon = 1e-9);
        assert!(!trade.is_win());
    }

    #[test]
    fn test_duplicate_fill_is_ignored() {
        let mut ledger = PositionLedger::new();
        let entry = Order::entry(Side::Buy, 1.0, Utc::now());
        let exit = Order::exit(Side::Sell, 1.0, ExitReason::TakeProfit, Utc::now());
        let entry_fill = fill_for(&entry, 100.0, 0.1);
        let exit_fill = fill_for(&exit, 103.0, 0.1);

        ledger.apply_fill(&entry, &entry_fill).unwrap();
        ledger.apply_fill(&exit, &exit_fill).unwrap();
        let position = *ledger.position();
        let trades = ledger.trades().to_vec();
        let realized = ledger.realized_pnl();

        for (order, fill) in [(&entry, &entry_fill), (&exit, &exit_fill)] {
            let err = ledger.apply_fill(order, fill).unwrap_err();
            assert!(matches!(err, Error::DuplicateFill { order_id } if order_id == order.id));
        }

        assert_eq!(*ledger.position(), position);
        assert_eq!(ledger.trades(), trades.as_slice());
        assert_eq!(ledger.realized_pnl(), realized);
    }

    #[test]
    fn test_exit_while_flat_is_refused() {
        let mut ledger = PositionLedger::new();
        let exit = Order::exit(Side::Sell, 1.0, ExitReason::StopLoss, Utc::now());
        let err = ledger.apply_fill(&exit, &fill_for(&exit, 100.0, 0.0)).unwrap_err();

        assert!(matches!(err, Error::UnexpectedFill { .. }));
        assert!(!ledger.has_applied(exit.id));
    }

    #[test]
    fn test_second_entry_is_refused() {
        let mut ledger = PositionLedger::new();
        let first = Order::entry(Side::Buy, 1.0, Utc::now());
        ledger.apply_fill(&first, &fill_for(&first, 100.0, 0.0)).unwrap();

        let second = Order::entry(Side::Buy, 1.0, Utc::now());
        assert!(ledger.apply_fill(&second, &fill_for(&second, 101.0, 0.0)).is_err());
        assert_eq!(ledger.position().size, 1.0);
    }
}
