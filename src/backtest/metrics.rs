use crate::execution::EngineStats;
use crate::models::{Position, Trade};
use serde::Serialize;

/// Complete backtest performance report
#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    // P&L
    pub gross_pnl: f64,
    pub total_commission: f64,
    pub realized_pnl: f64, // net of commission
    pub unrealized_pnl: f64,
    pub initial_cash: f64,
    pub final_equity: f64,
    pub total_return_pct: f64,

    // Trade statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,

    // P&L distribution
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub profit_factor: f64, // Total wins / Total losses

    // Risk
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,

    // Holding period
    pub avg_holding_period_minutes: f64,

    // Engine counters
    pub bars: usize,
    pub warmup_bars: usize,
    pub out_of_order_bars: usize,
    pub orders_submitted: usize,
    pub orders_rejected: usize,

    pub final_position: Position,
    pub final_price: f64,
    pub trades: Vec<Trade>,
}

impl BacktestReport {
    /// Build the report from closed trades and whatever is still open.
    ///
    /// `open_commission` is what the open position already paid on entry; it
    /// is charged against the unrealized P&L.
    pub fn from_trades(
        trades: Vec<Trade>,
        final_position: Position,
        final_price: f64,
        open_commission: f64,
        initial_cash: f64,
        stats: EngineStats,
    ) -> Self {
        let total_trades = trades.len();

        let gross_pnl: f64 = trades.iter().map(|t| t.gross_pnl).sum();
        let total_commission: f64 = trades.iter().map(|t| t.commission).sum();
        let realized_pnl: f64 = trades.iter().map(|t| t.net_pnl).sum();
        let unrealized_pnl = if final_position.is_flat() {
            0.0
        } else {
            final_position.unrealized_pnl(final_price) - open_commission
        };
        let final_equity = initial_cash + realized_pnl + unrealized_pnl;
        let total_return_pct = if initial_cash > 0.0 {
            (final_equity - initial_cash) / initial_cash * 100.0
        } else {
            0.0
        };

        // Win/Loss statistics on net P&L
        let wins: Vec<f64> = trades.iter().map(|t| t.net_pnl).filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = trades.iter().map(|t| t.net_pnl).filter(|p| *p <= 0.0).collect();

        let win_rate = if total_trades > 0 {
            (wins.len() as f64 / total_trades as f64) * 100.0
        } else {
            0.0
        };

        let total_wins: f64 = wins.iter().sum();
        let total_losses: f64 = losses.iter().map(|p| p.abs()).sum();

        let avg_win = if wins.is_empty() {
            0.0
        } else {
            total_wins / wins.len() as f64
        };
        let avg_loss = if losses.is_empty() {
            0.0
        } else {
            total_losses / losses.len() as f64
        };

        let largest_win = wins.iter().copied().fold(0.0, f64::max);
        let largest_loss = losses.iter().copied().fold(0.0, f64::min);

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_pct) = Self::calculate_drawdown(&trades, initial_cash);

        let avg_holding_period_minutes = if total_trades > 0 {
            trades
                .iter()
                .map(|t| t.holding_period().num_minutes())
                .sum::<i64>() as f64
                / total_trades as f64
        } else {
            0.0
        };

        Self {
            gross_pnl,
            total_commission,
            realized_pnl,
            unrealized_pnl,
            initial_cash,
            final_equity,
            total_return_pct,
            total_trades,
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            profit_factor,
            max_drawdown,
            max_drawdown_pct,
            avg_holding_period_minutes,
            bars: stats.bars_processed,
            warmup_bars: stats.warmup_bars,
            out_of_order_bars: stats.out_of_order_bars,
            orders_submitted: stats.orders_submitted,
            orders_rejected: stats.orders_rejected,
            final_position,
            final_price,
            trades,
        }
    }

    /// Maximum peak-to-trough drop of realized equity
    fn calculate_drawdown(trades: &[Trade], initial_value: f64) -> (f64, f64) {
        let mut peak = initial_value;
        let mut max_dd = 0.0;
        let mut max_dd_pct = 0.0;
        let mut current_value = initial_value;

        for trade in trades {
            current_value += trade.net_pnl;

            if current_value > peak {
                peak = current_value;
            }

            let drawdown = peak - current_value;
            if drawdown > max_dd {
                max_dd = drawdown;
                max_dd_pct = if peak > 0.0 { drawdown / peak * 100.0 } else { 0.0 };
            }
        }

        (max_dd, max_dd_pct)
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        println!("\n========================================================");
        println!("               BACKTEST PERFORMANCE REPORT");
        println!("========================================================\n");

        println!("P&L SUMMARY");
        println!("  Initial Cash:          ${:.2}", self.initial_cash);
        println!("  Final Equity:          ${:.2}", self.final_equity);
        println!("  Gross P&L:             ${:.2}", self.gross_pnl);
        println!("  Commission:            ${:.2}", self.total_commission);
        println!("  Realized P&L (net):    ${:.2}", self.realized_pnl);
        println!("  Unrealized P&L (net):  ${:.2}", self.unrealized_pnl);
        println!("  Total Return:          {:+.2}%", self.total_return_pct);

        println!("\nTRADE STATISTICS");
        println!("  Total Trades:          {}", self.total_trades);
        println!(
            "  Winning Trades:        {} ({:.1}%)",
            self.winning_trades, self.win_rate
        );
        println!("  Losing Trades:         {}", self.losing_trades);

        if self.total_trades > 0 {
            println!("\nWIN/LOSS ANALYSIS");
            println!("  Average Win:           ${:.2}", self.avg_win);
            println!("  Average Loss:          ${:.2}", self.avg_loss);
            println!("  Largest Win:           ${:.2}", self.largest_win);
            println!("  Largest Loss:          ${:.2}", self.largest_loss);
            println!("  Profit Factor:         {:.2}", self.profit_factor);
            println!(
                "  Max Drawdown:          ${:.2} ({:.2}%)",
                self.max_drawdown, self.max_drawdown_pct
            );
            println!(
                "  Avg Holding Period:    {:.1} hours",
                self.avg_holding_period_minutes / 60.0
            );
        }

        println!("\nENGINE");
        println!("  Bars:                  {}", self.bars);
        println!("  Warm-up Bars:          {}", self.warmup_bars);
        println!("  Orders Submitted:      {}", self.orders_submitted);
        println!("  Orders Rejected:       {}", self.orders_rejected);
        match self.final_position.direction() {
            Some(direction) => println!(
                "  Final Position:        {:?} {:.4} @ ${:.2} (mark ${:.2})",
                direction, self.final_position.size, self.final_position.entry_price, self.final_price
            ),
            None => println!("  Final Position:        flat"),
        }

        println!("\n========================================================\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, ExitReason};
    use chrono::{Duration, Utc};

    fn create_test_trade(net_pnl: f64, holding_minutes: i64) -> Trade {
        let opened_at = Utc::now();
        Trade {
            direction: Direction::Long,
            entry_price: 100.0,
            exit_price: 100.0 + net_pnl,
            size: 1.0,
            gross_pnl: net_pnl,
            commission: 0.0,
            net_pnl,
            opened_at,
            closed_at: opened_at + Duration::minutes(holding_minutes),
            exit_reason: Some(ExitReason::TakeProfit),
        }
    }

    fn report(trades: Vec<Trade>) -> BacktestReport {
        BacktestReport::from_trades(trades, Position::flat(), 100.0, 0.0, 10000.0, EngineStats::default())
    }

    #[test]
    fn test_report_with_winning_trades() {
        let report = report(vec![
            create_test_trade(100.0, 60), // $100 profit
            create_test_trade(50.0, 120), // $50 profit
            create_test_trade(-30.0, 90), // $30 loss
        ]);

        assert_eq!(report.total_trades, 3);
        assert_eq!(report.winning_trades, 2);
        assert_eq!(report.losing_trades, 1);
        assert!((report.win_rate - 66.66).abs() < 0.1);
        assert!((report.realized_pnl - 120.0).abs() < 0.01);
        assert!((report.final_equity - 10120.0).abs() < 0.01);
        assert!((report.avg_holding_period_minutes - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_report_with_no_trades() {
        let report = report(vec![]);

        assert_eq!(report.total_trades, 0);
        assert_eq!(report.win_rate, 0.0);
        assert_eq!(report.realized_pnl, 0.0);
        assert_eq!(report.profit_factor, 0.0);
    }

    #[test]
    fn test_profit_factor_calculation() {
        let report = report(vec![
            create_test_trade(200.0, 60),
            create_test_trade(100.0, 60),
            create_test_trade(-50.0, 60),
        ]);

        // 300 / 50
        assert!((report.profit_factor - 6.0).abs() < 0.01);
        assert_eq!(report.largest_loss, -50.0);
        assert_eq!(report.largest_win, 200.0);
    }

    #[test]
    fn test_drawdown_calculation() {
        let report = report(vec![
            create_test_trade(100.0, 60),  // Peak at 10100
            create_test_trade(-200.0, 60), // Down to 9900 (drawdown: 200)
            create_test_trade(50.0, 60),   // Back to 9950
        ]);

        assert!((report.max_drawdown - 200.0).abs() < 0.01);
    }

    #[test]
    fn test_open_position_is_marked_not_closed() {
        let position = Position::open(Direction::Long, 100.0, 2.0, Utc::now());
        let report = BacktestReport::from_trades(vec![], position, 110.0, 0.5, 1000.0, EngineStats::default());

        assert_eq!(report.total_trades, 0);
        // 20 on the mark, less the 0.5 entry commission
        assert!((report.unrealized_pnl - 19.5).abs() < 1e-9);
        assert!((report.final_equity - 1019.5).abs() < 1e-9);
        assert!((report.total_return_pct - 1.95).abs() < 1e-9);
        assert_eq!(report.final_position.direction(), Some(Direction::Long));
    }
}
