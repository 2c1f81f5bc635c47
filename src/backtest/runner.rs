use crate::backtest::broker::SimulatedBroker;
use crate::backtest::metrics::BacktestReport;
use crate::config::{BacktestConfig, StrategyConfig};
use crate::error::Error;
use crate::execution::{Broker, BrokerEvent, StrategyEngine};
use crate::models::CandleSeries;
use crate::strategy::Strategy;
use crate::Result;

/// Backtest runner that replays a candle series through the strategy engine
pub struct BacktestRunner {
    strategy: StrategyConfig,
    backtest: BacktestConfig,
}

impl BacktestRunner {
    pub fn new(strategy: StrategyConfig, backtest: BacktestConfig) -> Self {
        Self { strategy, backtest }
    }

    /// Run the tunnel strategy against a [`SimulatedBroker`]
    ///
    /// Errors only when the series cannot even warm up the slow EMA. A
    /// position still open at the end is reported as unrealized, not closed.
    pub fn run(&self, series: &CandleSeries) -> Result<BacktestReport> {
        let mut engine = StrategyEngine::tunnel(self.strategy.clone());
        let mut broker = SimulatedBroker::new(&self.backtest);
        self.run_with(&mut engine, &mut broker, series)
    }

    /// Drive any engine/broker pair over `series`.
    ///
    /// Per bar: broker events first (fills happen at the bar's open), then
    /// the engine's decision on the bar's close, then the acknowledgement of
    /// whatever was submitted.
    pub fn run_with<S: Strategy, B: Broker>(
        &self,
        engine: &mut StrategyEngine<S>,
        broker: &mut B,
        series: &CandleSeries,
    ) -> Result<BacktestReport> {
        let needed = engine.strategy().min_candles_required();
        if series.len() < needed {
            return Err(Error::InsufficientWarmup {
                have: series.len(),
                needed,
            });
        }

        tracing::info!(
            "Starting backtest: {} candles, strategy {} needs {}",
            series.len(),
            engine.strategy().name(),
            needed
        );

        for candle in series {
            for event in broker.on_bar(candle) {
                dispatch(engine, event);
            }

            match engine.on_bar(candle) {
                Ok(Some(order)) => {
                    broker.submit(&order);
                    for event in broker.drain_events() {
                        dispatch(engine, event);
                    }
                }
                Ok(None) => {}
                Err(Error::InsufficientWarmup { .. }) => {}
                Err(e) => tracing::warn!("No decision at {}: {}", candle.timestamp, e),
            }
        }

        let final_price = series.last().map(|c| c.close).unwrap_or_default();
        if !engine.position().is_flat() {
            tracing::info!(
                "Position still open at the end: {:?} @ {:.4}, unrealized {:.4}",
                engine.position().direction(),
                engine.position().entry_price,
                engine.ledger().unrealized_pnl(final_price)
            );
        }

        let report = BacktestReport::from_trades(
            engine.ledger().trades().to_vec(),
            *engine.position(),
            final_price,
            engine.ledger().open_commission(),
            self.backtest.initial_cash,
            engine.stats(),
        );

        tracing::info!(
            "Backtest complete: {} trades, realized P&L: ${:.2}, unrealized: ${:.2}",
            report.total_trades,
            report.realized_pnl,
            report.unrealized_pnl
        );

        Ok(report)
    }
}

fn dispatch<S: Strategy>(engine: &mut StrategyEngine<S>, event: BrokerEvent) {
    let order_id = event.order_id();
    match engine.handle_event(event) {
        Ok(_) => {}
        // Already logged by the engine; the strategy carries on
        Err(Error::OrderRejected { .. } | Error::DuplicateFill { .. }) => {}
        Err(e) => tracing::warn!("Broker event for {} not applied: {}", order_id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::synthetic::{MarketScenario, SyntheticDataGenerator};
    use crate::models::{BarInterval, Direction};
    use chrono::{TimeZone, Utc};

    fn series(scenario: MarketScenario, bars: usize) -> CandleSeries {
        SyntheticDataGenerator::new(42)
            .ending_at(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
            .generate_series(scenario, bars, BarInterval::OneHour)
    }

    fn fast_config() -> StrategyConfig {
        StrategyConfig {
            ema_fast_period: 12,
            ema_slow_period: 26,
            ..StrategyConfig::default()
        }
    }

    #[test]
    fn test_backtest_uptrend_goes_long() {
        tracing_subscriber::fmt()
            .with_env_filter("trendbot=debug")
            .try_init()
            .ok();

        let runner = BacktestRunner::new(fast_config(), BacktestConfig::default());
        let report = runner.run(&series(MarketScenario::Uptrend, 500)).unwrap();

        assert_eq!(report.bars, 500);
        assert_eq!(report.warmup_bars, 25);
        assert!(report.orders_submitted > 0);
        assert!(report.trades.iter().all(|t| t.direction == Direction::Long));
        assert!(report.total_trades > 0 || !report.final_position.is_flat());
    }

    #[test]
    fn test_open_position_is_marked_net_of_entry_commission() {
        let runner = BacktestRunner::new(fast_config(), BacktestConfig::default());
        let report = runner.run(&series(MarketScenario::Uptrend, 500)).unwrap();

        let position = report.final_position;
        let entry_commission = position.entry_price * position.size * 0.001;
        let expected = if position.is_flat() {
            0.0
        } else {
            position.unrealized_pnl(report.final_price) - entry_commission
        };
        assert!((report.unrealized_pnl - expected).abs() < 1e-6);
    }

    #[test]
    fn test_backtest_downtrend_goes_short() {
        let runner = BacktestRunner::new(fast_config(), BacktestConfig::default());
        let report = runner.run(&series(MarketScenario::Downtrend, 500)).unwrap();

        assert!(report.trades.iter().all(|t| t.direction == Direction::Short));
        assert!(report.total_trades > 0 || !report.final_position.is_flat());
    }

    #[test]
    fn test_backtest_insufficient_data() {
        let runner = BacktestRunner::new(StrategyConfig::default(), BacktestConfig::default());
        let err = runner.run(&series(MarketScenario::Uptrend, 100)).unwrap_err();

        assert!(matches!(
            err,
            Error::InsufficientWarmup {
                have: 100,
                needed: 169
            }
        ));
    }

    #[test]
    fn test_margin_rejections_are_counted() {
        let backtest = BacktestConfig {
            initial_cash: 10.0,
            ..BacktestConfig::default()
        };
        let runner = BacktestRunner::new(fast_config(), backtest);
        let report = runner.run(&series(MarketScenario::Uptrend, 300)).unwrap();

        assert_eq!(report.total_trades, 0);
        assert!(report.final_position.is_flat());
        assert!(report.orders_rejected > 0);
        assert_eq!(report.orders_rejected, report.orders_submitted);
    }

    #[test]
    fn test_pnl_accounting_is_consistent() {
        let runner = BacktestRunner::new(fast_config(), BacktestConfig::default());
        let report = runner.run(&series(MarketScenario::Volatile, 600)).unwrap();

        let net: f64 = report.trades.iter().map(|t| t.net_pnl).sum();
        assert!((report.realized_pnl - net).abs() < 1e-6);
        assert!((report.gross_pnl - report.total_commission - net).abs() < 1e-6);
        for trade in &report.trades {
            assert!(trade.exit_reason.is_some());
            assert!(trade.closed_at > trade.opened_at);
        }
    }
}
