use super::{
    signals::{entry_signal, exit_check, ExitLevels},
    Action, BarContext, Decision, Strategy,
};
use crate::config::StrategyConfig;
use crate::error::Error;
use crate::Result;

/// EMA tunnel breakout with fixed percentage stop-loss and take-profit
///
/// The tunnel is the band between a fast and a slow EMA (144/169 by
/// default). A close outside the band in the direction the EMAs are stacked
/// opens a position; the position is held until the close crosses the stop
/// or the target. At most one position and one outstanding order at a time.
#[derive(Debug, Clone)]
pub struct TunnelStrategy {
    config: StrategyConfig,
}

impl TunnelStrategy {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }
}

impl Default for TunnelStrategy {
    fn default() -> Self {
        Self::new(StrategyConfig::default())
    }
}

impl Strategy for TunnelStrategy {
    fn decide(&self, ctx: &BarContext<'_>) -> Result<Decision> {
        if ctx.has_pending_order {
            return Ok(Decision::hold("Order outstanding"));
        }

        // Exits first; they need no indicators
        if let Some(direction) = ctx.position.direction() {
            let levels = ExitLevels::for_position(
                direction,
                ctx.position.entry_price,
                self.config.stop_loss_pct,
                self.config.take_profit_pct,
            );

            return Ok(match exit_check(direction, &levels, ctx.candle) {
                Some(reason) => Decision {
                    action: Action::Exit {
                        direction,
                        size: ctx.position.size,
                        reason,
                    },
                    reason: format!(
                        "{} at {:.4} (entry {:.4}, stop {:.4}, target {:.4})",
                        reason,
                        ctx.candle.close,
                        ctx.position.entry_price,
                        levels.stop_loss,
                        levels.take_profit
                    ),
                },
                None => Decision::hold("Position open, no exit level crossed"),
            });
        }

        let (Some(fast), Some(slow)) = (ctx.ema_fast, ctx.ema_slow) else {
            return Err(Error::InsufficientWarmup {
                have: ctx.bars_seen,
                needed: self.min_candles_required(),
            });
        };

        Ok(match entry_signal(ctx.candle.close, fast, slow) {
            Some(direction) => Decision {
                action: Action::Enter {
                    direction,
                    size: self.config.order_size,
                },
                reason: format!(
                    "{:?} breakout: close {:.4}, fast {:.4}, slow {:.4}",
                    direction, ctx.candle.close, fast, slow
                ),
            },
            None => Decision::hold("Inside the tunnel"),
        })
    }

    fn name(&self) -> &str {
        "TunnelStrategy"
    }

    fn min_candles_required(&self) -> usize {
        self.config.ema_fast_period.max(self.config.ema_slow_period)
    }
}
