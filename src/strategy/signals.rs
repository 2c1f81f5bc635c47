use crate::models::{Candle, Direction, ExitReason};

/// Price levels that close an open position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitLevels {
    pub stop_loss: f64,
    pub take_profit: f64,
}

impl ExitLevels {
    /// Levels for a position entered at `entry_price`.
    ///
    /// Long: stop below, target above. Short: mirrored.
    pub fn for_position(
        direction: Direction,
        entry_price: f64,
        stop_loss_pct: f64,
        take_profit_pct: f64,
    ) -> Self {
        match direction {
            Direction::Long => Self {
                stop_loss: entry_price * (1.0 - stop_loss_pct),
                take_profit: entry_price * (1.0 + take_profit_pct),
            },
            Direction::Short => Self {
                stop_loss: entry_price * (1.0 + stop_loss_pct),
                take_profit: entry_price * (1.0 - take_profit_pct),
            },
        }
    }
}

/// Tunnel breakout entry.
///
/// Long when the close is above the slow EMA and the fast EMA sits above the
/// slow one; short when the close is below the fast EMA and the fast EMA
/// sits below the slow one. Long is checked first.
pub fn entry_signal(close: f64, ema_fast: f64, ema_slow: f64) -> Option<Direction> {
    if close > ema_slow && ema_fast > ema_slow {
        return Some(Direction::Long);
    }
    if close < ema_fast && ema_fast < ema_slow {
        return Some(Direction::Short);
    }
    None
}

/// Check whether this bar closes the position.
///
/// An exit triggers on the close. When the close reaches the take-profit
/// but the bar's range also touched the stop, the stop wins: the bar order
/// inside the candle is unknown and the conservative outcome is assumed.
pub fn exit_check(direction: Direction, levels: &ExitLevels, candle: &Candle) -> Option<ExitReason> {
    let (stop_by_close, target_by_close, stop_by_range) = match direction {
        Direction::Long => (
            candle.close <= levels.stop_loss,
            candle.close >= levels.take_profit,
            candle.low <= levels.stop_loss,
        ),
        Direction::Short => (
            candle.close >= levels.stop_loss,
            candle.close <= levels.take_profit,
            candle.high >= levels.stop_loss,
        ),
    };

    if stop_by_close {
        return Some(ExitReason::StopLoss);
    }
    if target_by_close {
        if stop_by_range {
            tracing::debug!(
                "Bar at {} reached both stop {:.4} and target {:.4}, taking the stop",
                candle.timestamp,
                levels.stop_loss,
                levels.take_profit
            );
            return Some(ExitReason::StopLoss);
        }
        return Some(ExitReason::TakeProfit);
    }
    None
}
