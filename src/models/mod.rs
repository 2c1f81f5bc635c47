pub mod order;
pub mod series;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub use order::{Fill, Order, OrderIntent, OrderStatus, Side};
pub use series::{CandleSeries, Gap};

/// OHLCV candlestick data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Nominal spacing between bars, named the way the source API names them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BarInterval {
    OneMinute,
    ThreeMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    TwoHours,
    FourHours,
    SixHours,
    TwelveHours,
    OneDay,
    OneWeek,
}

impl BarInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarInterval::OneMinute => "1m",
            BarInterval::ThreeMinutes => "3m",
            BarInterval::FiveMinutes => "5m",
            BarInterval::FifteenMinutes => "15m",
            BarInterval::ThirtyMinutes => "30m",
            BarInterval::OneHour => "1H",
            BarInterval::TwoHours => "2H",
            BarInterval::FourHours => "4H",
            BarInterval::SixHours => "6H",
            BarInterval::TwelveHours => "12H",
            BarInterval::OneDay => "1D",
            BarInterval::OneWeek => "1W",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            BarInterval::OneMinute => Duration::minutes(1),
            BarInterval::ThreeMinutes => Duration::minutes(3),
            BarInterval::FiveMinutes => Duration::minutes(5),
            BarInterval::FifteenMinutes => Duration::minutes(15),
            BarInterval::ThirtyMinutes => Duration::minutes(30),
            BarInterval::OneHour => Duration::hours(1),
            BarInterval::TwoHours => Duration::hours(2),
            BarInterval::FourHours => Duration::hours(4),
            BarInterval::SixHours => Duration::hours(6),
            BarInterval::TwelveHours => Duration::hours(12),
            BarInterval::OneDay => Duration::days(1),
            BarInterval::OneWeek => Duration::weeks(1),
        }
    }
}

impl fmt::Display for BarInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BarInterval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Minutes are lowercase on the wire; hours and up are uppercase, but
        // accept either for the larger units.
        let interval = match s {
            "1m" => BarInterval::OneMinute,
            "3m" => BarInterval::ThreeMinutes,
            "5m" => BarInterval::FiveMinutes,
            "15m" => BarInterval::FifteenMinutes,
            "30m" => BarInterval::ThirtyMinutes,
            "1H" | "1h" => BarInterval::OneHour,
            "2H" | "2h" => BarInterval::TwoHours,
            "4H" | "4h" => BarInterval::FourHours,
            "6H" | "6h" => BarInterval::SixHours,
            "12H" | "12h" => BarInterval::TwelveHours,
            "1D" | "1d" => BarInterval::OneDay,
            "1W" | "1w" => BarInterval::OneWeek,
            other => return Err(Error::Config(format!("unknown bar interval: {}", other))),
        };
        Ok(interval)
    }
}

impl TryFrom<String> for BarInterval {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BarInterval> for String {
    fn from(interval: BarInterval) -> Self {
        interval.as_str().to_string()
    }
}

/// Direction of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn entry_side(&self) -> Side {
        match self {
            Direction::Long => Side::Buy,
            Direction::Short => Side::Sell,
        }
    }

    pub fn exit_side(&self) -> Side {
        self.entry_side().opposite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Flat,
    Long,
    Short,
}

impl PositionState {
    pub fn direction(&self) -> Option<Direction> {
        match self {
            PositionState::Flat => None,
            PositionState::Long => Some(Direction::Long),
            PositionState::Short => Some(Direction::Short),
        }
    }
}

impl From<Direction> for PositionState {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Long => PositionState::Long,
            Direction::Short => PositionState::Short,
        }
    }
}

/// The single position the strategy can hold.
///
/// `Flat` always carries `size == 0.0`; `Long`/`Short` always carry a
/// positive size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub state: PositionState,
    pub entry_price: f64,
    pub size: f64,
    pub opened_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn flat() -> Self {
        Self {
            state: PositionState::Flat,
            entry_price: 0.0,
            size: 0.0,
            opened_at: None,
        }
    }

    pub fn open(
        direction: Direction,
        entry_price: f64,
        size: f64,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            state: direction.into(),
            entry_price,
            size,
            opened_at: Some(opened_at),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.state == PositionState::Flat
    }

    pub fn direction(&self) -> Option<Direction> {
        self.state.direction()
    }

    /// Mark-to-market P&L at `price`, zero when flat
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        match self.direction() {
            Some(direction) => (price - self.entry_price) * self.size * direction.sign(),
            None => 0.0,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::flat()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop-loss"),
            ExitReason::TakeProfit => write!(f, "take-profit"),
        }
    }
}

/// A completed round trip, emitted once when a position fully closes.
///
/// `gross_pnl = (exit_price - entry_price) * size * sign`, with sign +1 for
/// long and -1 for short. `net_pnl = gross_pnl - commission`, where
/// `commission` covers both the entry and the exit fill. These match a
/// broker's `pnl` and `pnl_with_commission`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub gross_pnl: f64,
    pub commission: f64, // entry + exit
    pub net_pnl: f64,    // gross_pnl - commission
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub exit_reason: Option<ExitReason>,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.net_pnl > 0.0
    }

    pub fn holding_period(&self) -> Duration {
        self.closed_at - self.opened_at
    }
}
