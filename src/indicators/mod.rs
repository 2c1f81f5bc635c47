// Technical indicators module
// Streaming moving averages used by the tunnel strategy

pub mod moving_average;

pub use moving_average::{ema_series, Ema, EmaIter, IndicatorSeries};
