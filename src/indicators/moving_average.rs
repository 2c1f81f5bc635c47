use crate::models::Candle;

/// Streaming EMA.
///
/// Holds only the running seed sum, the bar count and the last value, so a
/// caller can feed bars one at a time as they arrive and copy the state to
/// resume later without replaying history. The first value is the SMA of the
/// first `period` closes; after that `ema = α·close + (1-α)·ema`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ema {
    period: usize,
    alpha: f64,
    count: usize,
    seed_sum: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            count: 0,
            seed_sum: 0.0,
            value: None,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Bars seen so far
    pub fn count(&self) -> usize {
        self.count
    }

    /// Latest value, `None` during warm-up
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    /// Feed one close and return the EMA at this bar
    pub fn update(&mut self, close: f64) -> Option<f64> {
        if self.period == 0 {
            return None;
        }

        self.count += 1;
        self.value = match self.value {
            Some(prev) => Some(self.alpha * close + (1.0 - self.alpha) * prev),
            None => {
                self.seed_sum += close;
                (self.count == self.period).then(|| self.seed_sum / self.period as f64)
            }
        };
        self.value
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.period);
    }
}

/// One indicator value per candle, `None` until warm-up completes
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub period: usize,
    pub values: Vec<Option<f64>>,
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value_at(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }

    /// Index of the first defined value
    pub fn first_valid_index(&self) -> Option<usize> {
        self.values.iter().position(Option::is_some)
    }
}

/// Lazily yields the EMA for each candle of a window.
///
/// Starting from a saved `Ema` state lets a caller continue a previously
/// computed prefix.
pub struct EmaIter<'a, I: Iterator<Item = &'a Candle>> {
    candles: I,
    ema: Ema,
}

impl<'a, I: Iterator<Item = &'a Candle>> EmaIter<'a, I> {
    pub fn new(candles: I, period: usize) -> Self {
        Self::resume(candles, Ema::new(period))
    }

    pub fn resume(candles: I, ema: Ema) -> Self {
        Self { candles, ema }
    }

    /// State after the candles consumed so far
    pub fn state(&self) -> Ema {
        self.ema
    }
}

impl<'a, I: Iterator<Item = &'a Candle>> Iterator for EmaIter<'a, I> {
    type Item = Option<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        let candle = self.candles.next()?;
        Some(self.ema.update(candle.close))
    }
}

/// EMA of closes aligned 1:1 with `candles`
pub fn ema_series(candles: &[Candle], period: usize) -> IndicatorSeries {
    IndicatorSeries {
        period,
        values: EmaIter::new(candles.iter(), period).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::{Duration, Utc};

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        let start = Utc::now() - Duration::hours(closes.len() as i64);
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: start + Duration::hours(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_ema_seed_is_simple_average() {
        let candles = candles_from_closes(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        let series = ema_series(&candles, 3);

        assert_eq!(series.len(), 5);
        assert_eq!(series.value_at(0), None);
        assert_eq!(series.value_at(1), None);
        assert_eq!(series.first_valid_index(), Some(2));
        assert_abs_diff_eq!(series.value_at(2).unwrap(), 20.0, epsilon = 1e-9);

        // α = 0.5
        assert_abs_diff_eq!(series.value_at(3).unwrap(), 30.0, epsilon = 1e-9);
        assert_abs_diff_eq!(series.value_at(4).unwrap(), 40.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ema_recurrence_with_uneven_closes() {
        let closes = [3.0, 7.0, 1.0, 9.0, 4.0, 12.5];
        let candles = candles_from_closes(&closes);
        let series = ema_series(&candles, 2);

        let alpha = 2.0 / 3.0;
        let mut expected = (3.0 + 7.0) / 2.0;
        assert_abs_diff_eq!(series.value_at(1).unwrap(), expected, epsilon = 1e-9);
        for (i, close) in closes.iter().enumerate().skip(2) {
            expected = alpha * close + (1.0 - alpha) * expected;
            assert_abs_diff_eq!(series.value_at(i).unwrap(), expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_resume_from_prefix_matches_full_run() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let candles = candles_from_closes(&closes);
        let full = ema_series(&candles, 9);

        let mut prefix = EmaIter::new(candles[..25].iter(), 9);
        let head: Vec<Option<f64>> = prefix.by_ref().collect();
        let tail: Vec<Option<f64>> = EmaIter::resume(candles[25..].iter(), prefix.state()).collect();

        let stitched: Vec<Option<f64>> = head.into_iter().chain(tail).collect();
        assert_eq!(stitched, full.values);
    }

    #[test]
    fn test_zero_period_never_ready() {
        let mut ema = Ema::new(0);
        assert_eq!(ema.update(10.0), None);
        assert!(!ema.is_ready());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut ema = Ema::new(2);
        ema.update(1.0);
        ema.update(3.0);
        assert_eq!(ema.value(), Some(2.0));

        ema.reset();
        assert_eq!(ema.count(), 0);
        assert_eq!(ema.value(), None);
        assert_eq!(ema.period(), 2);
    }
}
