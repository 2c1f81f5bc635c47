use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::{BarInterval, Candle};

/// Candles ordered by strictly increasing timestamp, one per timestamp.
///
/// Merging never mutates in place: `merge` consumes the series and returns the
/// extended one. When two candles share a timestamp the one already in the
/// series wins, so pages fetched earlier take precedence over later pages.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

/// Two adjacent candles whose spacing is not the nominal interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gap {
    pub after: DateTime<Utc>,
    pub before: DateTime<Utc>,
    pub spacing: Duration,
}

impl Gap {
    /// Whole bars absent between the two candles (0 for irregular spacing
    /// shorter than two intervals)
    pub fn missing_bars(&self, interval: BarInterval) -> i64 {
        let step = interval.duration().num_seconds().max(1);
        (self.spacing.num_seconds() / step - 1).max(0)
    }
}

impl CandleSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from candles in any order; the first candle seen for a timestamp
    /// is kept
    pub fn from_candles(candles: impl IntoIterator<Item = Candle>) -> Self {
        Self::new().merge(candles)
    }

    /// Merge a page into the series
    pub fn merge(self, page: impl IntoIterator<Item = Candle>) -> Self {
        let mut by_time: BTreeMap<DateTime<Utc>, Candle> = self
            .candles
            .into_iter()
            .map(|c| (c.timestamp, c))
            .collect();

        for candle in page {
            by_time.entry(candle.timestamp).or_insert(candle);
        }

        Self {
            candles: by_time.into_values().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candle> {
        self.candles.iter()
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Latest timestamp minus earliest timestamp
    pub fn span(&self) -> Duration {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => Duration::zero(),
        }
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.candles
            .binary_search_by_key(&timestamp, |c| c.timestamp)
            .is_ok()
    }

    /// Every adjacent pair not spaced exactly `interval` apart.
    ///
    /// Markets close and exchanges have outages, so gaps are reported rather
    /// than treated as errors.
    pub fn gaps(&self, interval: BarInterval) -> Vec<Gap> {
        let step = interval.duration();
        self.candles
            .windows(2)
            .filter_map(|pair| {
                let spacing = pair[1].timestamp - pair[0].timestamp;
                (spacing != step).then_some(Gap {
                    after: pair[0].timestamp,
                    before: pair[1].timestamp,
                    spacing,
                })
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a CandleSeries {
    type Item = &'a Candle;
    type IntoIter = std::slice::Iter<'a, Candle>;

    fn into_iter(self) -> Self::IntoIter {
        self.candles.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn candle_at(minutes: i64, close: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minutes),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn test_merge_sorts_and_dedups() {
        let newest = vec![candle_at(10, 1.0), candle_at(15, 2.0)];
        let older = vec![candle_at(0, 3.0), candle_at(5, 4.0), candle_at(10, 99.0)];

        let series = CandleSeries::new().merge(newest).merge(older);

        let times: Vec<i64> = series
            .iter()
            .map(|c| c.timestamp.timestamp() / 60 % 60)
            .collect();
        assert_eq!(times, vec![0, 5, 10, 15]);
        // The overlapping bar keeps the first copy fetched
        assert_eq!(series.candles()[2].close, 1.0);
    }

    #[test]
    fn test_span_and_contains() {
        let series = CandleSeries::from_candles(vec![candle_at(60, 1.0), candle_at(0, 1.0)]);
        assert_eq!(series.span(), Duration::hours(1));
        assert!(series.contains(candle_at(60, 0.0).timestamp));
        assert!(!series.contains(candle_at(30, 0.0).timestamp));
        assert_eq!(CandleSeries::new().span(), Duration::zero());
    }

    #[test]
    fn test_gaps_reported() {
        let series = CandleSeries::from_candles(vec![
            candle_at(0, 1.0),
            candle_at(5, 1.0),
            candle_at(20, 1.0),
            candle_at(25, 1.0),
        ]);

        let gaps = series.gaps(BarInterval::FiveMinutes);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].spacing, Duration::minutes(15));
        assert_eq!(gaps[0].missing_bars(BarInterval::FiveMinutes), 2);
    }

    #[test]
    fn test_contiguous_series_has_no_gaps() {
        let series = CandleSeries::from_candles((0..10).map(|i| candle_at(i * 5, 1.0)));
        assert!(series.gaps(BarInterval::FiveMinutes).is_empty());
    }

    proptest! {
        #[test]
        fn prop_any_page_sequence_is_strictly_increasing(
            pages in prop::collection::vec(prop::collection::vec(0i64..500, 0..40), 0..12)
        ) {
            let series = pages.iter().fold(CandleSeries::new(), |acc, page| {
                acc.merge(page.iter().map(|&m| candle_at(m, m as f64)))
            });

            for pair in series.candles().windows(2) {
                prop_assert!(pair[0].timestamp < pair[1].timestamp);
            }

            let mut expected: Vec<i64> = pages.iter().flatten().copied().collect();
            expected.sort_unstable();
            expected.dedup();
            prop_assert_eq!(series.len(), expected.len());
        }
    }
}
