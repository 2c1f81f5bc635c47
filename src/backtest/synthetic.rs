use crate::models::{BarInterval, Candle, CandleSeries};
use chrono::{DateTime, Duration, DurationRound, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Steady uptrend with noise (+2% daily average)
    Uptrend,
    /// Steady downtrend with noise (-2% daily average)
    Downtrend,
    /// Sideways/choppy market (±1% around mean)
    Sideways,
    /// High volatility (±5% large swings)
    Volatile,
    /// Contains time gaps (missing candles)
    WithGaps,
    /// Rally for the first half, then a 25% slide
    Reversal,
}

impl std::str::FromStr for MarketScenario {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uptrend" => Ok(MarketScenario::Uptrend),
            "downtrend" => Ok(MarketScenario::Downtrend),
            "sideways" => Ok(MarketScenario::Sideways),
            "volatile" => Ok(MarketScenario::Volatile),
            "gaps" | "with-gaps" => Ok(MarketScenario::WithGaps),
            "reversal" => Ok(MarketScenario::Reversal),
            other => Err(crate::Error::Config(format!("unknown scenario: {}", other))),
        }
    }
}

/// Generates synthetic price data for backtesting
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
    end_time: Option<DateTime<Utc>>,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 40_000.0,
            base_volume: 50.0,
            end_time: None,
        }
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }

    /// Pin the last candle's timestamp instead of deriving it from the clock
    pub fn ending_at(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn base_price(&self) -> f64 {
        self.base_price
    }

    /// Generate candles for a specific market scenario
    ///
    /// # Arguments
    /// * `scenario` - The market scenario to simulate
    /// * `num_candles` - Number of candles to generate (the default EMAs need 169+)
    /// * `bar` - Spacing between candles
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        num_candles: usize,
        bar: BarInterval,
    ) -> Vec<Candle> {
        let step = bar.duration();
        let end_time = self.end_time.unwrap_or_else(|| {
            let now = Utc::now();
            now.duration_trunc(step).unwrap_or(now) - step
        });
        let start_time = end_time - step * (num_candles as i32 - 1).max(0);

        // Drift is quoted per day; scale it to the bar size
        let bars_per_day = (Duration::days(1).num_seconds() as f64 / step.num_seconds() as f64).max(1.0);

        match scenario {
            MarketScenario::Uptrend => {
                self.generate_trend(start_time, num_candles, step, 0.02 / bars_per_day)
            }
            MarketScenario::Downtrend => {
                self.generate_trend(start_time, num_candles, step, -0.02 / bars_per_day)
            }
            MarketScenario::Sideways => self.generate_sideways(start_time, num_candles, step),
            MarketScenario::Volatile => self.generate_volatile(start_time, num_candles, step),
            MarketScenario::WithGaps => self.generate_with_gaps(start_time, num_candles, step),
            MarketScenario::Reversal => self.generate_reversal(start_time, num_candles, step),
        }
    }

    /// Same as [`generate`](Self::generate), as a deduplicated series
    pub fn generate_series(
        &mut self,
        scenario: MarketScenario,
        num_candles: usize,
        bar: BarInterval,
    ) -> CandleSeries {
        CandleSeries::from_candles(self.generate(scenario, num_candles, bar))
    }

    fn generate_trend(
        &mut self,
        start_time: DateTime<Utc>,
        num_candles: usize,
        step: Duration,
        drift_per_interval: f64,
    ) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(num_candles);
        let mut current_price = self.base_price;

        for i in 0..num_candles {
            let timestamp = start_time + step * i as i32;

            // Noise stays below the drift so the trend dominates
            let drift = current_price * drift_per_interval;
            let noise = current_price * self.rng.gen_range(-0.0005..0.0005);
            current_price += drift + noise;

            candles.push(self.create_candle(current_price, timestamp));
        }

        candles
    }

    /// Generate sideways market: mean-reverting random walk
    fn generate_sideways(
        &mut self,
        start_time: DateTime<Utc>,
        num_candles: usize,
        step: Duration,
    ) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(num_candles);
        let mut current_price = self.base_price;
        let mean_price = self.base_price;

        for i in 0..num_candles {
            let timestamp = start_time + step * i as i32;

            let reversion = (mean_price - current_price) * 0.1;
            let noise = current_price * self.rng.gen_range(-0.01..0.01);
            current_price += reversion + noise;

            candles.push(self.create_candle(current_price, timestamp));
        }

        candles
    }

    /// Generate volatile market: large swings
    fn generate_volatile(
        &mut self,
        start_time: DateTime<Utc>,
        num_candles: usize,
        step: Duration,
    ) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(num_candles);
        let mut current_price = self.base_price;

        for i in 0..num_candles {
            let timestamp = start_time + step * i as i32;

            let change = current_price * self.rng.gen_range(-0.05..0.05);
            current_price = (current_price + change).max(self.base_price * 0.5);

            candles.push(self.create_candle(current_price, timestamp));
        }

        candles
    }

    /// Every 50th bar is dropped, leaving a two-bar hole
    fn generate_with_gaps(
        &mut self,
        start_time: DateTime<Utc>,
        num_candles: usize,
        step: Duration,
    ) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(num_candles);
        let mut current_price = self.base_price;
        let mut actual_index = 0;

        for i in 0..num_candles {
            if i % 50 == 49 {
                actual_index += 2;
                continue;
            }

            let timestamp = start_time + step * actual_index;

            let change = current_price * self.rng.gen_range(-0.01..0.01);
            current_price += change;

            candles.push(self.create_candle(current_price, timestamp));

            actual_index += 1;
        }

        candles
    }

    fn generate_reversal(
        &mut self,
        start_time: DateTime<Utc>,
        num_candles: usize,
        step: Duration,
    ) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(num_candles);
        let mut current_price = self.base_price;
        let half = num_candles / 2;

        for i in 0..num_candles {
            let timestamp = start_time + step * i as i32;

            if i < half {
                current_price += current_price * self.rng.gen_range(-0.002..0.004);
            } else {
                let drop_rate = -0.25 / (num_candles - half).max(1) as f64;
                let noise = current_price * self.rng.gen_range(-0.002..0.002);
                current_price += current_price * drop_rate + noise;
            }

            candles.push(self.create_candle(current_price, timestamp));
        }

        candles
    }

    /// Helper to create a candle from price and timestamp
    fn create_candle(&mut self, price: f64, timestamp: DateTime<Utc>) -> Candle {
        let noise_pct = 0.002; // ±0.2% intrabar movement

        let high = price * (1.0 + self.rng.gen_range(0.0..noise_pct));
        let low = price * (1.0 - self.rng.gen_range(0.0..noise_pct));

        let open_raw = price * (1.0 + self.rng.gen_range(-noise_pct..noise_pct));
        let open = open_raw.clamp(low, high);

        // Vary volume ±30%
        let volume = self.base_volume * self.rng.gen_range(0.7..1.3);

        Candle {
            timestamp,
            open,
            high,
            low,
            close: price,
            volume,
        }
    }
}
