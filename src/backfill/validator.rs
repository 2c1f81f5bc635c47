use chrono::{DateTime, Duration, Utc};

use crate::error::Error;
use crate::models::Candle;
use crate::Result;

/// Sanity checks applied to every candle a page delivers
pub struct CandleValidator {
    /// How far past "now" a bar timestamp may sit before it is rejected
    max_clock_skew: Duration,
}

impl CandleValidator {
    pub fn new() -> Self {
        Self {
            max_clock_skew: Duration::minutes(1),
        }
    }

    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.max_clock_skew = skew;
        self
    }

    /// Validate a candle for correctness
    pub fn validate(&self, candle: &Candle) -> Result<()> {
        self.validate_prices(candle)?;
        self.validate_timestamp(candle, Utc::now())?;
        self.validate_ohlc_relationship(candle)?;
        Ok(())
    }

    /// Validate every candle of a page, naming the offending bar
    pub fn validate_page(&self, candles: &[Candle]) -> Result<()> {
        for candle in candles {
            self.validate(candle).map_err(|e| match e {
                Error::MalformedPage { reason } => {
                    Error::malformed(format!("candle at {}: {}", candle.timestamp, reason))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    /// Prices must be finite and positive; volume finite and non-negative
    fn validate_prices(&self, candle: &Candle) -> Result<()> {
        for (name, price) in [
            ("open", candle.open),
            ("high", candle.high),
            ("low", candle.low),
            ("close", candle.close),
        ] {
            if !price.is_finite() || price <= 0.0 {
                return Err(Error::malformed(format!("Invalid {} price: {}", name, price)));
            }
        }
        if !candle.volume.is_finite() || candle.volume < 0.0 {
            return Err(Error::malformed(format!("Invalid volume: {}", candle.volume)));
        }
        Ok(())
    }

    fn validate_timestamp(&self, candle: &Candle, now: DateTime<Utc>) -> Result<()> {
        if candle.timestamp > now + self.max_clock_skew {
            return Err(Error::malformed(format!(
                "Candle timestamp is in the future: {} (now: {})",
                candle.timestamp, now
            )));
        }
        Ok(())
    }

    /// high >= max(open, close), low <= min(open, close)
    fn validate_ohlc_relationship(&self, candle: &Candle) -> Result<()> {
        if candle.high < candle.low {
            return Err(Error::malformed(format!(
                "High ({}) is less than low ({})",
                candle.high, candle.low
            )));
        }
        let body_top = candle.open.max(candle.close);
        if candle.high < body_top {
            return Err(Error::malformed(format!(
                "High ({}) is below the candle body ({})",
                candle.high, body_top
            )));
        }
        let body_bottom = candle.open.min(candle.close);
        if candle.low > body_bottom {
            return Err(Error::malformed(format!(
                "Low ({}) is above the candle body ({})",
                candle.low, body_bottom
            )));
        }
        Ok(())
    }
}

impl Default for CandleValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_valid_candle() -> Candle {
        Candle {
            timestamp: Utc::now() - Duration::hours(1),
            open: 100.0,
            high: 102.0,
            low: 99.0,
            close: 101.0,
            volume: 1000000.0,
        }
    }

    fn error_for(candle: &Candle) -> String {
        CandleValidator::new()
            .validate(candle)
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn test_validate_valid_candle() {
        assert!(CandleValidator::new().validate(&make_valid_candle()).is_ok());
    }

    #[test]
    fn test_validate_non_positive_prices() {
        let mut candle = make_valid_candle();
        candle.open = -100.0;
        assert!(error_for(&candle).contains("Invalid open price"));

        let mut candle = make_valid_candle();
        candle.low = 0.0;
        assert!(error_for(&candle).contains("Invalid low price"));

        let mut candle = make_valid_candle();
        candle.close = f64::NAN;
        assert!(error_for(&candle).contains("Invalid close price"));
    }

    #[test]
    fn test_validate_volume() {
        let mut candle = make_valid_candle();
        candle.volume = 0.0;
        assert!(CandleValidator::new().validate(&candle).is_ok());

        candle.volume = -1000.0;
        assert!(error_for(&candle).contains("Invalid volume"));
    }

    #[test]
    fn test_validate_high_less_than_low() {
        let mut candle = make_valid_candle();
        candle.high = 98.0;
        candle.low = 99.0;
        assert!(error_for(&candle).contains("less than low"));
    }

    #[test]
    fn test_validate_body_outside_range() {
        let mut candle = make_valid_candle();
        candle.close = 105.0;
        candle.high = 104.0;
        assert!(error_for(&candle).contains("below the candle body"));

        let mut candle = make_valid_candle();
        candle.open = 95.0;
        candle.low = 96.0;
        assert!(error_for(&candle).contains("above the candle body"));
    }

    #[test]
    fn test_validate_future_timestamp() {
        let mut candle = make_valid_candle();
        candle.timestamp = Utc::now() + Duration::hours(10);
        assert!(error_for(&candle).contains("future"));

        let lenient = CandleValidator::new().with_clock_skew(Duration::days(1));
        assert!(lenient.validate(&candle).is_ok());
    }

    #[test]
    fn test_validate_all_prices_equal() {
        let mut candle = make_valid_candle();
        candle.open = 100.0;
        candle.high = 100.0;
        candle.low = 100.0;
        candle.close = 100.0;
        assert!(CandleValidator::new().validate(&candle).is_ok());
    }

    #[test]
    fn test_validate_page_reports_malformed() {
        let good = make_valid_candle();
        let mut bad = make_valid_candle();
        bad.high = 1.0;

        let validator = CandleValidator::new();
        assert!(validator.validate_page(&[good, good]).is_ok());

        let err = validator.validate_page(&[good, bad]).unwrap_err();
        assert!(matches!(err, Error::MalformedPage { .. }));
    }
}
