pub mod okx;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{BarInterval, Candle};
use crate::Result;

pub use okx::{instrument_type, Instrument, OkxClient, Ticker};

/// Largest page the candle endpoint serves
pub const MAX_PAGE_LIMIT: usize = 100;

/// One bounded request for candles
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub instrument: String,
    pub bar: BarInterval,
    pub limit: usize,
    /// Newest candle timestamp to include; `None` means "up to now"
    pub end: Option<DateTime<Utc>>,
    /// Oldest candle timestamp to include
    pub start: Option<DateTime<Utc>>,
}

impl PageRequest {
    pub fn latest(instrument: impl Into<String>, bar: BarInterval, limit: usize) -> Self {
        Self {
            instrument: instrument.into(),
            bar,
            limit,
            end: None,
            start: None,
        }
    }

    pub fn ending_at(mut self, end: Option<DateTime<Utc>>) -> Self {
        self.end = end;
        self
    }
}

/// A paginated, page-bounded source of historical candles.
///
/// Implementations return at most `limit` candles, ascending by timestamp.
/// An empty page means the source has nothing older to offer.
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Candle>>;
}
