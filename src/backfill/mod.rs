pub mod validator;

use chrono::{DateTime, Duration, Utc};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::api::{CandleSource, PageRequest};
use crate::config::FetchConfig;
use crate::error::Error;
use crate::models::{BarInterval, CandleSeries, Gap};

pub use validator::CandleValidator;

// Type alias for the rate limiter to simplify signatures
type PageRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// What to do with a page whose candles fail validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPagePolicy {
    /// Stop and hand back the partial series with the error
    #[default]
    Abort,
    /// Drop the page, step the cursor past it, keep going
    Skip,
}

/// Cooperative cancellation flag, checked before every page request
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why the paging loop stopped
#[derive(Debug, Clone)]
pub enum FetchCompletion {
    /// Accumulated span reached the requested number of days
    TargetReached,
    /// The source returned an empty page; there is nothing older
    SourceExhausted,
    /// The page cap was hit before the target span
    PageCapReached { pages: usize },
    /// The cancel token was set between pages
    Cancelled,
    /// A page did not move backward past the cursor
    Stalled,
    /// A page request failed; the series holds what came before it
    PageFailed(Error),
}

/// Result of a history fetch: always a series, possibly partial
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub series: CandleSeries,
    pub completion: FetchCompletion,
    pub pages_requested: usize,
    pub pages_skipped: usize,
    pub target_span: Duration,
    pub gaps: Vec<Gap>,
}

impl FetchOutcome {
    /// True when the loop ended because there was nothing more to fetch
    pub fn is_complete(&self) -> bool {
        matches!(
            self.completion,
            FetchCompletion::TargetReached | FetchCompletion::SourceExhausted
        )
    }

    pub fn span_reached(&self) -> bool {
        self.series.span() >= self.target_span
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.completion {
            FetchCompletion::PageFailed(e) => Some(e),
            _ => None,
        }
    }
}

/// Walks a paginated candle source backward in time until enough history
/// has been collected.
///
/// Requests run one at a time, spaced by a fixed delay. There is no retry:
/// a failed page ends the fetch and the caller decides what to do with the
/// partial series.
pub struct HistoryFetcher<S> {
    source: S,
    page_limit: usize,
    max_pages: usize,
    page_timeout: std::time::Duration,
    malformed_policy: MalformedPagePolicy,
    validator: CandleValidator,
    rate_limiter: Option<Arc<PageRateLimiter>>,
    cancel: CancelToken,
}

impl<S: CandleSource> HistoryFetcher<S> {
    pub fn new(source: S, config: &FetchConfig) -> Self {
        // A zero delay yields no quota, i.e. no throttling
        let rate_limiter = Quota::with_period(config.request_delay())
            .map(|quota| Arc::new(RateLimiter::direct(quota)));

        Self {
            source,
            page_limit: config.page_limit,
            max_pages: config.max_pages,
            page_timeout: config.page_timeout(),
            malformed_policy: config.malformed_page_policy,
            validator: CandleValidator::new(),
            rate_limiter,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_validator(mut self, validator: CandleValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    async fn throttle(&self) {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }
    }

    /// Fetch at least `target_span_days` of `bar` candles for `instrument`,
    /// newest first, and return them as one ascending series.
    pub async fn fetch(
        &self,
        instrument: &str,
        bar: BarInterval,
        target_span_days: u32,
    ) -> FetchOutcome {
        let target_span = Duration::days(target_span_days as i64);
        let step = bar.duration();

        tracing::info!(
            "Fetching {} days of {} candles for {} (page limit {}, max {} pages)",
            target_span_days,
            bar,
            instrument,
            self.page_limit,
            self.max_pages
        );

        let mut series = CandleSeries::new();
        let mut cursor: Option<DateTime<Utc>> = None;
        let mut pages_requested = 0;
        let mut pages_skipped = 0;

        let completion = loop {
            if pages_requested >= self.max_pages {
                break FetchCompletion::PageCapReached {
                    pages: pages_requested,
                };
            }
            if self.cancel.is_cancelled() {
                break FetchCompletion::Cancelled;
            }

            self.throttle().await;

            let request = PageRequest::latest(instrument, bar, self.page_limit).ending_at(cursor);
            pages_requested += 1;

            let page =
                match tokio::time::timeout(self.page_timeout, self.source.fetch_page(&request))
                    .await
                {
                    Ok(Ok(page)) => page,
                    Ok(Err(e)) => {
                        tracing::warn!("Page {} failed: {}", pages_requested, e);
                        break FetchCompletion::PageFailed(e);
                    }
                    Err(_) => {
                        let e = Error::source_unavailable(format!(
                            "page request timed out after {:?}",
                            self.page_timeout
                        ));
                        tracing::warn!("Page {} failed: {}", pages_requested, e);
                        break FetchCompletion::PageFailed(e);
                    }
                };

            let Some(earliest) = page.iter().map(|c| c.timestamp).min() else {
                tracing::debug!("Empty page {}, source exhausted", pages_requested);
                break FetchCompletion::SourceExhausted;
            };

            if let Some(cursor) = cursor {
                if earliest > cursor {
                    tracing::warn!(
                        "Page {} starts at {} which is after the cursor {}; source is not paging",
                        pages_requested,
                        earliest,
                        cursor
                    );
                    break FetchCompletion::Stalled;
                }
            }
            cursor = Some(earliest - step);

            if let Err(e) = self.validator.validate_page(&page) {
                match self.malformed_policy {
                    MalformedPagePolicy::Abort => {
                        tracing::warn!("Page {} rejected: {}", pages_requested, e);
                        break FetchCompletion::PageFailed(e);
                    }
                    MalformedPagePolicy::Skip => {
                        tracing::warn!("Skipping page {}: {}", pages_requested, e);
                        pages_skipped += 1;
                        continue;
                    }
                }
            }

            series = series.merge(page);

            tracing::info!(
                "Fetched page {}: {} candles total, back to {}, span {}h",
                pages_requested,
                series.len(),
                earliest,
                series.span().num_hours()
            );

            if series.span() >= target_span {
                break FetchCompletion::TargetReached;
            }
        };

        let gaps = series.gaps(bar);
        if !gaps.is_empty() {
            tracing::warn!(
                "{} gap(s) in {} {} history, {} bars missing",
                gaps.len(),
                instrument,
                bar,
                gaps.iter().map(|g| g.missing_bars(bar)).sum::<i64>()
            );
        }

        tracing::info!(
            "Fetch finished ({:?}): {} candles over {} pages",
            completion,
            series.len(),
            pages_requested
        );

        FetchOutcome {
            series,
            completion,
            pages_requested,
            pages_skipped,
            target_span,
            gaps,
        }
    }
}
