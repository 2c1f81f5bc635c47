use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::backfill::MalformedPagePolicy;
use crate::error::Error;
use crate::models::BarInterval;
use crate::Result;

/// File looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "trendbot";
/// Environment variables override file values, e.g. `TRENDBOT__FETCH__PAGE_LIMIT=50`
pub const ENV_PREFIX: &str = "TRENDBOT";

/// Everything the fetcher, strategy and backtest read at startup.
///
/// Example `trendbot.toml`:
/// ```toml
/// [strategy]
/// ema_fast_period = 144
/// ema_slow_period = 169
/// stop_loss_pct = 0.01
/// take_profit_pct = 0.02
/// order_size = 0.5
///
/// [fetch]
/// instrument = "BTC-USDT"
/// bar = "1H"
/// target_span_days = 30
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub strategy: StrategyConfig,
    pub fetch: FetchConfig,
    pub source: SourceConfig,
    pub backtest: BacktestConfig,
}

/// Tunnel strategy parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub ema_fast_period: usize,
    pub ema_slow_period: usize,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub order_size: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            ema_fast_period: 144,
            ema_slow_period: 169,
            stop_loss_pct: 0.01,
            take_profit_pct: 0.02,
            order_size: 1.0,
        }
    }
}

/// History pagination parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub instrument: String,
    pub bar: BarInterval,
    pub page_limit: usize,
    pub target_span_days: u32,
    pub request_delay_sec: f64,
    pub max_pages: usize,
    pub page_timeout_sec: u64,
    pub malformed_page_policy: MalformedPagePolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            instrument: "BTC-USDT".to_string(),
            bar: BarInterval::OneHour,
            page_limit: 100,
            target_span_days: 30,
            request_delay_sec: 0.1,
            max_pages: 100,
            page_timeout_sec: 10,
            malformed_page_policy: MalformedPagePolicy::Abort,
        }
    }
}

impl FetchConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.request_delay_sec.max(0.0))
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_sec)
    }
}

/// Market-data HTTP endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub proxy: Option<String>,
    pub timeout_sec: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.okx.com".to_string(),
            proxy: None,
            timeout_sec: 10,
        }
    }
}

/// Simulated broker parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub commission_pct: f64,
    pub initial_cash: f64,
    pub fill_delay_bars: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            commission_pct: 0.001,
            initial_cash: 100_000.0,
            fill_delay_bars: 0,
        }
    }
}

impl Settings {
    /// Load defaults, then the config file, then `TRENDBOT__*` env vars.
    ///
    /// With `path == None` a `trendbot.{toml,yaml,json}` in the working
    /// directory is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let builder = config::Config::builder();
        let builder = match path {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let settings: Settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.strategy;
        if s.ema_fast_period == 0 || s.ema_slow_period == 0 {
            return Err(invalid("EMA periods must be positive"));
        }
        if s.ema_fast_period >= s.ema_slow_period {
            return Err(invalid(format!(
                "ema_fast_period ({}) must be shorter than ema_slow_period ({})",
                s.ema_fast_period, s.ema_slow_period
            )));
        }
        if !(s.stop_loss_pct > 0.0 && s.stop_loss_pct < 1.0) {
            return Err(invalid(format!("stop_loss_pct out of range: {}", s.stop_loss_pct)));
        }
        if !(s.take_profit_pct > 0.0 && s.take_profit_pct < 1.0) {
            return Err(invalid(format!(
                "take_profit_pct out of range: {}",
                s.take_profit_pct
            )));
        }
        if !(s.order_size > 0.0 && s.order_size.is_finite()) {
            return Err(invalid(format!("order_size must be positive: {}", s.order_size)));
        }

        let f = &self.fetch;
        if f.instrument.trim().is_empty() {
            return Err(invalid("instrument is empty"));
        }
        if f.page_limit == 0 || f.page_limit > crate::api::MAX_PAGE_LIMIT {
            return Err(invalid(format!(
                "page_limit must be within 1..={}, got {}",
                crate::api::MAX_PAGE_LIMIT,
                f.page_limit
            )));
        }
        if f.target_span_days == 0 {
            return Err(invalid("target_span_days must be positive"));
        }
        if f.max_pages == 0 {
            return Err(invalid("max_pages must be positive"));
        }
        if !(f.request_delay_sec >= 0.0 && f.request_delay_sec.is_finite()) {
            return Err(invalid(format!(
                "request_delay_sec must be non-negative: {}",
                f.request_delay_sec
            )));
        }
        if f.page_timeout_sec == 0 {
            return Err(invalid("page_timeout_sec must be positive"));
        }

        let b = &self.backtest;
        if !(b.commission_pct >= 0.0 && b.commission_pct < 1.0) {
            return Err(invalid(format!("commission_pct out of range: {}", b.commission_pct)));
        }
        if b.initial_cash <= 0.0 {
            return Err(invalid("initial_cash must be positive"));
        }

        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::Config(reason.into())
}
