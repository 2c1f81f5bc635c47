// Core modules
pub mod api;
pub mod backfill;
pub mod backtest;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod strategy;

// Re-export commonly used types
pub use api::{CandleSource, OkxClient, PageRequest};
pub use backfill::{CancelToken, FetchCompletion, FetchOutcome, HistoryFetcher};
pub use config::Settings;
pub use models::*;
pub use strategy::Strategy;

// Error handling
pub use error::{Error, Result};
