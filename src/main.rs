use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use trendbot::backfill::{CancelToken, FetchOutcome, HistoryFetcher};
use trendbot::backtest::{BacktestRunner, MarketScenario, SyntheticDataGenerator};
use trendbot::config::Settings;
use trendbot::models::{BarInterval, CandleSeries};
use trendbot::api::instrument_type;
use trendbot::OkxClient;

#[derive(Parser, Debug)]
#[command(name = "trendbot", about = "EMA tunnel strategy: history backfill and backtesting")]
struct Cli {
    /// Config file (defaults to ./trendbot.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct FetchArgs {
    /// Instrument id, e.g. BTC-USDT
    #[arg(long)]
    instrument: Option<String>,
    /// Bar interval, e.g. 1H, 15m, 1D
    #[arg(long)]
    bar: Option<BarInterval>,
    /// Days of history to collect
    #[arg(long)]
    days: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch candle history from OKX
    Fetch {
        #[command(flatten)]
        fetch: FetchArgs,
        /// Print candles as JSON lines instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Show the latest OKX ticker
    Ticker {
        /// Instrument id, defaults to the configured one
        #[arg(long)]
        instrument: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Run the tunnel strategy over fetched or synthetic history
    Backtest {
        #[command(flatten)]
        fetch: FetchArgs,
        /// Use generated data instead of fetching (uptrend, downtrend, sideways, volatile, gaps, reversal)
        #[arg(long)]
        synthetic: Option<MarketScenario>,
        /// Number of synthetic bars
        #[arg(long, default_value_t = 2000)]
        bars: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Fetch { fetch, json } => {
            apply_overrides(&mut settings, &fetch)?;
            let outcome = fetch_history(&settings).await?;
            if json {
                for candle in &outcome.series {
                    println!("{}", serde_json::to_string(candle)?);
                }
            } else {
                print_fetch_summary(&settings, &outcome);
            }
        }
        Command::Ticker { instrument, json } => {
            let client = OkxClient::new(&settings.source).context("failed to create OKX client")?;
            let inst_id = instrument.unwrap_or_else(|| settings.fetch.instrument.clone());
            let ticker = client
                .get_ticker(&inst_id)
                .await
                .with_context(|| format!("failed to get ticker for {}", inst_id))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&ticker)?);
            } else {
                println!("{}  last {}  bid {:?}  ask {:?}", ticker.instrument, ticker.last, ticker.bid, ticker.ask);
                println!(
                    "24h   open {}  high {}  low {}  volume {}",
                    ticker.open_24h, ticker.high_24h, ticker.low_24h, ticker.volume_24h
                );
            }
        }
        Command::Backtest {
            fetch,
            synthetic,
            bars,
            seed,
            json,
        } => {
            apply_overrides(&mut settings, &fetch)?;
            let series = match synthetic {
                Some(scenario) => SyntheticDataGenerator::new(seed).generate_series(
                    scenario,
                    bars,
                    settings.fetch.bar,
                ),
                None => fetch_history(&settings).await?.series,
            };

            let runner = BacktestRunner::new(settings.strategy.clone(), settings.backtest.clone());
            let report = runner.run(&series).context("backtest failed")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                report.print_report();
            }
        }
    }

    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trendbot=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn apply_overrides(settings: &mut Settings, args: &FetchArgs) -> Result<()> {
    if let Some(instrument) = &args.instrument {
        settings.fetch.instrument = instrument.clone();
    }
    if let Some(bar) = args.bar {
        settings.fetch.bar = bar;
    }
    if let Some(days) = args.days {
        settings.fetch.target_span_days = days;
    }
    settings.validate().context("invalid command-line overrides")?;
    Ok(())
}

async fn fetch_history(settings: &Settings) -> Result<FetchOutcome> {
    let client = OkxClient::new(&settings.source).context("failed to create OKX client")?;
    check_instrument(&client, &settings.fetch.instrument).await?;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, finishing with the pages fetched so far");
                cancel.cancel();
            }
        });
    }

    let fetcher = HistoryFetcher::new(client, &settings.fetch).with_cancel_token(cancel);
    let outcome = fetcher
        .fetch(
            &settings.fetch.instrument,
            settings.fetch.bar,
            settings.fetch.target_span_days,
        )
        .await;

    if let Some(e) = outcome.error() {
        tracing::warn!("History is partial: {}", e);
    }

    Ok(outcome)
}

/// Refuse ids OKX does not list. If the list itself cannot be fetched the
/// candle requests will report the problem, so carry on.
async fn check_instrument(client: &OkxClient, inst_id: &str) -> Result<()> {
    let inst_type = instrument_type(inst_id);
    match client.get_instruments(inst_type).await {
        Ok(instruments) => match instruments.iter().find(|i| i.inst_id == inst_id) {
            Some(instrument) if !instrument.is_live() => {
                tracing::warn!("{} is {}, history may stop early", inst_id, instrument.state);
                Ok(())
            }
            Some(_) => Ok(()),
            None => anyhow::bail!("OKX lists no {} instrument {}", inst_type, inst_id),
        },
        Err(e) => {
            tracing::warn!("Could not check the instrument list: {}", e);
            Ok(())
        }
    }
}

fn print_fetch_summary(settings: &Settings, outcome: &FetchOutcome) {
    let series: &CandleSeries = &outcome.series;
    println!("Instrument:  {} ({})", settings.fetch.instrument, settings.fetch.bar);
    println!("Completion:  {:?}", outcome.completion);
    println!("Pages:       {} ({} skipped)", outcome.pages_requested, outcome.pages_skipped);
    println!("Candles:     {}", series.len());
    if let (Some(first), Some(last)) = (series.first(), series.last()) {
        println!("Range:       {} .. {}", first.timestamp, last.timestamp);
        println!(
            "Span:        {:.1} days (target {})",
            series.span().num_hours() as f64 / 24.0,
            settings.fetch.target_span_days
        );
    }
    println!("Gaps:        {}", outcome.gaps.len());
    for gap in outcome.gaps.iter().take(10) {
        println!(
            "  {} -> {} ({} bars missing)",
            gap.after,
            gap.before,
            gap.missing_bars(settings.fetch.bar)
        );
    }
}
