use chrono::{DateTime, Duration, TimeZone, Utc};
use mockito::Matcher;

use trendbot::backfill::{FetchCompletion, HistoryFetcher};
use trendbot::backtest::{BacktestRunner, MarketScenario, SyntheticDataGenerator};
use trendbot::config::{BacktestConfig, FetchConfig, SourceConfig, StrategyConfig};
use trendbot::*;

fn anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

/// OKX-style page body, newest first
fn page(hours_back: &[i64]) -> String {
    let rows: Vec<String> = hours_back
        .iter()
        .map(|h| {
            let ts = (anchor() - Duration::hours(*h)).timestamp_millis();
            let close = 42000.0 - *h as f64 * 10.0;
            format!(
                r#"["{}","{}","{}","{}","{}","1.5","63000","63000","1"]"#,
                ts,
                close - 5.0,
                close + 20.0,
                close - 20.0,
                close
            )
        })
        .collect();
    format!(r#"{{"code":"0","msg":"","data":[{}]}}"#, rows.join(","))
}

fn after_param(hours_back: i64) -> Matcher {
    let ms = (anchor() - Duration::hours(hours_back)).timestamp_millis() + 1;
    Matcher::UrlEncoded("after".into(), ms.to_string())
}

fn fetch_config() -> FetchConfig {
    FetchConfig {
        page_limit: 3,
        request_delay_sec: 0.0,
        ..FetchConfig::default()
    }
}

#[tokio::test]
async fn test_fetch_walks_okx_pages_back_to_exhaustion() {
    let _ = tracing_subscriber::fmt::try_init();

    let mut server = mockito::Server::new_async().await;
    let first = server
        .mock("GET", "/api/v5/market/candles")
        .match_query(Matcher::Regex("^instId=BTC-USDT&bar=1H&limit=3$".into()))
        .with_status(200)
        .with_body(page(&[0, 1, 2]))
        .expect(1)
        .create_async()
        .await;
    // Overlaps the first page by one bar
    let second = server
        .mock("GET", "/api/v5/market/candles")
        .match_query(after_param(3))
        .with_status(200)
        .with_body(page(&[2, 3, 4]))
        .expect(1)
        .create_async()
        .await;
    let third = server
        .mock("GET", "/api/v5/market/candles")
        .match_query(after_param(5))
        .with_status(200)
        .with_body(r#"{"code":"0","msg":"","data":[]}"#)
        .expect(1)
        .create_async()
        .await;

    let client = OkxClient::new(&SourceConfig {
        base_url: server.url(),
        ..SourceConfig::default()
    })
    .unwrap();
    let fetcher = HistoryFetcher::new(client, &fetch_config());
    let outcome = fetcher.fetch("BTC-USDT", BarInterval::OneHour, 30).await;

    first.assert_async().await;
    second.assert_async().await;
    third.assert_async().await;

    assert!(matches!(outcome.completion, FetchCompletion::SourceExhausted));
    assert!(outcome.is_complete());
    assert!(!outcome.span_reached());
    assert_eq!(outcome.pages_requested, 3);
    assert_eq!(outcome.series.len(), 5);
    assert_eq!(outcome.series.first().unwrap().timestamp, anchor() - Duration::hours(4));
    assert_eq!(outcome.series.last().unwrap().timestamp, anchor());
    assert!(outcome.gaps.is_empty());
}

#[tokio::test]
async fn test_fetch_api_error_keeps_partial_history() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/v5/market/candles")
        .match_query(Matcher::Regex("^instId=BTC-USDT&bar=1H&limit=3$".into()))
        .with_status(200)
        .with_body(page(&[0, 1, 2]))
        .create_async()
        .await;
    server
        .mock("GET", "/api/v5/market/candles")
        .match_query(after_param(3))
        .with_status(200)
        .with_body(r#"{"code":"50011","msg":"Too Many Requests","data":[]}"#)
        .create_async()
        .await;

    let client = OkxClient::new(&SourceConfig {
        base_url: server.url(),
        ..SourceConfig::default()
    })
    .unwrap();
    let outcome = HistoryFetcher::new(client, &fetch_config())
        .fetch("BTC-USDT", BarInterval::OneHour, 30)
        .await;

    assert_eq!(outcome.series.len(), 3);
    let err = outcome.error().expect("second page should fail");
    assert!(matches!(err, Error::SourceUnavailable { .. }));
    assert!(err.to_string().contains("50011"));
    assert!(!outcome.is_complete());
}

#[test]
fn test_backtest_with_default_tunnel() {
    let series = SyntheticDataGenerator::new(7)
        .with_base_price(30_000.0)
        .ending_at(anchor())
        .generate_series(MarketScenario::Uptrend, 1000, BarInterval::OneHour);

    let runner = BacktestRunner::new(StrategyConfig::default(), BacktestConfig::default());
    let report = runner.run(&series).unwrap();

    assert_eq!(report.bars, 1000);
    // The 169-bar slow EMA is ready on bar 169
    assert_eq!(report.warmup_bars, 168);
    assert!(report.orders_submitted > 0);
    assert_eq!(report.orders_rejected, 0);
    assert!((report.final_equity - (report.initial_cash + report.realized_pnl + report.unrealized_pnl)).abs() < 1e-6);

    // Reports serialize for the CLI's --json output
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["total_trades"], report.total_trades);
}
