use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CandleSource, PageRequest, MAX_PAGE_LIMIT};
use crate::config::SourceConfig;
use crate::error::Error;
use crate::models::Candle;
use crate::Result;

const CANDLES_PATH: &str = "/api/v5/market/candles";
const TICKER_PATH: &str = "/api/v5/market/ticker";
const INSTRUMENTS_PATH: &str = "/api/v5/public/instruments";

/// Client for the OKX public market-data API
///
/// All endpoints used here need no credentials. Candles come at most 100
/// per request, newest first, and page backward with `after`.
#[derive(Clone)]
pub struct OkxClient {
    client: Client,
    base_url: String,
}

// ============== Response Types ==============

/// Every OKX v5 response wraps its rows the same way
#[derive(Debug, Deserialize)]
struct OkxResponse<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTicker {
    inst_id: String,
    last: String,
    #[serde(default)]
    bid_px: String,
    #[serde(default)]
    ask_px: String,
    open24h: String,
    high24h: String,
    low24h: String,
    vol24h: String,
    ts: String,
}

/// Latest trade and 24h statistics for one instrument
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ticker {
    pub instrument: String,
    pub last: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub open_24h: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub volume_24h: f64,
    pub timestamp: DateTime<Utc>,
}

/// A tradable product as listed by OKX
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub inst_id: String,
    pub inst_type: String,
    #[serde(default)]
    pub base_ccy: String,
    #[serde(default)]
    pub quote_ccy: String,
    pub state: String,
    #[serde(default)]
    pub tick_sz: String,
    #[serde(default)]
    pub lot_sz: String,
    #[serde(default)]
    pub min_sz: String,
}

impl Instrument {
    pub fn is_live(&self) -> bool {
        self.state == "live"
    }
}

/// OKX `instType` for an instrument id: `BTC-USDT-SWAP` is a perpetual,
/// `BTC-USD-240628` a dated future, anything else spot.
pub fn instrument_type(inst_id: &str) -> &'static str {
    let parts: Vec<&str> = inst_id.split('-').collect();
    match parts.as_slice() {
        [_, _, "SWAP"] => "SWAP",
        [_, _, expiry] if expiry.chars().all(|c| c.is_ascii_digit()) => "FUTURES",
        [_, _, _, _, "C" | "P"] => "OPTION",
        _ => "SPOT",
    }
}

// ============== Implementation ==============

impl OkxClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_sec));

        if let Some(proxy_url) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| Error::Config(format!("invalid proxy {}: {}", proxy_url, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Query parameters for one page.
    ///
    /// `after` returns bars strictly older than the given millisecond
    /// timestamp and `before` bars strictly newer, so inclusive bounds are
    /// shifted by one millisecond.
    fn query_params(request: &PageRequest) -> Vec<(&'static str, String)> {
        let limit = request.limit.clamp(1, MAX_PAGE_LIMIT);
        let mut params = vec![
            ("instId", request.instrument.clone()),
            ("bar", request.bar.as_str().to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(end) = request.end {
            params.push(("after", (end.timestamp_millis() + 1).to_string()));
        }
        if let Some(start) = request.start {
            params.push(("before", (start.timestamp_millis() - 1).to_string()));
        }
        params
    }

    /// GET an endpoint and unwrap the OKX envelope.
    ///
    /// Transport failures, non-2xx statuses and non-zero codes are
    /// `SourceUnavailable`; a body that does not decode is `MalformedPage`.
    async fn get_data<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&'static str, String)],
    ) -> Result<Vec<T>> {
        let url = format!("{}{}", self.base_url, path);

        let response = self.client.get(&url).query(params).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::source_unavailable(format!(
                "OKX HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: OkxResponse<T> = serde_json::from_str(&body)
            .map_err(|e| Error::malformed(format!("undecodable OKX response: {}", e)))?;

        if parsed.code != "0" {
            return Err(Error::source_unavailable(format!(
                "OKX error code {}: {}",
                parsed.code, parsed.msg
            )));
        }

        Ok(parsed.data)
    }

    /// Get one page of candles
    /// Endpoint: GET /api/v5/market/candles?instId={instId}&bar={bar}&limit={limit}&after={ms}
    pub async fn get_candles(&self, request: &PageRequest) -> Result<Vec<Candle>> {
        let rows: Vec<Vec<String>> = self
            .get_data(CANDLES_PATH, &Self::query_params(request))
            .await?;

        let mut candles = rows
            .iter()
            .map(|row| parse_row(row))
            .collect::<Result<Vec<_>>>()?;

        // Newest first on the wire
        candles.sort_by_key(|c| c.timestamp);

        tracing::debug!(
            "OKX returned {} {} candles for {}",
            candles.len(),
            request.bar,
            request.instrument
        );

        Ok(candles)
    }

    /// Get the latest ticker
    /// Endpoint: GET /api/v5/market/ticker?instId={instId}
    pub async fn get_ticker(&self, inst_id: &str) -> Result<Ticker> {
        let rows: Vec<RawTicker> = self
            .get_data(TICKER_PATH, &[("instId", inst_id.to_string())])
            .await?;

        let raw = rows
            .into_iter()
            .next()
            .ok_or_else(|| Error::malformed(format!("no ticker returned for {}", inst_id)))?;

        let ticker = parse_ticker(raw)?;
        tracing::debug!("OKX ticker {}: last {}", ticker.instrument, ticker.last);
        Ok(ticker)
    }

    /// List instruments of one type (SPOT, SWAP, FUTURES, ...)
    /// Endpoint: GET /api/v5/public/instruments?instType={instType}
    pub async fn get_instruments(&self, inst_type: &str) -> Result<Vec<Instrument>> {
        let instruments: Vec<Instrument> = self
            .get_data(INSTRUMENTS_PATH, &[("instType", inst_type.to_string())])
            .await?;

        tracing::debug!("OKX lists {} {} instruments", instruments.len(), inst_type);
        Ok(instruments)
    }
}

fn parse_number(value: &str, name: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|_| Error::malformed(format!("bad {}: {:?}", name, value)))
}

/// Empty strings mean "no quote" for bid and ask
fn parse_optional(value: &str, name: &str) -> Result<Option<f64>> {
    if value.is_empty() {
        return Ok(None);
    }
    parse_number(value, name).map(Some)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let millis: i64 = value
        .parse()
        .map_err(|_| Error::malformed(format!("bad timestamp: {:?}", value)))?;
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| Error::malformed(format!("timestamp out of range: {}", millis)))
}

fn parse_ticker(raw: RawTicker) -> Result<Ticker> {
    Ok(Ticker {
        last: parse_number(&raw.last, "last")?,
        bid: parse_optional(&raw.bid_px, "bid")?,
        ask: parse_optional(&raw.ask_px, "ask")?,
        open_24h: parse_number(&raw.open24h, "open24h")?,
        high_24h: parse_number(&raw.high24h, "high24h")?,
        low_24h: parse_number(&raw.low24h, "low24h")?,
        volume_24h: parse_number(&raw.vol24h, "vol24h")?,
        timestamp: parse_timestamp(&raw.ts)?,
        instrument: raw.inst_id,
    })
}

/// Parse `[ts, o, h, l, c, vol, volCcy, volCcyQuote, confirm]`
fn parse_row(row: &[String]) -> Result<Candle> {
    if row.len() < 6 {
        return Err(Error::malformed(format!(
            "candle row has {} fields, expected at least 6",
            row.len()
        )));
    }

    let number = |index: usize, name: &str| parse_number(&row[index], name);

    Ok(Candle {
        timestamp: parse_timestamp(&row[0])?,
        open: number(1, "open")?,
        high: number(2, "high")?,
        low: number(3, "low")?,
        close: number(4, "close")?,
        volume: number(5, "volume")?,
    })
}

#[async_trait]
impl CandleSource for OkxClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Candle>> {
        self.get_candles(request).await
    }
}
