//! HTTP price-history adapter.
//!
//! The feed answers `GET <url>?symbol=&interval=&start=&end=` with a JSON array
//! of `[timestamp, open, high, low, close, volume]` rows. Values may be numbers
//! or numeric strings. Anything else (an object, an `{"error": ..}` payload, an
//! empty array) means the feed has no data for the request.

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::candle::{normalize_epoch_secs, Candle};
use crate::domain::error::SigpnlError;
use crate::ports::candle_port::CandlePort;
use crate::ports::config_port::ConfigPort;

pub struct HttpCandleAdapter {
    client: Client,
    url: String,
    interval: String,
}

impl HttpCandleAdapter {
    pub fn new(url: &str, interval: &str, timeout: Duration) -> Result<Self, SigpnlError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SigpnlError::ConfigInvalid {
                section: "candles".into(),
                key: "url".into(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            url: url.to_string(),
            interval: interval.to_string(),
        })
    }

    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SigpnlError> {
        let url = config
            .get_string("candles", "url")
            .ok_or_else(|| SigpnlError::ConfigMissing {
                section: "candles".into(),
                key: "url".into(),
            })?;
        let interval = config
            .get_string("candles", "interval")
            .unwrap_or_else(|| "1m".to_string());
        let timeout = config.get_int("candles", "timeout_secs", 60).max(1) as u64;
        Self::new(&url, &interval, Duration::from_secs(timeout))
    }
}

impl CandlePort for HttpCandleAdapter {
    fn fetch_candles(&self, symbol: &str, start: i64, end: i64) -> Result<Vec<Candle>, SigpnlError> {
        let fetch_err = |reason: String| SigpnlError::CandleFetch {
            symbol: symbol.to_string(),
            reason,
        };

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("symbol", symbol.to_string()),
                ("interval", self.interval.clone()),
                ("start", start.to_string()),
                ("end", end.to_string()),
            ])
            .send()
            .map_err(|e| fetch_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {status}")));
        }

        let body: Value = response.json().map_err(|e| fetch_err(e.to_string()))?;
        let bars = parse_bars(symbol, &body)?;
        debug!(symbol, bars = bars.len(), "candles fetched");
        Ok(bars)
    }
}

fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|v: &f64| v.is_finite())
}

fn parse_row(row: &Value) -> Option<Candle> {
    let fields = row.as_array()?;
    if fields.len() < 6 {
        return None;
    }
    let timestamp = match &fields[0] {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    }?;
    Some(Candle {
        timestamp: normalize_epoch_secs(timestamp),
        open: number(&fields[1])?,
        high: number(&fields[2])?,
        low: number(&fields[3])?,
        close: number(&fields[4])?,
        volume: number(&fields[5])?,
    })
}

/// Decode a feed response. Rows that fail numeric parsing are dropped.
pub fn parse_bars(symbol: &str, body: &Value) -> Result<Vec<Candle>, SigpnlError> {
    let rows = match body {
        Value::Array(rows) if !rows.is_empty() => rows,
        Value::Object(obj) => {
            if let Some(err) = obj.get("error") {
                debug!(symbol, error = %err, "feed returned an error payload");
            }
            return Err(SigpnlError::NoData {
                symbol: symbol.to_string(),
            });
        }
        _ => {
            return Err(SigpnlError::NoData {
                symbol: symbol.to_string(),
            });
        }
    };

    let mut bars: Vec<Candle> = rows.iter().filter_map(parse_row).collect();
    let skipped = rows.len() - bars.len();
    if skipped > 0 {
        warn!(symbol, skipped, "dropped malformed candle rows");
    }
    if bars.is_empty() {
        return Err(SigpnlError::NoData {
            symbol: symbol.to_string(),
        });
    }
    bars.sort_by_key(|c| c.timestamp);
    Ok(bars)
}
