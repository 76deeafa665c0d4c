#![allow(dead_code)]

use sigpnl::domain::aggregate::{day_start, DayIndex};
use sigpnl::domain::candle::Candle;
use sigpnl::domain::error::SigpnlError;
use sigpnl::domain::signal::{Direction, Signal, Timeframe};
use sigpnl::ports::candle_port::CandlePort;
use sigpnl::ports::signal_port::SignalPort;
use std::collections::HashMap;
use std::sync::Mutex;

/// A fixed "today" so every window in the suite is reproducible.
pub const TODAY: DayIndex = 19_850;

/// One hour into `TODAY`.
pub fn now() -> i64 {
    day_start(TODAY) + 3_600
}

/// Seconds into `TODAY - days_ago`.
pub fn at(days_ago: i64, secs: i64) -> i64 {
    day_start(TODAY - days_ago) + secs
}

pub struct MockCandlePort {
    pub data: HashMap<String, Vec<Candle>>,
    pub errors: HashMap<String, String>,
    pub calls: Mutex<Vec<(String, i64, i64)>>,
}

impl MockCandlePort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Candle>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, i64, i64)> {
        self.calls.lock().unwrap().clone()
    }
}

impl CandlePort for MockCandlePort {
    fn fetch_candles(&self, symbol: &str, start: i64, end: i64) -> Result<Vec<Candle>, SigpnlError> {
        self.calls
            .lock()
            .unwrap()
            .push((symbol.to_string(), start, end));
        if let Some(reason) = self.errors.get(symbol) {
            return Err(SigpnlError::CandleFetch {
                symbol: symbol.to_string(),
                reason: reason.clone(),
            });
        }
        let bars: Vec<Candle> = self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.timestamp >= start && b.timestamp <= end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default();
        if bars.is_empty() {
            return Err(SigpnlError::NoData {
                symbol: symbol.to_string(),
            });
        }
        Ok(bars)
    }
}

pub struct MockSignalPort {
    pub signals: Vec<Signal>,
}

impl SignalPort for MockSignalPort {
    fn fetch_signals(&self, _timeframe: Timeframe, since: i64) -> Result<Vec<Signal>, SigpnlError> {
        Ok(self
            .signals
            .iter()
            .filter(|s| s.timestamp >= since)
            .cloned()
            .collect())
    }
}

pub fn buy(symbol: &str, timestamp: i64, price: f64) -> Signal {
    Signal {
        symbol: symbol.to_string(),
        timestamp,
        price,
        direction: Direction::Buy,
    }
}

pub fn sell(symbol: &str, timestamp: i64, price: f64) -> Signal {
    Signal {
        symbol: symbol.to_string(),
        timestamp,
        price,
        direction: Direction::Sell,
    }
}

/// Bar with explicit extremes; open and close sit at the midpoint.
pub fn bar(timestamp: i64, low: f64, high: f64) -> Candle {
    let mid = (low + high) / 2.0;
    Candle {
        timestamp,
        open: mid,
        high,
        low,
        close: mid,
        volume: 1_000.0,
    }
}

pub fn bar_closing(timestamp: i64, low: f64, high: f64, close: f64) -> Candle {
    Candle {
        close,
        ..bar(timestamp, low, high)
    }
}
