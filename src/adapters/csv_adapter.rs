//! CSV candle adapter: one `<SYMBOL>.csv` per canonical symbol.
//!
//! Header row then `timestamp,open,high,low,close,volume`. Rows that fail to
//! parse are skipped; a missing file means no data.

use crate::domain::candle::{normalize_epoch_secs, Candle};
use crate::domain::error::SigpnlError;
use crate::ports::candle_port::CandlePort;
use std::path::PathBuf;
use tracing::warn;

pub struct CsvCandleAdapter {
    base_path: PathBuf,
}

impl CsvCandleAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }
}

fn parse_record(record: &csv::StringRecord) -> Option<Candle> {
    let field = |i: usize| -> Option<f64> {
        record
            .get(i)?
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    };
    Some(Candle {
        timestamp: normalize_epoch_secs(field(0)? as i64),
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

impl CandlePort for CsvCandleAdapter {
    fn fetch_candles(&self, symbol: &str, start: i64, end: i64) -> Result<Vec<Candle>, SigpnlError> {
        let path = self.csv_path(symbol);
        if !path.exists() {
            return Err(SigpnlError::NoData {
                symbol: symbol.to_string(),
            });
        }

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&path)
            .map_err(|e| SigpnlError::CandleFetch {
                symbol: symbol.to_string(),
                reason: format!("failed to read {}: {}", path.display(), e),
            })?;

        let mut bars = Vec::new();
        let mut skipped = 0usize;
        for result in rdr.records() {
            let parsed = result.ok().as_ref().and_then(parse_record);
            match parsed {
                Some(bar) if bar.timestamp >= start && bar.timestamp <= end => bars.push(bar),
                Some(_) => {}
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!(symbol, skipped, path = %path.display(), "dropped malformed candle rows");
        }
        if bars.is_empty() {
            return Err(SigpnlError::NoData {
                symbol: symbol.to_string(),
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}
