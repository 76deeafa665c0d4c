//! OHLCV candle representation.

/// One bar. `timestamp` is the bucket start in UTC seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Rescale prices by `multiplier` (1000× feeds quote the unleveraged pair).
    pub fn scaled(&self, multiplier: f64) -> Candle {
        Candle {
            timestamp: self.timestamp,
            open: self.open * multiplier,
            high: self.high * multiplier,
            low: self.low * multiplier,
            close: self.close * multiplier,
            volume: self.volume,
        }
    }

    /// All price fields are finite and `low <= high`.
    pub fn is_well_formed(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|v| v.is_finite())
            && self.low <= self.high
    }
}

/// Candles with `start <= timestamp < end`. Input must be timestamp-ordered.
pub fn slice_between(candles: &[Candle], start: i64, end: i64) -> &[Candle] {
    let lo = candles.partition_point(|c| c.timestamp < start);
    let hi = candles.partition_point(|c| c.timestamp < end);
    &candles[lo..hi.max(lo)]
}

/// Candles with `timestamp >= start`.
pub fn slice_from(candles: &[Candle], start: i64) -> &[Candle] {
    let lo = candles.partition_point(|c| c.timestamp < start);
    &candles[lo..]
}

/// Millisecond epoch values are brought down to seconds.
pub fn normalize_epoch_secs(raw: i64) -> i64 {
    if raw.abs() > 100_000_000_000 {
        raw / 1000
    } else {
        raw
    }
}
