//! Candle-close debouncing of raw signals.
//!
//! A signal may fire several times inside one candle before it closes. Only the
//! last one in each timeframe bucket is kept, so transient intra-candle
//! reversals never turn into simulated round trips.

use std::collections::BTreeMap;

use super::signal::{Signal, Timeframe};

/// Keep the last signal of each `timeframe` bucket, in ascending bucket order.
///
/// Input is expected timestamp-ascending; ties within a bucket resolve to the
/// later element of the input.
pub fn debounce(signals: &[Signal], timeframe: Timeframe) -> Vec<Signal> {
    let mut last_per_bucket: BTreeMap<i64, &Signal> = BTreeMap::new();
    for signal in signals {
        last_per_bucket.insert(timeframe.bucket_start(signal.timestamp), signal);
    }
    last_per_bucket.into_values().cloned().collect()
}
