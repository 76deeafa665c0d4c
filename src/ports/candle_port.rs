//! Price-history port trait.

use crate::domain::candle::Candle;
use crate::domain::error::SigpnlError;

/// Shared across simulation workers, hence `Send + Sync`.
pub trait CandlePort: Send + Sync {
    /// Bars for `symbol` (canonical form) in `[start, end]`, ordered by timestamp.
    ///
    /// An empty feed or an error payload is reported as [`SigpnlError::NoData`].
    fn fetch_candles(&self, symbol: &str, start: i64, end: i64) -> Result<Vec<Candle>, SigpnlError>;
}
