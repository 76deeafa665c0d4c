//! Signal source port trait.

use crate::domain::error::SigpnlError;
use crate::domain::signal::{Signal, Timeframe};

pub trait SignalPort {
    /// Signals of `timeframe` with `timestamp >= since`, ordered by timestamp.
    fn fetch_signals(&self, timeframe: Timeframe, since: i64) -> Result<Vec<Signal>, SigpnlError>;
}
