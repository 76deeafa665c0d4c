//! Per-(symbol, day) PnL cache port trait.
//!
//! At most one authoritative value per key; `put` overwrites. Keys are
//! partitioned by symbol, so workers never write the same key concurrently.

use crate::domain::aggregate::DayIndex;
use crate::domain::error::SigpnlError;

pub trait PnlCachePort: Send + Sync {
    fn get(&self, symbol: &str, day: DayIndex) -> Result<Option<f64>, SigpnlError>;
    fn put(&self, symbol: &str, day: DayIndex, pnl: f64) -> Result<(), SigpnlError>;
    fn clear(&self) -> Result<(), SigpnlError>;
}
