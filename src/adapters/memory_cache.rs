//! In-process PnL cache.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::aggregate::DayIndex;
use crate::domain::error::SigpnlError;
use crate::ports::cache_port::PnlCachePort;

#[derive(Default)]
pub struct MemoryPnlCache {
    entries: Mutex<HashMap<(String, DayIndex), f64>>,
}

impl MemoryPnlCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<(String, DayIndex), f64>>, SigpnlError> {
        self.entries.lock().map_err(|_| SigpnlError::Database {
            reason: "cache lock poisoned".into(),
        })
    }
}

impl PnlCachePort for MemoryPnlCache {
    fn get(&self, symbol: &str, day: DayIndex) -> Result<Option<f64>, SigpnlError> {
        Ok(self.lock()?.get(&(symbol.to_string(), day)).copied())
    }

    fn put(&self, symbol: &str, day: DayIndex, pnl: f64) -> Result<(), SigpnlError> {
        self.lock()?.insert((symbol.to_string(), day), pnl);
        Ok(())
    }

    fn clear(&self) -> Result<(), SigpnlError> {
        self.lock()?.clear();
        Ok(())
    }
}
