//! Result artifact port trait.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::aggregate::DailyPnl;
use crate::domain::error::SigpnlError;
use crate::domain::signal::Timeframe;

/// Port for writing the per-timeframe PnL artifact.
pub trait ReportPort {
    /// Returns the path of the written artifact.
    fn write(
        &self,
        timeframe: Timeframe,
        results: &BTreeMap<String, Vec<DailyPnl>>,
    ) -> Result<PathBuf, SigpnlError>;

    /// Default implementation: nothing to publish.
    fn publish(&self, _artifact: &Path) -> Result<Option<PathBuf>, SigpnlError> {
        Ok(None)
    }
}
