//! JSON artifact writer: `pnl_results_<timeframe>.json`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::domain::aggregate::{round2, DailyPnl, DayLabel};
use crate::domain::error::SigpnlError;
use crate::domain::signal::Timeframe;
use crate::ports::report_port::ReportPort;

#[derive(Debug, Serialize, PartialEq)]
pub struct DayEntry {
    pub day: i64,
    pub pnl: f64,
}

pub struct JsonReportAdapter {
    output_dir: PathBuf,
    publish_dir: Option<PathBuf>,
    day_label: DayLabel,
}

impl JsonReportAdapter {
    pub fn new(output_dir: PathBuf, publish_dir: Option<PathBuf>, day_label: DayLabel) -> Self {
        Self {
            output_dir,
            publish_dir,
            day_label,
        }
    }

    pub fn artifact_name(timeframe: Timeframe) -> String {
        format!("pnl_results_{}.json", timeframe)
    }

    /// `{ "<symbol>": [ {"day": .., "pnl": ..}, .. ] }` with symbols sorted.
    pub fn render(
        &self,
        results: &BTreeMap<String, Vec<DailyPnl>>,
    ) -> Result<String, SigpnlError> {
        let doc: BTreeMap<&str, Vec<DayEntry>> = results
            .iter()
            .map(|(symbol, series)| {
                let entries = series
                    .iter()
                    .map(|d| DayEntry {
                        day: self.day_label.label(d.day),
                        pnl: round2(d.pnl),
                    })
                    .collect();
                (symbol.as_str(), entries)
            })
            .collect();
        serde_json::to_string_pretty(&doc).map_err(|e| SigpnlError::Output {
            path: "<memory>".into(),
            reason: e.to_string(),
        })
    }
}

impl ReportPort for JsonReportAdapter {
    fn write(
        &self,
        timeframe: Timeframe,
        results: &BTreeMap<String, Vec<DailyPnl>>,
    ) -> Result<PathBuf, SigpnlError> {
        let path = self.output_dir.join(Self::artifact_name(timeframe));
        let body = self.render(results)?;
        fs::create_dir_all(&self.output_dir)?;
        fs::write(&path, body).map_err(|e| SigpnlError::Output {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        info!(path = %path.display(), symbols = results.len(), "results written");
        Ok(path)
    }

    fn publish(&self, artifact: &Path) -> Result<Option<PathBuf>, SigpnlError> {
        let Some(dir) = &self.publish_dir else {
            return Ok(None);
        };
        let Some(name) = artifact.file_name() else {
            return Err(SigpnlError::Output {
                path: artifact.display().to_string(),
                reason: "artifact has no file name".into(),
            });
        };
        let target = dir.join(name);
        fs::copy(artifact, &target).map_err(|e| SigpnlError::Output {
            path: target.display().to_string(),
            reason: e.to_string(),
        })?;
        info!(path = %target.display(), "artifact published");
        Ok(Some(target))
    }
}
