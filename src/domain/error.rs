//! Domain error types.

/// Top-level error type for sigpnl.
#[derive(Debug, thiserror::Error)]
pub enum SigpnlError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("candle fetch failed for {symbol}: {reason}")]
    CandleFetch { symbol: String, reason: String },

    #[error("no candle data for {symbol}")]
    NoData { symbol: String },

    #[error("failed to write {path}: {reason}")]
    Output { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SigpnlError {
    /// True for errors the runner degrades to the no-data exit rule instead of surfacing.
    pub fn is_missing_data(&self) -> bool {
        matches!(
            self,
            SigpnlError::CandleFetch { .. } | SigpnlError::NoData { .. }
        )
    }
}

impl From<&SigpnlError> for std::process::ExitCode {
    fn from(err: &SigpnlError) -> Self {
        let code: u8 = match err {
            SigpnlError::Io(_) | SigpnlError::Output { .. } => 1,
            SigpnlError::ConfigParse { .. }
            | SigpnlError::ConfigMissing { .. }
            | SigpnlError::ConfigInvalid { .. } => 2,
            SigpnlError::Database { .. } | SigpnlError::DatabaseQuery { .. } => 3,
            SigpnlError::CandleFetch { .. } | SigpnlError::NoData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
