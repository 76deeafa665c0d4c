//! Concrete adapter implementations for ports.

#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
#[cfg(feature = "http")]
pub mod http_candle_adapter;
pub mod csv_adapter;
pub mod file_config_adapter;
pub mod json_report_adapter;
pub mod memory_cache;
