//! Port traits: the seams between the simulation core and its collaborators.

pub mod cache_port;
pub mod candle_port;
pub mod config_port;
pub mod report_port;
pub mod signal_port;
