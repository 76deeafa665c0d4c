//! Core domain types and logic.

pub mod aggregate;
pub mod candle;
pub mod debounce;
pub mod error;
pub mod position;
pub mod rules;
pub mod runner;
pub mod signal;
pub mod simulation;
pub mod symbol;
