//! Core domain types and logic.

pub mod ohlcv;
pub mod session;
pub mod signal;
pub mod position;
pub mod risk;
pub mod indicator;
pub mod indicator_helpers;
pub mod strategy;
pub mod strategy_config;
pub mod backtest;
pub mod metrics;
pub mod error;
