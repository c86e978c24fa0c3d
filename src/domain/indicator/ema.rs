//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seed with the SMA of the first n inputs, then
//! EMA[i] = x[i]*k + EMA[i-1]*(1-k). The first (n-1) inputs have no value.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::{closes, PriceBar};

/// Defined EMA values of `values` over `period`; `N - period + 1` entries.
pub fn ema_values(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len() - period + 1);
    let mut ema = values[..period].iter().sum::<f64>() / period as f64;
    out.push(ema);
    for &x in &values[period..] {
        ema = x * k + ema * (1.0 - k);
        out.push(ema);
    }
    out
}

/// EMA of bar closes.
pub fn calculate_ema(bars: &[PriceBar], period: usize) -> IndicatorSeries {
    let values = ema_values(&closes(bars), period);
    if values.is_empty() {
        return IndicatorSeries::empty(IndicatorType::Ema(period));
    }
    IndicatorSeries::new(IndicatorType::Ema(period), period - 1, values)
}
