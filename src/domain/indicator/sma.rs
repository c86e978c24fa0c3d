//! Simple Moving Average.
//!
//! SMA[i] = mean(x[i-n+1..=i]). First value at index n-1.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::{closes, volumes, PriceBar};

/// Defined SMA values of `values` over `period`; `N - period + 1` entries.
pub fn sma_values(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(values.len() - period + 1);
    let mut sum: f64 = values[..period].iter().sum();
    out.push(sum / period as f64);
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out.push(sum / period as f64);
    }
    out
}

/// SMA of bar closes.
pub fn calculate_sma(bars: &[PriceBar], period: usize) -> IndicatorSeries {
    series_from(IndicatorType::Sma(period), &closes(bars), period)
}

/// SMA of bar volumes.
pub fn calculate_volume_sma(bars: &[PriceBar], period: usize) -> IndicatorSeries {
    series_from(IndicatorType::VolumeSma(period), &volumes(bars), period)
}

fn series_from(indicator_type: IndicatorType, input: &[f64], period: usize) -> IndicatorSeries {
    let values = sma_values(input, period);
    if values.is_empty() {
        return IndicatorSeries::empty(indicator_type);
    }
    IndicatorSeries::new(indicator_type, period - 1, values)
}
