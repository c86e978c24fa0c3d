//! Average True Range.
//!
//! TR[0] = high - low (no previous close), TR[i] = true_range(close[i-1]).
//! ATR is the simple rolling mean of TR over `period`; first value at period-1.

use crate::domain::indicator::{sma_values, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::PriceBar;

/// True range of every bar, oldest first.
pub fn true_ranges(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                bar.high - bar.low
            } else {
                bar.true_range(bars[i - 1].close)
            }
        })
        .collect()
}

pub fn calculate_atr(bars: &[PriceBar], period: usize) -> IndicatorSeries {
    let values = sma_values(&true_ranges(bars), period);
    if values.is_empty() {
        return IndicatorSeries::empty(IndicatorType::Atr(period));
    }
    IndicatorSeries::new(IndicatorType::Atr(period), period - 1, values)
}
