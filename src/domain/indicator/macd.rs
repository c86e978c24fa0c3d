//! MACD (Moving Average Convergence Divergence) indicator.
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Alignment compounds: the line starts at bar max(fast, slow) - 1, the
//! signal and histogram at bar max(fast, slow) + signal - 2 (33 for 12/26/9).

use crate::domain::indicator::{ema_values, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::{closes, PriceBar};

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub line: IndicatorSeries,
    pub signal: IndicatorSeries,
    pub histogram: IndicatorSeries,
}

impl MacdSeries {
    fn empty(indicator_type: IndicatorType) -> Self {
        Self {
            line: IndicatorSeries::empty(indicator_type),
            signal: IndicatorSeries::empty(indicator_type),
            histogram: IndicatorSeries::empty(indicator_type),
        }
    }
}

/// MACD over an arbitrary input series (closes, typically).
pub fn macd_from_values(
    values: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> MacdSeries {
    let indicator_type = IndicatorType::Macd {
        fast,
        slow,
        signal: signal_period,
    };
    if fast == 0 || slow == 0 || signal_period == 0 {
        return MacdSeries::empty(indicator_type);
    }

    let ema_fast = ema_values(values, fast);
    let ema_slow = ema_values(values, slow);
    let line_start = fast.max(slow) - 1;
    if values.len() <= line_start {
        return MacdSeries::empty(indicator_type);
    }

    // ema_x[j] belongs to bar j + (x - 1)
    let line: Vec<f64> = (line_start..values.len())
        .map(|bar| ema_fast[bar + 1 - fast] - ema_slow[bar + 1 - slow])
        .collect();

    let signal = ema_values(&line, signal_period);
    let signal_start = line_start + signal_period - 1;
    let histogram: Vec<f64> = signal
        .iter()
        .enumerate()
        .map(|(j, s)| line[j + signal_period - 1] - s)
        .collect();

    let line = IndicatorSeries::new(indicator_type, line_start, line);
    if signal.is_empty() {
        return MacdSeries {
            line,
            signal: IndicatorSeries::empty(indicator_type),
            histogram: IndicatorSeries::empty(indicator_type),
        };
    }

    MacdSeries {
        line,
        signal: IndicatorSeries::new(indicator_type, signal_start, signal),
        histogram: IndicatorSeries::new(indicator_type, signal_start, histogram),
    }
}

pub fn calculate_macd(
    bars: &[PriceBar],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> MacdSeries {
    macd_from_values(&closes(bars), fast, slow, signal_period)
}
