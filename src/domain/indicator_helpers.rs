//! Precomputation of declared indicators over a bar series.

use std::collections::HashMap;

use crate::domain::error::EngineError;
use crate::domain::indicator::{
    calculate_atr, calculate_ema, calculate_macd, calculate_sma, calculate_volume_sma,
    sma_values, IndicatorSeries, IndicatorType, MacdSeries,
};
use crate::domain::ohlcv::{volumes, PriceBar};
use crate::domain::session::BarContext;

/// Output shape of one computed indicator.
#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorOutput {
    Single(IndicatorSeries),
    Macd(MacdSeries),
}

impl IndicatorOutput {
    /// Most recent value; for MACD the histogram.
    pub fn latest(&self) -> Option<f64> {
        match self {
            IndicatorOutput::Single(series) => series.latest(),
            IndicatorOutput::Macd(macd) => macd.histogram.latest(),
        }
    }

    /// Number of defined values; for MACD the histogram.
    pub fn len(&self) -> usize {
        match self {
            IndicatorOutput::Single(series) => series.len(),
            IndicatorOutput::Macd(macd) => macd.histogram.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn compute_indicator(bars: &[PriceBar], indicator: IndicatorType) -> IndicatorOutput {
    match indicator {
        IndicatorType::Sma(p) => IndicatorOutput::Single(calculate_sma(bars, p)),
        IndicatorType::Ema(p) => IndicatorOutput::Single(calculate_ema(bars, p)),
        IndicatorType::Atr(p) => IndicatorOutput::Single(calculate_atr(bars, p)),
        IndicatorType::VolumeSma(p) => IndicatorOutput::Single(calculate_volume_sma(bars, p)),
        IndicatorType::Macd { fast, slow, signal } => {
            IndicatorOutput::Macd(calculate_macd(bars, fast, slow, signal))
        }
    }
}

/// Compute every requested indicator once; duplicates collapse.
pub fn compute_indicators(
    bars: &[PriceBar],
    indicators: &[IndicatorType],
) -> HashMap<IndicatorType, IndicatorOutput> {
    let mut out = HashMap::with_capacity(indicators.len());
    for &indicator in indicators {
        out.entry(indicator)
            .or_insert_with(|| compute_indicator(bars, indicator));
    }
    out
}

/// ATR at the current bar of `ctx`, from the `period + 1` bars ending there.
/// Equal to `calculate_atr(series, period).at(ctx.index())` without the full
/// pass. A window that starts mid-series must hold those `period + 1` bars.
pub fn atr_at(ctx: &BarContext<'_>, period: usize) -> Result<f64, EngineError> {
    let index = ctx.index();
    let first_available = if ctx.first_index() == 0 {
        period.saturating_sub(1)
    } else {
        ctx.first_index() + period
    };
    let unavailable = || EngineError::IndicatorUnavailable {
        indicator: IndicatorType::Atr(period).to_string(),
        index,
        first_index: first_available,
    };
    if period == 0 || index < first_available {
        return Err(unavailable());
    }
    let start = (index + 1).saturating_sub(period + 1) - ctx.first_index();
    calculate_atr(&ctx.bars()[start..], period)
        .latest()
        .ok_or_else(unavailable)
}

/// Mean volume of the `lookback` bars strictly before the current one.
pub fn volume_average_before(ctx: &BarContext<'_>, lookback: usize) -> Result<f64, EngineError> {
    let local = ctx.bars().len() - 1;
    if lookback == 0 || local < lookback {
        return Err(EngineError::IndicatorUnavailable {
            indicator: IndicatorType::VolumeSma(lookback).to_string(),
            index: ctx.index(),
            first_index: ctx.first_index() + lookback,
        });
    }
    let window = volumes(&ctx.bars()[local - lookback..local]);
    Ok(sma_values(&window, lookback)[0])
}
