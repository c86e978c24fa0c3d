//! Technical indicator implementations.
//!
//! Every calculation is a pure function of its input series. Results are
//! stored densely: an [`IndicatorSeries`] keeps the bar index of its first
//! defined value plus the defined values only, so a series derived from `N`
//! inputs with lookback `P` holds exactly `N - P + 1` values. Lookups before
//! `first_index` are reported as unavailable, never as zero.

pub mod atr;
pub mod ema;
pub mod macd;
pub mod sma;
pub mod stream;

pub use atr::calculate_atr;
pub use ema::{calculate_ema, ema_values};
pub use macd::{calculate_macd, MacdSeries};
pub use sma::{calculate_sma, calculate_volume_sma, sma_values};
pub use stream::{
    EmaStream, MacdPoint, MacdStream, MovingAverageKind, MovingAverageStream, SmaStream,
};

use crate::domain::error::EngineError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Ema(usize),
    Atr(usize),
    VolumeSma(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
}

impl IndicatorType {
    /// Number of input bars consumed before the first value exists.
    pub fn lookback(&self) -> usize {
        match *self {
            IndicatorType::Sma(p)
            | IndicatorType::Ema(p)
            | IndicatorType::Atr(p)
            | IndicatorType::VolumeSma(p) => p,
            IndicatorType::Macd { fast, slow, signal } => fast.max(slow) + signal - 1,
        }
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::VolumeSma(period) => write!(f, "VOLUME_SMA({})", period),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
        }
    }
}

/// A single-valued indicator aligned to the bar series it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    first_index: usize,
    values: Vec<f64>,
}

impl IndicatorSeries {
    pub fn new(indicator_type: IndicatorType, first_index: usize, values: Vec<f64>) -> Self {
        Self {
            indicator_type,
            first_index,
            values,
        }
    }

    pub fn empty(indicator_type: IndicatorType) -> Self {
        Self::new(indicator_type, 0, Vec::new())
    }

    /// Bar index of the first defined value.
    pub fn first_index(&self) -> usize {
        self.first_index
    }

    /// Defined values only, oldest first.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at bar `index`, or `None` while the lookback is unsatisfied or
    /// past the end of the series.
    pub fn get(&self, index: usize) -> Option<f64> {
        index
            .checked_sub(self.first_index)
            .and_then(|offset| self.values.get(offset))
            .copied()
    }

    /// Value at bar `index`; a lookup that cannot exist is a fault.
    pub fn at(&self, index: usize) -> Result<f64, EngineError> {
        self.get(index)
            .ok_or_else(|| EngineError::IndicatorUnavailable {
                indicator: self.indicator_type.to_string(),
                index,
                first_index: self.first_index,
            })
    }

    /// Append the value for bar `index`. Appends must be contiguous.
    pub fn push(&mut self, index: usize, value: f64) -> Result<(), EngineError> {
        if self.values.is_empty() {
            self.first_index = index;
        } else {
            let expected = self.first_index + self.values.len();
            if index != expected {
                return Err(EngineError::IndicatorAlignment {
                    indicator: self.indicator_type.to_string(),
                    expected,
                    actual: index,
                });
            }
        }
        self.values.push(value);
        Ok(())
    }

    /// Most recent value, if any.
    pub fn latest(&self) -> Option<f64> {
        self.values.last().copied()
    }

    /// Bar index of the most recent value.
    pub fn last_index(&self) -> Option<usize> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.first_index + self.values.len() - 1)
        }
    }
}
