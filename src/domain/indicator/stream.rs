//! Incremental calculators. Each `push` folds one input and returns the
//! indicator value for that input once the warm-up is complete, matching
//! the batch functions value for value.

use std::collections::VecDeque;

use crate::domain::indicator::IndicatorType;

#[derive(Debug, Clone)]
pub struct SmaStream {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
}

impl SmaStream {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            window: VecDeque::with_capacity(period + 1),
            sum: 0.0,
        }
    }

    pub fn push(&mut self, x: f64) -> Option<f64> {
        if self.period == 0 {
            return None;
        }
        if self.window.len() < self.period {
            self.sum += x;
            self.window.push_back(x);
        } else {
            let oldest = self.window.pop_front().unwrap_or(0.0);
            self.sum += x - oldest;
            self.window.push_back(x);
        }
        (self.window.len() == self.period).then(|| self.sum / self.period as f64)
    }
}

#[derive(Debug, Clone)]
pub struct EmaStream {
    period: usize,
    k: f64,
    seen: usize,
    seed_sum: f64,
    value: Option<f64>,
}

impl EmaStream {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            k: 2.0 / (period as f64 + 1.0),
            seen: 0,
            seed_sum: 0.0,
            value: None,
        }
    }

    pub fn push(&mut self, x: f64) -> Option<f64> {
        if self.period == 0 {
            return None;
        }
        self.seen += 1;
        let next = match self.value {
            Some(prev) => x * self.k + prev * (1.0 - self.k),
            None => {
                self.seed_sum += x;
                if self.seen < self.period {
                    return None;
                }
                self.seed_sum / self.period as f64
            }
        };
        self.value = Some(next);
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovingAverageKind {
    Sma,
    Ema,
}

impl MovingAverageKind {
    pub fn indicator(&self, period: usize) -> IndicatorType {
        match self {
            MovingAverageKind::Sma => IndicatorType::Sma(period),
            MovingAverageKind::Ema => IndicatorType::Ema(period),
        }
    }
}

#[derive(Debug, Clone)]
pub enum MovingAverageStream {
    Sma(SmaStream),
    Ema(EmaStream),
}

impl MovingAverageStream {
    pub fn new(kind: MovingAverageKind, period: usize) -> Self {
        match kind {
            MovingAverageKind::Sma => MovingAverageStream::Sma(SmaStream::new(period)),
            MovingAverageKind::Ema => MovingAverageStream::Ema(EmaStream::new(period)),
        }
    }

    pub fn push(&mut self, x: f64) -> Option<f64> {
        match self {
            MovingAverageStream::Sma(s) => s.push(x),
            MovingAverageStream::Ema(e) => e.push(x),
        }
    }
}

/// One MACD observation. Signal and histogram trail the line by
/// `signal - 1` inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdPoint {
    pub line: f64,
    pub signal: Option<f64>,
    pub histogram: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct MacdStream {
    fast: EmaStream,
    slow: EmaStream,
    signal: EmaStream,
}

impl MacdStream {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast: EmaStream::new(fast),
            slow: EmaStream::new(slow),
            signal: EmaStream::new(signal),
        }
    }

    pub fn push(&mut self, x: f64) -> Option<MacdPoint> {
        let fast = self.fast.push(x);
        let slow = self.slow.push(x);
        let line = fast? - slow?;
        let signal = self.signal.push(line);
        Some(MacdPoint {
            line,
            signal,
            histogram: signal.map(|s| line - s),
        })
    }
}
