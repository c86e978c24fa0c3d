//! Strategy output: a closed set of actions plus explainability metadata.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;

/// Why (part of) a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
    MaxHoldingTime,
    PreClose,
    SessionEnd,
    OppositeSignal,
    HistogramReversal,
    FirstProfitTarget,
    SecondProfitTarget,
    Manual,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::MaxHoldingTime => "max_holding_time",
            ExitReason::PreClose => "pre_close",
            ExitReason::SessionEnd => "session_end",
            ExitReason::OppositeSignal => "opposite_signal",
            ExitReason::HistogramReversal => "histogram_reversal",
            ExitReason::FirstProfitTarget => "first_profit_target",
            ExitReason::SecondProfitTarget => "second_profit_target",
            ExitReason::Manual => "manual",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Hold,
    Buy,
    Sell,
    /// Close `quantity` units, or everything that remains when `None`.
    Close {
        quantity: Option<u64>,
        reason: ExitReason,
    },
}

impl Action {
    pub fn is_entry(&self) -> bool {
        matches!(self, Action::Buy | Action::Sell)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SignalStrength {
    Weak,
    Moderate,
    Strong,
}

impl SignalStrength {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            SignalStrength::Strong
        } else if confidence >= 0.65 {
            SignalStrength::Moderate
        } else {
            SignalStrength::Weak
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

/// Indicator values and flags captured at decision time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata(BTreeMap<String, MetaValue>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_number(mut self, key: &str, value: f64) -> Self {
        self.0.insert(key.to_string(), MetaValue::Number(value));
        self
    }

    pub fn with_flag(mut self, key: &str, value: bool) -> Self {
        self.0.insert(key.to_string(), MetaValue::Flag(value));
        self
    }

    pub fn with_text(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.insert(key.to_string(), MetaValue::Text(value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.0.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.0.get(key) {
            Some(MetaValue::Number(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.0.get(key) {
            Some(MetaValue::Flag(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetaValue)> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub action: Action,
    pub price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub reason: String,
    pub confidence: f64,
    pub strength: SignalStrength,
    pub timestamp: NaiveDateTime,
    pub metadata: Metadata,
}

impl Signal {
    fn build(
        action: Action,
        price: f64,
        timestamp: NaiveDateTime,
        confidence: f64,
        reason: impl Into<String>,
    ) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        Self {
            action,
            price,
            stop_loss: None,
            take_profit: None,
            reason: reason.into(),
            confidence,
            strength: SignalStrength::from_confidence(confidence),
            timestamp,
            metadata: Metadata::new(),
        }
    }

    pub fn hold(price: f64, timestamp: NaiveDateTime, reason: impl Into<String>) -> Self {
        Self::build(Action::Hold, price, timestamp, 0.0, reason)
    }

    pub fn buy(
        price: f64,
        timestamp: NaiveDateTime,
        confidence: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self::build(Action::Buy, price, timestamp, confidence, reason)
    }

    pub fn sell(
        price: f64,
        timestamp: NaiveDateTime,
        confidence: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self::build(Action::Sell, price, timestamp, confidence, reason)
    }

    /// Close everything that remains.
    pub fn close(price: f64, timestamp: NaiveDateTime, exit: ExitReason) -> Self {
        Self::build(
            Action::Close {
                quantity: None,
                reason: exit,
            },
            price,
            timestamp,
            1.0,
            exit.as_str(),
        )
    }

    /// Close `quantity` units and keep the rest open.
    pub fn close_partial(
        price: f64,
        timestamp: NaiveDateTime,
        quantity: u64,
        exit: ExitReason,
    ) -> Self {
        Self::build(
            Action::Close {
                quantity: Some(quantity),
                reason: exit,
            },
            price,
            timestamp,
            1.0,
            exit.as_str(),
        )
    }

    pub fn with_stops(mut self, stop_loss: Option<f64>, take_profit: Option<f64>) -> Self {
        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_hold(&self) -> bool {
        self.action == Action::Hold
    }
}
