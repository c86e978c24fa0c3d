//! Strategy contract and the shared per-bar pipeline.
//!
//! A strategy instance owns its configuration, its indicator buffers and a
//! [`PositionBook`]. The caller drives it one bar at a time through
//! [`Strategy::on_bar`], reports executions back through
//! [`Strategy::apply_fill`], and calls [`Strategy::on_session_end`] after the
//! last bar of each session.
//!
//! Per bar, exits are evaluated before entries, so a single call never flips
//! a position: at most one of CLOSE or BUY/SELL is emitted.

pub mod ma_crossover;
pub mod macd_momentum;
pub mod opening_range;
pub mod range_strategy;

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use tracing::debug;

use crate::domain::error::EngineError;
use crate::domain::indicator::IndicatorType;
use crate::domain::ohlcv::PriceBar;
use crate::domain::position::{CompletedTrade, Fill, Position, PositionBook};
use crate::domain::risk::{check_default_exits, effective_trailing_stop, ExitPolicy};
use crate::domain::session::{BarContext, SessionClock};
use crate::domain::signal::{ExitReason, Signal};

pub use ma_crossover::{CrossDirection, MaCrossover, MaCrossoverConfig};
pub use macd_momentum::{MacdExitOrder, MacdMomentum, MacdMomentumConfig};
pub use opening_range::Polarity;
pub use range_strategy::{OpeningRangeConfig, OpeningRangeStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    OpeningRangeBreakout,
    OpeningRangeFade,
    MovingAverageCrossover,
    MacdMomentum,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::OpeningRangeBreakout => "opening_range_breakout",
            StrategyKind::OpeningRangeFade => "opening_range_fade",
            StrategyKind::MovingAverageCrossover => "ma_crossover",
            StrategyKind::MacdMomentum => "macd_momentum",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opening_range_breakout" | "orb" | "breakout" => Ok(StrategyKind::OpeningRangeBreakout),
            "opening_range_fade" | "fade" => Ok(StrategyKind::OpeningRangeFade),
            "ma_crossover" | "moving_average_crossover" | "crossover" => {
                Ok(StrategyKind::MovingAverageCrossover)
            }
            "macd_momentum" | "macd" => Ok(StrategyKind::MacdMomentum),
            other => Err(format!("unknown strategy kind '{other}'")),
        }
    }
}

/// Outcome of parameter validation. Every failing check is listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` unless `ok` holds.
    pub fn check(&mut self, ok: bool, message: impl Into<String>) {
        if !ok {
            self.errors.push(message.into());
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self, strategy: &str) -> Result<(), EngineError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(EngineError::InvalidParameters {
                strategy: strategy.to_string(),
                errors: self.errors,
            })
        }
    }
}

/// Bookkeeping every strategy carries: the position book plus the index of
/// the next bar to fold into indicator state.
#[derive(Debug, Clone, Default)]
pub struct StrategyState {
    pub book: PositionBook,
    next_bar: usize,
}

impl StrategyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Series indices of `ctx` not yet ingested. Re-delivering an ingested
    /// bar, or a window that starts past the next expected bar, is a fault.
    fn pending_bars(&self, ctx: &BarContext<'_>) -> Result<Range<usize>, EngineError> {
        let index = ctx.index();
        if index < self.next_bar {
            return Err(EngineError::BarOutOfOrder {
                index,
                expected: self.next_bar,
            });
        }
        if ctx.first_index() > self.next_bar {
            return Err(EngineError::BarOutOfOrder {
                index: ctx.first_index(),
                expected: self.next_bar,
            });
        }
        Ok(self.next_bar..index + 1)
    }

    pub fn bars_ingested(&self) -> usize {
        self.next_bar
    }
}

pub trait Strategy {
    fn name(&self) -> &str;

    fn kind(&self) -> StrategyKind;

    /// Bars needed before an entry can be evaluated.
    fn required_history(&self) -> usize;

    fn required_indicators(&self) -> Vec<IndicatorType>;

    fn validate_parameters(&self) -> ValidationReport;

    /// Fresh instance with the same configuration and no runtime state.
    fn clone_with_parameters(&self) -> Box<dyn Strategy>;

    fn state(&self) -> &StrategyState;

    fn state_mut(&mut self) -> &mut StrategyState;

    /// Fold `bar`, the bar at series index `index`, into indicator and
    /// session state. Called exactly once per bar, in order.
    fn ingest(
        &mut self,
        bar: &PriceBar,
        index: usize,
        session: &SessionClock,
    ) -> Result<(), EngineError>;

    /// Entry decision for the current bar. Only called while flat and with
    /// at least `required_history` bars.
    fn evaluate_entry(&mut self, ctx: &BarContext<'_>) -> Result<Signal, EngineError>;

    fn exit_policy(&self) -> ExitPolicy;

    /// Distance the trailing stop keeps from the favourable extreme, when
    /// trailing is active for `position`.
    fn trailing_distance(&self, position: &Position) -> Option<f64> {
        self.exit_policy().trailing_distance(position)
    }

    /// Exit decision for the open position on the current bar. Does not
    /// change state.
    fn should_exit(&self, ctx: &BarContext<'_>) -> Result<Option<Signal>, EngineError> {
        let Some(position) = self.position() else {
            return Ok(None);
        };
        let bar = ctx.current();
        Ok(
            check_default_exits(position, bar, &ctx.session, &self.exit_policy())
                .map(|(reason, price)| Signal::close(price, bar.timestamp, reason)),
        )
    }

    /// Clear per-session state after the last bar of a session.
    fn reset_session(&mut self) {}

    fn on_bar(&mut self, ctx: &BarContext<'_>) -> Result<Signal, EngineError> {
        let pending = self.state().pending_bars(ctx)?;
        for index in pending {
            if let Some(bar) = ctx.bar(index) {
                self.ingest(bar, index, &ctx.session)?;
            }
        }
        self.state_mut().next_bar = ctx.index() + 1;

        let bar = ctx.current();
        let signal = if self.position().is_some() {
            let exit = self.should_exit(ctx)?;
            track_open_position(self, bar);
            exit.unwrap_or_else(|| Signal::hold(bar.close, bar.timestamp, "holding position"))
        } else if ctx.bars_seen() < self.required_history() {
            insufficient_history(bar, ctx.bars_seen(), self.required_history())
        } else {
            self.evaluate_entry(ctx)?
        };

        self.state_mut().book.record_signal(&signal);
        if !signal.is_hold() {
            debug!(
                strategy = self.name(),
                action = ?signal.action,
                price = signal.price,
                reason = %signal.reason,
                "signal"
            );
        }
        Ok(signal)
    }

    /// Flatten anything still open at the last bar of the session, then
    /// clear per-session state.
    fn on_session_end(&mut self, ctx: &BarContext<'_>) -> Result<Vec<Signal>, EngineError> {
        let mut signals = Vec::new();
        if self.position().is_some() {
            let bar = ctx.current();
            signals.push(Signal::close(bar.close, bar.timestamp, ExitReason::SessionEnd));
        }
        self.reset_session();
        Ok(signals)
    }

    fn apply_fill(&mut self, fill: &Fill) -> Result<Option<CompletedTrade>, EngineError> {
        self.state_mut().book.apply_fill(fill)
    }

    fn position(&self) -> Option<&Position> {
        self.state().book.position()
    }

    fn completed_trades(&self) -> &[CompletedTrade] {
        self.state().book.completed_trades()
    }
}

/// Update running extremes and ratchet the trailing stop after the exit
/// check for `bar`.
fn track_open_position<S: Strategy + ?Sized>(strategy: &mut S, bar: &PriceBar) {
    strategy.state_mut().book.mark(bar);
    let distance = strategy
        .position()
        .and_then(|position| strategy.trailing_distance(position));
    if let (Some(distance), Some(position)) = (distance, strategy.state_mut().book.position_mut())
    {
        let level = effective_trailing_stop(position, distance);
        position.ratchet_trailing_stop(level);
    }
}

pub fn insufficient_history(bar: &PriceBar, have: usize, need: usize) -> Signal {
    Signal::hold(
        bar.close,
        bar.timestamp,
        format!("insufficient history: have {have} bars, need {need}"),
    )
}
