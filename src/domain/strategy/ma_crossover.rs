//! Moving Average Crossover with confirmation bars, a minimum-separation
//! filter and optional volume confirmation.
//!
//! A crossover is a sign change of `fast - slow` between consecutive bars.
//! Spreads within a relative tolerance of zero count as flat. Leaving flat
//! is a cross only when the spread lands on the side opposite to where it
//! last was (or it was never off flat), so above, flat, above is no cross.
//! A cross must hold for `confirmation_bars` consecutive bars (the crossing
//! bar counts as one) before the filters run; a cross the other way
//! restarts the count at 1.

use crate::domain::error::EngineError;
use crate::domain::indicator::{
    IndicatorSeries, IndicatorType, MovingAverageKind, MovingAverageStream,
};
use crate::domain::indicator_helpers::{atr_at, volume_average_before};
use crate::domain::ohlcv::PriceBar;
use crate::domain::position::Side;
use crate::domain::risk::{
    check_default_exits, entries_closed, stop_and_target, ExitPolicy, StopRule,
};
use crate::domain::session::{BarContext, SessionClock};
use crate::domain::signal::{ExitReason, Metadata, Signal};
use crate::domain::strategy::{Strategy, StrategyKind, StrategyState, ValidationReport};

const FLAT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossDirection {
    Bullish,
    Bearish,
}

impl CrossDirection {
    pub fn entry_side(&self) -> Side {
        match self {
            CrossDirection::Bullish => Side::Long,
            CrossDirection::Bearish => Side::Short,
        }
    }

    fn spread_side(&self) -> SpreadSide {
        match self {
            CrossDirection::Bullish => SpreadSide::Above,
            CrossDirection::Bearish => SpreadSide::Below,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpreadSide {
    Above,
    Below,
    Flat,
}

fn spread_side(spread: f64, price: f64) -> SpreadSide {
    if spread.abs() <= FLAT_TOLERANCE * price.abs().max(1.0) {
        SpreadSide::Flat
    } else if spread > 0.0 {
        SpreadSide::Above
    } else {
        SpreadSide::Below
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaCrossoverConfig {
    pub name: String,
    pub fast_period: usize,
    pub slow_period: usize,
    pub ma_kind: MovingAverageKind,
    pub confirmation_bars: usize,
    /// Minimum |fast - slow| / close at confirmation.
    pub min_separation: f64,
    pub use_volume_confirmation: bool,
    pub volume_multiplier: f64,
    pub volume_lookback: usize,
    pub atr_period: usize,
    pub stop_rule: StopRule,
    pub take_profit_ratio: Option<f64>,
    pub trailing: Option<StopRule>,
    pub max_holding_minutes: Option<i64>,
    pub exit_before_close_minutes: Option<i64>,
    pub exit_on_opposite_cross: bool,
}

impl Default for MaCrossoverConfig {
    fn default() -> Self {
        Self {
            name: "MA Crossover".into(),
            fast_period: 9,
            slow_period: 21,
            ma_kind: MovingAverageKind::Ema,
            confirmation_bars: 1,
            min_separation: 0.001,
            use_volume_confirmation: false,
            volume_multiplier: 1.2,
            volume_lookback: 20,
            atr_period: 14,
            stop_rule: StopRule::Percent(0.02),
            take_profit_ratio: Some(2.0),
            trailing: None,
            max_holding_minutes: None,
            exit_before_close_minutes: Some(15),
            exit_on_opposite_cross: true,
        }
    }
}

impl MaCrossoverConfig {
    fn uses_atr(&self) -> bool {
        matches!(self.stop_rule, StopRule::AtrMultiple(_))
            || matches!(self.trailing, Some(StopRule::AtrMultiple(_)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingCross {
    direction: CrossDirection,
    count: usize,
}

#[derive(Debug, Clone)]
pub struct MaCrossover {
    config: MaCrossoverConfig,
    fast_stream: MovingAverageStream,
    slow_stream: MovingAverageStream,
    fast: IndicatorSeries,
    slow: IndicatorSeries,
    /// Spread side at the previous bar, once both averages exist.
    prev_side: Option<SpreadSide>,
    /// Last side that was not flat.
    last_directional: Option<SpreadSide>,
    pending: Option<PendingCross>,
    last_cross: Option<(usize, CrossDirection)>,
    confirmed: Option<(usize, CrossDirection)>,
    state: StrategyState,
}

impl MaCrossover {
    pub fn new(config: MaCrossoverConfig) -> Self {
        let kind = config.ma_kind;
        Self {
            fast_stream: MovingAverageStream::new(kind, config.fast_period),
            slow_stream: MovingAverageStream::new(kind, config.slow_period),
            fast: IndicatorSeries::empty(kind.indicator(config.fast_period)),
            slow: IndicatorSeries::empty(kind.indicator(config.slow_period)),
            prev_side: None,
            last_directional: None,
            pending: None,
            last_cross: None,
            confirmed: None,
            state: StrategyState::new(),
            config,
        }
    }

    pub fn config(&self) -> &MaCrossoverConfig {
        &self.config
    }

    pub fn fast_series(&self) -> &IndicatorSeries {
        &self.fast
    }

    pub fn slow_series(&self) -> &IndicatorSeries {
        &self.slow
    }

    /// Crossover awaiting confirmation and the bars counted so far.
    pub fn pending_confirmation(&self) -> Option<(CrossDirection, usize)> {
        self.pending.map(|p| (p.direction, p.count))
    }

    fn spread_at(&self, index: usize) -> Option<f64> {
        Some(self.fast.get(index)? - self.slow.get(index)?)
    }

    fn track_cross(&mut self, index: usize, close: f64) {
        let Some(spread) = self.spread_at(index) else {
            return;
        };
        let cur_side = spread_side(spread, close);
        let crossed = match (self.prev_side, cur_side) {
            (None, _) | (_, SpreadSide::Flat) => None,
            (Some(_), side) if self.last_directional == Some(side) => None,
            (Some(_), SpreadSide::Above) => Some(CrossDirection::Bullish),
            (Some(_), SpreadSide::Below) => Some(CrossDirection::Bearish),
        };
        self.prev_side = Some(cur_side);
        if cur_side != SpreadSide::Flat {
            self.last_directional = Some(cur_side);
        }

        if let Some(direction) = crossed {
            self.last_cross = Some((index, direction));
            self.pending = Some(PendingCross {
                direction,
                count: 1,
            });
        } else if let Some(pending) = self.pending.as_mut() {
            if cur_side == pending.direction.spread_side() {
                pending.count += 1;
            } else {
                self.pending = None;
            }
        }

        if let Some(pending) = self.pending {
            if pending.count >= self.config.confirmation_bars {
                self.confirmed = Some((index, pending.direction));
                self.pending = None;
            }
        }
    }
}

impl Default for MaCrossover {
    fn default() -> Self {
        Self::new(MaCrossoverConfig::default())
    }
}

impl Strategy for MaCrossover {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::MovingAverageCrossover
    }

    fn required_history(&self) -> usize {
        let mut need = self.config.slow_period.max(self.config.fast_period) + 1;
        if self.config.uses_atr() {
            need = need.max(self.config.atr_period);
        }
        if self.config.use_volume_confirmation {
            need = need.max(self.config.volume_lookback + 1);
        }
        need
    }

    fn required_indicators(&self) -> Vec<IndicatorType> {
        let kind = self.config.ma_kind;
        let mut out = vec![
            kind.indicator(self.config.fast_period),
            kind.indicator(self.config.slow_period),
        ];
        if self.config.uses_atr() {
            out.push(IndicatorType::Atr(self.config.atr_period));
        }
        if self.config.use_volume_confirmation {
            out.push(IndicatorType::VolumeSma(self.config.volume_lookback));
        }
        out
    }

    fn validate_parameters(&self) -> ValidationReport {
        let c = &self.config;
        let mut report = ValidationReport::new();
        report.check(c.fast_period > 0, "fast_period must be positive");
        report.check(
            c.fast_period < c.slow_period,
            "fast_period must be less than slow_period",
        );
        report.check(
            c.confirmation_bars >= 1,
            "confirmation_bars must be at least 1",
        );
        report.check(c.min_separation >= 0.0, "min_separation must not be negative");
        if c.use_volume_confirmation {
            report.check(c.volume_multiplier > 0.0, "volume_multiplier must be positive");
            report.check(c.volume_lookback > 0, "volume_lookback must be positive");
        }
        report.check(c.atr_period > 0, "atr_period must be positive");
        let stop_positive = match c.stop_rule {
            StopRule::AtrMultiple(m) | StopRule::Percent(m) => m > 0.0,
        };
        report.check(stop_positive, "stop distance must be positive");
        if let Some(ratio) = c.take_profit_ratio {
            report.check(ratio > 0.0, "take_profit_ratio must be positive");
        }
        if let Some(StopRule::AtrMultiple(m) | StopRule::Percent(m)) = c.trailing {
            report.check(m > 0.0, "trailing distance must be positive");
        }
        if let Some(minutes) = c.max_holding_minutes {
            report.check(minutes > 0, "max_holding_minutes must be positive");
        }
        report
    }

    fn clone_with_parameters(&self) -> Box<dyn Strategy> {
        Box::new(Self::new(self.config.clone()))
    }

    fn state(&self) -> &StrategyState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StrategyState {
        &mut self.state
    }

    fn ingest(
        &mut self,
        bar: &PriceBar,
        index: usize,
        _session: &SessionClock,
    ) -> Result<(), EngineError> {
        if let Some(value) = self.fast_stream.push(bar.close) {
            self.fast.push(index, value)?;
        }
        if let Some(value) = self.slow_stream.push(bar.close) {
            self.slow.push(index, value)?;
        }
        self.track_cross(index, bar.close);
        Ok(())
    }

    fn evaluate_entry(&mut self, ctx: &BarContext<'_>) -> Result<Signal, EngineError> {
        let bar = ctx.current();
        let index = ctx.index();
        let hold = |reason: &str| Signal::hold(bar.close, bar.timestamp, reason);

        let direction = match self.confirmed {
            Some((at, direction)) if at == index => direction,
            _ => {
                let reason = match self.pending {
                    Some(_) => "crossover awaiting confirmation",
                    None => "no crossover",
                };
                return Ok(hold(reason));
            }
        };
        if entries_closed(&ctx.session, bar, self.config.exit_before_close_minutes) {
            return Ok(hold("crossover ignored: too close to session close"));
        }

        let fast = self.fast.at(index)?;
        let slow = self.slow.at(index)?;
        let separation = (fast - slow).abs() / bar.close;
        if separation < self.config.min_separation {
            return Ok(hold("crossover rejected: separation below minimum"));
        }

        let mut metadata = Metadata::new()
            .with_number("fast_ma", fast)
            .with_number("slow_ma", slow)
            .with_number("separation_pct", separation * 100.0);
        let mut confidence = 0.75;

        if self.config.use_volume_confirmation {
            let avg = volume_average_before(ctx, self.config.volume_lookback)?;
            let ratio = if avg > 0.0 { bar.volume / avg } else { 0.0 };
            if ratio < self.config.volume_multiplier {
                return Ok(hold("crossover rejected: volume below threshold"));
            }
            metadata = metadata
                .with_number("volume_ratio", ratio)
                .with_flag("volume_confirmed", true);
            confidence += 0.1;
        }

        let atr = atr_at(ctx, self.config.atr_period).ok();
        if let Some(atr) = atr {
            metadata = metadata.with_number("atr", atr);
        }
        let side = direction.entry_side();
        let entry = bar.close;
        let Some(distance) = self.config.stop_rule.distance(entry, atr) else {
            return Ok(hold("no ATR for stop placement"));
        };
        let (stop, target) = stop_and_target(side, entry, distance, self.config.take_profit_ratio);

        let (signal, label) = match side {
            Side::Long => (Signal::buy(entry, bar.timestamp, confidence, ""), "bullish"),
            Side::Short => (Signal::sell(entry, bar.timestamp, confidence, ""), "bearish"),
        };
        Ok(signal
            .with_reason(format!(
                "{label} crossover confirmed, separation {:.3}%",
                separation * 100.0
            ))
            .with_stops(Some(stop), target)
            .with_metadata(metadata))
    }

    fn exit_policy(&self) -> ExitPolicy {
        ExitPolicy {
            trailing: self.config.trailing,
            max_holding_minutes: self.config.max_holding_minutes,
            exit_before_close_minutes: self.config.exit_before_close_minutes,
        }
    }

    fn should_exit(&self, ctx: &BarContext<'_>) -> Result<Option<Signal>, EngineError> {
        let Some(position) = self.position() else {
            return Ok(None);
        };
        let bar = ctx.current();
        if let Some((reason, price)) =
            check_default_exits(position, bar, &ctx.session, &self.exit_policy())
        {
            return Ok(Some(Signal::close(price, bar.timestamp, reason)));
        }
        if self.config.exit_on_opposite_cross {
            if let Some((at, direction)) = self.last_cross {
                if at == ctx.index() && direction.entry_side() != position.side {
                    return Ok(Some(Signal::close(
                        bar.close,
                        bar.timestamp,
                        ExitReason::OppositeSignal,
                    )));
                }
            }
        }
        Ok(None)
    }
}
