//! MACD histogram momentum.
//!
//! Entries fire when the histogram crosses zero with enough change, with
//! optional slope and trend-EMA confirmation. Exits scale out in two
//! partial steps at ATR multiples of the entry ATR, then trail the remainder
//! by `trailing_atr_multiple` ATRs from the favourable extreme.
//!
//! Exit order per bar: stop-loss, profit targets, trailing stop and
//! max-holding time (in `exit_order`), histogram exits, pre-close.

use crate::domain::error::EngineError;
use crate::domain::indicator::macd::{DEFAULT_FAST, DEFAULT_SIGNAL, DEFAULT_SLOW};
use crate::domain::indicator::{EmaStream, IndicatorSeries, IndicatorType, MacdStream};
use crate::domain::indicator_helpers::atr_at;
use crate::domain::ohlcv::PriceBar;
use crate::domain::position::{Position, Side};
use crate::domain::risk::{
    adverse_touch, effective_trailing_stop, entries_closed, favourable_touch,
    max_holding_elapsed, pre_close_due, ExitPolicy, StopRule,
};
use crate::domain::session::{BarContext, SessionClock};
use crate::domain::signal::{ExitReason, Metadata, Signal};
use crate::domain::strategy::{Strategy, StrategyKind, StrategyState, ValidationReport};

/// Which of the trailing stop and the holding-time limit is checked first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdExitOrder {
    TrailingFirst,
    TimeFirst,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacdMomentumConfig {
    pub name: String,
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
    /// Minimum |h[t] - h[t-1]| for a zero cross to count.
    pub min_histogram_change: f64,
    pub use_slope_confirmation: bool,
    pub slope_lookback: usize,
    pub use_trend_filter: bool,
    pub trend_ema_period: usize,
    pub atr_period: usize,
    pub stop_atr_multiple: f64,
    /// Full take-profit distance in entry ATRs; only used without partials.
    pub take_profit_atr_multiple: Option<f64>,
    pub use_partial_profits: bool,
    pub first_profit_target: f64,
    pub first_exit_fraction: f64,
    pub second_profit_target: f64,
    pub second_exit_fraction: f64,
    pub trailing_atr_multiple: f64,
    pub max_holding_minutes: Option<i64>,
    pub exit_on_opposite_signal: bool,
    pub exit_on_zero_line_reversal: bool,
    pub exit_order: MacdExitOrder,
    pub exit_before_close_minutes: Option<i64>,
}

impl Default for MacdMomentumConfig {
    fn default() -> Self {
        Self {
            name: "MACD Momentum".into(),
            fast_period: DEFAULT_FAST,
            slow_period: DEFAULT_SLOW,
            signal_period: DEFAULT_SIGNAL,
            min_histogram_change: 0.0,
            use_slope_confirmation: false,
            slope_lookback: 3,
            use_trend_filter: false,
            trend_ema_period: 50,
            atr_period: 14,
            stop_atr_multiple: 2.0,
            take_profit_atr_multiple: Some(3.0),
            use_partial_profits: true,
            first_profit_target: 1.5,
            first_exit_fraction: 0.5,
            second_profit_target: 3.0,
            second_exit_fraction: 0.5,
            trailing_atr_multiple: 1.5,
            max_holding_minutes: None,
            exit_on_opposite_signal: true,
            exit_on_zero_line_reversal: true,
            exit_order: MacdExitOrder::TrailingFirst,
            exit_before_close_minutes: Some(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MacdMomentum {
    config: MacdMomentumConfig,
    macd_stream: MacdStream,
    trend_stream: EmaStream,
    line: IndicatorSeries,
    signal: IndicatorSeries,
    histogram: IndicatorSeries,
    trend: IndicatorSeries,
    state: StrategyState,
}

impl MacdMomentum {
    pub fn new(config: MacdMomentumConfig) -> Self {
        let macd_type = IndicatorType::Macd {
            fast: config.fast_period,
            slow: config.slow_period,
            signal: config.signal_period,
        };
        Self {
            macd_stream: MacdStream::new(
                config.fast_period,
                config.slow_period,
                config.signal_period,
            ),
            trend_stream: EmaStream::new(config.trend_ema_period),
            line: IndicatorSeries::empty(macd_type),
            signal: IndicatorSeries::empty(macd_type),
            histogram: IndicatorSeries::empty(macd_type),
            trend: IndicatorSeries::empty(IndicatorType::Ema(config.trend_ema_period)),
            state: StrategyState::new(),
            config,
        }
    }

    pub fn config(&self) -> &MacdMomentumConfig {
        &self.config
    }

    pub fn histogram(&self) -> &IndicatorSeries {
        &self.histogram
    }

    fn macd_type(&self) -> IndicatorType {
        IndicatorType::Macd {
            fast: self.config.fast_period,
            slow: self.config.slow_period,
            signal: self.config.signal_period,
        }
    }

    fn confirmation_lookback(&self) -> usize {
        if self.config.use_slope_confirmation {
            self.config.slope_lookback.max(1)
        } else {
            1
        }
    }

    /// Next profit-taking step for `position` on `bar`, if its target was
    /// touched. A fraction that rounds to nothing, or to everything left,
    /// closes the whole remainder.
    fn partial_exit(&self, position: &Position, bar: &PriceBar) -> Option<Signal> {
        let atr = position.entry_snapshot.number("atr")?;
        let c = &self.config;
        let (multiple, fraction, reason) = match position.partials_taken() {
            0 => (
                c.first_profit_target,
                c.first_exit_fraction,
                ExitReason::FirstProfitTarget,
            ),
            1 => (
                c.second_profit_target,
                c.second_exit_fraction,
                ExitReason::SecondProfitTarget,
            ),
            _ => return None,
        };
        let level = match position.side {
            Side::Long => position.entry_price + atr * multiple,
            Side::Short => position.entry_price - atr * multiple,
        };
        let price = favourable_touch(position.side, level, bar)?;

        let remaining = position.remaining_quantity;
        let quantity = (remaining as f64 * fraction).floor() as u64;
        if quantity == 0 || quantity >= remaining {
            Some(Signal::close(price, bar.timestamp, reason))
        } else {
            Some(Signal::close_partial(price, bar.timestamp, quantity, reason))
        }
    }

    fn histogram_exit(&self, position: &Position, index: usize) -> Option<ExitReason> {
        let h = self.histogram.get(index)?;
        let prev = self.histogram.get(index.checked_sub(1)?)?;
        let (crossed_against, deepening_against) = match position.side {
            Side::Long => (prev >= 0.0 && h < 0.0, prev < 0.0 && h < prev),
            Side::Short => (prev <= 0.0 && h > 0.0, prev > 0.0 && h > prev),
        };
        if self.config.exit_on_opposite_signal
            && crossed_against
            && (h - prev).abs() >= self.config.min_histogram_change
        {
            return Some(ExitReason::OppositeSignal);
        }
        if self.config.exit_on_zero_line_reversal && deepening_against {
            return Some(ExitReason::HistogramReversal);
        }
        None
    }

    fn trailing_exit(&self, position: &Position, bar: &PriceBar) -> Option<(ExitReason, f64)> {
        let distance = self.trailing_distance(position)?;
        let level = effective_trailing_stop(position, distance);
        adverse_touch(position.side, level, bar).map(|price| (ExitReason::TrailingStop, price))
    }

    fn time_exit(&self, position: &Position, bar: &PriceBar) -> Option<(ExitReason, f64)> {
        let max = self.config.max_holding_minutes?;
        max_holding_elapsed(position, bar, max).then_some((ExitReason::MaxHoldingTime, bar.close))
    }
}

impl Default for MacdMomentum {
    fn default() -> Self {
        Self::new(MacdMomentumConfig::default())
    }
}

impl Strategy for MacdMomentum {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::MacdMomentum
    }

    fn required_history(&self) -> usize {
        let c = &self.config;
        let histogram_start = c.fast_period.max(c.slow_period) + c.signal_period.max(1) - 1;
        let mut need = histogram_start + self.confirmation_lookback();
        need = need.max(c.atr_period);
        if c.use_trend_filter {
            need = need.max(c.trend_ema_period);
        }
        need
    }

    fn required_indicators(&self) -> Vec<IndicatorType> {
        let mut out = vec![self.macd_type(), IndicatorType::Atr(self.config.atr_period)];
        if self.config.use_trend_filter {
            out.push(IndicatorType::Ema(self.config.trend_ema_period));
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
        report.check(c.signal_period > 0, "signal_period must be positive");
        report.check(
            c.min_histogram_change >= 0.0,
            "min_histogram_change must not be negative",
        );
        if c.use_slope_confirmation {
            report.check(c.slope_lookback > 0, "slope_lookback must be positive");
        }
        if c.use_trend_filter {
            report.check(c.trend_ema_period > 0, "trend_ema_period must be positive");
        }
        report.check(c.atr_period > 0, "atr_period must be positive");
        report.check(c.stop_atr_multiple > 0.0, "stop_atr_multiple must be positive");
        if c.use_partial_profits {
            report.check(
                c.first_profit_target > 0.0,
                "first_profit_target must be positive",
            );
            report.check(
                c.second_profit_target > c.first_profit_target,
                "second_profit_target must exceed first_profit_target",
            );
            report.check(
                c.first_exit_fraction > 0.0 && c.first_exit_fraction <= 1.0,
                "first_exit_fraction must be in (0, 1]",
            );
            report.check(
                c.second_exit_fraction > 0.0 && c.second_exit_fraction <= 1.0,
                "second_exit_fraction must be in (0, 1]",
            );
            report.check(
                c.trailing_atr_multiple > 0.0,
                "trailing_atr_multiple must be positive",
            );
        } else if let Some(multiple) = c.take_profit_atr_multiple {
            report.check(multiple > 0.0, "take_profit_atr_multiple must be positive");
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
        let close = bar.close;
        if let Some(point) = self.macd_stream.push(close) {
            self.line.push(index, point.line)?;
            if let (Some(signal), Some(histogram)) = (point.signal, point.histogram) {
                self.signal.push(index, signal)?;
                self.histogram.push(index, histogram)?;
            }
        }
        if self.config.use_trend_filter {
            if let Some(value) = self.trend_stream.push(close) {
                self.trend.push(index, value)?;
            }
        }
        Ok(())
    }

    fn evaluate_entry(&mut self, ctx: &BarContext<'_>) -> Result<Signal, EngineError> {
        let c = &self.config;
        let bar = ctx.current();
        let index = ctx.index();
        let hold = |reason: &str| Signal::hold(bar.close, bar.timestamp, reason);

        let h = self.histogram.at(index)?;
        let prev = self.histogram.at(index.saturating_sub(1))?;
        let side = if prev <= 0.0 && h > 0.0 {
            Side::Long
        } else if prev >= 0.0 && h < 0.0 {
            Side::Short
        } else {
            return Ok(hold("no histogram zero cross"));
        };
        if entries_closed(&ctx.session, bar, c.exit_before_close_minutes) {
            return Ok(hold("histogram cross ignored: too close to session close"));
        }
        let change = h - prev;
        if change.abs() < c.min_histogram_change {
            return Ok(hold("histogram change below minimum"));
        }

        let mut confidence: f64 = 0.6;
        let mut metadata = Metadata::new()
            .with_number("histogram", h)
            .with_number("prev_histogram", prev)
            .with_number("histogram_change", change)
            .with_number("macd_line", self.line.at(index)?)
            .with_number("signal_line", self.signal.at(index)?);

        if c.use_slope_confirmation {
            let past = self
                .histogram
                .at(index.saturating_sub(self.confirmation_lookback()))?;
            let slope_ok = match side {
                Side::Long => h > past,
                Side::Short => h < past,
            };
            if !slope_ok {
                return Ok(hold("histogram slope not confirmed"));
            }
            confidence += 0.1;
            metadata = metadata.with_flag("slope_confirmed", true);
        }

        if c.use_trend_filter {
            let ema = self.trend.at(index)?;
            let with_trend = match side {
                Side::Long => bar.close > ema,
                Side::Short => bar.close < ema,
            };
            if !with_trend {
                return Ok(hold("against trend filter"));
            }
            confidence += 0.1;
            metadata = metadata.with_number("trend_ema", ema);
        }

        let atr = atr_at(ctx, c.atr_period)?;
        let entry = bar.close;
        let stop_distance = atr * c.stop_atr_multiple;
        let target_distance = if c.use_partial_profits {
            None
        } else {
            c.take_profit_atr_multiple.map(|m| atr * m)
        };
        let (stop, target) = match side {
            Side::Long => (entry - stop_distance, target_distance.map(|d| entry + d)),
            Side::Short => (entry + stop_distance, target_distance.map(|d| entry - d)),
        };
        metadata = metadata.with_number("atr", atr);

        let signal = match side {
            Side::Long => Signal::buy(entry, bar.timestamp, confidence, "bullish histogram cross"),
            Side::Short => {
                Signal::sell(entry, bar.timestamp, confidence, "bearish histogram cross")
            }
        };
        Ok(signal.with_stops(Some(stop), target).with_metadata(metadata))
    }

    fn exit_policy(&self) -> ExitPolicy {
        ExitPolicy {
            trailing: Some(StopRule::AtrMultiple(self.config.trailing_atr_multiple)),
            max_holding_minutes: self.config.max_holding_minutes,
            exit_before_close_minutes: self.config.exit_before_close_minutes,
        }
    }

    /// Trailing only runs on what is left after the first partial exit.
    fn trailing_distance(&self, position: &Position) -> Option<f64> {
        if !self.config.use_partial_profits || position.partials_taken() == 0 {
            return None;
        }
        self.exit_policy().trailing_distance(position)
    }

    fn should_exit(&self, ctx: &BarContext<'_>) -> Result<Option<Signal>, EngineError> {
        let Some(position) = self.position() else {
            return Ok(None);
        };
        let bar = ctx.current();
        let close = |reason: ExitReason, price: f64| Signal::close(price, bar.timestamp, reason);

        if let Some(price) = position
            .stop_loss
            .and_then(|stop| adverse_touch(position.side, stop, bar))
        {
            return Ok(Some(close(ExitReason::StopLoss, price)));
        }

        if self.config.use_partial_profits {
            if let Some(signal) = self.partial_exit(position, bar) {
                return Ok(Some(signal));
            }
        } else if let Some(price) = position
            .take_profit
            .and_then(|target| favourable_touch(position.side, target, bar))
        {
            return Ok(Some(close(ExitReason::TakeProfit, price)));
        }

        let ordered = match self.config.exit_order {
            MacdExitOrder::TrailingFirst => [
                self.trailing_exit(position, bar),
                self.time_exit(position, bar),
            ],
            MacdExitOrder::TimeFirst => [
                self.time_exit(position, bar),
                self.trailing_exit(position, bar),
            ],
        };
        if let Some((reason, price)) = ordered.into_iter().flatten().next() {
            return Ok(Some(close(reason, price)));
        }

        if let Some(reason) = self.histogram_exit(position, ctx.index()) {
            return Ok(Some(close(reason, bar.close)));
        }

        if let Some(minutes) = self.config.exit_before_close_minutes {
            if pre_close_due(&ctx.session, bar, minutes) {
                return Ok(Some(close(ExitReason::PreClose, bar.close)));
            }
        }
        Ok(None)
    }
}
