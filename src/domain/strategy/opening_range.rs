//! Opening range tracking and the evaluation core shared by the breakout and
//! fade strategies.
//!
//! The range covers bars in `[open, open + opening_range_minutes)`. The first
//! bar at or past the window end finalises it: `Established` when its height
//! relative to its midpoint reaches `min_range_size`, `TooNarrow` otherwise.
//! Only `Established` ranges produce entries.

use chrono::NaiveDateTime;
use tracing::debug;

use crate::domain::error::EngineError;
use crate::domain::indicator::IndicatorType;
use crate::domain::indicator_helpers::{atr_at, volume_average_before};
use crate::domain::ohlcv::PriceBar;
use crate::domain::position::Side;
use crate::domain::risk::{entries_closed, stop_and_target, ExitPolicy, StopRule};
use crate::domain::session::{BarContext, SessionClock};
use crate::domain::signal::{Metadata, Signal};
use crate::domain::strategy::{insufficient_history, ValidationReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangePhase {
    /// No bar of the current session seen yet.
    Idle,
    Forming,
    Established,
    TooNarrow,
    /// Session closed; nothing further until the next session opens.
    Ended,
}

#[derive(Debug, Clone, Copy)]
pub enum RangeEvent<'a> {
    Bar(&'a PriceBar, &'a SessionClock),
    SessionEnd,
}

#[derive(Debug, Clone)]
pub struct OpeningRange {
    phase: RangePhase,
    session_open: Option<NaiveDateTime>,
    high: f64,
    low: f64,
    bars_in_window: usize,
}

impl Default for OpeningRange {
    fn default() -> Self {
        Self {
            phase: RangePhase::Idle,
            session_open: None,
            high: f64::NEG_INFINITY,
            low: f64::INFINITY,
            bars_in_window: 0,
        }
    }
}

impl OpeningRange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> RangePhase {
        self.phase
    }

    pub fn is_established(&self) -> bool {
        self.phase == RangePhase::Established
    }

    /// `(high, low)` once at least one bar fell inside the window.
    pub fn levels(&self) -> Option<(f64, f64)> {
        (self.bars_in_window > 0).then_some((self.high, self.low))
    }

    pub fn midpoint(&self) -> Option<f64> {
        self.levels().map(|(h, l)| (h + l) / 2.0)
    }

    /// Height relative to the midpoint.
    pub fn relative_size(&self) -> Option<f64> {
        let (high, low) = self.levels()?;
        let mid = (high + low) / 2.0;
        (mid > 0.0).then(|| (high - low) / mid)
    }

    /// Single transition function for the range lifecycle.
    pub fn advance(&mut self, event: RangeEvent<'_>, window_minutes: i64, min_size: f64) {
        let (bar, session) = match event {
            RangeEvent::SessionEnd => {
                self.phase = RangePhase::Ended;
                return;
            }
            RangeEvent::Bar(bar, session) => (bar, session),
        };

        if self.session_open != Some(session.open) {
            *self = Self {
                phase: RangePhase::Forming,
                session_open: Some(session.open),
                ..Self::default()
            };
        }
        if bar.timestamp < session.open || self.phase != RangePhase::Forming {
            return;
        }

        if session.minutes_since_open(bar.timestamp) < window_minutes {
            self.high = self.high.max(bar.high);
            self.low = self.low.min(bar.low);
            self.bars_in_window += 1;
            return;
        }

        self.phase = match self.relative_size() {
            Some(size) if size >= min_size => RangePhase::Established,
            _ => RangePhase::TooNarrow,
        };
    }
}

/// Parameters shared by both opening-range strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSettings {
    pub opening_range_minutes: i64,
    /// Fractional distance beyond the range edge that counts as a break.
    pub breakout_threshold: f64,
    pub volume_multiplier: f64,
    /// Preceding bars averaged for the volume check.
    pub volume_lookback: usize,
    pub atr_period: usize,
    pub stop_atr_multiple: f64,
    pub take_profit_ratio: f64,
    pub min_range_size: f64,
    pub max_entries_per_session: usize,
    pub exit_before_close_minutes: Option<i64>,
    pub max_holding_minutes: Option<i64>,
    pub trailing_atr_multiple: Option<f64>,
}

impl RangeSettings {
    pub fn breakout_defaults() -> Self {
        Self {
            opening_range_minutes: 30,
            breakout_threshold: 0.001,
            volume_multiplier: 1.5,
            volume_lookback: 20,
            atr_period: 14,
            stop_atr_multiple: 1.5,
            take_profit_ratio: 2.0,
            min_range_size: 0.002,
            max_entries_per_session: 1,
            exit_before_close_minutes: Some(15),
            max_holding_minutes: None,
            trailing_atr_multiple: None,
        }
    }

    pub fn fade_defaults() -> Self {
        Self {
            stop_atr_multiple: 2.0,
            take_profit_ratio: 1.0,
            ..Self::breakout_defaults()
        }
    }

    pub fn required_history(&self) -> usize {
        self.atr_period.max(self.volume_lookback + 1)
    }

    pub fn required_indicators(&self) -> Vec<IndicatorType> {
        vec![
            IndicatorType::Atr(self.atr_period),
            IndicatorType::VolumeSma(self.volume_lookback),
        ]
    }

    pub fn exit_policy(&self) -> ExitPolicy {
        ExitPolicy {
            trailing: self.trailing_atr_multiple.map(StopRule::AtrMultiple),
            max_holding_minutes: self.max_holding_minutes,
            exit_before_close_minutes: self.exit_before_close_minutes,
        }
    }

    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::new();
        report.check(
            self.opening_range_minutes > 0,
            "opening_range_minutes must be positive",
        );
        report.check(
            self.breakout_threshold >= 0.0,
            "breakout_threshold must not be negative",
        );
        report.check(
            self.volume_multiplier > 0.0,
            "volume_multiplier must be positive",
        );
        report.check(self.volume_lookback > 0, "volume_lookback must be positive");
        report.check(self.atr_period > 0, "atr_period must be positive");
        report.check(
            self.stop_atr_multiple > 0.0,
            "stop_atr_multiple must be positive",
        );
        report.check(
            self.take_profit_ratio > 0.0,
            "take_profit_ratio must be positive",
        );
        report.check(self.min_range_size >= 0.0, "min_range_size must not be negative");
        report.check(
            self.max_entries_per_session > 0,
            "max_entries_per_session must be at least 1",
        );
        if let Some(minutes) = self.exit_before_close_minutes {
            report.check(minutes >= 0, "exit_before_close_minutes must not be negative");
        }
        if let Some(minutes) = self.max_holding_minutes {
            report.check(minutes > 0, "max_holding_minutes must be positive");
        }
        if let Some(mult) = self.trailing_atr_multiple {
            report.check(mult > 0.0, "trailing_atr_multiple must be positive");
        }
        report
    }
}

/// Which side of a range break a strategy trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Trade in the direction of the break.
    Follow,
    /// Trade back toward the range.
    Fade,
}

impl Polarity {
    fn label(&self) -> &'static str {
        match self {
            Polarity::Follow => "breakout",
            Polarity::Fade => "fade",
        }
    }

    fn base_confidence(&self) -> f64 {
        match self {
            Polarity::Follow => 0.6,
            Polarity::Fade => 0.55,
        }
    }
}

/// Range state and per-session entry counting.
#[derive(Debug, Clone)]
pub struct RangeCore {
    pub settings: RangeSettings,
    range: OpeningRange,
    entries_this_session: usize,
}

impl RangeCore {
    pub fn new(settings: RangeSettings) -> Self {
        Self {
            settings,
            range: OpeningRange::new(),
            entries_this_session: 0,
        }
    }

    pub fn range(&self) -> &OpeningRange {
        &self.range
    }

    pub fn entries_this_session(&self) -> usize {
        self.entries_this_session
    }

    pub fn ingest(&mut self, bar: &PriceBar, session: &SessionClock) {
        let before = self.range.session_open;
        let phase_before = self.range.phase();
        self.range.advance(
            RangeEvent::Bar(bar, session),
            self.settings.opening_range_minutes,
            self.settings.min_range_size,
        );
        if self.range.session_open != before {
            self.entries_this_session = 0;
        }
        if self.range.phase() != phase_before {
            debug!(
                at = %bar.timestamp,
                from = ?phase_before,
                to = ?self.range.phase(),
                levels = ?self.range.levels(),
                "opening range transition"
            );
        }
    }

    pub fn end_session(&mut self) {
        self.range.advance(
            RangeEvent::SessionEnd,
            self.settings.opening_range_minutes,
            self.settings.min_range_size,
        );
        self.entries_this_session = 0;
    }

    pub fn evaluate(
        &mut self,
        ctx: &BarContext<'_>,
        polarity: Polarity,
    ) -> Result<Signal, EngineError> {
        let bar = ctx.current();
        let need = self.settings.required_history();
        if ctx.bars_seen() < need {
            return Ok(insufficient_history(bar, ctx.bars_seen(), need));
        }
        let hold = |reason: &str| Signal::hold(bar.close, bar.timestamp, reason);

        if !self.range.is_established() {
            let reason = match self.range.phase() {
                RangePhase::TooNarrow => "opening range too narrow",
                RangePhase::Ended => "session ended",
                _ => "opening range forming",
            };
            return Ok(hold(reason));
        }
        if self.entries_this_session >= self.settings.max_entries_per_session {
            return Ok(hold("entry limit reached for session"));
        }
        if entries_closed(&ctx.session, bar, self.settings.exit_before_close_minutes) {
            return Ok(hold("too close to session close"));
        }
        let Some((range_high, range_low)) = self.range.levels() else {
            return Ok(hold("opening range forming"));
        };

        let threshold = self.settings.breakout_threshold;
        let broke_up = bar.close > range_high * (1.0 + threshold);
        let broke_down = bar.close < range_low * (1.0 - threshold);
        let break_side = match (broke_up, broke_down) {
            (true, _) => Side::Long,
            (_, true) => Side::Short,
            _ => return Ok(hold("price inside opening range")),
        };

        let avg_volume = volume_average_before(ctx, self.settings.volume_lookback)?;
        let volume_ratio = if avg_volume > 0.0 {
            bar.volume / avg_volume
        } else {
            0.0
        };
        if volume_ratio < self.settings.volume_multiplier {
            return Ok(hold("range break without volume confirmation"));
        }

        let atr = atr_at(ctx, self.settings.atr_period)?;
        let side = match polarity {
            Polarity::Follow => break_side,
            Polarity::Fade => break_side.opposite(),
        };
        let entry = bar.close;
        let (stop, target) = stop_and_target(
            side,
            entry,
            atr * self.settings.stop_atr_multiple,
            Some(self.settings.take_profit_ratio),
        );

        let surplus = (volume_ratio / self.settings.volume_multiplier - 1.0).clamp(0.0, 1.0);
        let confidence = polarity.base_confidence() + surplus * 0.3;
        let direction = match break_side {
            Side::Long => "upside",
            Side::Short => "downside",
        };
        let reason = format!("{} of {direction} range break", polarity.label());
        let metadata = Metadata::new()
            .with_number("range_high", range_high)
            .with_number("range_low", range_low)
            .with_number("range_size", self.range.relative_size().unwrap_or(0.0))
            .with_number("volume_ratio", volume_ratio)
            .with_number("atr", atr)
            .with_number("minutes_since_open", ctx.minutes_since_open() as f64)
            .with_text("break_direction", direction);

        self.entries_this_session += 1;
        let signal = match side {
            Side::Long => Signal::buy(entry, bar.timestamp, confidence, reason),
            Side::Short => Signal::sell(entry, bar.timestamp, confidence, reason),
        };
        Ok(signal.with_stops(Some(stop), target).with_metadata(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveTime};

    fn session() -> SessionClock {
        SessionClock::for_date(
            NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        )
    }

    fn bar(minute: i64, high: f64, low: f64) -> PriceBar {
        let close = (high + low) / 2.0;
        PriceBar {
            symbol: "SPY".into(),
            timestamp: session().open + Duration::minutes(minute),
            open: close,
            high,
            low,
            close,
            volume: 1000.0,
        }
    }

    fn feed(range: &mut OpeningRange, bars: &[PriceBar], min_size: f64) {
        let s = session();
        for b in bars {
            range.advance(RangeEvent::Bar(b, &s), 30, min_size);
        }
    }

    #[test]
    fn range_forms_then_establishes_on_first_bar_past_window() {
        let mut range = OpeningRange::new();
        feed(
            &mut range,
            &[bar(0, 100.5, 99.5), bar(10, 101.0, 100.0), bar(29, 100.8, 99.0)],
            0.002,
        );
        assert_eq!(range.phase(), RangePhase::Forming);
        assert_eq!(range.levels(), Some((101.0, 99.0)));

        // outside the window: finalises without extending the range
        feed(&mut range, &[bar(30, 105.0, 98.0)], 0.002);
        assert_eq!(range.phase(), RangePhase::Established);
        assert_eq!(range.levels(), Some((101.0, 99.0)));
    }

    #[test]
    fn narrow_range_never_establishes() {
        let mut range = OpeningRange::new();
        feed(
            &mut range,
            &[bar(0, 100.10, 100.00), bar(15, 100.08, 100.02), bar(30, 100.5, 100.0)],
            0.002,
        );
        assert_eq!(range.phase(), RangePhase::TooNarrow);
        feed(&mut range, &[bar(60, 103.0, 102.0)], 0.002);
        assert_eq!(range.phase(), RangePhase::TooNarrow);
    }

    #[test]
    fn new_session_resets_range() {
        let mut range = OpeningRange::new();
        feed(&mut range, &[bar(0, 101.0, 99.0), bar(30, 100.0, 100.0)], 0.002);
        assert!(range.is_established());
        range.advance(RangeEvent::SessionEnd, 30, 0.002);
        assert_eq!(range.phase(), RangePhase::Ended);

        let next = SessionClock::new(
            session().open + Duration::days(1),
            session().close + Duration::days(1),
        );
        let mut first = bar(0, 50.0, 49.0);
        first.timestamp = next.open;
        range.advance(RangeEvent::Bar(&first, &next), 30, 0.002);
        assert_eq!(range.phase(), RangePhase::Forming);
        assert_eq!(range.levels(), Some((50.0, 49.0)));
    }

    #[test]
    fn fade_defaults_differ_only_in_risk() {
        let b = RangeSettings::breakout_defaults();
        let f = RangeSettings::fade_defaults();
        assert_eq!(f.stop_atr_multiple, 2.0);
        assert_eq!(f.take_profit_ratio, 1.0);
        assert_eq!(
            RangeSettings {
                stop_atr_multiple: b.stop_atr_multiple,
                take_profit_ratio: b.take_profit_ratio,
                ..f
            },
            b
        );
    }

    #[test]
    fn settings_validation_lists_failures() {
        let settings = RangeSettings {
            opening_range_minutes: 0,
            atr_period: 0,
            ..RangeSettings::breakout_defaults()
        };
        let report = settings.validate();
        assert_eq!(report.errors.len(), 2);
    }
}
