//! Risk policy helpers: stop/target placement, trailing stops, time-boxed
//! and pre-close exits.

use crate::domain::ohlcv::PriceBar;
use crate::domain::position::{Position, Side};
use crate::domain::session::SessionClock;
use crate::domain::signal::ExitReason;

/// How far from entry the protective stop sits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopRule {
    /// Multiple of the ATR at entry.
    AtrMultiple(f64),
    /// Fraction of the entry price (0.02 = 2%).
    Percent(f64),
}

impl StopRule {
    /// Absolute stop distance, or `None` if an ATR rule has no ATR to use.
    pub fn distance(&self, entry: f64, atr: Option<f64>) -> Option<f64> {
        match *self {
            StopRule::AtrMultiple(mult) => atr.map(|a| a * mult),
            StopRule::Percent(pct) => Some(entry * pct),
        }
    }
}

/// Stop and target for an entry. The target sits `reward_ratio` times the
/// stop distance on the profitable side.
pub fn stop_and_target(
    side: Side,
    entry: f64,
    stop_distance: f64,
    reward_ratio: Option<f64>,
) -> (f64, Option<f64>) {
    let target_distance = reward_ratio.map(|r| stop_distance * r);
    match side {
        Side::Long => (entry - stop_distance, target_distance.map(|d| entry + d)),
        Side::Short => (entry + stop_distance, target_distance.map(|d| entry - d)),
    }
}

/// Price `distance` back from `extreme` against the position.
pub fn trailing_level(side: Side, extreme: f64, distance: f64) -> f64 {
    match side {
        Side::Long => extreme - distance,
        Side::Short => extreme + distance,
    }
}

/// Favourable extreme reached since entry.
pub fn favourable_extreme(position: &Position) -> f64 {
    match position.side {
        Side::Long => position.highest_since_entry,
        Side::Short => position.lowest_since_entry,
    }
}

/// Fill price for an adverse level touched by `bar`, or `None` if untouched.
/// Gaps through the level fill at the open.
pub fn adverse_touch(side: Side, level: f64, bar: &PriceBar) -> Option<f64> {
    match side {
        Side::Long if bar.low <= level => Some(bar.open.min(level)),
        Side::Short if bar.high >= level => Some(bar.open.max(level)),
        _ => None,
    }
}

/// Fill price for a favourable level touched by `bar`, or `None`.
pub fn favourable_touch(side: Side, level: f64, bar: &PriceBar) -> Option<f64> {
    match side {
        Side::Long if bar.high >= level => Some(bar.open.max(level)),
        Side::Short if bar.low <= level => Some(bar.open.min(level)),
        _ => None,
    }
}

/// Active trailing level: the computed level from the extreme so far,
/// tightened by any level already ratcheted on the position.
pub fn effective_trailing_stop(position: &Position, distance: f64) -> f64 {
    let computed = trailing_level(position.side, favourable_extreme(position), distance);
    match (position.trailing_stop, position.side) {
        (Some(current), Side::Long) => current.max(computed),
        (Some(current), Side::Short) => current.min(computed),
        (None, _) => computed,
    }
}

pub fn max_holding_elapsed(position: &Position, bar: &PriceBar, max_minutes: i64) -> bool {
    position.holding_minutes(bar.timestamp) >= max_minutes
}

pub fn pre_close_due(session: &SessionClock, bar: &PriceBar, minutes_before: i64) -> bool {
    session.minutes_to_close(bar.timestamp) <= minutes_before
}

/// No new entries once the pre-close exit window has begun; a position
/// opened there would be closed on the next bar.
pub fn entries_closed(session: &SessionClock, bar: &PriceBar, exit_before_close: Option<i64>) -> bool {
    exit_before_close.is_some_and(|minutes| pre_close_due(session, bar, minutes))
}

/// Exit rules shared by every strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitPolicy {
    /// Trailing distance rule; ATR rules read `atr` from the entry snapshot.
    pub trailing: Option<StopRule>,
    pub max_holding_minutes: Option<i64>,
    pub exit_before_close_minutes: Option<i64>,
}

impl ExitPolicy {
    pub fn trailing_distance(&self, position: &Position) -> Option<f64> {
        self.trailing?
            .distance(position.entry_price, position.entry_snapshot.number("atr"))
    }
}

/// Shared exit check. Order: stop-loss, take-profit, trailing stop,
/// max holding time, pre-close. First match wins.
pub fn check_default_exits(
    position: &Position,
    bar: &PriceBar,
    session: &SessionClock,
    policy: &ExitPolicy,
) -> Option<(ExitReason, f64)> {
    if let Some(stop) = position.stop_loss {
        if let Some(price) = adverse_touch(position.side, stop, bar) {
            return Some((ExitReason::StopLoss, price));
        }
    }
    if let Some(target) = position.take_profit {
        if let Some(price) = favourable_touch(position.side, target, bar) {
            return Some((ExitReason::TakeProfit, price));
        }
    }
    if let Some(distance) = policy.trailing_distance(position) {
        let level = effective_trailing_stop(position, distance);
        if let Some(price) = adverse_touch(position.side, level, bar) {
            return Some((ExitReason::TrailingStop, price));
        }
    }
    if let Some(max) = policy.max_holding_minutes {
        if max_holding_elapsed(position, bar, max) {
            return Some((ExitReason::MaxHoldingTime, bar.close));
        }
    }
    if let Some(minutes) = policy.exit_before_close_minutes {
        if pre_close_due(session, bar, minutes) {
            return Some((ExitReason::PreClose, bar.close));
        }
    }
    None
}
