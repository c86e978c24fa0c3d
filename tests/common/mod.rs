#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use sessionbars::domain::backtest::SessionHours;
pub use sessionbars::domain::ohlcv::PriceBar;
use sessionbars::domain::session::{BarContext, SessionClock};
use sessionbars::domain::signal::Signal;
use sessionbars::domain::strategy::Strategy;

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

pub fn hours() -> SessionHours {
    SessionHours::new(
        NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
    )
}

pub fn session_on(d: u32) -> SessionClock {
    SessionClock::for_date(day(d), hours().open, hours().close)
}

pub fn session() -> SessionClock {
    session_on(3)
}

/// One-minute timestamp `minute` minutes after the 09:30 open on June `d`.
pub fn minute_on(d: u32, minute: i64) -> NaiveDateTime {
    session_on(d).open + Duration::minutes(minute)
}

pub fn make_bar(at: NaiveDateTime, open: f64, high: f64, low: f64, close: f64, volume: f64) -> PriceBar {
    PriceBar {
        symbol: "SPY".to_string(),
        timestamp: at,
        open,
        high,
        low,
        close,
        volume,
    }
}

/// Bars whose open, high and low sit 0.05 around each close.
pub fn bars_from_closes(closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            make_bar(minute_on(3, i as i64), close, close + 0.05, close - 0.05, close, 1000.0)
        })
        .collect()
}

/// Flat at 100 for 30 bars, then up one point per bar.
pub fn flat_then_rising(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| if i < 30 { 100.0 } else { 100.0 + (i - 29) as f64 })
        .collect()
}

/// 30 bars spanning `low..high`, then `quiet` bars inside the range.
pub fn opening_session(d: u32, high: f64, low: f64, quiet: usize) -> Vec<PriceBar> {
    let mid = (high + low) / 2.0;
    (0..30 + quiet)
        .map(|i| {
            let at = minute_on(d, i as i64);
            if i < 30 {
                make_bar(at, mid, high, low, mid, 1000.0)
            } else {
                make_bar(at, mid, mid + 0.01, mid - 0.01, mid, 1000.0)
            }
        })
        .collect()
}

/// Feed every prefix of `bars` to `strategy`, one call per bar.
pub fn drive(strategy: &mut dyn Strategy, bars: &[PriceBar], session: SessionClock) -> Vec<Signal> {
    (1..=bars.len())
        .map(|n| {
            let ctx = BarContext::new(&bars[..n], session).unwrap();
            strategy.on_bar(&ctx).unwrap()
        })
        .collect()
}

/// Like [`drive`], but each call only sees the last `window` bars.
pub fn drive_windowed(
    strategy: &mut dyn Strategy,
    bars: &[PriceBar],
    session: SessionClock,
    window: usize,
) -> Vec<Signal> {
    (0..bars.len())
        .map(|i| {
            let first = (i + 1).saturating_sub(window);
            let ctx = BarContext::windowed(&bars[first..=i], first, session).unwrap();
            strategy.on_bar(&ctx).unwrap()
        })
        .collect()
}

/// Indices of the bars that produced an entry signal.
pub fn entry_indices(signals: &[Signal]) -> Vec<usize> {
    signals
        .iter()
        .enumerate()
        .filter(|(_, s)| s.action.is_entry())
        .map(|(i, _)| i)
        .collect()
}
