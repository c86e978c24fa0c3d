//! Trading-session metadata and the per-bar evaluation context.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::domain::ohlcv::PriceBar;

/// Boundaries of one trading session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClock {
    pub open: NaiveDateTime,
    pub close: NaiveDateTime,
}

impl SessionClock {
    pub fn new(open: NaiveDateTime, close: NaiveDateTime) -> Self {
        Self { open, close }
    }

    /// Session for `date` with the given daily open/close times.
    pub fn for_date(date: NaiveDate, open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            open: date.and_time(open),
            close: date.and_time(close),
        }
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        at >= self.open && at < self.close
    }

    pub fn minutes_since_open(&self, at: NaiveDateTime) -> i64 {
        (at - self.open).num_minutes()
    }

    /// Minutes until the close; negative once the close has passed.
    pub fn minutes_to_close(&self, at: NaiveDateTime) -> i64 {
        (self.close - at).num_minutes()
    }
}

/// What a strategy sees on each call: a window of consecutive bars ending
/// at the current one, and the session the current bar belongs to.
///
/// `first_index` is the position of the window's first bar in the full
/// series, so indices stay absolute when the caller only keeps a bounded
/// tail of the history.
#[derive(Debug, Clone, Copy)]
pub struct BarContext<'a> {
    bars: &'a [PriceBar],
    first_index: usize,
    pub session: SessionClock,
}

impl<'a> BarContext<'a> {
    /// Context over the whole series so far. `bars` must be non-empty and in
    /// strictly increasing timestamp order.
    pub fn new(bars: &'a [PriceBar], session: SessionClock) -> Option<Self> {
        Self::windowed(bars, 0, session)
    }

    /// Context over a window whose first bar sits at `first_index`.
    pub fn windowed(
        bars: &'a [PriceBar],
        first_index: usize,
        session: SessionClock,
    ) -> Option<Self> {
        if bars.is_empty() {
            return None;
        }
        Some(Self {
            bars,
            first_index,
            session,
        })
    }

    /// The window, oldest first; the current bar is last.
    pub fn bars(&self) -> &'a [PriceBar] {
        self.bars
    }

    pub fn current(&self) -> &'a PriceBar {
        &self.bars[self.bars.len() - 1]
    }

    /// Window bars preceding the current one.
    pub fn history(&self) -> &'a [PriceBar] {
        &self.bars[..self.bars.len() - 1]
    }

    /// Series index of the window's first bar.
    pub fn first_index(&self) -> usize {
        self.first_index
    }

    /// Series index of the current bar.
    pub fn index(&self) -> usize {
        self.first_index + self.bars.len() - 1
    }

    /// Bar at series index `index`, if it is inside the window.
    pub fn bar(&self, index: usize) -> Option<&'a PriceBar> {
        self.bars.get(index.checked_sub(self.first_index)?)
    }

    /// Bars in the series up to and including the current one.
    pub fn bars_seen(&self) -> usize {
        self.index() + 1
    }

    pub fn minutes_since_open(&self) -> i64 {
        self.session.minutes_since_open(self.current().timestamp)
    }

    pub fn minutes_to_close(&self) -> i64 {
        self.session.minutes_to_close(self.current().timestamp)
    }
}
