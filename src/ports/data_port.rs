//! Bar data access port.

use chrono::{NaiveDate, NaiveDateTime};

use crate::domain::error::EngineError;
use crate::domain::ohlcv::PriceBar;

pub trait DataPort {
    /// Bars dated within `[start, end]` (either bound optional), oldest first
    /// with strictly increasing timestamps.
    fn fetch_bars(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, EngineError>;

    /// First and last timestamp plus bar count, or `None` when empty.
    fn data_range(&self) -> Result<Option<(NaiveDateTime, NaiveDateTime, usize)>, EngineError>;
}
