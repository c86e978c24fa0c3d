//! CSV bar data adapter.
//!
//! Columns: `timestamp,open,high,low,close,volume`, with a header row.
//! Timestamps are `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DDTHH:MM:SS`. The symbol
//! is the file stem.

use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::PathBuf;

use crate::domain::error::EngineError;
use crate::domain::ohlcv::PriceBar;
use crate::ports::data_port::DataPort;

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

pub struct CsvBarAdapter {
    path: PathBuf,
}

impl CsvBarAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn symbol(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn read_all(&self) -> Result<Vec<PriceBar>, EngineError> {
        let content = fs::read_to_string(&self.path).map_err(|e| EngineError::Data {
            reason: format!("failed to read {}: {}", self.path.display(), e),
        })?;

        let symbol = self.symbol();
        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (row, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| EngineError::Data {
                reason: format!("CSV parse error: {}", e),
            })?;
            // header is line 1
            let line = row + 2;

            let ts_str = record.get(0).ok_or_else(|| EngineError::Data {
                reason: format!("line {line}: missing timestamp column"),
            })?;
            let timestamp = parse_timestamp(ts_str.trim()).ok_or_else(|| EngineError::Data {
                reason: format!("line {line}: invalid timestamp '{ts_str}'"),
            })?;

            bars.push(PriceBar {
                symbol: symbol.clone(),
                timestamp,
                open: number(&record, 1, "open", line)?,
                high: number(&record, 2, "high", line)?,
                low: number(&record, 3, "low", line)?,
                close: number(&record, 4, "close", line)?,
                volume: number(&record, 5, "volume", line)?,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        if let Some(pair) = bars.windows(2).find(|w| w[0].timestamp == w[1].timestamp) {
            return Err(EngineError::Data {
                reason: format!("duplicate timestamp {}", pair[0].timestamp),
            });
        }
        Ok(bars)
    }
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

fn number(
    record: &csv::StringRecord,
    column: usize,
    name: &str,
    line: usize,
) -> Result<f64, EngineError> {
    let raw = record.get(column).ok_or_else(|| EngineError::Data {
        reason: format!("line {line}: missing {name} column"),
    })?;
    raw.trim().parse().map_err(|e| EngineError::Data {
        reason: format!("line {line}: invalid {name} value '{raw}': {e}"),
    })
}

impl DataPort for CsvBarAdapter {
    fn fetch_bars(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, EngineError> {
        let mut bars = self.read_all()?;
        bars.retain(|bar| {
            let date = bar.timestamp.date();
            start.is_none_or(|s| date >= s) && end.is_none_or(|e| date <= e)
        });
        Ok(bars)
    }

    fn data_range(&self) -> Result<Option<(NaiveDateTime, NaiveDateTime, usize)>, EngineError> {
        let bars = self.read_all()?;
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp, bars.len())),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_csv(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    const SAMPLE: &str = "timestamp,open,high,low,close,volume\n\
        2024-06-04 09:31:00,101.0,101.5,100.5,101.2,1200\n\
        2024-06-03 09:30:00,100.0,100.5,99.5,100.2,1000\n\
        2024-06-03T09:31:00,100.2,100.8,100.0,100.6,1100\n";

    #[test]
    fn reads_both_timestamp_formats_and_sorts() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvBarAdapter::new(write_csv(&dir, "SPY.csv", SAMPLE));

        let bars = adapter.fetch_bars(None, None).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].symbol, "SPY");
        assert_eq!(bars[0].close, 100.2);
        assert_eq!(bars[1].volume, 1100.0);
        assert!(bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn filters_by_date() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvBarAdapter::new(write_csv(&dir, "SPY.csv", SAMPLE));

        let day = NaiveDate::from_ymd_opt(2024, 6, 4);
        let bars = adapter.fetch_bars(day, day).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].timestamp.date(), day.unwrap());
    }

    #[test]
    fn data_range_reports_span() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvBarAdapter::new(write_csv(&dir, "SPY.csv", SAMPLE));

        let (first, last, count) = adapter.data_range().unwrap().unwrap();
        assert_eq!(count, 3);
        assert_eq!(first.to_string(), "2024-06-03 09:30:00");
        assert_eq!(last.to_string(), "2024-06-04 09:31:00");
    }

    #[test]
    fn duplicate_timestamps_are_rejected() {
        let dir = TempDir::new().unwrap();
        let content = "timestamp,open,high,low,close,volume\n\
            2024-06-03 09:30:00,1,1,1,1,1\n\
            2024-06-03T09:30:00,1,1,1,1,1\n";
        let adapter = CsvBarAdapter::new(write_csv(&dir, "DUP.csv", content));
        let err = adapter.fetch_bars(None, None).unwrap_err();
        assert!(err.to_string().contains("duplicate timestamp"));
    }

    #[test]
    fn bad_number_names_line_and_column() {
        let dir = TempDir::new().unwrap();
        let content = "timestamp,open,high,low,close,volume\n\
            2024-06-03 09:30:00,1,1,1,abc,1\n";
        let adapter = CsvBarAdapter::new(write_csv(&dir, "BAD.csv", content));
        let err = adapter.fetch_bars(None, None).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("line 2"));
        assert!(message.contains("close"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvBarAdapter::new(dir.path().join("nope.csv"));
        assert!(adapter.fetch_bars(None, None).is_err());
    }

    #[test]
    fn empty_file_has_no_range() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvBarAdapter::new(write_csv(
            &dir,
            "EMPTY.csv",
            "timestamp,open,high,low,close,volume\n",
        ));
        assert_eq!(adapter.data_range().unwrap(), None);
    }
}
