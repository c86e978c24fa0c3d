//! Completed-trade report written as CSV, one row per trade.

use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::EngineError;
use crate::domain::position::{CompletedTrade, Side};
use crate::ports::report_port::ReportPort;

const HEADER: [&str; 11] = [
    "strategy",
    "side",
    "entry_time",
    "entry_price",
    "quantity",
    "exit_time",
    "exit_price",
    "exit_reason",
    "partial_exits",
    "total_pnl",
    "holding_minutes",
];

pub struct CsvTradeReport;

impl CsvTradeReport {
    fn row(strategy_name: &str, trade: &CompletedTrade) -> Vec<String> {
        let side = match trade.side {
            Side::Long => "long",
            Side::Short => "short",
        };
        vec![
            strategy_name.to_string(),
            side.to_string(),
            trade.entry_time.to_string(),
            format!("{:.4}", trade.entry_price),
            trade.quantity.to_string(),
            trade.exit_time.to_string(),
            format!("{:.4}", trade.exit_price),
            trade.exit_reason.to_string(),
            trade.partial_exits.len().to_string(),
            format!("{:.2}", trade.total_pnl),
            trade.holding_minutes().to_string(),
        ]
    }
}

impl ReportPort for CsvTradeReport {
    fn write(
        &self,
        result: &BacktestResult,
        strategy_name: &str,
        output_path: &str,
    ) -> Result<(), EngineError> {
        let csv_err = |e: csv::Error| EngineError::Data {
            reason: format!("failed to write {}: {}", output_path, e),
        };

        let mut writer = csv::Writer::from_path(Path::new(output_path)).map_err(csv_err)?;
        writer.write_record(HEADER).map_err(csv_err)?;
        for trade in &result.trades {
            writer
                .write_record(Self::row(strategy_name, trade))
                .map_err(csv_err)?;
        }
        writer.flush()?;
        Ok(())
    }
}
