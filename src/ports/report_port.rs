//! Report output port.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::EngineError;

pub trait ReportPort {
    fn write(
        &self,
        result: &BacktestResult,
        strategy_name: &str,
        output_path: &str,
    ) -> Result<(), EngineError>;
}
