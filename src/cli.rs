//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvBarAdapter;
use crate::adapters::csv_report_adapter::CsvTradeReport;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self as backtest_engine, SessionHours};
use crate::domain::error::EngineError;
use crate::domain::indicator::IndicatorType;
use crate::domain::indicator_helpers::{compute_indicators, IndicatorOutput};
use crate::domain::metrics::Summary;
use crate::domain::ohlcv::PriceBar;
use crate::domain::strategy::Strategy;
use crate::domain::strategy_config::{
    load_run_config, load_strategy, validate_run_config, RunConfig,
};
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "sessionbars", about = "Intraday strategy evaluation over bar data")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a strategy over a bar file
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Bar CSV; overrides [backtest] data
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Write completed trades to this CSV file
        #[arg(short, long)]
        trades: Option<PathBuf>,
    },
    /// Validate a strategy configuration
    Validate {
        #[arg(short, long)]
        strategy: PathBuf,
    },
    /// Print the latest value of every indicator the strategy declares
    Indicators {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: Option<PathBuf>,
    },
    /// Show the time span and bar count of a bar file
    Info {
        #[arg(short, long)]
        data: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Run {
            config,
            data,
            trades,
        } => run_strategy(&config, data.as_deref(), trades.as_deref()),
        Command::Validate { strategy } => run_validate(&strategy),
        Command::Indicators { config, data } => run_indicators(&config, data.as_deref()),
        Command::Info { data } => run_info(&data),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, EngineError> {
    FileConfigAdapter::from_file(path)
}

/// `--data` wins over `[backtest] data`.
fn resolve_data_path(override_path: Option<&Path>, run: &RunConfig) -> Result<PathBuf, EngineError> {
    override_path
        .map(Path::to_path_buf)
        .or_else(|| run.data.as_ref().map(PathBuf::from))
        .ok_or_else(|| EngineError::ConfigMissing {
            section: "backtest".into(),
            key: "data".into(),
        })
}

fn load_bars(path: &Path, run: &RunConfig) -> Result<Vec<PriceBar>, EngineError> {
    eprintln!("Loading bars from {}", path.display());
    let bars = CsvBarAdapter::new(path.to_path_buf()).fetch_bars(run.start_date, run.end_date)?;
    if bars.is_empty() {
        return Err(EngineError::Data {
            reason: format!("no bars in {}", path.display()),
        });
    }
    Ok(bars)
}

fn run_strategy(
    config_path: &Path,
    data_override: Option<&Path>,
    trades_path: Option<&Path>,
) -> Result<(), EngineError> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;
    let run_config = load_run_config(&adapter)?;
    let mut strategy = load_strategy(&adapter)?;
    eprintln!("Loaded strategy: {} ({})", strategy.name(), strategy.kind());

    let data_path = resolve_data_path(data_override, &run_config)?;
    let bars = load_bars(&data_path, &run_config)?;
    eprintln!(
        "Running over {} bars, {} to {}",
        bars.len(),
        bars[0].timestamp,
        bars[bars.len() - 1].timestamp
    );

    let hours = SessionHours::new(run_config.session_open, run_config.session_close);
    let result =
        backtest_engine::run_backtest(strategy.as_mut(), &bars, hours, run_config.quantity)?;

    print_summary(&result.summary);

    if let Some(path) = trades_path {
        CsvTradeReport.write(&result, strategy.name(), &path.display().to_string())?;
        eprintln!("\nTrades written to: {}", path.display());
    }
    Ok(())
}

fn print_summary(summary: &Summary) {
    eprintln!("\n=== Results ===");
    eprintln!("Total Trades:     {}", summary.total_trades);
    eprintln!(
        "Won / Lost / BE:  {} / {} / {}",
        summary.trades_won, summary.trades_lost, summary.trades_breakeven
    );
    eprintln!("Win Rate:         {:.1}%", summary.win_rate * 100.0);
    eprintln!("Total P&L:        {:.2}", summary.total_pnl);
    eprintln!("Profit Factor:    {:.2}", summary.profit_factor);
    eprintln!("Avg Win:          {:.2}", summary.avg_win);
    eprintln!("Avg Loss:         {:.2}", summary.avg_loss);
    eprintln!("Largest Win:      {:.2}", summary.largest_win);
    eprintln!("Largest Loss:     {:.2}", summary.largest_loss);
    eprintln!("Avg Holding:      {:.1} min", summary.avg_holding_minutes);
    eprintln!("Partial Exits:    {}", summary.partial_exits);
}

fn run_validate(strategy_path: &Path) -> Result<(), EngineError> {
    eprintln!("Validating strategy: {}", strategy_path.display());
    let adapter = load_config(strategy_path)?;
    let strategy = load_strategy(&adapter)?;
    validate_run_config(&adapter)?;

    eprintln!("\nStrategy:          {}", strategy.name());
    eprintln!("Kind:              {}", strategy.kind());
    eprintln!("Required history:  {} bars", strategy.required_history());
    eprintln!("Indicators:");
    for indicator in unique_indicators(strategy.as_ref()) {
        eprintln!("  {:<16} warm-up {} bars", indicator.to_string(), indicator.lookback());
    }
    eprintln!("\nStrategy configuration is valid.");
    Ok(())
}

fn run_indicators(config_path: &Path, data_override: Option<&Path>) -> Result<(), EngineError> {
    let adapter = load_config(config_path)?;
    let run_config = load_run_config(&adapter)?;
    let strategy = load_strategy(&adapter)?;
    let data_path = resolve_data_path(data_override, &run_config)?;
    let bars = load_bars(&data_path, &run_config)?;

    let indicators = unique_indicators(strategy.as_ref());
    let computed = compute_indicators(&bars, &indicators);
    for indicator in &indicators {
        match computed.get(indicator) {
            Some(IndicatorOutput::Macd(macd)) => println!(
                "{}: line={} signal={} histogram={}",
                indicator,
                format_latest(macd.line.latest()),
                format_latest(macd.signal.latest()),
                format_latest(macd.histogram.latest()),
            ),
            Some(output) => println!("{}: {}", indicator, format_latest(output.latest())),
            None => println!("{}: n/a", indicator),
        }
    }
    Ok(())
}

fn run_info(data_path: &Path) -> Result<(), EngineError> {
    let adapter = CsvBarAdapter::new(data_path.to_path_buf());
    match adapter.data_range()? {
        Some((first, last, count)) => {
            println!("{}: {} bars, {} to {}", data_path.display(), count, first, last);
        }
        None => eprintln!("{}: no data found", data_path.display()),
    }
    Ok(())
}

/// Declared indicators in declaration order, duplicates removed.
fn unique_indicators(strategy: &dyn Strategy) -> Vec<IndicatorType> {
    let mut seen = Vec::new();
    for indicator in strategy.required_indicators() {
        if !seen.contains(&indicator) {
            seen.push(indicator);
        }
    }
    seen
}

fn format_latest(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.4}", v))
        .unwrap_or_else(|| "n/a".to_string())
}
