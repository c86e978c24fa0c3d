//! Reference runner: drives a strategy over a bar series, fills every
//! signal at its own price and settles sessions.
//!
//! Bars are grouped into sessions by calendar date. After the last bar of
//! each date the strategy's session-end hook runs, so positions still open
//! at the end of the data are settled the same way as any other session.

use chrono::NaiveTime;
use tracing::{debug, info};

use crate::domain::error::EngineError;
use crate::domain::metrics::Summary;
use crate::domain::ohlcv::PriceBar;
use crate::domain::position::{CompletedTrade, Fill};
use crate::domain::session::{BarContext, SessionClock};
use crate::domain::signal::Signal;
use crate::domain::strategy::Strategy;

/// Daily session times applied to every date in the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl SessionHours {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Self {
        Self { open, close }
    }

    pub fn clock_for(&self, bar: &PriceBar) -> SessionClock {
        SessionClock::for_date(bar.timestamp.date(), self.open, self.close)
    }
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    /// One signal per bar, followed by any session-end closes.
    pub signals: Vec<Signal>,
    pub trades: Vec<CompletedTrade>,
    pub summary: Summary,
}

pub fn run_backtest(
    strategy: &mut dyn Strategy,
    bars: &[PriceBar],
    hours: SessionHours,
    quantity: u64,
) -> Result<BacktestResult, EngineError> {
    if quantity == 0 {
        return Err(EngineError::Lifecycle {
            reason: "entry quantity must be positive".into(),
        });
    }
    check_ordering(bars)?;
    info!(
        strategy = strategy.name(),
        bars = bars.len(),
        quantity,
        "backtest started"
    );

    let mut signals = Vec::with_capacity(bars.len());
    let mut trades = Vec::new();

    for (i, bar) in bars.iter().enumerate() {
        let ctx = BarContext::new(&bars[..=i], hours.clock_for(bar)).ok_or_else(|| {
            EngineError::Data {
                reason: "empty bar window".into(),
            }
        })?;

        let signal = strategy.on_bar(&ctx)?;
        execute(strategy, &signal, quantity, &mut trades)?;
        signals.push(signal);

        let session_over = bars
            .get(i + 1)
            .is_none_or(|next| next.timestamp.date() != bar.timestamp.date());
        if session_over {
            debug!(date = %bar.timestamp.date(), "session end");
            for close in strategy.on_session_end(&ctx)? {
                execute(strategy, &close, quantity, &mut trades)?;
                signals.push(close);
            }
        }
    }

    let summary = Summary::compute(&trades);
    info!(
        trades = summary.total_trades,
        pnl = summary.total_pnl,
        "backtest finished"
    );
    Ok(BacktestResult {
        signals,
        trades,
        summary,
    })
}

fn execute(
    strategy: &mut dyn Strategy,
    signal: &Signal,
    quantity: u64,
    trades: &mut Vec<CompletedTrade>,
) -> Result<(), EngineError> {
    let Some(fill) = Fill::from_signal(signal, quantity) else {
        return Ok(());
    };
    if let Some(trade) = strategy.apply_fill(&fill)? {
        trades.push(trade);
    }
    Ok(())
}

fn check_ordering(bars: &[PriceBar]) -> Result<(), EngineError> {
    for (i, pair) in bars.windows(2).enumerate() {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(EngineError::Data {
                reason: format!(
                    "bar {} at {} does not follow {}",
                    i + 1,
                    pair[1].timestamp,
                    pair[0].timestamp
                ),
            });
        }
    }
    Ok(())
}
