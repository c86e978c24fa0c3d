//! Position lifecycle: entry, partial exits, final close.
//!
//! A [`PositionBook`] holds at most one open [`Position`]. Quantities are whole
//! units so that partial slices plus the final slice always sum to the
//! original quantity. Closing more than what remains is a lifecycle violation
//! and fails the call.

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::domain::error::EngineError;
use crate::domain::ohlcv::PriceBar;
use crate::domain::signal::{Action, ExitReason, Metadata, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// Realized P&L of `quantity` units moved from `entry` to `exit`.
    pub fn pnl(&self, entry: f64, exit: f64, quantity: u64) -> f64 {
        let per_unit = match self {
            Side::Long => exit - entry,
            Side::Short => entry - exit,
        };
        per_unit * quantity as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartialExit {
    pub time: NaiveDateTime,
    pub price: f64,
    pub quantity: u64,
    pub pnl: f64,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub quantity: u64,
    pub remaining_quantity: u64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    /// Indicator values of the signal that opened the position.
    pub entry_snapshot: Metadata,
    pub partial_exits: Vec<PartialExit>,
    pub highest_since_entry: f64,
    pub lowest_since_entry: f64,
    /// Ratchets with price, never loosens.
    pub trailing_stop: Option<f64>,
}

impl Position {
    pub fn partials_taken(&self) -> usize {
        self.partial_exits.len()
    }

    pub fn realized_pnl(&self) -> f64 {
        self.partial_exits.iter().map(|p| p.pnl).sum()
    }

    pub fn holding_minutes(&self, now: NaiveDateTime) -> i64 {
        (now - self.entry_time).num_minutes()
    }

    /// Move the trailing stop toward price; a looser level is ignored.
    pub fn ratchet_trailing_stop(&mut self, level: f64) {
        self.trailing_stop = Some(match (self.trailing_stop, self.side) {
            (Some(current), Side::Long) => current.max(level),
            (Some(current), Side::Short) => current.min(level),
            (None, _) => level,
        });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTrade {
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub quantity: u64,
    pub exit_price: f64,
    pub exit_time: NaiveDateTime,
    /// Units closed by the final slice.
    pub final_quantity: u64,
    pub total_pnl: f64,
    pub exit_reason: ExitReason,
    pub entry_snapshot: Metadata,
    pub partial_exits: Vec<PartialExit>,
}

impl CompletedTrade {
    pub fn is_win(&self) -> bool {
        self.total_pnl > 0.0
    }

    pub fn holding_minutes(&self) -> i64 {
        (self.exit_time - self.entry_time).num_minutes()
    }
}

/// A fill reported back by the execution collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum Fill {
    Entry {
        side: Side,
        price: f64,
        quantity: u64,
        time: NaiveDateTime,
    },
    Exit {
        price: f64,
        /// `None` closes everything that remains.
        quantity: Option<u64>,
        time: NaiveDateTime,
        reason: ExitReason,
    },
}

impl Fill {
    /// Fill a signal in full at its own price. `None` for HOLD.
    pub fn from_signal(signal: &Signal, entry_quantity: u64) -> Option<Fill> {
        match signal.action {
            Action::Hold => None,
            Action::Buy => Some(Fill::Entry {
                side: Side::Long,
                price: signal.price,
                quantity: entry_quantity,
                time: signal.timestamp,
            }),
            Action::Sell => Some(Fill::Entry {
                side: Side::Short,
                price: signal.price,
                quantity: entry_quantity,
                time: signal.timestamp,
            }),
            Action::Close { quantity, reason } => Some(Fill::Exit {
                price: signal.price,
                quantity,
                time: signal.timestamp,
                reason,
            }),
        }
    }
}

/// Owner of the single open position and the trades it produced.
#[derive(Debug, Clone, Default)]
pub struct PositionBook {
    position: Option<Position>,
    pending_entry: Option<Signal>,
    completed: Vec<CompletedTrade>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn position_mut(&mut self) -> Option<&mut Position> {
        self.position.as_mut()
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    pub fn completed_trades(&self) -> &[CompletedTrade] {
        &self.completed
    }

    /// Remember an entry signal so its stops and snapshot attach to the fill.
    pub fn record_signal(&mut self, signal: &Signal) {
        if signal.action.is_entry() {
            self.pending_entry = Some(signal.clone());
        }
    }

    pub fn open(
        &mut self,
        side: Side,
        price: f64,
        quantity: u64,
        time: NaiveDateTime,
    ) -> Result<(), EngineError> {
        if let Some(existing) = &self.position {
            return Err(EngineError::Lifecycle {
                reason: format!(
                    "cannot open {side:?} while a {:?} position is open",
                    existing.side
                ),
            });
        }
        if quantity == 0 {
            return Err(EngineError::Lifecycle {
                reason: "cannot open a position with zero quantity".into(),
            });
        }

        let pending = self.pending_entry.take();
        let (stop_loss, take_profit, entry_snapshot) = match pending {
            Some(signal) => (signal.stop_loss, signal.take_profit, signal.metadata),
            None => (None, None, Metadata::new()),
        };

        debug!(side = ?side, price, quantity, "position opened");
        self.position = Some(Position {
            side,
            entry_price: price,
            entry_time: time,
            quantity,
            remaining_quantity: quantity,
            stop_loss,
            take_profit,
            entry_snapshot,
            partial_exits: Vec::new(),
            highest_since_entry: price,
            lowest_since_entry: price,
            trailing_stop: None,
        });
        Ok(())
    }

    /// Close `quantity` units (or all that remain). Returns the completed
    /// trade once nothing remains.
    pub fn reduce(
        &mut self,
        price: f64,
        quantity: Option<u64>,
        time: NaiveDateTime,
        reason: ExitReason,
    ) -> Result<Option<CompletedTrade>, EngineError> {
        let Some(mut position) = self.position.take() else {
            return Err(EngineError::Lifecycle {
                reason: format!("{reason} exit with no open position"),
            });
        };

        let remaining = position.remaining_quantity;
        let closing = quantity.unwrap_or(remaining);
        if closing == 0 || closing > remaining {
            self.position = Some(position);
            return Err(EngineError::Lifecycle {
                reason: format!("cannot close {closing} units, {remaining} remain"),
            });
        }

        let pnl = position.side.pnl(position.entry_price, price, closing);
        if closing < remaining {
            position.remaining_quantity -= closing;
            position.partial_exits.push(PartialExit {
                time,
                price,
                quantity: closing,
                pnl,
                reason,
            });
            debug!(
                %reason,
                closed = closing,
                remaining = position.remaining_quantity,
                pnl,
                "partial exit"
            );
            self.position = Some(position);
            return Ok(None);
        }

        let closed = position;
        let trade = CompletedTrade {
            side: closed.side,
            entry_price: closed.entry_price,
            entry_time: closed.entry_time,
            quantity: closed.quantity,
            exit_price: price,
            exit_time: time,
            final_quantity: closing,
            total_pnl: closed.realized_pnl() + pnl,
            exit_reason: reason,
            entry_snapshot: closed.entry_snapshot,
            partial_exits: closed.partial_exits,
        };
        info!(
            side = ?trade.side,
            entry = trade.entry_price,
            exit = trade.exit_price,
            pnl = trade.total_pnl,
            %reason,
            "trade completed"
        );
        self.completed.push(trade.clone());
        Ok(Some(trade))
    }

    pub fn apply_fill(&mut self, fill: &Fill) -> Result<Option<CompletedTrade>, EngineError> {
        match *fill {
            Fill::Entry {
                side,
                price,
                quantity,
                time,
            } => self.open(side, price, quantity, time).map(|_| None),
            Fill::Exit {
                price,
                quantity,
                time,
                reason,
            } => self.reduce(price, quantity, time, reason),
        }
    }

    /// Fold a new bar into the running extremes since entry.
    pub fn mark(&mut self, bar: &PriceBar) {
        if let Some(position) = self.position.as_mut() {
            position.highest_since_entry = position.highest_since_entry.max(bar.high);
            position.lowest_since_entry = position.lowest_since_entry.min(bar.low);
        }
    }
}
