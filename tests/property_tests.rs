//! Property tests for indicator alignment and position bookkeeping.
//!
//! Uses proptest to verify:
//! 1. EMA output length and SMA seed for any series and period
//! 2. MACD histogram starts at max(fast, slow) + signal - 2
//! 3. Streaming EMA/SMA match the batch calculations
//! 4. Partial exits plus the final close conserve quantity and P&L
//! 5. Trailing stops only tighten

use approx::relative_eq;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use sessionbars::domain::indicator::{
    ema_values, macd::macd_from_values, sma_values, EmaStream, SmaStream,
};
use sessionbars::domain::position::{PositionBook, Side};
use sessionbars::domain::signal::ExitReason;

fn ts(minute: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 3)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
        + Duration::minutes(minute)
}

// ── Generators ───────────────────────────────────────────────────────

fn arb_closes(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0..500.0_f64, 0..max_len)
}

fn arb_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Long), Just(Side::Short)]
}

fn close_enough(a: f64, b: f64) -> bool {
    relative_eq!(a, b, epsilon = 1e-9, max_relative = 1e-9)
}

// ── 1-3. Indicators ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn ema_alignment(closes in arb_closes(200), period in 1usize..50) {
        let ema = ema_values(&closes, period);
        if closes.len() < period {
            prop_assert!(ema.is_empty());
        } else {
            prop_assert_eq!(ema.len(), closes.len() - period + 1);
            let seed = closes[..period].iter().sum::<f64>() / period as f64;
            prop_assert!(close_enough(ema[0], seed));
        }
    }

    #[test]
    fn macd_histogram_start(
        fast in 2usize..20,
        extra in 1usize..20,
        signal in 2usize..12,
        closes in prop::collection::vec(50.0..150.0_f64, 80..120),
    ) {
        let slow = fast + extra;
        let macd = macd_from_values(&closes, fast, slow, signal);
        let first = slow + signal - 2;
        prop_assert_eq!(macd.histogram.first_index(), first);
        prop_assert_eq!(macd.line.first_index(), slow - 1);
        prop_assert_eq!(macd.histogram.len(), closes.len() - first);
        prop_assert!(macd.histogram.get(first - 1).is_none());
    }

    #[test]
    fn streams_match_batch(closes in arb_closes(150), period in 1usize..30) {
        let mut ema_stream = EmaStream::new(period);
        let mut sma_stream = SmaStream::new(period);
        let streamed_ema: Vec<f64> = closes.iter().filter_map(|&c| ema_stream.push(c)).collect();
        let streamed_sma: Vec<f64> = closes.iter().filter_map(|&c| sma_stream.push(c)).collect();

        let batch_ema = ema_values(&closes, period);
        let batch_sma = sma_values(&closes, period);
        prop_assert_eq!(streamed_ema.len(), batch_ema.len());
        prop_assert_eq!(streamed_sma.len(), batch_sma.len());
        for (a, b) in streamed_ema.iter().zip(&batch_ema) {
            prop_assert!(close_enough(*a, *b));
        }
        for (a, b) in streamed_sma.iter().zip(&batch_sma) {
            prop_assert!(close_enough(*a, *b));
        }
    }
}

// ── 4-5. Position bookkeeping ────────────────────────────────────────

proptest! {
    #[test]
    fn partial_exits_conserve_quantity_and_pnl(
        side in arb_side(),
        quantity in 1u64..10_000,
        entry in 10.0..500.0_f64,
        slices in prop::collection::vec((0.01..0.99_f64, -5.0..5.0_f64), 0..5),
        final_move in -5.0..5.0_f64,
    ) {
        let mut book = PositionBook::new();
        book.open(side, entry, quantity, ts(0)).unwrap();

        let mut minute = 1;
        for (fraction, price_move) in slices {
            let remaining = book.position().unwrap().remaining_quantity;
            let slice = (remaining as f64 * fraction).floor() as u64;
            if slice == 0 || slice >= remaining {
                continue;
            }
            let done = book
                .reduce(entry + price_move, Some(slice), ts(minute), ExitReason::FirstProfitTarget)
                .unwrap();
            prop_assert!(done.is_none());
            minute += 1;
        }

        let trade = book
            .reduce(entry + final_move, None, ts(minute), ExitReason::SessionEnd)
            .unwrap()
            .unwrap();

        let partial_qty: u64 = trade.partial_exits.iter().map(|p| p.quantity).sum();
        prop_assert_eq!(partial_qty + trade.final_quantity, quantity);

        let slice_pnl: f64 = trade.partial_exits.iter().map(|p| p.pnl).sum::<f64>()
            + side.pnl(entry, trade.exit_price, trade.final_quantity);
        prop_assert!(relative_eq!(slice_pnl, trade.total_pnl, epsilon = 1e-6));
        prop_assert!(book.is_flat());
    }

    #[test]
    fn closing_more_than_remains_is_rejected(quantity in 1u64..1000, excess in 1u64..100) {
        let mut book = PositionBook::new();
        book.open(Side::Long, 100.0, quantity, ts(0)).unwrap();
        let result = book.reduce(101.0, Some(quantity + excess), ts(1), ExitReason::Manual);
        prop_assert!(result.is_err());
        prop_assert_eq!(book.position().unwrap().remaining_quantity, quantity);
    }

    #[test]
    fn trailing_stop_only_tightens(
        side in arb_side(),
        levels in prop::collection::vec(90.0..110.0_f64, 1..20),
    ) {
        let mut book = PositionBook::new();
        book.open(side, 100.0, 10, ts(0)).unwrap();
        let position = book.position_mut().unwrap();

        let mut previous: Option<f64> = None;
        for level in levels {
            position.ratchet_trailing_stop(level);
            let current = position.trailing_stop.unwrap();
            if let Some(prev) = previous {
                match side {
                    Side::Long => prop_assert!(current >= prev),
                    Side::Short => prop_assert!(current <= prev),
                }
            }
            previous = Some(current);
        }
    }
}
