//! End-to-end behaviour of the indicator library and the four strategies.
//!
//! Tests cover:
//! - EMA and MACD index alignment
//! - Moving average crossover entry and confirmation reset
//! - Opening range too narrow to trade
//! - Breakout/fade mirrored entries
//! - MACD partial profit taking and full trade settlement
//! - Multi-session runs through the reference runner
//! - Strategies fed a bounded window of recent bars

mod common;

use approx::assert_relative_eq;
use common::*;
use sessionbars::domain::backtest::run_backtest;
use sessionbars::domain::error::EngineError;
use sessionbars::domain::indicator::{calculate_ema, calculate_macd};
use sessionbars::domain::position::{Fill, Side};
use sessionbars::domain::session::BarContext;
use sessionbars::domain::signal::{Action, ExitReason, Metadata, Signal};
use sessionbars::domain::strategy::opening_range::RangePhase;
use sessionbars::domain::strategy::{
    CrossDirection, MaCrossover, MaCrossoverConfig, MacdMomentum, MacdMomentumConfig,
    OpeningRangeStrategy, Strategy,
};

mod indicator_alignment {
    use super::*;

    #[test]
    fn ema_has_n_minus_p_plus_one_values_seeded_by_sma() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.7).sin() * 3.0).collect();
        let bars = bars_from_closes(&closes);

        let ema = calculate_ema(&bars, 10);
        assert_eq!(ema.len(), 60 - 10 + 1);
        assert_eq!(ema.first_index(), 9);
        assert!(ema.get(8).is_none());

        let seed: f64 = closes[..10].iter().sum::<f64>() / 10.0;
        assert_relative_eq!(ema.get(9).unwrap(), seed, epsilon = 1e-12);
    }

    #[test]
    fn macd_first_histogram_at_bar_33() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + (i as f64 / 6.0).sin() * 2.0).collect();
        let bars = bars_from_closes(&closes);

        let macd = calculate_macd(&bars, 12, 26, 9);
        assert_eq!(macd.line.first_index(), 25);
        assert_eq!(macd.histogram.first_index(), 33);
        assert_eq!(macd.signal.first_index(), 33);
        assert_eq!(macd.histogram.len(), 100 - 33);
        assert!(macd.histogram.get(32).is_none());
        assert!(matches!(
            macd.histogram.at(32),
            Err(EngineError::IndicatorUnavailable {
                index: 32,
                first_index: 33,
                ..
            })
        ));
    }
}

mod moving_average_crossover {
    use super::*;

    fn config(confirmation_bars: usize) -> MaCrossoverConfig {
        MaCrossoverConfig {
            fast_period: 5,
            slow_period: 10,
            confirmation_bars,
            use_volume_confirmation: false,
            ..MaCrossoverConfig::default()
        }
    }

    #[test]
    fn clean_cross_buys_at_bar_30() {
        let bars = bars_from_closes(&flat_then_rising(50));
        let mut ma = MaCrossover::new(config(1));
        let signals = drive(&mut ma, &bars, session());

        assert_eq!(entry_indices(&signals), vec![30]);
        let entry = &signals[30];
        assert_eq!(entry.action, Action::Buy);
        assert_relative_eq!(entry.confidence, 0.75);
        assert!(entry.metadata.contains("separation_pct"));
        assert!(entry.metadata.number("separation_pct").unwrap() > 0.0);
    }

    #[test]
    fn reversal_before_confirmation_restarts_at_one() {
        let mut closes = flat_then_rising(31);
        closes.push(90.0);
        let bars = bars_from_closes(&closes);

        let mut ma = MaCrossover::new(config(3));
        drive(&mut ma, &bars[..31], session());
        assert_eq!(ma.pending_confirmation(), Some((CrossDirection::Bullish, 1)));

        let ctx = BarContext::new(&bars, session()).unwrap();
        assert!(ma.on_bar(&ctx).unwrap().is_hold());
        assert_eq!(ma.pending_confirmation(), Some((CrossDirection::Bearish, 1)));
    }

    #[test]
    fn clone_shares_configuration_not_state() {
        let bars = bars_from_closes(&flat_then_rising(40));
        let mut ma = MaCrossover::new(config(1));
        drive(&mut ma, &bars, session());

        let fresh = ma.clone_with_parameters();
        assert_eq!(fresh.name(), ma.name());
        assert_eq!(fresh.state().bars_ingested(), 0);
        assert!(fresh.position().is_none());
    }
}

mod opening_range {
    use super::*;

    fn with_break(mut bars: Vec<PriceBar>, minute: i64, up: bool) -> Vec<PriceBar> {
        let at = minute_on(3, minute);
        let bar = if up {
            make_bar(at, 100.5, 101.6, 100.4, 101.5, 3000.0)
        } else {
            make_bar(at, 99.5, 99.6, 98.4, 98.5, 3000.0)
        };
        bars.push(bar);
        bars
    }

    #[test]
    fn too_narrow_range_holds_all_session() {
        let mut bars = opening_session(3, 100.10, 100.00, 5);
        bars.push(make_bar(minute_on(3, 35), 100.1, 102.1, 100.0, 102.0, 5000.0));
        bars.push(make_bar(minute_on(3, 36), 102.0, 102.5, 101.8, 102.3, 4000.0));

        let mut orb = OpeningRangeStrategy::breakout();
        let signals = drive(&mut orb, &bars, session());

        assert!(signals.iter().all(Signal::is_hold));
        assert_eq!(orb.core().range().phase(), RangePhase::TooNarrow);
        assert!(!orb.core().range().is_established());
    }

    #[test]
    fn upside_break_buys_breakout_and_sells_fade_on_same_bar() {
        let bars = with_break(opening_session(3, 101.0, 99.0, 5), 35, true);

        let mut orb = OpeningRangeStrategy::breakout();
        let mut fade = OpeningRangeStrategy::fade();
        let orb_signals = drive(&mut orb, &bars, session());
        let fade_signals = drive(&mut fade, &bars, session());

        assert_eq!(entry_indices(&orb_signals), vec![35]);
        assert_eq!(entry_indices(&fade_signals), vec![35]);
        assert_eq!(orb_signals[35].action, Action::Buy);
        assert_eq!(fade_signals[35].action, Action::Sell);

        // fade: stop above entry, target below
        let fade_entry = &fade_signals[35];
        assert!(fade_entry.stop_loss.unwrap() > fade_entry.price);
        assert!(fade_entry.take_profit.unwrap() < fade_entry.price);
    }

    #[test]
    fn downside_break_sells_breakout_and_buys_fade_on_same_bar() {
        let bars = with_break(opening_session(3, 101.0, 99.0, 5), 35, false);

        let mut orb = OpeningRangeStrategy::breakout();
        let mut fade = OpeningRangeStrategy::fade();
        let orb_signals = drive(&mut orb, &bars, session());
        let fade_signals = drive(&mut fade, &bars, session());

        assert_eq!(entry_indices(&orb_signals), entry_indices(&fade_signals));
        assert_eq!(orb_signals[35].action, Action::Sell);
        assert_eq!(fade_signals[35].action, Action::Buy);
    }

    #[test]
    fn instances_do_not_share_range_state() {
        let bars = with_break(opening_session(3, 101.0, 99.0, 5), 35, true);
        let mut orb = OpeningRangeStrategy::breakout();
        let fade = OpeningRangeStrategy::fade();
        drive(&mut orb, &bars, session());

        assert!(orb.core().range().is_established());
        assert_eq!(fade.core().range().phase(), RangePhase::Idle);
    }
}

mod macd_partial_exits {
    use super::*;

    fn holding_long(quantity: u64) -> MacdMomentum {
        let mut strategy = MacdMomentum::new(MacdMomentumConfig {
            use_partial_profits: true,
            first_profit_target: 1.5,
            ..MacdMomentumConfig::default()
        });
        let entry = Signal::buy(100.0, minute_on(3, 0), 0.7, "entry")
            .with_stops(Some(98.0), None)
            .with_metadata(Metadata::new().with_number("atr", 1.0));
        strategy.state_mut().book.record_signal(&entry);
        strategy
            .apply_fill(&Fill::from_signal(&entry, quantity).unwrap())
            .unwrap();
        strategy
    }

    #[test]
    fn first_target_closes_half_and_keeps_remainder_open() {
        let mut strategy = holding_long(100);
        let bars = vec![
            make_bar(minute_on(3, 0), 100.0, 100.2, 99.9, 100.1, 1000.0),
            make_bar(minute_on(3, 1), 100.8, 101.6, 100.7, 101.4, 1000.0),
        ];
        drive(&mut strategy, &bars[..1], session());
        let ctx = BarContext::new(&bars, session()).unwrap();
        let signal = strategy.on_bar(&ctx).unwrap();

        assert_eq!(
            signal.action,
            Action::Close {
                quantity: Some(50),
                reason: ExitReason::FirstProfitTarget
            }
        );
        assert!(strategy
            .apply_fill(&Fill::from_signal(&signal, 0).unwrap())
            .unwrap()
            .is_none());

        let position = strategy.position().unwrap();
        assert_eq!(position.remaining_quantity, 50);
        assert_eq!(position.partial_exits.len(), 1);
        assert_eq!(position.partial_exits[0].quantity, 50);
        assert_relative_eq!(position.partial_exits[0].price, 101.5);
        assert_relative_eq!(position.partial_exits[0].pnl, 75.0);
    }

    #[test]
    fn settled_trade_conserves_quantity_and_pnl() {
        let mut strategy = holding_long(100);
        let bars = vec![
            make_bar(minute_on(3, 0), 100.0, 100.2, 99.9, 100.1, 1000.0),
            make_bar(minute_on(3, 1), 100.8, 101.6, 100.7, 101.4, 1000.0),
            make_bar(minute_on(3, 2), 101.4, 101.5, 101.2, 101.3, 1000.0),
        ];
        drive(&mut strategy, &bars[..1], session());
        let ctx = BarContext::new(&bars[..2], session()).unwrap();
        let partial = strategy.on_bar(&ctx).unwrap();
        strategy
            .apply_fill(&Fill::from_signal(&partial, 0).unwrap())
            .unwrap();

        let ctx = BarContext::new(&bars, session()).unwrap();
        assert!(strategy.on_bar(&ctx).unwrap().is_hold());
        let closes = strategy.on_session_end(&ctx).unwrap();
        assert_eq!(closes.len(), 1);
        let trade = strategy
            .apply_fill(&Fill::from_signal(&closes[0], 0).unwrap())
            .unwrap()
            .unwrap();

        let partial_qty: u64 = trade.partial_exits.iter().map(|p| p.quantity).sum();
        assert_eq!(partial_qty + trade.final_quantity, trade.quantity);
        let partial_pnl: f64 = trade.partial_exits.iter().map(|p| p.pnl).sum();
        let final_pnl = Side::Long.pnl(trade.entry_price, trade.exit_price, trade.final_quantity);
        assert_relative_eq!(partial_pnl + final_pnl, trade.total_pnl, epsilon = 1e-9);
        assert_eq!(trade.exit_reason, ExitReason::SessionEnd);
        assert!(strategy.position().is_none());
    }
}

mod reference_runner {
    use super::*;

    fn oscillating_session(d: u32, len: usize) -> Vec<PriceBar> {
        (0..len)
            .map(|i| {
                let close = 100.0 + (i as f64 / 8.0).sin() * 3.0;
                make_bar(minute_on(d, i as i64), close, close + 0.1, close - 0.1, close, 1000.0)
            })
            .collect()
    }

    #[test]
    fn macd_run_conserves_every_trade() {
        let mut bars = oscillating_session(3, 300);
        bars.extend(oscillating_session(4, 300));

        let mut strategy = MacdMomentum::default();
        let result = run_backtest(&mut strategy, &bars, hours(), 100).unwrap();

        assert!(!result.trades.is_empty());
        for trade in &result.trades {
            let partial_qty: u64 = trade.partial_exits.iter().map(|p| p.quantity).sum();
            assert_eq!(partial_qty + trade.final_quantity, 100);
            let slices: f64 = trade.partial_exits.iter().map(|p| p.pnl).sum::<f64>()
                + trade
                    .side
                    .pnl(trade.entry_price, trade.exit_price, trade.final_quantity);
            assert_relative_eq!(slices, trade.total_pnl, epsilon = 1e-9);
        }
        assert!(strategy.position().is_none());
        assert_eq!(result.summary.total_trades, result.trades.len());
    }

    #[test]
    fn breakout_and_fade_mirror_over_two_sessions() {
        let mut bars = opening_session(3, 101.0, 99.0, 5);
        bars.push(make_bar(minute_on(3, 35), 100.5, 101.6, 100.4, 101.5, 3000.0));
        let mut day_two = opening_session(4, 101.0, 99.0, 5);
        day_two.push(make_bar(minute_on(4, 35), 99.5, 99.6, 98.4, 98.5, 3000.0));
        bars.extend(day_two);

        let mut orb = OpeningRangeStrategy::breakout();
        let mut fade = OpeningRangeStrategy::fade();
        let orb_result = run_backtest(&mut orb, &bars, hours(), 10).unwrap();
        let fade_result = run_backtest(&mut fade, &bars, hours(), 10).unwrap();

        let orb_sides: Vec<Side> = orb_result.trades.iter().map(|t| t.side).collect();
        let fade_sides: Vec<Side> = fade_result.trades.iter().map(|t| t.side).collect();
        assert_eq!(orb_sides, vec![Side::Long, Side::Short]);
        assert_eq!(fade_sides, vec![Side::Short, Side::Long]);
        for (a, b) in orb_result.trades.iter().zip(&fade_result.trades) {
            assert_eq!(a.entry_time, b.entry_time);
        }
    }
}

mod bounded_window {
    use super::*;

    fn actions(signals: &[Signal]) -> Vec<Action> {
        signals.iter().map(|s| s.action).collect()
    }

    #[test]
    fn ma_crossover_on_thirty_bar_window_matches_full_history() {
        let bars = bars_from_closes(&flat_then_rising(50));
        let config = MaCrossoverConfig {
            fast_period: 5,
            slow_period: 10,
            ..MaCrossoverConfig::default()
        };

        let mut full = MaCrossover::new(config.clone());
        let expected = drive(&mut full, &bars, session());
        let mut windowed = MaCrossover::new(config);
        let signals = drive_windowed(&mut windowed, &bars, session(), 30);

        assert_eq!(entry_indices(&signals), vec![30]);
        assert_eq!(actions(&signals), actions(&expected));
        assert_eq!(windowed.state().bars_ingested(), 50);
    }

    #[test]
    fn macd_on_sixty_bar_window_matches_full_history() {
        let bars: Vec<PriceBar> = (0..240)
            .map(|i| {
                let close = 100.0 + (i as f64 / 8.0).sin() * 3.0;
                make_bar(minute_on(3, i as i64), close, close + 0.1, close - 0.1, close, 1000.0)
            })
            .collect();

        let mut full = MacdMomentum::default();
        let expected = drive(&mut full, &bars, session());
        let mut windowed = MacdMomentum::default();
        let signals = drive_windowed(&mut windowed, &bars, session(), 60);

        assert!(!entry_indices(&expected).is_empty());
        assert_eq!(actions(&signals), actions(&expected));
        for (a, b) in signals.iter().zip(&expected) {
            assert_eq!(a.stop_loss, b.stop_loss);
        }
    }

    #[test]
    fn window_that_skips_bars_is_rejected() {
        let bars = bars_from_closes(&flat_then_rising(50));
        let mut ma = MaCrossover::default();
        drive_windowed(&mut ma, &bars[..20], session(), 30);

        let ctx = BarContext::windowed(&bars[25..40], 25, session()).unwrap();
        assert!(matches!(
            ma.on_bar(&ctx),
            Err(EngineError::BarOutOfOrder {
                index: 25,
                expected: 20
            })
        ));
    }
}
