//! Strategy and run configuration loaded through a [`ConfigPort`].
//!
//! `[strategy]` selects the variant with `kind` and carries its parameters;
//! missing keys fall back to the variant defaults. `[session]` holds the
//! daily open/close times and `[backtest]` the runner settings.

use chrono::{NaiveDate, NaiveTime};
use tracing::warn;

use crate::domain::error::EngineError;
use crate::domain::indicator::MovingAverageKind;
use crate::domain::risk::StopRule;
use crate::domain::strategy::opening_range::RangeSettings;
use crate::domain::strategy::{
    MacdExitOrder, MacdMomentum, MacdMomentumConfig, MaCrossover, MaCrossoverConfig,
    OpeningRangeConfig, OpeningRangeStrategy, Strategy, StrategyKind,
};
use crate::ports::config_port::ConfigPort;

const STRATEGY: &str = "strategy";
const SESSION: &str = "session";
const BACKTEST: &str = "backtest";

/// Runner settings from `[session]` and `[backtest]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub session_open: NaiveTime,
    pub session_close: NaiveTime,
    pub quantity: u64,
    pub data: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Build and validate the strategy described by `[strategy]`.
pub fn load_strategy(config: &dyn ConfigPort) -> Result<Box<dyn Strategy>, EngineError> {
    let kind_str = config
        .get_string(STRATEGY, "kind")
        .ok_or_else(|| EngineError::ConfigMissing {
            section: STRATEGY.to_string(),
            key: "kind".to_string(),
        })?;
    let kind: StrategyKind = kind_str.parse().map_err(|reason| EngineError::ConfigInvalid {
        section: STRATEGY.to_string(),
        key: "kind".to_string(),
        reason,
    })?;

    let strategy: Box<dyn Strategy> = match kind {
        StrategyKind::OpeningRangeBreakout | StrategyKind::OpeningRangeFade => {
            let defaults = if kind == StrategyKind::OpeningRangeFade {
                OpeningRangeConfig::fade()
            } else {
                OpeningRangeConfig::breakout()
            };
            Box::new(OpeningRangeStrategy::new(OpeningRangeConfig {
                name: name_or(config, defaults.name),
                polarity: defaults.polarity,
                settings: range_settings(config, defaults.settings)?,
            }))
        }
        StrategyKind::MovingAverageCrossover => {
            Box::new(MaCrossover::new(ma_crossover_config(config)?))
        }
        StrategyKind::MacdMomentum => Box::new(MacdMomentum::new(macd_config(config)?)),
    };

    let report = strategy.validate_parameters();
    if !report.is_valid() {
        warn!(strategy = strategy.name(), errors = ?report.errors, "rejected strategy parameters");
    }
    report.into_result(strategy.name())?;
    Ok(strategy)
}

pub fn load_run_config(config: &dyn ConfigPort) -> Result<RunConfig, EngineError> {
    let session_open = time_or(config, "open", NaiveTime::from_hms_opt(9, 30, 0))?;
    let session_close = time_or(config, "close", NaiveTime::from_hms_opt(16, 0, 0))?;
    if session_open >= session_close {
        return Err(invalid(SESSION, "open", "session open must be before close"));
    }

    let quantity = match config.get_string(BACKTEST, "quantity") {
        None => 100,
        Some(value) => parse_int(BACKTEST, "quantity", value.trim())?,
    };
    if quantity <= 0 {
        return Err(invalid(BACKTEST, "quantity", "quantity must be positive"));
    }

    let start_date = date(config, "start_date")?;
    let end_date = date(config, "end_date")?;
    if let (Some(start), Some(end)) = (start_date, end_date) {
        if start > end {
            return Err(invalid(BACKTEST, "start_date", "start_date must not be after end_date"));
        }
    }

    Ok(RunConfig {
        session_open,
        session_close,
        quantity: quantity as u64,
        data: config
            .get_string(BACKTEST, "data")
            .filter(|path| !path.trim().is_empty()),
        start_date,
        end_date,
    })
}

pub fn validate_run_config(config: &dyn ConfigPort) -> Result<(), EngineError> {
    load_run_config(config).map(|_| ())
}

fn range_settings(
    config: &dyn ConfigPort,
    defaults: RangeSettings,
) -> Result<RangeSettings, EngineError> {
    Ok(RangeSettings {
        opening_range_minutes: int_or(
            config,
            "opening_range_minutes",
            defaults.opening_range_minutes,
        )?,
        breakout_threshold: float_or(config, "breakout_threshold", defaults.breakout_threshold)?,
        volume_multiplier: float_or(config, "volume_multiplier", defaults.volume_multiplier)?,
        volume_lookback: count_or(config, "volume_lookback", defaults.volume_lookback)?,
        atr_period: count_or(config, "atr_period", defaults.atr_period)?,
        stop_atr_multiple: float_or(config, "stop_atr_multiple", defaults.stop_atr_multiple)?,
        take_profit_ratio: float_or(config, "take_profit_ratio", defaults.take_profit_ratio)?,
        min_range_size: float_or(config, "min_range_size", defaults.min_range_size)?,
        max_entries_per_session: count_or(
            config,
            "max_entries_per_session",
            defaults.max_entries_per_session,
        )?,
        exit_before_close_minutes: optional_int(
            config,
            "exit_before_close_minutes",
            defaults.exit_before_close_minutes,
        )?,
        max_holding_minutes: optional_int(
            config,
            "max_holding_minutes",
            defaults.max_holding_minutes,
        )?,
        trailing_atr_multiple: optional_float(
            config,
            "trailing_atr_multiple",
            defaults.trailing_atr_multiple,
        )?,
    })
}

fn ma_crossover_config(config: &dyn ConfigPort) -> Result<MaCrossoverConfig, EngineError> {
    let d = MaCrossoverConfig::default();
    let ma_kind = match config.get_string(STRATEGY, "ma_type").as_deref().map(str::trim) {
        None => d.ma_kind,
        Some(s) if s.eq_ignore_ascii_case("ema") => MovingAverageKind::Ema,
        Some(s) if s.eq_ignore_ascii_case("sma") => MovingAverageKind::Sma,
        Some(other) => {
            return Err(invalid(
                STRATEGY,
                "ma_type",
                &format!("expected sma or ema, got '{other}'"),
            ));
        }
    };
    let stop_rule = stop_rule_or(config, "stop", Some(d.stop_rule))?.unwrap_or(d.stop_rule);

    Ok(MaCrossoverConfig {
        name: name_or(config, d.name),
        fast_period: count_or(config, "fast_period", d.fast_period)?,
        slow_period: count_or(config, "slow_period", d.slow_period)?,
        ma_kind,
        confirmation_bars: count_or(config, "confirmation_bars", d.confirmation_bars)?,
        min_separation: float_or(config, "min_separation", d.min_separation)?,
        use_volume_confirmation: bool_or(
            config,
            "use_volume_confirmation",
            d.use_volume_confirmation,
        )?,
        volume_multiplier: float_or(config, "volume_multiplier", d.volume_multiplier)?,
        volume_lookback: count_or(config, "volume_lookback", d.volume_lookback)?,
        atr_period: count_or(config, "atr_period", d.atr_period)?,
        stop_rule,
        take_profit_ratio: optional_float(config, "take_profit_ratio", d.take_profit_ratio)?,
        trailing: stop_rule_or(config, "trailing", d.trailing)?,
        max_holding_minutes: optional_int(config, "max_holding_minutes", d.max_holding_minutes)?,
        exit_before_close_minutes: optional_int(
            config,
            "exit_before_close_minutes",
            d.exit_before_close_minutes,
        )?,
        exit_on_opposite_cross: bool_or(
            config,
            "exit_on_opposite_cross",
            d.exit_on_opposite_cross,
        )?,
    })
}

fn macd_config(config: &dyn ConfigPort) -> Result<MacdMomentumConfig, EngineError> {
    let d = MacdMomentumConfig::default();
    let exit_order = match config.get_string(STRATEGY, "exit_order").as_deref().map(str::trim) {
        None => d.exit_order,
        Some("trailing_first") => MacdExitOrder::TrailingFirst,
        Some("time_first") => MacdExitOrder::TimeFirst,
        Some(other) => {
            return Err(invalid(
                STRATEGY,
                "exit_order",
                &format!("expected trailing_first or time_first, got '{other}'"),
            ));
        }
    };

    Ok(MacdMomentumConfig {
        name: name_or(config, d.name),
        fast_period: count_or(config, "fast_period", d.fast_period)?,
        slow_period: count_or(config, "slow_period", d.slow_period)?,
        signal_period: count_or(config, "signal_period", d.signal_period)?,
        min_histogram_change: float_or(config, "min_histogram_change", d.min_histogram_change)?,
        use_slope_confirmation: bool_or(
            config,
            "use_slope_confirmation",
            d.use_slope_confirmation,
        )?,
        slope_lookback: count_or(config, "slope_lookback", d.slope_lookback)?,
        use_trend_filter: bool_or(config, "use_trend_filter", d.use_trend_filter)?,
        trend_ema_period: count_or(config, "trend_ema_period", d.trend_ema_period)?,
        atr_period: count_or(config, "atr_period", d.atr_period)?,
        stop_atr_multiple: float_or(config, "stop_atr_multiple", d.stop_atr_multiple)?,
        take_profit_atr_multiple: optional_float(
            config,
            "take_profit_atr_multiple",
            d.take_profit_atr_multiple,
        )?,
        use_partial_profits: bool_or(config, "use_partial_profits", d.use_partial_profits)?,
        first_profit_target: float_or(config, "first_profit_target", d.first_profit_target)?,
        first_exit_fraction: float_or(config, "first_exit_fraction", d.first_exit_fraction)?,
        second_profit_target: float_or(config, "second_profit_target", d.second_profit_target)?,
        second_exit_fraction: float_or(config, "second_exit_fraction", d.second_exit_fraction)?,
        trailing_atr_multiple: float_or(config, "trailing_atr_multiple", d.trailing_atr_multiple)?,
        max_holding_minutes: optional_int(config, "max_holding_minutes", d.max_holding_minutes)?,
        exit_on_opposite_signal: bool_or(
            config,
            "exit_on_opposite_signal",
            d.exit_on_opposite_signal,
        )?,
        exit_on_zero_line_reversal: bool_or(
            config,
            "exit_on_zero_line_reversal",
            d.exit_on_zero_line_reversal,
        )?,
        exit_order,
        exit_before_close_minutes: optional_int(
            config,
            "exit_before_close_minutes",
            d.exit_before_close_minutes,
        )?,
    })
}

fn invalid(section: &str, key: &str, reason: &str) -> EngineError {
    EngineError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn name_or(config: &dyn ConfigPort, default: String) -> String {
    config
        .get_string(STRATEGY, "name")
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(default)
}

/// Raw `[strategy]` value; `None` when absent.
fn raw(config: &dyn ConfigPort, key: &str) -> Option<String> {
    config
        .get_string(STRATEGY, key)
        .map(|value| value.trim().to_string())
}

fn is_disabled(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "" | "none" | "off")
}

fn float_or(config: &dyn ConfigPort, key: &str, default: f64) -> Result<f64, EngineError> {
    match raw(config, key) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| invalid(STRATEGY, key, &format!("expected a number, got '{value}'"))),
    }
}

fn int_or(config: &dyn ConfigPort, key: &str, default: i64) -> Result<i64, EngineError> {
    match raw(config, key) {
        None => Ok(default),
        Some(value) => parse_int(STRATEGY, key, &value),
    }
}

fn parse_int(section: &str, key: &str, value: &str) -> Result<i64, EngineError> {
    value
        .parse()
        .map_err(|_| invalid(section, key, &format!("expected an integer, got '{value}'")))
}

fn bool_or(config: &dyn ConfigPort, key: &str, default: bool) -> Result<bool, EngineError> {
    let Some(value) = raw(config, key) else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(
            STRATEGY,
            key,
            &format!("expected true or false, got '{value}'"),
        )),
    }
}

fn count_or(config: &dyn ConfigPort, key: &str, default: usize) -> Result<usize, EngineError> {
    let value = int_or(config, key, default as i64)?;
    usize::try_from(value).map_err(|_| invalid(STRATEGY, key, "must not be negative"))
}

/// Optional integer; `none`, `off` or an empty value disables it.
fn optional_int(
    config: &dyn ConfigPort,
    key: &str,
    default: Option<i64>,
) -> Result<Option<i64>, EngineError> {
    match raw(config, key) {
        None => Ok(default),
        Some(value) if is_disabled(&value) => Ok(None),
        Some(_) => int_or(config, key, 0).map(Some),
    }
}

fn optional_float(
    config: &dyn ConfigPort,
    key: &str,
    default: Option<f64>,
) -> Result<Option<f64>, EngineError> {
    match raw(config, key) {
        None => Ok(default),
        Some(value) if is_disabled(&value) => Ok(None),
        Some(_) => float_or(config, key, 0.0).map(Some),
    }
}

/// `<prefix>_type` (`percent` or `atr`) plus `<prefix>_value`.
fn stop_rule_or(
    config: &dyn ConfigPort,
    prefix: &str,
    default: Option<StopRule>,
) -> Result<Option<StopRule>, EngineError> {
    let type_key = format!("{prefix}_type");
    let value_key = format!("{prefix}_value");
    let Some(kind) = raw(config, &type_key) else {
        return Ok(default);
    };
    if is_disabled(&kind) {
        return Ok(None);
    }
    let value = raw(config, &value_key)
        .ok_or_else(|| EngineError::ConfigMissing {
            section: STRATEGY.to_string(),
            key: value_key.clone(),
        })
        .and_then(|_| float_or(config, &value_key, 0.0))?;
    match kind.to_ascii_lowercase().as_str() {
        "percent" => Ok(Some(StopRule::Percent(value))),
        "atr" => Ok(Some(StopRule::AtrMultiple(value))),
        other => Err(invalid(
            STRATEGY,
            &type_key,
            &format!("expected percent or atr, got '{other}'"),
        )),
    }
}

fn time_or(
    config: &dyn ConfigPort,
    key: &str,
    default: Option<NaiveTime>,
) -> Result<NaiveTime, EngineError> {
    match config.get_string(SESSION, key) {
        None => default.ok_or_else(|| EngineError::ConfigMissing {
            section: SESSION.to_string(),
            key: key.to_string(),
        }),
        Some(value) => NaiveTime::parse_from_str(value.trim(), "%H:%M")
            .map_err(|_| invalid(SESSION, key, &format!("expected HH:MM, got '{value}'"))),
    }
}

fn date(config: &dyn ConfigPort, key: &str) -> Result<Option<NaiveDate>, EngineError> {
    match config.get_string(BACKTEST, key) {
        None => Ok(None),
        Some(value) => NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| invalid(BACKTEST, key, &format!("invalid {key} format, expected YYYY-MM-DD"))),
    }
}
