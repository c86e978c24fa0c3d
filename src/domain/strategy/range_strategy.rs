//! Opening Range Breakout and Opening Range Fade.
//!
//! Both trade a volume-confirmed close beyond the opening range. The breakout
//! follows the break; the fade bets that it fails and price returns toward
//! the range. Only the [`Polarity`] and the risk defaults differ.

use crate::domain::error::EngineError;
use crate::domain::indicator::IndicatorType;
use crate::domain::ohlcv::PriceBar;
use crate::domain::risk::ExitPolicy;
use crate::domain::session::{BarContext, SessionClock};
use crate::domain::signal::Signal;
use crate::domain::strategy::opening_range::{Polarity, RangeCore, RangeSettings};
use crate::domain::strategy::{Strategy, StrategyKind, StrategyState, ValidationReport};

#[derive(Debug, Clone, PartialEq)]
pub struct OpeningRangeConfig {
    pub name: String,
    pub polarity: Polarity,
    pub settings: RangeSettings,
}

impl OpeningRangeConfig {
    pub fn breakout() -> Self {
        Self {
            name: "Opening Range Breakout".into(),
            polarity: Polarity::Follow,
            settings: RangeSettings::breakout_defaults(),
        }
    }

    pub fn fade() -> Self {
        Self {
            name: "Opening Range Fade".into(),
            polarity: Polarity::Fade,
            settings: RangeSettings::fade_defaults(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpeningRangeStrategy {
    config: OpeningRangeConfig,
    core: RangeCore,
    state: StrategyState,
}

impl OpeningRangeStrategy {
    pub fn new(config: OpeningRangeConfig) -> Self {
        let core = RangeCore::new(config.settings.clone());
        Self {
            config,
            core,
            state: StrategyState::new(),
        }
    }

    pub fn breakout() -> Self {
        Self::new(OpeningRangeConfig::breakout())
    }

    pub fn fade() -> Self {
        Self::new(OpeningRangeConfig::fade())
    }

    pub fn config(&self) -> &OpeningRangeConfig {
        &self.config
    }

    pub fn core(&self) -> &RangeCore {
        &self.core
    }
}

impl Strategy for OpeningRangeStrategy {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> StrategyKind {
        match self.config.polarity {
            Polarity::Follow => StrategyKind::OpeningRangeBreakout,
            Polarity::Fade => StrategyKind::OpeningRangeFade,
        }
    }

    fn required_history(&self) -> usize {
        self.config.settings.required_history()
    }

    fn required_indicators(&self) -> Vec<IndicatorType> {
        self.config.settings.required_indicators()
    }

    fn validate_parameters(&self) -> ValidationReport {
        self.config.settings.validate()
    }

    fn clone_with_parameters(&self) -> Box<dyn Strategy> {
        Box::new(Self::new(self.config.clone()))
    }

    fn state(&self) -> &StrategyState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StrategyState {
        &mut self.state
    }

    fn ingest(
        &mut self,
        bar: &PriceBar,
        _index: usize,
        session: &SessionClock,
    ) -> Result<(), EngineError> {
        self.core.ingest(bar, session);
        Ok(())
    }

    fn evaluate_entry(&mut self, ctx: &BarContext<'_>) -> Result<Signal, EngineError> {
        self.core.evaluate(ctx, self.config.polarity)
    }

    fn exit_policy(&self) -> ExitPolicy {
        self.config.settings.exit_policy()
    }

    fn reset_session(&mut self) {
        self.core.end_session();
    }
}
