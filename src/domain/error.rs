//! Domain error types.

/// Top-level error type for sessionbars.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid parameters for {strategy}: {}", errors.join("; "))]
    InvalidParameters {
        strategy: String,
        errors: Vec<String>,
    },

    #[error("{indicator} has no value at bar {index} (first value at bar {first_index})")]
    IndicatorUnavailable {
        indicator: String,
        index: usize,
        first_index: usize,
    },

    #[error("{indicator} append out of alignment: expected bar {expected}, got bar {actual}")]
    IndicatorAlignment {
        indicator: String,
        expected: usize,
        actual: usize,
    },

    #[error("bar {index} delivered out of order; next expected bar is {expected}")]
    BarOutOfOrder { index: usize, expected: usize },

    #[error("position lifecycle violation: {reason}")]
    Lifecycle { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        let code: u8 = match err {
            EngineError::Io(_) | EngineError::Data { .. } | EngineError::BarOutOfOrder { .. } => 1,
            EngineError::ConfigParse { .. }
            | EngineError::ConfigMissing { .. }
            | EngineError::ConfigInvalid { .. }
            | EngineError::InvalidParameters { .. } => 2,
            EngineError::IndicatorUnavailable { .. } | EngineError::IndicatorAlignment { .. } => 3,
            EngineError::Lifecycle { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}
