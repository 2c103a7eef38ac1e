use thiserror::Error;

/// Main error type for the CostFrugal searcher
#[derive(Error, Debug)]
pub enum CfError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CfError {
    /// Protocol errors are expected from schedulers that double-report or
    /// report late; callers usually log and carry on.
    pub fn is_protocol(&self) -> bool {
        matches!(self, CfError::Protocol(_))
    }
}

/// Malformed search spaces and missing searcher properties.
///
/// Always surfaced to the caller immediately, never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid bounds for '{parameter}': low ({low}) must be less than or equal to high ({high})")]
    InvalidBounds {
        parameter: String,
        low: f64,
        high: f64,
    },

    #[error("invalid log bounds for '{parameter}': low ({low}) must be positive")]
    InvalidLogBounds { parameter: String, low: f64 },

    #[error("categorical parameter '{parameter}' has no options")]
    EmptyChoices { parameter: String },

    #[error("parameter '{parameter}' is defined more than once")]
    DuplicateParameter { parameter: String },

    #[error("parameter '{parameter}' is not part of the search space")]
    UnknownParameter { parameter: String },

    #[error("value {value} is outside the domain of '{parameter}'")]
    ValueOutOfDomain { parameter: String, value: String },

    #[error(
        "search space contains unresolved nested definitions at '{parameter}'; \
         flatten the space before sampling"
    )]
    UnresolvedSearchSpace { parameter: String },

    #[error(
        "trying to sample a configuration from {searcher}, but the metric ({metric}) or mode ({mode}) \
         has not been set"
    )]
    UndefinedMetricMode {
        searcher: String,
        metric: String,
        mode: String,
    },

    #[error("invalid mode '{0}': expected \"min\" or \"max\"")]
    InvalidMode(String),

    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}

/// Misuse of the suggest/complete protocol.
///
/// Reported to the caller, never applied to searcher state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("trial '{trial_id}' is not pending")]
    UnknownTrial { trial_id: String },

    #[error("trial '{trial_id}' already has an outstanding suggestion")]
    DuplicateTrial { trial_id: String },

    #[error("result for trial '{trial_id}' has no numeric value for metric '{metric}'")]
    MissingMetric { trial_id: String, metric: String },
}

/// Result type alias for CostFrugal operations
pub type CfResult<T> = Result<T, CfError>;

/// Macro for creating configuration errors from a free-form message
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::CfError::Config($crate::ConfigError::InvalidSetting(format!($($arg)*)))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::CfError::Internal(format!($($arg)*))
    };
}
