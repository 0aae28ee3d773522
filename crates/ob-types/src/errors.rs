use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::config::Cost;

/// Main error type for an optimization run
#[derive(Error, Debug)]
pub enum OptError {
    #[error("Invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Failed to start bridge on {endpoint}: {source}")]
    BridgeStart {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Working directory {}: {message}", path.display())]
    WorkingDir { path: PathBuf, message: String },

    #[error("Optimizer subprocess failed: {0}")]
    Subprocess(#[from] SubprocessError),

    /// The subprocess failed after a bridge call had failed. The bridge error
    /// is the cause, the subprocess outcome is kept alongside.
    #[error("Optimizer subprocess failed ({exit}), last bridge error: {source}")]
    SubprocessFailed {
        #[source]
        source: BridgeError,
        exit: SubprocessError,
    },

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
}

/// Parameter description errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("name '{name}' does not match pattern '{pattern}'")]
    InvalidName { name: String, pattern: &'static str },

    #[error("parameter '{name}' has no modifier")]
    MissingModifier { name: String },

    #[error("parameter '{name}' has empty bound [{left}, {right}]")]
    InvalidBound { name: String, left: i64, right: i64 },

    #[error("parameter '{name}' does not exist")]
    NotFound { name: String },
}

/// Structural problems in the run configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("field root_dir is empty")]
    EmptyRootDir,

    #[error("endpoint '{endpoint}' is not a socket address")]
    InvalidEndpoint { endpoint: String },

    #[error("endpoint '{endpoint}' is not a loopback address")]
    NonLoopbackEndpoint { endpoint: String },

    #[error("field parameters is empty")]
    EmptyParameters,

    #[error("field cost_function is empty")]
    MissingCostFunction,

    #[error("validate parameter: {0}")]
    Parameter(#[from] ParameterError),

    #[error("field max_evaluations is zero")]
    ZeroMaxEvaluations,

    #[error("field max_iterations is zero")]
    ZeroMaxIterations,

    #[error("invalid parameter combination cost {ceiling} must be below f64::MAX")]
    CeilingTooHigh { ceiling: Cost },
}

/// Errors returned by a cost function.
///
/// `InvalidParameterCombination` is not a failure of the run: the estimator
/// answers it with the configured ceiling cost and keeps going.
#[derive(Error, Debug)]
pub enum CostError {
    #[error("invalid parameter combination")]
    InvalidParameterCombination,

    /// The evaluation observed its cancellation token and gave up.
    #[error("cost evaluation cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors confined to a single bridge call
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("method {actual} not allowed, expected {expected}")]
    MethodNotAllowed { expected: String, actual: String },

    #[error("malformed request: {message}")]
    MalformedRequest { message: String },

    #[error("response encoding failed: {message}")]
    Encoding { message: String },

    #[error("unknown parameter: {name}")]
    UnknownParameter { name: String },

    #[error("value {value} of parameter '{name}' is outside [{left}, {right}]")]
    OutOfBound {
        name: String,
        value: i64,
        left: i64,
        right: i64,
    },

    #[error("cost function call: {0}")]
    CostFunction(#[source] CostError),

    #[error("cost function returned non-finite value {cost}")]
    NonFiniteCost { cost: Cost },

    #[error("observed cost {cost} is not below invalid parameter combination cost {ceiling}")]
    CostCeilingViolated { cost: Cost, ceiling: Cost },

    #[error("report has been already registered")]
    DuplicateReport,

    #[error("empty report")]
    EmptyReport,

    #[error("internal bridge error: {message}")]
    Internal { message: String },
}

/// Failures of the external optimizer process
#[derive(Error, Debug)]
pub enum SubprocessError {
    #[error("encode settings: {0}")]
    SettingsEncode(#[from] serde_json::Error),

    #[error("write settings to {}: {source}", path.display())]
    SettingsWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Exit { program: String, status: ExitStatus },

    #[error("forward subprocess output: {0}")]
    Output(#[source] std::io::Error),
}

/// Result type alias for optimization runs
pub type OptResult<T> = Result<T, OptError>;
