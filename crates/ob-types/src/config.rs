//! Run configuration: what to optimize, how hard to try, and where the
//! bridge and the optimizer process live.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
pub use tokio_util::sync::CancellationToken;

use crate::errors::{ConfigError, CostError, ParameterError};
use crate::parameter::{find_parameter, ParameterDescription};

/// Value returned by a cost function. Lower is better.
pub type Cost = f64;

/// Optimizer executable launched when nothing else is configured.
pub const DEFAULT_EXECUTABLE: &str = "rbfopt-go-wrapper";

/// Overrides [`DEFAULT_EXECUTABLE`].
pub const EXECUTABLE_ENV: &str = "OB_OPTIMIZER_EXECUTABLE";

/// Loopback address with an ephemeral port.
pub const DEFAULT_ENDPOINT: &str = "127.0.0.1:0";

/// Overrides [`DEFAULT_ENDPOINT`].
pub const ENDPOINT_ENV: &str = "OB_BRIDGE_ENDPOINT";

pub const DEFAULT_MAX_EVALUATIONS: u32 = 100;
pub const DEFAULT_MAX_ITERATIONS: u32 = 100;
pub const DEFAULT_INVALID_COMBINATION_COST: Cost = 1.0e9;

/// The objective being minimized.
///
/// Implementations read whatever state the parameter setters wrote. A call
/// may be slow; the bridge runs it on a blocking thread and imposes no
/// deadline of its own. `cancel` fires when the requesting optimizer goes
/// away or the bridge shuts down; long evaluations should poll it and
/// return [`CostError::Cancelled`].
pub trait CostFunction: Send + Sync {
    fn estimate(&self, cancel: &CancellationToken) -> Result<Cost, CostError>;
}

impl<F> CostFunction for F
where
    F: Fn(&CancellationToken) -> Result<Cost, CostError> + Send + Sync,
{
    fn estimate(&self, cancel: &CancellationToken) -> Result<Cost, CostError> {
        self(cancel)
    }
}

/// How the optimizer picks its initial sample of points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitStrategy {
    #[default]
    LhdMaximin,
    LhdCorr,
    AllCorners,
    LowerCorners,
    RandCorners,
}

/// How points reported as invalid combinations are drawn on plots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderPolicy {
    /// Not rendered at all.
    #[default]
    Omit,
    /// Rendered with the closest valid value observed.
    AssignClosestValidValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlotConfig {
    pub scatter_plot_policy: RenderPolicy,
    pub heatmap_render_policy: RenderPolicy,
}

/// Optimizer knobs plus the function being optimized.
#[derive(Clone)]
pub struct OptimizerConfig {
    pub cost_function: Option<Arc<dyn CostFunction>>,
    pub parameters: Vec<ParameterDescription>,
    pub max_evaluations: u32,
    pub max_iterations: u32,
    pub init_strategy: InitStrategy,
    /// Cost reported for infeasible points. Every valid cost must stay below it.
    pub invalid_parameter_combination_cost: Cost,
}

impl OptimizerConfig {
    pub fn new() -> Self {
        Self {
            cost_function: None,
            parameters: Vec::new(),
            max_evaluations: DEFAULT_MAX_EVALUATIONS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            init_strategy: InitStrategy::default(),
            invalid_parameter_combination_cost: DEFAULT_INVALID_COMBINATION_COST,
        }
    }

    pub fn with_cost_function<F>(mut self, cost_function: F) -> Self
    where
        F: Fn(&CancellationToken) -> Result<Cost, CostError> + Send + Sync + 'static,
    {
        self.cost_function = Some(Arc::new(cost_function));
        self
    }

    pub fn with_parameter(mut self, parameter: ParameterDescription) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_max_evaluations(mut self, n: u32) -> Self {
        self.max_evaluations = n;
        self
    }

    pub fn with_max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_init_strategy(mut self, strategy: InitStrategy) -> Self {
        self.init_strategy = strategy;
        self
    }

    pub fn with_invalid_parameter_combination_cost(mut self, cost: Cost) -> Self {
        self.invalid_parameter_combination_cost = cost;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parameters.is_empty() {
            return Err(ConfigError::EmptyParameters);
        }
        if self.cost_function.is_none() {
            return Err(ConfigError::MissingCostFunction);
        }
        for param in &self.parameters {
            param.validate()?;
        }
        if self.max_evaluations == 0 {
            return Err(ConfigError::ZeroMaxEvaluations);
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::ZeroMaxIterations);
        }
        // also catches NaN and infinity
        if !(self.invalid_parameter_combination_cost < Cost::MAX) {
            return Err(ConfigError::CeilingTooHigh {
                ceiling: self.invalid_parameter_combination_cost,
            });
        }
        Ok(())
    }

    pub fn parameter_by_name(&self, name: &str) -> Result<&ParameterDescription, ParameterError> {
        find_parameter(&self.parameters, name)
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OptimizerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimizerConfig")
            .field("cost_function", &self.cost_function.as_ref().map(|_| "<fn>"))
            .field("parameters", &self.parameters)
            .field("max_evaluations", &self.max_evaluations)
            .field("max_iterations", &self.max_iterations)
            .field("init_strategy", &self.init_strategy)
            .field(
                "invalid_parameter_combination_cost",
                &self.invalid_parameter_combination_cost,
            )
            .finish()
    }
}

/// Top-level configuration of one optimization run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Working directory for the settings file and optimizer artifacts,
    /// created if missing.
    pub root_dir: PathBuf,
    /// Address the bridge listens on. Must be loopback.
    pub endpoint: String,
    /// External optimizer binary.
    pub executable: PathBuf,
    pub optimizer: OptimizerConfig,
    pub plot: PlotConfig,
}

impl Config {
    pub fn new(root_dir: impl Into<PathBuf>, optimizer: OptimizerConfig) -> Self {
        let endpoint =
            std::env::var(ENDPOINT_ENV).unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        let executable =
            std::env::var(EXECUTABLE_ENV).unwrap_or_else(|_| DEFAULT_EXECUTABLE.to_string());

        Self {
            root_dir: root_dir.into(),
            endpoint,
            executable: PathBuf::from(executable),
            optimizer,
            plot: PlotConfig::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    pub fn with_plot(mut self, plot: PlotConfig) -> Self {
        self.plot = plot;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRootDir);
        }
        self.endpoint_addr()?;
        self.optimizer.validate()
    }

    /// Parsed bridge address; only loopback addresses are accepted.
    pub fn endpoint_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr: SocketAddr =
            self.endpoint
                .parse()
                .map_err(|_| ConfigError::InvalidEndpoint {
                    endpoint: self.endpoint.clone(),
                })?;
        if !addr.ip().is_loopback() {
            return Err(ConfigError::NonLoopbackEndpoint {
                endpoint: self.endpoint.clone(),
            });
        }
        Ok(addr)
    }
}
