//! # ob-optimizer
//!
//! Orchestration of one optimization run against an external optimizer
//! process.
//!
//! [`optimize`] validates the configuration, starts the bridge, makes sure the
//! working directory exists, writes the settings file, runs the optimizer with
//! that directory as its argument and returns the report it registered. When
//! the optimizer fails, the bridge's last recorded error is preferred over the
//! bare exit status.

mod optimize;
mod run;
mod settings;
mod subprocess;

pub use optimize::{optimize, Optimization};
pub use run::{RunId, RunState, RunStatus};
pub use settings::{OptimizerSettings, ParameterSpec, SubprocessSettings, SETTINGS_FILE_NAME};
pub use subprocess::OptimizerProcess;
