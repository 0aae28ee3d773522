//! Settings file handed to the optimizer process.

use anyhow::Context;
use ob_types::{Bound, Config, Cost, InitStrategy, PlotConfig, SubprocessError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Name of the settings file inside the working directory.
pub const SETTINGS_FILE_NAME: &str = "config.json";

/// Parameter as the optimizer sees it: a name and a box to search in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub bound: Bound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSettings {
    pub parameters: Vec<ParameterSpec>,
    pub max_evaluations: u32,
    pub max_iterations: u32,
    pub init_strategy: InitStrategy,
    pub invalid_parameter_combination_cost: Cost,
}

/// The subset of a [`Config`] the optimizer process needs, plus the address
/// the bridge actually bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubprocessSettings {
    pub root_dir: PathBuf,
    pub endpoint: String,
    /// The wrapper script looks this section up as `rbfopt`.
    #[serde(rename = "rbfopt")]
    pub optimizer: OptimizerSettings,
    pub plot: PlotConfig,
}

impl SubprocessSettings {
    pub fn new(config: &Config, endpoint: SocketAddr) -> Self {
        let optimizer = &config.optimizer;
        Self {
            root_dir: config.root_dir.clone(),
            endpoint: endpoint.to_string(),
            optimizer: OptimizerSettings {
                parameters: optimizer
                    .parameters
                    .iter()
                    .map(|p| ParameterSpec {
                        name: p.name.clone(),
                        bound: p.bound,
                    })
                    .collect(),
                max_evaluations: optimizer.max_evaluations,
                max_iterations: optimizer.max_iterations,
                init_strategy: optimizer.init_strategy,
                invalid_parameter_combination_cost: optimizer.invalid_parameter_combination_cost,
            },
            plot: config.plot,
        }
    }

    pub fn path(root_dir: &Path) -> PathBuf {
        root_dir.join(SETTINGS_FILE_NAME)
    }

    /// Write the settings into `root_dir`, replacing any previous file.
    pub fn write(&self, root_dir: &Path) -> Result<PathBuf, SubprocessError> {
        let path = Self::path(root_dir);
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, data).map_err(|source| SubprocessError::SettingsWrite {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    pub fn load(root_dir: &Path) -> anyhow::Result<Self> {
        let path = Self::path(root_dir);
        let data = std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_slice(&data).with_context(|| format!("parse {}", path.display()))
    }
}
