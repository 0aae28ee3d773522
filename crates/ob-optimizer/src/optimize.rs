//! Top-level orchestration: validate, start the bridge, run the optimizer
//! process and reconcile its exit with what came over the bridge.

use ob_bridge::{BridgeServer, CostEstimator};
use ob_types::{Config, OptError, OptResult, Report};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::run::{RunState, RunStatus};
use crate::settings::SubprocessSettings;
use crate::subprocess::OptimizerProcess;

/// A single optimization run and its lifecycle status.
#[derive(Debug)]
pub struct Optimization {
    config: Config,
    status: RunStatus,
}

impl Optimization {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            status: RunStatus::new(),
        }
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Drive the run to completion. The bridge is shut down on every path
    /// once it has been started.
    pub async fn run(&mut self) -> OptResult<Report> {
        let result = self.execute().await;
        match &result {
            Ok(report) => {
                info!(run_id = %self.status.id, cost = report.cost, "optimization finished");
                self.status.mark_done();
            }
            Err(e) => {
                error!(run_id = %self.status.id, "optimization failed: {}", e);
                self.status.mark_failed(e.to_string());
            }
        }
        result
    }

    async fn execute(&mut self) -> OptResult<Report> {
        self.status.advance(RunState::ValidatingConfig);
        self.config.validate()?;

        self.status.advance(RunState::StartingBridge);
        let estimator = Arc::new(CostEstimator::new(&self.config.optimizer)?);
        let mut bridge = BridgeServer::start(&self.config.endpoint, estimator)
            .await
            .map_err(|source| OptError::BridgeStart {
                endpoint: self.config.endpoint.clone(),
                source,
            })?;

        let result = self.run_with_bridge(&bridge).await;
        bridge.shutdown().await;
        result
    }

    async fn run_with_bridge(&mut self, bridge: &BridgeServer) -> OptResult<Report> {
        self.status.advance(RunState::EnsuringWorkingDirectory);
        ensure_working_dir(&self.config.root_dir).await?;

        self.status.advance(RunState::RunningSubprocess);
        let settings = SubprocessSettings::new(&self.config, bridge.local_addr());
        let process = OptimizerProcess::new(&self.config.executable, &self.config.root_dir);
        if let Err(err) = process.run(&settings).await {
            // the bridge's view of what went wrong beats a bare exit code
            if let Some(cause) = bridge.take_last_error() {
                warn!("{} after bridge error", err);
                return Err(OptError::SubprocessFailed {
                    source: cause,
                    exit: err,
                });
            }
            return Err(err.into());
        }

        self.status.advance(RunState::ReconcilingResult);
        let attempts = bridge.estimator().attempts();
        match bridge.estimator().report() {
            Some(report) => {
                info!(attempts, "report received");
                Ok(report)
            }
            None => Err(OptError::ProtocolViolation(format!(
                "{} exited cleanly after {} estimations without registering a report",
                process.program(),
                attempts
            ))),
        }
    }
}

/// Run one optimization described by `config`.
pub async fn optimize(config: Config) -> OptResult<Report> {
    Optimization::new(config).run().await
}

async fn ensure_working_dir(path: &Path) -> OptResult<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(OptError::WorkingDir {
            path: path.to_path_buf(),
            message: "exists and is not a directory".to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(path)
                .await
                .map_err(|e| OptError::WorkingDir {
                    path: path.to_path_buf(),
                    message: format!("make directory: {e}"),
                })
        }
        Err(e) => Err(OptError::WorkingDir {
            path: path.to_path_buf(),
            message: format!("stat directory: {e}"),
        }),
    }
}
