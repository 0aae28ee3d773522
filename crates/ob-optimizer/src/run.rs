//! Lifecycle tracking for a single optimization run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Unique optimization run identifier.
pub type RunId = Uuid;

/// Where an [`crate::Optimization`] is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    ValidatingConfig,
    StartingBridge,
    EnsuringWorkingDirectory,
    RunningSubprocess,
    ReconcilingResult,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Aggregate status of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub id: RunId,
    pub state: RunState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl RunStatus {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RunState::Pending,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn advance(&mut self, state: RunState) {
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        info!(run_id = %self.id, from = ?self.state, to = ?state, "run state");
        self.state = state;
    }

    pub fn mark_done(&mut self) {
        self.advance(RunState::Done);
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.advance(RunState::Failed);
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::new()
    }
}
