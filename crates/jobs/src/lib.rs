use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

mod controller;
mod progress;

pub use controller::MuxJobController;
pub use progress::{ProgressSample, ProgressTracker, HEARTBEAT_CAP};
pub use session::MuxRequest;

pub type JobId = Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("a mux job is already running")]
    Busy,
    #[error("output path {0:?} has no file name")]
    MissingFileName(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    Cancelled,
    /// Raw diagnostic output of the external tool.
    ExternalTool(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Idle,
    Probing,
    Running,
    Cancelling,
    Succeeded,
    Failed(FailureReason),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed(_))
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobState::Probing | JobState::Running | JobState::Cancelling
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Succeeded(PathBuf),
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobEvent {
    Progress { job_id: JobId, percent: u8 },
    Terminal { job_id: JobId, outcome: JobOutcome },
}
