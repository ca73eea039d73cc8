//! TransferRun (§3): the lifecycle record for one execution of a Transfer.
//! Created RUNNING, transitions exactly once to a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::progress::ProgressReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Success,
    Failure,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMeta {
    #[serde(default)]
    pub arguments: serde_json::Value,
    #[serde(default)]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub retry_max: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunOutput {
    #[serde(default)]
    pub progress: ProgressReport,
    #[serde(default)]
    pub cause: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRun {
    pub transfer_id: String,
    pub status: RunStatus,
    pub meta: RunMeta,
    pub output: RunOutput,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl TransferRun {
    pub fn open(transfer_id: impl Into<String>, meta: RunMeta, now: DateTime<Utc>) -> Self {
        TransferRun {
            transfer_id: transfer_id.into(),
            status: RunStatus::Running,
            meta,
            output: RunOutput::default(),
            created_at: now,
            modified_at: now,
        }
    }

    /// `RUNNING -> SUCCESS`. Panics if the run is already terminal — status
    /// transitions are write-once by contract (§5).
    pub fn succeed(&mut self, progress: ProgressReport, now: DateTime<Utc>) {
        assert_eq!(self.status, RunStatus::Running, "run is already terminal");
        self.status = RunStatus::Success;
        self.output.progress = progress;
        self.output.success = Some(true);
        self.modified_at = now;
    }

    /// `RUNNING -> FAILURE`, recording a human-readable cause and machine
    /// error code alongside the final progress snapshot (§7).
    pub fn fail(
        &mut self,
        cause: impl Into<String>,
        error: ErrorCode,
        progress: ProgressReport,
        now: DateTime<Utc>,
    ) {
        assert_eq!(self.status, RunStatus::Running, "run is already terminal");
        self.status = RunStatus::Failure;
        self.output.progress = progress;
        self.output.cause = Some(cause.into());
        self.output.error = Some(error.as_str().to_string());
        self.output.success = Some(false);
        self.modified_at = now;
    }

    pub fn is_terminal(&self) -> bool {
        self.status != RunStatus::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "already terminal")]
    fn double_transition_panics() {
        let mut run = TransferRun::open("t-1", RunMeta::default(), Utc::now());
        run.succeed(ProgressReport::default(), Utc::now());
        run.succeed(ProgressReport::default(), Utc::now());
    }

    #[test]
    fn fail_records_cause_and_code() {
        let mut run = TransferRun::open("t-1", RunMeta::default(), Utc::now());
        run.fail("boom", ErrorCode::RunGapDetected, ProgressReport::default(), Utc::now());
        assert_eq!(run.status, RunStatus::Failure);
        assert_eq!(run.output.error.as_deref(), Some("RunGapDetected"));
    }
}
