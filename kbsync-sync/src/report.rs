//! Run outcome reporting.

use std::path::PathBuf;

use serde::Serialize;

use crate::manifest::ResolutionWarning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialFailure,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
    /// Run-level step (cache save, remote listing).
    Run,
}

/// One file (or run step) that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub operation: Operation,
    pub error: String,
}

/// Summary of one synchronization run. Serialized for the HTTP endpoint and
/// `kbsync sync --json`; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub dry_run: bool,
    pub forced: bool,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failures: Vec<FileFailure>,
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

impl RunResult {
    pub fn new(dry_run: bool, forced: bool) -> Self {
        Self {
            status: RunStatus::Success,
            dry_run,
            forced,
            created: 0,
            updated: 0,
            deleted: 0,
            unchanged: 0,
            failures: Vec::new(),
            warnings: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn record_failure(&mut self, path: impl Into<PathBuf>, operation: Operation, error: impl ToString) {
        self.failures.push(FileFailure {
            path: path.into(),
            operation,
            error: error.to_string(),
        });
    }

    pub fn add_resolution_warnings(&mut self, warnings: &[ResolutionWarning]) {
        self.warnings.extend(warnings.iter().map(ToString::to_string));
    }

    /// Mark the run aborted with a run-level failure.
    pub fn abort(&mut self, path: impl Into<PathBuf>, error: impl ToString) {
        self.record_failure(path, Operation::Run, error);
        self.status = RunStatus::Aborted;
    }

    /// Settle the status from the failures list. Aborted is sticky.
    pub fn finish(&mut self, elapsed: std::time::Duration) {
        self.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if self.status != RunStatus::Aborted {
            self.status = if self.failures.is_empty() {
                RunStatus::Success
            } else {
                RunStatus::PartialFailure
            };
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}
