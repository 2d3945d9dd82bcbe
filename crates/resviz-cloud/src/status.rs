//! Execution status for an identity/region

use crate::lock::{RunLockRecord, RunLockRegistry, RunStatus};
use crate::report::{ReportStore, RunSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What is known about the latest run for an identity/region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionInfo {
    pub identity: String,
    pub region: String,

    /// `None` when no run has been recorded
    pub status: Option<RunStatus>,

    /// Live lock holder, if a run is in progress
    pub running: Option<RunLockRecord>,

    /// Summary of the latest finished run
    pub last_run: Option<RunSummary>,
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl ExecutionInfo {
    pub fn is_running(&self) -> bool {
        self.status == Some(RunStatus::Running)
    }
}

/// Combine the run lock and the latest report
///
/// A stale lock counts as not running.
pub async fn execution_info(
    locks: &RunLockRegistry,
    reports: &ReportStore,
    identity: &str,
    region: &str,
) -> ExecutionInfo {
    let running = if locks.is_held(identity, region).await {
        locks.read(identity, region).await.ok().flatten()
    } else {
        None
    };

    let report = match reports.load(identity, region).await {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!("Ignoring unreadable report: {}", e);
            None
        }
    };

    let status = if running.is_some() {
        Some(RunStatus::Running)
    } else {
        report.as_ref().map(|r| {
            if r.success {
                RunStatus::Completed
            } else {
                RunStatus::Failed
            }
        })
    };

    ExecutionInfo {
        identity: identity.to_string(),
        region: region.to_string(),
        status,
        running,
        last_completed_at: report.as_ref().map(|r| r.completed_at),
        last_run: report.as_ref().map(RunSummary::from),
    }
}
