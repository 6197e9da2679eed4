// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job records owned by the TaskDispatcher.

use crate::ids::{DeviceId, JobId, WorkerId};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Job lifecycle status. `Pending` is reserved for future queueing and is
/// never produced by `dispatch` today — a dispatched job starts in `Dispatched`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Dispatched,
    Running,
    Completed,
    Failed,
    Cancelled,
}

crate::simple_display! {
    JobStatus {
        Pending => "pending",
        Dispatched => "dispatched",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

/// Structured error attached to a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub code: String,
    pub message: String,
    pub recoverable: bool,
}

impl JobError {
    /// The error recorded when a Job's Worker disconnects mid-flight.
    /// See SPEC_FULL.md §4.2, "Worker-eviction policy".
    pub fn worker_disconnected() -> Self {
        Self {
            code: "WORKER_DISCONNECTED".to_string(),
            message: "owning worker disconnected before the job completed".to_string(),
            recoverable: false,
        }
    }
}

/// Retry policy forwarded to the Worker on dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, delay_ms: 5000 }
    }
}

/// Options accepted by `TaskDispatcher::dispatch`.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    pub target_worker_type: Option<crate::worker::WorkerType>,
    pub target_device_count: Option<u32>,
    pub priority: Option<i32>,
    pub timeout_ms: Option<u64>,
    pub retry: Option<RetryPolicy>,
}

/// A dispatched Job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub job_type: String,
    pub worker_id: WorkerId,
    pub device_ids: Vec<DeviceId>,
    #[serde(skip, default = "Instant::now")]
    pub dispatched_at: Instant,
    pub status: JobStatus,
    pub progress: u8,
    pub current_step: Option<String>,
    pub params: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<JobError>,
    #[serde(skip)]
    pub completed_at: Option<Instant>,
    pub duration_ms: Option<u64>,
}

impl Job {
    pub fn new(
        job_id: JobId,
        job_type: String,
        worker_id: WorkerId,
        device_ids: Vec<DeviceId>,
        params: serde_json::Value,
        now: Instant,
    ) -> Self {
        Self {
            job_id,
            job_type,
            worker_id,
            device_ids,
            dispatched_at: now,
            status: JobStatus::Dispatched,
            progress: 0,
            current_step: None,
            params,
            result: None,
            error: None,
            completed_at: None,
            duration_ms: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Job {
    /// Build a minimal Job for tests, bypassing the dispatcher.
    pub fn test_fixture(job_id: impl Into<String>, worker_id: impl Into<String>) -> Self {
        Self::new(
            JobId::new(job_id.into()),
            "wf".to_string(),
            WorkerId::new(worker_id.into()),
            vec![DeviceId::new("d1")],
            serde_json::json!({}),
            Instant::now(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Dispatched.is_terminal());
    }

    #[test]
    fn new_job_starts_dispatched_with_zero_progress() {
        let job = Job::test_fixture("job-1", "w1");
        assert_eq!(job.status, JobStatus::Dispatched);
        assert_eq!(job.progress, 0);
        assert!(!job.is_terminal());
    }
}
