// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Internal notification events. "Emits X" throughout SPEC_FULL.md §4 means a
//! component pushes one of these onto its listener list (see `listener`
//! module) — not a process-wide bus (SPEC_FULL.md §9).

use crate::ids::{DeviceId, JobId, SessionId, ViewerId, WorkerId};
use crate::job::JobError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "worker:registered")]
    WorkerRegistered { worker_id: WorkerId },
    #[serde(rename = "worker:reconnected")]
    WorkerReconnected { worker_id: WorkerId },
    #[serde(rename = "worker:unregistered")]
    WorkerUnregistered { worker_id: WorkerId, reason: String },
    #[serde(rename = "worker:heartbeat")]
    WorkerHeartbeat { worker_id: WorkerId },
    #[serde(rename = "worker:timeout")]
    WorkerTimeout { worker_id: WorkerId, last_heartbeat_epoch_ms: u64 },

    #[serde(rename = "job:dispatched")]
    JobDispatched { job_id: JobId, worker_id: WorkerId, device_ids: Vec<DeviceId> },
    #[serde(rename = "job:progress")]
    JobProgress { job_id: JobId, progress: u8 },
    #[serde(rename = "job:complete")]
    JobComplete { job_id: JobId },
    #[serde(rename = "job:failed")]
    JobFailed { job_id: JobId, error: JobError },
    #[serde(rename = "job:cancelled")]
    JobCancelled { job_id: JobId, reason: Option<String> },

    #[serde(rename = "stream:started")]
    StreamStarted { device_id: DeviceId, session_id: SessionId },
    #[serde(rename = "stream:stopped")]
    StreamStopped { device_id: DeviceId, session_id: SessionId },
    #[serde(rename = "stream:viewer_joined")]
    StreamViewerJoined { device_id: DeviceId, viewer_id: ViewerId },
    #[serde(rename = "stream:viewer_left")]
    StreamViewerLeft { device_id: DeviceId, viewer_id: ViewerId },

    #[serde(rename = "connection:closed")]
    ConnectionClosed { worker_id: Option<WorkerId> },
}

/// One-line summary for structured logging, mirroring the teacher's
/// `log_summary` convention for quick operator-facing log lines.
pub fn log_summary(event: &Event) -> String {
    match event {
        Event::WorkerRegistered { worker_id } => format!("worker {worker_id} registered"),
        Event::WorkerReconnected { worker_id } => format!("worker {worker_id} reconnected"),
        Event::WorkerUnregistered { worker_id, reason } => {
            format!("worker {worker_id} unregistered ({reason})")
        }
        Event::WorkerHeartbeat { worker_id } => format!("worker {worker_id} heartbeat"),
        Event::WorkerTimeout { worker_id, .. } => format!("worker {worker_id} timed out"),
        Event::JobDispatched { job_id, worker_id, .. } => {
            format!("job {job_id} dispatched to {worker_id}")
        }
        Event::JobProgress { job_id, progress } => format!("job {job_id} progress={progress}"),
        Event::JobComplete { job_id } => format!("job {job_id} complete"),
        Event::JobFailed { job_id, error } => format!("job {job_id} failed: {}", error.code),
        Event::JobCancelled { job_id, .. } => format!("job {job_id} cancelled"),
        Event::StreamStarted { device_id, .. } => format!("stream started on {device_id}"),
        Event::StreamStopped { device_id, .. } => format!("stream stopped on {device_id}"),
        Event::StreamViewerJoined { device_id, viewer_id } => {
            format!("viewer {viewer_id} joined {device_id}")
        }
        Event::StreamViewerLeft { device_id, viewer_id } => {
            format!("viewer {viewer_id} left {device_id}")
        }
        Event::ConnectionClosed { worker_id } => match worker_id {
            Some(id) => format!("connection for {id} closed"),
            None => "anonymous connection closed".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_tag_matches_wire_naming() {
        let event = Event::WorkerRegistered { worker_id: WorkerId::new("w1") };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "worker:registered");
        assert_eq!(json["worker_id"], "w1");
    }

    #[test]
    fn log_summary_is_non_empty_for_every_variant() {
        let events = vec![
            Event::WorkerRegistered { worker_id: WorkerId::new("w1") },
            Event::JobComplete { job_id: JobId::new("j1") },
            Event::ConnectionClosed { worker_id: None },
        ];
        for event in events {
            assert!(!log_summary(&event).is_empty());
        }
    }
}
