// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-component scenarios (spec §8) driving WorkerRegistry, TaskDispatcher,
//! and StreamProxy together through an in-memory socket handle. No real TCP
//! socket is involved — `crates/server/src/connection_tests.rs` covers the
//! transport layer; these tests cover the domain logic the transport carries.

use manager_core::{
    Capability, DeviceId, DispatchOptions, Frame, FakeClock, HostInfo, JobId, JobStatus,
    SendError, SessionId, StreamConfig, ViewerHandle, ViewerId, WorkerHandle, WorkerId, WorkerType,
};
use manager_dispatcher::{DispatchConfig, TaskDispatcher};
use manager_registry::{RegisterInfo, RegistryConfig, WorkerRegistry};
use manager_stream::{StreamProxy, StreamProxyConfig};
use manager_wire::{ManagerCommand, ScreenMessage};
use parking_lot::Mutex;
use std::sync::Arc;

/// Records every payload sent to it, decoding it back to the caller's
/// message type of choice so assertions can inspect wire-level content.
#[derive(Default)]
struct RecordingHandle {
    sent: Mutex<Vec<Vec<u8>>>,
}

impl RecordingHandle {
    fn commands(&self) -> Vec<ManagerCommand> {
        self.sent.lock().iter().map(|b| manager_wire::decode(b).expect("decode command")).collect()
    }

    fn screen_messages(&self) -> Vec<ScreenMessage> {
        self.sent.lock().iter().map(|b| manager_wire::decode(b).expect("decode screen message")).collect()
    }
}

impl WorkerHandle for RecordingHandle {
    fn send(&self, payload: Vec<u8>) -> Result<(), SendError> {
        self.sent.lock().push(payload);
        Ok(())
    }
}

impl ViewerHandle for RecordingHandle {
    fn send(&self, payload: Vec<u8>) -> Result<(), SendError> {
        self.sent.lock().push(payload);
        Ok(())
    }
}

fn host() -> HostInfo {
    HostInfo { hostname: "h".into(), platform: "linux".into(), arch: "x86_64".into() }
}

fn register_info(worker_id: &str, devices: Vec<&str>, max: u32) -> RegisterInfo {
    RegisterInfo {
        worker_id: WorkerId::new(worker_id),
        worker_type: WorkerType::Generic,
        version: "1.0.0".into(),
        capabilities: vec![Capability { name: "exec".into(), enabled: true, version: "1".into() }],
        devices: devices.into_iter().map(DeviceId::new).collect(),
        max_concurrent_jobs: max,
        host: host(),
    }
}

fn frame(n: u64) -> Frame {
    Frame { frame_number: n, timestamp: 1000 + n as i64, width: 720, height: 1280, format: "jpeg".into(), data: vec![n as u8; 4], size: 4 }
}

/// Register a worker and dispatch a job to it; exercises
/// Registry -> Dispatcher wiring through `handle_for`.
#[test]
fn register_dispatch_progress_and_completion_flow_end_to_end() {
    let clock = FakeClock::new();
    let registry = WorkerRegistry::new(clock.clone(), RegistryConfig::default());
    let dispatcher = TaskDispatcher::new(clock.clone(), DispatchConfig::default());

    let worker_handle = Arc::new(RecordingHandle::default());
    registry.register(register_info("w1", vec!["d1"], 2), worker_handle.clone());

    let job_id = JobId::new("job-1");
    let job = dispatcher
        .dispatch(&registry, job_id.clone(), "install".to_string(), serde_json::json!({"pkg": "app"}), DispatchOptions::default())
        .expect("dispatch should succeed with one available worker/device");
    assert_eq!(job.status, JobStatus::Dispatched);
    assert_eq!(job.worker_id, "w1");

    let sent = worker_handle.commands();
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        ManagerCommand::ExecuteJob { job_id: sent_job_id, device_id, .. } => {
            assert_eq!(sent_job_id, "job-1");
            assert_eq!(device_id, "d1");
        }
        other => panic!("expected execute_job, got {other:?}"),
    }

    // Re-dispatching the same job id is idempotent: no second command sent.
    let again = dispatcher
        .dispatch(&registry, job_id.clone(), "install".to_string(), serde_json::json!({}), DispatchOptions::default())
        .expect("idempotent dispatch returns the existing job");
    assert_eq!(again.job_id, job.job_id);
    assert_eq!(worker_handle.commands().len(), 1);

    dispatcher.handle_progress(&job_id, &WorkerId::new("w1"), 50, Some("installing".to_string()));
    let midway = dispatcher.get(&job_id).expect("job present");
    assert_eq!(midway.status, JobStatus::Running);
    assert_eq!(midway.progress, 50);

    dispatcher.handle_completion(&job_id, &WorkerId::new("w1"), true, Some(serde_json::json!({"ok": true})), None, 1500);
    let done = dispatcher.get(&job_id).expect("job present");
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress, 100);
    assert!(done.is_terminal());
}

/// A job is all-or-nothing: if the available worker cannot supply the
/// requested device count, dispatch fails and no command is sent anywhere.
#[test]
fn dispatch_fails_cleanly_when_no_worker_has_enough_idle_devices() {
    let clock = FakeClock::new();
    let registry = WorkerRegistry::new(clock.clone(), RegistryConfig::default());
    let dispatcher = TaskDispatcher::new(clock.clone(), DispatchConfig::default());

    let worker_handle = Arc::new(RecordingHandle::default());
    registry.register(register_info("w1", vec!["d1"], 2), worker_handle.clone());

    let options = DispatchOptions { target_device_count: Some(2), ..Default::default() };
    let result = dispatcher.dispatch(&registry, JobId::new("job-1"), "install".to_string(), serde_json::json!({}), options);
    assert!(result.is_none());
    assert!(worker_handle.commands().is_empty());
    assert!(dispatcher.get(&JobId::new("job-1")).is_none());
}

/// Progress reported by a worker that does not own the job is dropped
/// rather than applied (spec §4.2, ownership check).
#[test]
fn progress_from_non_owning_worker_is_dropped() {
    let clock = FakeClock::new();
    let registry = WorkerRegistry::new(clock.clone(), RegistryConfig::default());
    let dispatcher = TaskDispatcher::new(clock.clone(), DispatchConfig::default());

    registry.register(register_info("w1", vec!["d1"], 1), Arc::new(RecordingHandle::default()));
    registry.register(register_info("w2", vec!["d2"], 1), Arc::new(RecordingHandle::default()));

    let job_id = JobId::new("job-1");
    let job = dispatcher
        .dispatch(&registry, job_id.clone(), "install".to_string(), serde_json::json!({}), DispatchOptions::default())
        .expect("dispatch succeeds with two available single-device workers");

    // Registry iteration order is unspecified, so whichever worker won the
    // dispatch, report progress from the *other* one.
    let impostor = if job.worker_id == "w1" { WorkerId::new("w2") } else { WorkerId::new("w1") };
    dispatcher.handle_progress(&job_id, &impostor, 75, None);
    let job = dispatcher.get(&job_id).expect("job present");
    assert_eq!(job.status, JobStatus::Dispatched, "progress from a non-owning worker must not move the status");
    assert_eq!(job.progress, 0);
}

/// Worker eviction fails every non-terminal job it owned
/// (Open Question #1, resolved in DESIGN.md).
#[test]
fn worker_disconnect_fails_its_active_jobs() {
    let clock = FakeClock::new();
    let registry = WorkerRegistry::new(clock.clone(), RegistryConfig::default());
    let dispatcher = TaskDispatcher::new(clock.clone(), DispatchConfig::default());

    registry.register(register_info("w1", vec!["d1", "d2"], 2), Arc::new(RecordingHandle::default()));

    let job_a = JobId::new("job-a");
    let job_b = JobId::new("job-b");
    dispatcher.dispatch(&registry, job_a.clone(), "install".to_string(), serde_json::json!({}), DispatchOptions::default()).unwrap();
    dispatcher.dispatch(&registry, job_b.clone(), "install".to_string(), serde_json::json!({}), DispatchOptions::default()).unwrap();

    dispatcher.handle_completion(&job_a, &WorkerId::new("w1"), true, None, None, 100);

    registry.unregister(&WorkerId::new("w1"), "connection closed");
    let affected = dispatcher.handle_worker_gone(&WorkerId::new("w1"));

    // job_a already completed (terminal) and is untouched; job_b was
    // non-terminal and must fail with WORKER_DISCONNECTED.
    assert_eq!(affected, vec![job_b.clone()]);
    let a = dispatcher.get(&job_a).unwrap();
    assert_eq!(a.status, JobStatus::Completed);
    let b = dispatcher.get(&job_b).unwrap();
    assert_eq!(b.status, JobStatus::Failed);
    assert_eq!(b.error.as_ref().unwrap().code, "WORKER_DISCONNECTED");
}

/// Stream start -> frame ingestion -> ring-buffer trim -> viewer fan-out,
/// including a late-joining viewer receiving the latest frame on admission.
#[test]
fn stream_frames_are_ring_buffered_and_fanned_out_to_viewers() {
    let clock = FakeClock::new();
    let stream = StreamProxy::new(clock.clone(), StreamProxyConfig { max_buffer_size: 2, ..StreamProxyConfig::default() });

    let device_id = DeviceId::new("d1");
    let worker_id = WorkerId::new("w1");
    let session_id = SessionId::new("s1");
    assert!(stream.handle_start(worker_id.clone(), device_id.clone(), session_id.clone(), StreamConfig::default(), None));

    // A second start for the same device is a no-op while the session is live.
    assert!(!stream.handle_start(worker_id.clone(), device_id.clone(), SessionId::new("s2"), StreamConfig::default(), None));

    let viewer_a = Arc::new(RecordingHandle::default());
    assert!(stream.add_viewer(&device_id, ViewerId::new("v1"), viewer_a.clone()));

    // Rate limit is 30/s by default in StreamProxyConfig; advance the clock
    // between frames so each one clears the per-frame rate window.
    for n in 1..=3u64 {
        clock.advance(std::time::Duration::from_millis(100));
        assert!(stream.handle_frame(&worker_id, &device_id, frame(n)));
    }

    // Ring buffer caps at max_buffer_size=2: only the newest two survive.
    assert_eq!(stream.buffer_len(&device_id), 2);
    assert_eq!(stream.buffered_frame_numbers(&device_id), vec![2, 3]);

    // viewer_a got screen:info on join plus all 3 frames as they arrived.
    let messages = viewer_a.screen_messages();
    assert!(matches!(messages[0], ScreenMessage::Info { .. }));
    let frame_numbers: Vec<u64> = messages
        .iter()
        .filter_map(|m| match m {
            ScreenMessage::Frame { frame_number, .. } => Some(*frame_number),
            _ => None,
        })
        .collect();
    assert_eq!(frame_numbers, vec![1, 2, 3]);

    // A viewer joining now only gets screen:info plus the latest buffered
    // frame, not the whole backlog.
    let viewer_b = Arc::new(RecordingHandle::default());
    assert!(stream.add_viewer(&device_id, ViewerId::new("v2"), viewer_b.clone()));
    let late_messages = viewer_b.screen_messages();
    assert_eq!(late_messages.len(), 2);
    match &late_messages[1] {
        ScreenMessage::Frame { frame_number, .. } => assert_eq!(*frame_number, 3),
        other => panic!("expected screen:frame, got {other:?}"),
    }

    stream.handle_stop(&device_id, &session_id, "worker requested".to_string());
    assert!(stream.get(&device_id).is_none());
    let stopped = viewer_a.screen_messages().into_iter().last().unwrap();
    assert!(matches!(stopped, ScreenMessage::Stopped { .. }));
}

/// The viewer cap rejects admission past the configured limit; removing a
/// viewer frees a slot for a new one.
#[test]
fn viewer_cap_is_enforced_and_freed_on_removal() {
    let clock = FakeClock::new();
    let stream = StreamProxy::new(clock.clone(), StreamProxyConfig { max_viewers_per_stream: 1, ..StreamProxyConfig::default() });

    let device_id = DeviceId::new("d1");
    stream.handle_start(WorkerId::new("w1"), device_id.clone(), SessionId::new("s1"), StreamConfig::default(), None);

    assert!(stream.add_viewer(&device_id, ViewerId::new("v1"), Arc::new(RecordingHandle::default())));
    assert!(!stream.add_viewer(&device_id, ViewerId::new("v2"), Arc::new(RecordingHandle::default())), "second viewer should be rejected at cap 1");
    assert_eq!(stream.viewer_count(&device_id), 1);

    // Re-adding the same id while already present is a no-op success, not a
    // cap violation.
    assert!(stream.add_viewer(&device_id, ViewerId::new("v1"), Arc::new(RecordingHandle::default())));
    assert_eq!(stream.viewer_count(&device_id), 1);

    assert!(stream.remove_viewer(&device_id, &ViewerId::new("v1")));
    assert_eq!(stream.viewer_count(&device_id), 0);
    assert!(stream.add_viewer(&device_id, ViewerId::new("v2"), Arc::new(RecordingHandle::default())));
    assert_eq!(stream.viewer_count(&device_id), 1);
}

/// A non-recoverable stream error tears the session down after notifying
/// viewers; a recoverable one leaves the session intact.
#[test]
fn non_recoverable_stream_error_destroys_session_recoverable_does_not() {
    let clock = FakeClock::new();
    let stream = StreamProxy::new(clock.clone(), StreamProxyConfig::default());
    let device_id = DeviceId::new("d1");
    let session_id = SessionId::new("s1");
    stream.handle_start(WorkerId::new("w1"), device_id.clone(), session_id.clone(), StreamConfig::default(), None);

    let viewer = Arc::new(RecordingHandle::default());
    stream.add_viewer(&device_id, ViewerId::new("v1"), viewer.clone());

    assert!(stream.handle_error(&device_id, Some(session_id.clone()), "TRANSIENT".to_string(), "hiccup".to_string(), true));
    assert!(stream.get(&device_id).is_some(), "recoverable error must not destroy the session");

    assert!(stream.handle_error(&device_id, Some(session_id), "FATAL".to_string(), "device lost".to_string(), false));
    assert!(stream.get(&device_id).is_none(), "non-recoverable error must destroy the session");

    let errors: Vec<_> = viewer
        .screen_messages()
        .into_iter()
        .filter(|m| matches!(m, ScreenMessage::Error { .. }))
        .collect();
    assert_eq!(errors.len(), 2);
}
