// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! StreamProxy: session lifecycle, viewer fan-out, ring buffer, rate
//! limiting. Grounded on the teacher's WebSocket bridging idiom
//! (`manager-server`'s per-connection forwarding loop follows the same
//! `tokio::select!`-over-inbound / `mpsc`-fan-out shape as
//! `oj-adapters::agent::coop::ws::event_bridge`); the ring buffer itself has
//! no direct teacher analogue and is built as a `VecDeque` bounded by
//! `max_buffer_size`, behind the same "bounded collection behind a
//! `parking_lot::Mutex`" discipline used throughout this workspace.

use crate::types::{StreamError, StreamProxyConfig};
use manager_core::{
    Clock, DeviceId, Event, Frame, Listeners, MinicapInfo, SessionId, StreamConfig,
    StreamSessionInfo, Viewer, ViewerHandle, ViewerId, WorkerId,
};
use manager_wire::{ManagerCommand, ScreenMessage};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

struct ViewerEntry {
    viewer: Viewer,
    handle: Arc<dyn ViewerHandle>,
}

struct Session {
    info: StreamSessionInfo,
    frames: VecDeque<Frame>,
    viewers: HashMap<ViewerId, ViewerEntry>,
}

pub struct StreamProxy<C: Clock = manager_core::SystemClock> {
    streams: Mutex<HashMap<DeviceId, Session>>,
    listeners: Listeners,
    clock: C,
    config: StreamProxyConfig,
}

impl<C: Clock> StreamProxy<C> {
    pub fn new(clock: C, config: StreamProxyConfig) -> Self {
        Self { streams: Mutex::new(HashMap::new()), listeners: Listeners::new(), clock, config }
    }

    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    pub fn config(&self) -> StreamProxyConfig {
        self.config
    }

    /// Create a session for `device_id`. Idempotent-suppression: a second
    /// `stream:started` for an already-live device is ignored with a
    /// warning (SPEC_FULL.md §4.3).
    pub fn handle_start(
        &self,
        worker_id: WorkerId,
        device_id: DeviceId,
        session_id: SessionId,
        config: StreamConfig,
        minicap_info: Option<MinicapInfo>,
    ) -> bool {
        let now = self.clock.now();
        let mut streams = self.streams.lock();
        if streams.contains_key(&device_id) {
            let err = StreamError::AlreadyStarted(device_id);
            warn!(%err, "ignoring duplicate start");
            return false;
        }
        let info =
            StreamSessionInfo::new(device_id.clone(), worker_id, session_id.clone(), config, minicap_info, now);
        streams
            .insert(device_id.clone(), Session { info, frames: VecDeque::new(), viewers: HashMap::new() });
        drop(streams);

        info!(%device_id, %session_id, "stream started");
        self.listeners.notify(&Event::StreamStarted { device_id, session_id });
        true
    }

    /// Tear down a session. Dropped if the stored `session_id` does not
    /// match the event's (a stale stop for a session that has already
    /// restarted).
    pub fn handle_stop(&self, device_id: &DeviceId, session_id: &SessionId, reason: String) -> bool {
        let removed = {
            let mut streams = self.streams.lock();
            match streams.get(device_id) {
                Some(session) if &session.info.session_id == session_id => streams.remove(device_id),
                Some(_) => {
                    warn!(%device_id, "stop for stale session id, dropped");
                    None
                }
                None => None,
            }
        };
        let Some(session) = removed else { return false };

        for entry in session.viewers.values() {
            self.send_to_viewer(
                entry,
                &ScreenMessage::Stopped { device_id: device_id.to_string(), reason: reason.clone() },
            );
        }

        info!(%device_id, %session_id, %reason, "stream stopped");
        self.listeners
            .notify(&Event::StreamStopped { device_id: device_id.clone(), session_id: session_id.clone() });
        true
    }

    /// Handle a Worker-reported stream error. Viewers are always notified;
    /// the session is destroyed only when the error is non-recoverable.
    pub fn handle_error(
        &self,
        device_id: &DeviceId,
        session_id: Option<SessionId>,
        code: String,
        message: String,
        recoverable: bool,
    ) -> bool {
        let (viewers, stored_session_id, destroy) = {
            let streams = self.streams.lock();
            match streams.get(device_id) {
                Some(session) => {
                    if let Some(expected) = &session_id {
                        if expected != &session.info.session_id {
                            warn!(%device_id, "stream error for stale session id, dropped");
                            return false;
                        }
                    }
                    let viewers: Vec<Arc<dyn ViewerHandle>> =
                        session.viewers.values().map(|e| Arc::clone(&e.handle)).collect();
                    (viewers, session.info.session_id.clone(), !recoverable)
                }
                None => return false,
            }
        };

        for handle in &viewers {
            let payload = ScreenMessage::Error {
                device_id: device_id.to_string(),
                code: code.clone(),
                message: message.clone(),
            };
            if let Ok(bytes) = manager_wire::encode(&payload) {
                if let Err(e) = handle.send(bytes) {
                    warn!(%device_id, error = %e, "failed to forward stream error to viewer");
                }
            }
        }

        if destroy {
            self.streams.lock().remove(device_id);
            info!(%device_id, %stored_session_id, %code, "stream destroyed after non-recoverable error");
            self.listeners.notify(&Event::StreamStopped {
                device_id: device_id.clone(),
                session_id: stored_session_id,
            });
        }
        true
    }

    /// Ingest a frame from `worker_id`. Rate-limited at `max_frame_rate`
    /// (global per session); frames within the window are dropped silently.
    pub fn handle_frame(&self, worker_id: &WorkerId, device_id: &DeviceId, frame: Frame) -> bool {
        let min_interval = Duration::from_millis(1000 / self.config.max_frame_rate.max(1) as u64);
        let now = self.clock.now();

        let viewers: Vec<Arc<dyn ViewerHandle>> = {
            let mut streams = self.streams.lock();
            let Some(session) = streams.get_mut(device_id) else {
                let err = StreamError::NoSession(device_id.clone());
                warn!(%err, "dropping frame");
                return false;
            };
            if &session.info.worker_id != worker_id {
                warn!(%device_id, %worker_id, "frame from non-owning worker, dropped");
                return false;
            }
            if let Some(last) = session.info.last_frame_at {
                if now.saturating_duration_since(last) < min_interval {
                    return false;
                }
            }
            session.info.last_frame_at = Some(now);
            session.frames.push_back(frame.clone());
            while session.frames.len() > self.config.max_buffer_size {
                session.frames.pop_front();
            }
            for entry in session.viewers.values_mut() {
                entry.viewer.frames_sent += 1;
                entry.viewer.last_frame_sent = Some(now);
            }
            session.viewers.values().map(|e| Arc::clone(&e.handle)).collect()
        };

        let payload = ScreenMessage::Frame {
            device_id: device_id.to_string(),
            frame_number: frame.frame_number,
            timestamp: frame.timestamp,
            width: frame.width,
            height: frame.height,
            format: frame.format.clone(),
            data: frame.data_base64(),
            size: frame.size,
        };
        if let Ok(bytes) = manager_wire::encode(&payload) {
            for handle in &viewers {
                if let Err(e) = handle.send(bytes.clone()) {
                    warn!(%device_id, error = %e, "failed to forward frame to viewer");
                }
            }
        }
        true
    }

    /// Admit a viewer to a device's stream. Fails on missing session or a
    /// full viewer cap; re-adding an already-present viewer id is a no-op
    /// success.
    pub fn add_viewer(
        &self,
        device_id: &DeviceId,
        viewer_id: ViewerId,
        handle: Arc<dyn ViewerHandle>,
    ) -> bool {
        let now = self.clock.now();
        let (info, latest_frame) = {
            let mut streams = self.streams.lock();
            let Some(session) = streams.get_mut(device_id) else {
                let err = StreamError::NoSession(device_id.clone());
                warn!(%err, %viewer_id, "viewer admission rejected");
                return false;
            };
            if session.viewers.contains_key(&viewer_id) {
                return true;
            }
            if session.viewers.len() >= self.config.max_viewers_per_stream {
                let err = StreamError::ViewerCapReached(device_id.clone());
                warn!(%err, %viewer_id, "viewer admission rejected");
                return false;
            }
            let viewer = Viewer::new(viewer_id.clone(), device_id.clone(), now);
            session.viewers.insert(viewer_id.clone(), ViewerEntry { viewer, handle: Arc::clone(&handle) });
            (session.info.clone(), session.frames.back().cloned())
        };

        let info_msg = ScreenMessage::Info {
            device_id: device_id.to_string(),
            session_id: info.session_id.to_string(),
            config: info.config,
            minicap_info: info.minicap_info,
        };
        if let Ok(bytes) = manager_wire::encode(&info_msg) {
            let _ = handle.send(bytes);
        }
        if let Some(frame) = latest_frame {
            let frame_msg = ScreenMessage::Frame {
                device_id: device_id.to_string(),
                frame_number: frame.frame_number,
                timestamp: frame.timestamp,
                width: frame.width,
                height: frame.height,
                format: frame.format.clone(),
                data: frame.data_base64(),
                size: frame.size,
            };
            if let Ok(bytes) = manager_wire::encode(&frame_msg) {
                let _ = handle.send(bytes);
            }
        }

        info!(%device_id, %viewer_id, "viewer joined");
        self.listeners.notify(&Event::StreamViewerJoined { device_id: device_id.clone(), viewer_id });
        true
    }

    pub fn remove_viewer(&self, device_id: &DeviceId, viewer_id: &ViewerId) -> bool {
        let removed = {
            let mut streams = self.streams.lock();
            streams.get_mut(device_id).and_then(|s| s.viewers.remove(viewer_id)).is_some()
        };
        if removed {
            self.listeners.notify(&Event::StreamViewerLeft {
                device_id: device_id.clone(),
                viewer_id: viewer_id.clone(),
            });
        }
        removed
    }

    /// Used on viewer disconnect — a viewer may be attached to at most one
    /// stream in practice, but this sweeps every session defensively.
    pub fn remove_viewer_from_all(&self, viewer_id: &ViewerId) {
        let affected: Vec<DeviceId> = {
            let mut streams = self.streams.lock();
            streams
                .iter_mut()
                .filter_map(|(device_id, session)| {
                    session.viewers.remove(viewer_id).map(|_| device_id.clone())
                })
                .collect()
        };
        for device_id in affected {
            self.listeners
                .notify(&Event::StreamViewerLeft { device_id, viewer_id: viewer_id.clone() });
        }
    }

    /// Ask the Worker owning `device_id` to start streaming. Fails cleanly
    /// if the device is unknown to the registry.
    pub fn request_stream_start(
        &self,
        registry: &manager_registry::WorkerRegistry<C>,
        device_id: &DeviceId,
        config: Option<StreamConfig>,
    ) -> bool {
        let Some(worker_id) = registry.find_worker_by_device(device_id) else { return false };
        let Some(handle) = registry.handle_for(&worker_id) else { return false };
        let command = ManagerCommand::StartStream { device_id: device_id.to_string(), config };
        match manager_wire::encode(&command) {
            Ok(bytes) => handle.send(bytes).is_ok(),
            Err(_) => false,
        }
    }

    /// Ask the Worker owning an active session to stop streaming.
    pub fn request_stream_stop(
        &self,
        registry: &manager_registry::WorkerRegistry<C>,
        device_id: &DeviceId,
    ) -> bool {
        let (worker_id, session_id) = {
            let streams = self.streams.lock();
            match streams.get(device_id) {
                Some(session) => (session.info.worker_id.clone(), session.info.session_id.clone()),
                None => return false,
            }
        };
        let Some(handle) = registry.handle_for(&worker_id) else { return false };
        let command =
            ManagerCommand::StopStream { device_id: device_id.to_string(), session_id: session_id.to_string() };
        match manager_wire::encode(&command) {
            Ok(bytes) => handle.send(bytes).is_ok(),
            Err(_) => false,
        }
    }

    /// Informational stats from a Worker; logged only.
    pub fn handle_stats(&self, device_id: &DeviceId, stats: serde_json::Value) {
        info!(%device_id, ?stats, "stream stats");
    }

    /// Pass a Worker-reported quality change through to viewers.
    pub fn handle_quality_change(
        &self,
        device_id: &DeviceId,
        previous_quality: u8,
        new_quality: u8,
        reason: String,
    ) -> bool {
        let viewers: Vec<Arc<dyn ViewerHandle>> = {
            let streams = self.streams.lock();
            match streams.get(device_id) {
                Some(session) => session.viewers.values().map(|e| Arc::clone(&e.handle)).collect(),
                None => return false,
            }
        };
        info!(%device_id, previous_quality, new_quality, %reason, "stream quality changed");
        let payload = ScreenMessage::QualityChanged {
            device_id: device_id.to_string(),
            quality: new_quality,
            reason,
        };
        if let Ok(bytes) = manager_wire::encode(&payload) {
            for handle in &viewers {
                let _ = handle.send(bytes.clone());
            }
        }
        true
    }

    pub fn get(&self, device_id: &DeviceId) -> Option<StreamSessionInfo> {
        self.streams.lock().get(device_id).map(|s| s.info.clone())
    }

    pub fn viewer_count(&self, device_id: &DeviceId) -> usize {
        self.streams.lock().get(device_id).map(|s| s.viewers.len()).unwrap_or(0)
    }

    pub fn buffer_len(&self, device_id: &DeviceId) -> usize {
        self.streams.lock().get(device_id).map(|s| s.frames.len()).unwrap_or(0)
    }

    pub fn buffered_frame_numbers(&self, device_id: &DeviceId) -> Vec<u64> {
        self.streams
            .lock()
            .get(device_id)
            .map(|s| s.frames.iter().map(|f| f.frame_number).collect())
            .unwrap_or_default()
    }

    pub fn active_stream_count(&self) -> usize {
        self.streams.lock().len()
    }

    fn send_to_viewer(&self, entry: &ViewerEntry, message: &ScreenMessage) {
        if let Ok(bytes) = manager_wire::encode(message) {
            if let Err(e) = entry.handle.send(bytes) {
                warn!(viewer_id = %entry.viewer.viewer_id, error = %e, "failed to notify viewer");
            }
        }
    }
}
