// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP accept loop and per-connection role state machine.
//!
//! Grounded on the teacher's `oj-daemon::listener` module: a shared,
//! `Arc`-held context passed into a per-connection `handle_connection`
//! task, with the same "decode one frame, dispatch, loop until EOF" shape.
//! Unlike the teacher's Unix/TCP dual listener (which speaks a Hello/Query
//! request-response IPC protocol), this server has exactly one transport
//! and two independent, un-acknowledged event streams (Worker, Viewer), so
//! there is no request/response correlation to track.

use crate::socket::{self, SocketHandle};
use manager_core::{
    Clock, DeviceId, Event, JobId, SessionId, TrackedDevice, ViewerHandle, ViewerId, WorkerHandle,
    WorkerId,
};
use manager_dispatcher::TaskDispatcher;
use manager_registry::{HeartbeatInfo, RegisterInfo, WorkerRegistry};
use manager_stream::StreamProxy;
use manager_wire::{ManagerCommand, ViewerMessage, WorkerEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
#[path = "connection_tests.rs"]
mod connection_tests;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared state every connection task needs. One instance per running
/// server, held behind `Arc`.
pub struct ManagerCtx<C: Clock = manager_core::SystemClock> {
    pub registry: Arc<WorkerRegistry<C>>,
    pub dispatcher: Arc<TaskDispatcher<C>>,
    pub stream: Arc<StreamProxy<C>>,
    pub clock: C,
    pub auth_token: Option<String>,
    pub manager_id: String,
    pub start_time: Instant,
}

pub struct ConnectionServer<C: Clock = manager_core::SystemClock> {
    listener: TcpListener,
    ctx: Arc<ManagerCtx<C>>,
}

impl<C: Clock + 'static> ConnectionServer<C> {
    pub async fn bind(host: &str, port: u16, ctx: Arc<ManagerCtx<C>>) -> Result<Self, ConnectionError> {
        let listener = TcpListener::bind((host, port)).await?;
        Ok(Self { listener, ctx })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections, spawning one task per connection, until `shutdown`
    /// is notified.
    pub async fn run(self, shutdown: Arc<Notify>) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            debug!(%addr, "accepted connection");
                            let ctx = Arc::clone(&self.ctx);
                            tokio::spawn(handle_connection(stream, ctx));
                        }
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }
                _ = shutdown.notified() => {
                    info!("connection server shutting down");
                    break;
                }
            }
        }
    }
}

/// What an anonymous connection becomes once its first frame is understood.
enum Role {
    Anonymous,
    Worker(WorkerId),
    Viewer(ViewerId),
}

#[instrument(skip(stream, ctx), fields(addr = %stream.peer_addr().map(|a| a.to_string()).unwrap_or_default()))]
async fn handle_connection<C: Clock + 'static>(stream: TcpStream, ctx: Arc<ManagerCtx<C>>) {
    let _ = stream.set_nodelay(true);
    let (mut reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel::<Vec<u8>>();
    tokio::spawn(socket::run_writer(writer, rx));
    let handle = Arc::new(SocketHandle::new(tx));

    let mut role = Role::Anonymous;

    loop {
        let bytes = match manager_wire::read_message(&mut reader).await {
            Ok(bytes) => bytes,
            Err(manager_wire::WireError::ConnectionClosed) => break,
            Err(e) => {
                warn!(error = %e, "read error, closing connection");
                break;
            }
        };

        let value: serde_json::Value = match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "malformed frame, dropped");
                continue;
            }
        };
        let frame_type = value.get("type").and_then(|v| v.as_str()).unwrap_or("").to_string();

        role = match role {
            Role::Anonymous => match frame_type.as_str() {
                "evt:register" => {
                    match handle_register(&value, &ctx, Arc::clone(&handle) as Arc<dyn WorkerHandle>) {
                        RegisterOutcome::Accepted(worker_id) => Role::Worker(worker_id),
                        RegisterOutcome::Malformed => Role::Anonymous,
                        RegisterOutcome::Rejected => break,
                    }
                }
                "viewer:subscribe" => {
                    match handle_subscribe(&value, &ctx, Arc::clone(&handle) as Arc<dyn ViewerHandle>) {
                        SubscribeOutcome::Accepted(viewer_id) => Role::Viewer(viewer_id),
                        SubscribeOutcome::Malformed => Role::Anonymous,
                        SubscribeOutcome::Rejected => break,
                    }
                }
                other => {
                    warn!(frame_type = other, "frame from anonymous connection, dropped");
                    Role::Anonymous
                }
            },
            Role::Worker(worker_id) => {
                handle_worker_frame(&value, &frame_type, &worker_id, &ctx);
                Role::Worker(worker_id)
            }
            Role::Viewer(viewer_id) => match frame_type.as_str() {
                "viewer:unsubscribe" => {
                    ctx.stream.remove_viewer_from_all(&viewer_id);
                    Role::Viewer(viewer_id)
                }
                other => {
                    warn!(frame_type = other, viewer_id = %viewer_id, "unexpected frame from viewer connection, dropped");
                    Role::Viewer(viewer_id)
                }
            },
        };
    }

    match role {
        Role::Worker(worker_id) => {
            ctx.registry.unregister(&worker_id, "connection closed");
            let affected = ctx.dispatcher.handle_worker_gone(&worker_id);
            if !affected.is_empty() {
                info!(%worker_id, jobs = affected.len(), "jobs failed after worker disconnect");
            }
            ctx.registry.listeners().notify(&Event::ConnectionClosed { worker_id: Some(worker_id) });
        }
        Role::Viewer(viewer_id) => ctx.stream.remove_viewer_from_all(&viewer_id),
        Role::Anonymous => {
            ctx.registry.listeners().notify(&Event::ConnectionClosed { worker_id: None });
        }
    }
}

enum RegisterOutcome {
    Accepted(WorkerId),
    Malformed,
    Rejected,
}

/// Validate and apply a worker registration (SPEC_FULL.md §4.1, §4.4).
/// `Malformed` leaves the connection open and anonymous; `Rejected` (bad
/// auth token) gets a `cmd:register_ack{success:false}` and then the
/// connection is closed by the caller.
fn handle_register<C: Clock>(
    value: &serde_json::Value,
    ctx: &ManagerCtx<C>,
    handle: Arc<dyn WorkerHandle>,
) -> RegisterOutcome {
    let event: WorkerEvent = match serde_json::from_value(value.clone()) {
        Ok(e) => e,
        Err(e) => {
            warn!(error = %e, "malformed evt:register, dropped");
            return RegisterOutcome::Malformed;
        }
    };
    let WorkerEvent::Register {
        worker_id,
        worker_type,
        version,
        capabilities,
        connected_devices,
        max_concurrent_jobs,
        host,
        token,
    } = event
    else {
        return RegisterOutcome::Malformed;
    };

    if let Some(expected) = &ctx.auth_token {
        if token.as_deref() != Some(expected.as_str()) {
            warn!(%worker_id, "registration rejected: bad auth token");
            send_ack(&handle, false, None, Some("unauthorized".to_string()), ctx.clock.epoch_ms());
            return RegisterOutcome::Rejected;
        }
    }

    let worker_id = WorkerId::new(worker_id);
    let info = RegisterInfo {
        worker_id: worker_id.clone(),
        worker_type,
        version,
        capabilities,
        devices: connected_devices.into_iter().map(DeviceId::new).collect(),
        max_concurrent_jobs,
        host,
    };
    ctx.registry.register(info, handle.clone());
    send_ack(&handle, true, Some(ctx.manager_id.clone()), None, ctx.clock.epoch_ms());
    RegisterOutcome::Accepted(worker_id)
}

fn send_ack(
    handle: &Arc<dyn WorkerHandle>,
    success: bool,
    manager_id: Option<String>,
    error: Option<String>,
    server_time: u64,
) {
    let ack = ManagerCommand::RegisterAck { success, manager_id, server_time: Some(server_time), error };
    if let Ok(bytes) = manager_wire::encode(&ack) {
        let _ = handle.send(bytes);
    }
}

enum SubscribeOutcome {
    Accepted(ViewerId),
    Malformed,
    Rejected,
}

/// Validate and apply a viewer subscription. There is no wire-supplied
/// viewer identity (SPEC_FULL.md §6, `viewer:subscribe` carries only
/// `deviceId`/`token`), so an accepted subscription mints a fresh id here —
/// the one deliberate exception to ids being externally supplied.
fn handle_subscribe<C: Clock>(
    value: &serde_json::Value,
    ctx: &ManagerCtx<C>,
    handle: Arc<dyn ViewerHandle>,
) -> SubscribeOutcome {
    let message: ViewerMessage = match serde_json::from_value(value.clone()) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "malformed viewer:subscribe, dropped");
            return SubscribeOutcome::Malformed;
        }
    };
    let ViewerMessage::Subscribe { device_id, token } = message else {
        return SubscribeOutcome::Malformed;
    };

    if let Some(expected) = &ctx.auth_token {
        if token.as_deref() != Some(expected.as_str()) {
            warn!(%device_id, "viewer subscription rejected: bad auth token");
            return SubscribeOutcome::Rejected;
        }
    }

    let viewer_id = ViewerId::new(uuid::Uuid::new_v4().to_string());
    let device_id = DeviceId::new(device_id);
    if !ctx.stream.add_viewer(&device_id, viewer_id.clone(), handle) {
        warn!(%device_id, %viewer_id, "no active stream for subscribing viewer");
    }
    SubscribeOutcome::Accepted(viewer_id)
}

fn handle_worker_frame<C: Clock>(
    value: &serde_json::Value,
    frame_type: &str,
    worker_id: &WorkerId,
    ctx: &ManagerCtx<C>,
) {
    match frame_type {
        "evt:heartbeat" => {
            let Ok(WorkerEvent::Heartbeat { worker_id: reported_worker_id, timestamp: _, metrics, devices }) =
                serde_json::from_value::<WorkerEvent>(value.clone())
            else {
                warn!(%worker_id, "malformed evt:heartbeat, dropped");
                return;
            };
            if reported_worker_id != worker_id.as_str() {
                warn!(%worker_id, reported = %reported_worker_id, "evt:heartbeat worker_id mismatch, dropped");
                return;
            }
            let active_jobs = metrics.active_jobs;
            let hb = HeartbeatInfo {
                worker_id: worker_id.clone(),
                epoch_ms: ctx.clock.epoch_ms(),
                metrics: manager_core::Metrics {
                    cpu_usage: metrics.cpu_usage,
                    memory_usage: metrics.memory_usage,
                    uptime_seconds: metrics.uptime_seconds,
                },
                devices: devices
                    .into_iter()
                    .map(|d| TrackedDevice {
                        device_id: DeviceId::new(d.device_id),
                        state: d.state,
                        current_job_id: d.current_job_id.map(JobId::new),
                    })
                    .collect(),
                active_jobs,
            };
            ctx.registry.update_heartbeat(hb);
        }
        "evt:job_progress" => {
            let Ok(WorkerEvent::JobProgress { job_id, progress, current_step, .. }) =
                serde_json::from_value::<WorkerEvent>(value.clone())
            else {
                warn!(%worker_id, "malformed evt:job_progress, dropped");
                return;
            };
            ctx.dispatcher.handle_progress(&JobId::new(job_id), worker_id, progress, current_step);
        }
        "evt:job_complete" => {
            let Ok(WorkerEvent::JobComplete { job_id, success, duration_ms, result, error, .. }) =
                serde_json::from_value::<WorkerEvent>(value.clone())
            else {
                warn!(%worker_id, "malformed evt:job_complete, dropped");
                return;
            };
            ctx.dispatcher.handle_completion(&JobId::new(job_id), worker_id, success, result, error, duration_ms);
        }
        "evt:pong" => {
            debug!(%worker_id, "pong received");
        }
        "evt:stream_started" => {
            let Ok(WorkerEvent::StreamStarted { device_id, session_id, config, minicap_info }) =
                serde_json::from_value::<WorkerEvent>(value.clone())
            else {
                warn!(%worker_id, "malformed evt:stream_started, dropped");
                return;
            };
            ctx.stream.handle_start(
                worker_id.clone(),
                DeviceId::new(device_id),
                SessionId::new(session_id),
                config,
                minicap_info,
            );
        }
        "evt:stream_stopped" => {
            let Ok(WorkerEvent::StreamStopped { device_id, session_id, reason, .. }) =
                serde_json::from_value::<WorkerEvent>(value.clone())
            else {
                warn!(%worker_id, "malformed evt:stream_stopped, dropped");
                return;
            };
            ctx.stream.handle_stop(&DeviceId::new(device_id), &SessionId::new(session_id), reason);
        }
        "evt:stream_error" => {
            let Ok(WorkerEvent::StreamError { device_id, session_id, code, message, recoverable }) =
                serde_json::from_value::<WorkerEvent>(value.clone())
            else {
                warn!(%worker_id, "malformed evt:stream_error, dropped");
                return;
            };
            ctx.stream.handle_error(&DeviceId::new(device_id), session_id.map(SessionId::new), code, message, recoverable);
        }
        "evt:stream_frame" => {
            let Ok(WorkerEvent::StreamFrame { device_id, frame }) =
                serde_json::from_value::<WorkerEvent>(value.clone())
            else {
                warn!(%worker_id, "malformed evt:stream_frame, dropped");
                return;
            };
            ctx.stream.handle_frame(worker_id, &DeviceId::new(device_id), frame);
        }
        "evt:stream_stats" => {
            let Ok(WorkerEvent::StreamStats { device_id, stats }) =
                serde_json::from_value::<WorkerEvent>(value.clone())
            else {
                warn!(%worker_id, "malformed evt:stream_stats, dropped");
                return;
            };
            ctx.stream.handle_stats(&DeviceId::new(device_id), stats);
        }
        "evt:quality_change" => {
            let Ok(WorkerEvent::QualityChange { device_id, previous_quality, new_quality, reason }) =
                serde_json::from_value::<WorkerEvent>(value.clone())
            else {
                warn!(%worker_id, "malformed evt:quality_change, dropped");
                return;
            };
            ctx.stream.handle_quality_change(&DeviceId::new(device_id), previous_quality, new_quality, reason);
        }
        other => {
            warn!(%worker_id, frame_type = other, "unexpected frame from registered worker, dropped");
        }
    }
}
