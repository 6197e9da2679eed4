// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker and device records owned by the WorkerRegistry.

use crate::ids::{DeviceId, JobId, WorkerId};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Worker kind, a closed set reported at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerType {
    Youtube,
    Install,
    Scrape,
    Generic,
}

crate::simple_display! {
    WorkerType {
        Youtube => "youtube",
        Install => "install",
        Scrape => "scrape",
        Generic => "generic",
    }
}

/// A named capability flag a Worker declares at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub enabled: bool,
    pub version: String,
}

/// Host platform metadata reported at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub hostname: String,
    pub platform: String,
    pub arch: String,
}

/// Resource metrics from the most recent heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub uptime_seconds: u64,
}

/// State of a single device as reported by its owning Worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Idle,
    Busy,
    Offline,
    Error,
}

crate::simple_display! {
    DeviceState {
        Idle => "idle",
        Busy => "busy",
        Offline => "offline",
        Error => "error",
    }
}

/// A device tracked under a Worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedDevice {
    pub device_id: DeviceId,
    pub state: DeviceState,
    pub current_job_id: Option<JobId>,
}

impl TrackedDevice {
    pub fn idle(device_id: DeviceId) -> Self {
        Self { device_id, state: DeviceState::Idle, current_job_id: None }
    }

    pub fn is_available(&self) -> bool {
        self.state == DeviceState::Idle && self.current_job_id.is_none()
    }
}

/// A registered Worker.
///
/// Reconnection (same `worker_id`, new socket) preserves `connected_at` and
/// `active_jobs`, but overwrites everything else reported at registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub worker_id: WorkerId,
    pub worker_type: WorkerType,
    pub version: String,
    pub capabilities: Vec<Capability>,
    pub devices: Vec<TrackedDevice>,
    pub max_concurrent_jobs: u32,
    pub host: HostInfo,
    #[serde(skip, default = "Instant::now")]
    pub connected_at: Instant,
    #[serde(skip, default = "Instant::now")]
    pub last_heartbeat: Instant,
    pub active_jobs: u32,
    pub metrics: Option<Metrics>,
}

impl Worker {
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.name == name && c.enabled)
    }

    pub fn is_available(&self) -> bool {
        self.active_jobs < self.max_concurrent_jobs
            && self.devices.iter().any(TrackedDevice::is_available)
    }

    pub fn idle_devices(&self) -> impl Iterator<Item = &TrackedDevice> {
        self.devices.iter().filter(|d| d.is_available())
    }
}
