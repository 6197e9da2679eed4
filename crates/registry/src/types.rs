// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use manager_core::{Capability, HostInfo, Metrics, TrackedDevice, WorkerId, WorkerType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Information carried by an `evt:register` event, already validated/decoded
/// by the caller (ConnectionServer). Authentication is not this crate's
/// concern (SPEC_FULL.md §4.4).
#[derive(Debug, Clone)]
pub struct RegisterInfo {
    pub worker_id: WorkerId,
    pub worker_type: WorkerType,
    pub version: String,
    pub capabilities: Vec<Capability>,
    pub devices: Vec<manager_core::DeviceId>,
    pub max_concurrent_jobs: u32,
    pub host: HostInfo,
}

/// Information carried by an `evt:heartbeat` event.
#[derive(Debug, Clone)]
pub struct HeartbeatInfo {
    pub worker_id: WorkerId,
    pub epoch_ms: u64,
    pub metrics: Metrics,
    pub devices: Vec<TrackedDevice>,
    pub active_jobs: u32,
}

/// Tunables from SPEC_FULL.md §6 ("WorkerRegistry" row of the configuration table).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub heartbeat_timeout_ms: u64,
    pub health_check_interval_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { heartbeat_timeout_ms: 30_000, health_check_interval_ms: 10_000 }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("worker {0} is not registered")]
    UnknownWorker(WorkerId),
}
