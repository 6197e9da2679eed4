// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WorkerRegistry: authoritative map of live Workers and their devices.
//!
//! Grounded on the teacher's reconnection-preserving `apply` logic for
//! worker records and its `Clock`-driven heartbeat bookkeeping.

use crate::types::{HeartbeatInfo, RegisterInfo, RegistryConfig, RegistryError};
use manager_core::{
    Clock, DeviceId, Event, Listeners, TrackedDevice, Worker, WorkerHandle, WorkerId, WorkerType,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

struct Entry {
    worker: Worker,
    handle: Arc<dyn WorkerHandle>,
}

pub struct WorkerRegistry<C: Clock = manager_core::SystemClock> {
    workers: Mutex<HashMap<WorkerId, Entry>>,
    listeners: Listeners,
    clock: C,
    config: RegistryConfig,
}

impl<C: Clock> WorkerRegistry<C> {
    pub fn new(clock: C, config: RegistryConfig) -> Self {
        Self { workers: Mutex::new(HashMap::new()), listeners: Listeners::new(), clock, config }
    }

    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    pub fn config(&self) -> RegistryConfig {
        self.config
    }

    /// Register (or reconnect) a Worker. Reconnection preserves
    /// `connected_at` and `active_jobs`; every other field is overwritten
    /// from `info` (SPEC_FULL.md §4.1).
    pub fn register(&self, info: RegisterInfo, handle: Arc<dyn WorkerHandle>) -> Worker {
        let now = self.clock.now();
        let devices: Vec<TrackedDevice> = info.devices.into_iter().map(TrackedDevice::idle).collect();

        let (worker, is_reconnect) = {
            let mut workers = self.workers.lock();
            match workers.get(&info.worker_id) {
                Some(existing) => {
                    let mut worker = existing.worker.clone();
                    worker.worker_type = info.worker_type;
                    worker.version = info.version;
                    worker.capabilities = info.capabilities;
                    worker.devices = devices;
                    worker.max_concurrent_jobs = info.max_concurrent_jobs;
                    worker.host = info.host;
                    worker.last_heartbeat = now;
                    workers.insert(
                        info.worker_id.clone(),
                        Entry { worker: worker.clone(), handle },
                    );
                    (worker, true)
                }
                None => {
                    let worker = Worker {
                        worker_id: info.worker_id.clone(),
                        worker_type: info.worker_type,
                        version: info.version,
                        capabilities: info.capabilities,
                        devices,
                        max_concurrent_jobs: info.max_concurrent_jobs,
                        host: info.host,
                        connected_at: now,
                        last_heartbeat: now,
                        active_jobs: 0,
                        metrics: None,
                    };
                    workers.insert(
                        info.worker_id.clone(),
                        Entry { worker: worker.clone(), handle },
                    );
                    (worker, false)
                }
            }
        };

        let event = if is_reconnect {
            info!(worker_id = %worker.worker_id, "worker reconnected");
            Event::WorkerReconnected { worker_id: worker.worker_id.clone() }
        } else {
            info!(worker_id = %worker.worker_id, "worker registered");
            Event::WorkerRegistered { worker_id: worker.worker_id.clone() }
        };
        self.listeners.notify(&event);
        worker
    }

    /// Remove a Worker. Returns whether an entry existed. Safe to call on an
    /// already-removed id.
    pub fn unregister(&self, worker_id: &WorkerId, reason: impl Into<String>) -> bool {
        let existed = self.workers.lock().remove(worker_id).is_some();
        if existed {
            let reason = reason.into();
            info!(%worker_id, %reason, "worker unregistered");
            self.listeners.notify(&Event::WorkerUnregistered {
                worker_id: worker_id.clone(),
                reason,
            });
        }
        existed
    }

    /// Apply a heartbeat. Heartbeats for an unknown worker are logged and dropped.
    pub fn update_heartbeat(&self, hb: HeartbeatInfo) {
        let now = self.clock.now();
        let updated = {
            let mut workers = self.workers.lock();
            match workers.get_mut(&hb.worker_id) {
                Some(entry) => {
                    entry.worker.last_heartbeat = now;
                    entry.worker.metrics = Some(hb.metrics);
                    entry.worker.active_jobs = hb.active_jobs;
                    entry.worker.devices = hb.devices;
                    true
                }
                None => false,
            }
        };
        if updated {
            self.listeners.notify(&Event::WorkerHeartbeat { worker_id: hb.worker_id });
        } else {
            let err = RegistryError::UnknownWorker(hb.worker_id);
            warn!(%err, "dropping heartbeat");
        }
    }

    pub fn get(&self, worker_id: &WorkerId) -> Option<Worker> {
        self.workers.lock().get(worker_id).map(|e| e.worker.clone())
    }

    pub fn handle_for(&self, worker_id: &WorkerId) -> Option<Arc<dyn WorkerHandle>> {
        self.workers.lock().get(worker_id).map(|e| Arc::clone(&e.handle))
    }

    pub fn list(&self) -> Vec<Worker> {
        self.workers.lock().values().map(|e| e.worker.clone()).collect()
    }

    pub fn by_type(&self, worker_type: WorkerType) -> Vec<Worker> {
        self.workers
            .lock()
            .values()
            .filter(|e| e.worker.worker_type == worker_type)
            .map(|e| e.worker.clone())
            .collect()
    }

    pub fn with_capability(&self, name: &str) -> Vec<Worker> {
        self.workers
            .lock()
            .values()
            .filter(|e| e.worker.has_capability(name))
            .map(|e| e.worker.clone())
            .collect()
    }

    pub fn available_workers(&self) -> Vec<Worker> {
        self.workers
            .lock()
            .values()
            .filter(|e| e.worker.is_available())
            .map(|e| e.worker.clone())
            .collect()
    }

    pub fn idle_devices(&self) -> Vec<(WorkerId, DeviceId)> {
        self.workers
            .lock()
            .values()
            .flat_map(|e| {
                let worker_id = e.worker.worker_id.clone();
                e.worker
                    .idle_devices()
                    .map(move |d| (worker_id.clone(), d.device_id.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn find_worker_by_device(&self, device_id: &DeviceId) -> Option<WorkerId> {
        self.workers
            .lock()
            .values()
            .find(|e| e.worker.devices.iter().any(|d| &d.device_id == device_id))
            .map(|e| e.worker.worker_id.clone())
    }

    pub fn total_device_count(&self) -> usize {
        self.workers.lock().values().map(|e| e.worker.devices.len()).sum()
    }

    /// Scan for Workers whose heartbeat has gone stale, emitting `worker:timeout`
    /// for each. Advisory only — does not unregister (SPEC_FULL.md §4.1).
    pub fn scan_for_timeouts(&self) -> Vec<WorkerId> {
        let now = self.clock.now();
        let timeout = std::time::Duration::from_millis(self.config.heartbeat_timeout_ms);
        let stale: Vec<(WorkerId, u64)> = {
            let workers = self.workers.lock();
            workers
                .values()
                .filter(|e| now.saturating_duration_since(e.worker.last_heartbeat) > timeout)
                .map(|e| (e.worker.worker_id.clone(), self.clock.epoch_ms()))
                .collect()
        };
        for (worker_id, last_heartbeat_epoch_ms) in &stale {
            warn!(%worker_id, "worker heartbeat timeout");
            self.listeners.notify(&Event::WorkerTimeout {
                worker_id: worker_id.clone(),
                last_heartbeat_epoch_ms: *last_heartbeat_epoch_ms,
            });
        }
        stale.into_iter().map(|(id, _)| id).collect()
    }

    /// Run the periodic health-check scan until `shutdown` fires.
    pub async fn run_health_check_loop(&self, shutdown: Arc<tokio::sync::Notify>) {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_millis(self.config.health_check_interval_ms));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.scan_for_timeouts();
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }
    }
}
