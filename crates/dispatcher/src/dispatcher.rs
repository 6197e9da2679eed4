// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TaskDispatcher: job lifecycle state machine, device selection, command
//! emission. Device selection and duplicate-dispatch guarding are grounded
//! on the teacher's `dispatch_queue_item`/`handle_worker_poll_complete`;
//! completion bookkeeping is grounded on `check_worker_job_complete`.

use crate::types::{DispatchConfig, DispatchError};
use manager_core::{
    Clock, DeviceId, DispatchOptions, Event, Job, JobError, JobId, JobStatus, Listeners, WorkerId,
};
use manager_wire::{ManagerCommand, RetrySpec};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

pub struct TaskDispatcher<C: Clock = manager_core::SystemClock> {
    jobs: Mutex<HashMap<JobId, Job>>,
    listeners: Listeners,
    clock: C,
    config: DispatchConfig,
}

impl<C: Clock> TaskDispatcher<C> {
    pub fn new(clock: C, config: DispatchConfig) -> Self {
        Self { jobs: Mutex::new(HashMap::new()), listeners: Listeners::new(), clock, config }
    }

    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    /// Greedy device selection across `available` workers in iteration
    /// order, then the single-worker rule: only the first worker's slice
    /// survives. Returns `None` if fewer than `target_count` devices are
    /// available within a single worker (SPEC_FULL.md §4.2, "All-or-nothing").
    fn select_devices(
        available: &[manager_core::Worker],
        target_count: u32,
    ) -> Option<(WorkerId, Vec<DeviceId>)> {
        let mut collected: Vec<(WorkerId, DeviceId)> = Vec::new();
        'outer: for worker in available {
            for device in worker.idle_devices() {
                collected.push((worker.worker_id.clone(), device.device_id.clone()));
                if collected.len() as u32 >= target_count {
                    break 'outer;
                }
            }
        }
        if (collected.len() as u32) < target_count {
            return None;
        }
        let first_worker = collected[0].0.clone();
        let slice: Vec<DeviceId> = collected
            .into_iter()
            .filter(|(w, _)| *w == first_worker)
            .map(|(_, d)| d)
            .take(target_count as usize)
            .collect();
        if (slice.len() as u32) < target_count {
            return None;
        }
        Some((first_worker, slice))
    }

    /// Dispatch a job. Idempotent on `job_id`. Returns `None` when no
    /// Worker/device combination satisfies the request.
    pub fn dispatch(
        &self,
        registry: &manager_registry::WorkerRegistry<C>,
        job_id: JobId,
        job_type: String,
        params: serde_json::Value,
        options: DispatchOptions,
    ) -> Option<Job> {
        if let Some(existing) = self.jobs.lock().get(&job_id) {
            return Some(existing.clone());
        }

        let target_count = options.target_device_count.unwrap_or(1).max(1);
        let mut available = registry.available_workers();
        if let Some(target_type) = options.target_worker_type {
            available.retain(|w| w.worker_type == target_type);
        }

        let (worker_id, device_ids) = Self::select_devices(&available, target_count)?;
        let handle = registry.handle_for(&worker_id)?;

        let now = self.clock.now();
        let job = Job::new(
            job_id.clone(),
            job_type.clone(),
            worker_id.clone(),
            device_ids.clone(),
            params.clone(),
            now,
        );
        self.jobs.lock().insert(job_id.clone(), job.clone());

        let timeout_ms = options.timeout_ms.unwrap_or(self.config.default_timeout_ms);
        let retry = options.retry.unwrap_or(self.config.default_retry);

        for device_id in &device_ids {
            let command = ManagerCommand::ExecuteJob {
                job_id: job_id.as_str().to_string(),
                workflow_id: job_type.clone(),
                device_id: device_id.as_str().to_string(),
                params: params.clone(),
                priority: options.priority,
                timeout_ms,
                retry: RetrySpec { max_attempts: retry.max_attempts, delay_ms: retry.delay_ms },
            };
            if let Ok(bytes) = manager_wire::encode(&command) {
                if let Err(e) = handle.send(bytes) {
                    warn!(%job_id, %device_id, error = %e, "failed to send execute_job command");
                }
            }
        }

        info!(%job_id, %worker_id, devices = device_ids.len(), "job dispatched");
        self.listeners.notify(&Event::JobDispatched {
            job_id: job_id.clone(),
            worker_id,
            device_ids,
        });
        Some(job)
    }

    /// Apply progress reported by `worker_id`. Dropped (with a log) if the
    /// job is unknown, the reporting worker does not own it, or the job has
    /// already reached a terminal state — terminal states are absorbing
    /// (SPEC_FULL.md §8 invariant 6).
    pub fn handle_progress(&self, job_id: &JobId, worker_id: &WorkerId, progress: u8, current_step: Option<String>) {
        let applied = {
            let mut jobs = self.jobs.lock();
            match jobs.get_mut(job_id) {
                Some(job) if job.is_terminal() => {
                    let err = DispatchError::AlreadyTerminal(job_id.clone());
                    warn!(%err, "progress for terminal job, dropped");
                    false
                }
                Some(job) if &job.worker_id == worker_id => {
                    job.status = JobStatus::Running;
                    job.progress = progress;
                    job.current_step = current_step;
                    true
                }
                Some(_) => {
                    warn!(%job_id, %worker_id, "progress from non-owning worker, dropped");
                    false
                }
                None => {
                    let err = DispatchError::UnknownJob(job_id.clone());
                    warn!(%err, "dropping progress");
                    false
                }
            }
        };
        if applied {
            self.listeners.notify(&Event::JobProgress { job_id: job_id.clone(), progress });
        }
    }

    /// Apply a completion reported by `worker_id`. A completion for a job
    /// that already reached a terminal state (e.g. one that was `cancel`led
    /// in the meantime) is dropped rather than overwriting the terminal
    /// status — terminal states are absorbing (SPEC_FULL.md §8 invariant 6).
    pub fn handle_completion(
        &self,
        job_id: &JobId,
        worker_id: &WorkerId,
        success: bool,
        result: Option<serde_json::Value>,
        error: Option<JobError>,
        duration_ms: u64,
    ) {
        let now = self.clock.now();
        let outcome = {
            let mut jobs = self.jobs.lock();
            match jobs.get_mut(job_id) {
                Some(job) if job.is_terminal() => {
                    let err = DispatchError::AlreadyTerminal(job_id.clone());
                    warn!(%err, "completion for terminal job, dropped");
                    None
                }
                Some(job) if &job.worker_id == worker_id => {
                    job.progress = 100;
                    job.completed_at = Some(now);
                    job.duration_ms = Some(duration_ms);
                    if success {
                        job.status = JobStatus::Completed;
                        job.result = result;
                        job.error = None;
                        Some(Event::JobComplete { job_id: job_id.clone() })
                    } else {
                        let error = error.unwrap_or_else(|| JobError {
                            code: "UNKNOWN".to_string(),
                            message: "worker reported failure without detail".to_string(),
                            recoverable: false,
                        });
                        job.status = JobStatus::Failed;
                        job.error = Some(error.clone());
                        Some(Event::JobFailed { job_id: job_id.clone(), error })
                    }
                }
                Some(_) => {
                    warn!(%job_id, %worker_id, "completion from non-owning worker, dropped");
                    None
                }
                None => {
                    let err = DispatchError::UnknownJob(job_id.clone());
                    warn!(%err, "dropping completion");
                    None
                }
            }
        };
        if let Some(event) = outcome {
            self.listeners.notify(&event);
        }
    }

    /// Cancel a job. Fire-and-forget toward the Worker: the job is marked
    /// cancelled regardless of whether the `cmd:cancel_job` send succeeds or
    /// the Worker is even still registered.
    pub fn cancel(
        &self,
        registry: &manager_registry::WorkerRegistry<C>,
        job_id: &JobId,
        reason: Option<String>,
    ) -> bool {
        let worker_id = {
            let mut jobs = self.jobs.lock();
            match jobs.get_mut(job_id) {
                Some(job) if !job.is_terminal() => {
                    job.status = JobStatus::Cancelled;
                    job.worker_id.clone()
                }
                Some(_) => {
                    let err = DispatchError::AlreadyTerminal(job_id.clone());
                    warn!(%err, "cancel of terminal job, ignored");
                    return false;
                }
                None => {
                    let err = DispatchError::UnknownJob(job_id.clone());
                    warn!(%err, "cancel of unknown job, ignored");
                    return false;
                }
            }
        };

        if let Some(handle) = registry.handle_for(&worker_id) {
            let command = ManagerCommand::CancelJob {
                job_id: job_id.as_str().to_string(),
                reason: reason.clone(),
                force: false,
            };
            if let Ok(bytes) = manager_wire::encode(&command) {
                let _ = handle.send(bytes);
            }
        }

        self.listeners.notify(&Event::JobCancelled { job_id: job_id.clone(), reason });
        true
    }

    /// Worker-eviction policy (SPEC_FULL.md §4.2/§9 Open Question #1): every
    /// non-terminal job owned by `worker_id` fails with `WORKER_DISCONNECTED`.
    pub fn handle_worker_gone(&self, worker_id: &WorkerId) -> Vec<JobId> {
        let mut affected = Vec::new();
        {
            let mut jobs = self.jobs.lock();
            for job in jobs.values_mut() {
                if &job.worker_id == worker_id && !job.is_terminal() {
                    job.status = JobStatus::Failed;
                    job.error = Some(JobError::worker_disconnected());
                    affected.push(job.job_id.clone());
                }
            }
        }
        for job_id in &affected {
            self.listeners.notify(&Event::JobFailed {
                job_id: job_id.clone(),
                error: JobError::worker_disconnected(),
            });
        }
        affected
    }

    pub fn get(&self, job_id: &JobId) -> Option<Job> {
        self.jobs.lock().get(job_id).cloned()
    }

    pub fn by_status(&self, status: JobStatus) -> Vec<Job> {
        self.jobs.lock().values().filter(|j| j.status == status).cloned().collect()
    }

    pub fn by_worker(&self, worker_id: &WorkerId) -> Vec<Job> {
        self.jobs.lock().values().filter(|j| &j.worker_id == worker_id).cloned().collect()
    }

    pub fn active(&self) -> Vec<Job> {
        self.jobs.lock().values().filter(|j| !j.is_terminal()).cloned().collect()
    }

    pub fn all(&self) -> Vec<Job> {
        self.jobs.lock().values().cloned().collect()
    }

    /// Remove terminal jobs older than `max_age`, keyed by completion time
    /// (or dispatch time if never completed).
    pub fn prune_old(&self, max_age: Duration) -> usize {
        let now = self.clock.now();
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|_, job| {
            if !job.is_terminal() {
                return true;
            }
            let age_anchor = job.completed_at.unwrap_or(job.dispatched_at);
            now.saturating_duration_since(age_anchor) <= max_age
        });
        before - jobs.len()
    }
}
