// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A point-in-time operator view, logged on a timer rather than served over
//! a network API (SPEC_FULL.md §10.4 — no admin surface is part of this
//! release).

use manager_core::Clock;
use manager_dispatcher::TaskDispatcher;
use manager_registry::WorkerRegistry;
use manager_stream::StreamProxy;
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct ManagerSnapshot {
    pub worker_count: usize,
    pub active_job_count: usize,
    pub open_stream_count: usize,
    pub uptime_secs: u64,
}

impl ManagerSnapshot {
    pub fn capture<C: Clock>(
        registry: &WorkerRegistry<C>,
        dispatcher: &TaskDispatcher<C>,
        stream: &StreamProxy<C>,
        start_time: Instant,
    ) -> Self {
        Self {
            worker_count: registry.list().len(),
            active_job_count: dispatcher.active().len(),
            open_stream_count: stream.active_stream_count(),
            uptime_secs: start_time.elapsed().as_secs(),
        }
    }
}
