// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use manager_core::{JobId, RetryPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tunables from SPEC_FULL.md §6 ("TaskDispatcher" row).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub default_timeout_ms: u64,
    pub default_retry: RetryPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { default_timeout_ms: 300_000, default_retry: RetryPolicy::default() }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("job {0} is not known")]
    UnknownJob(JobId),
    #[error("job {0} is already in a terminal state")]
    AlreadyTerminal(JobId),
}
