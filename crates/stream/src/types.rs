// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use manager_core::DeviceId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tunables from SPEC_FULL.md §6 ("StreamProxy" row).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamProxyConfig {
    pub max_buffer_size: usize,
    pub max_viewers_per_stream: usize,
    pub max_frame_rate: u32,
    pub quality_reduction_threshold: usize,
}

impl Default for StreamProxyConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 3,
            max_viewers_per_stream: 10,
            max_frame_rate: 30,
            quality_reduction_threshold: 5,
        }
    }
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("no active stream session for device {0}")]
    NoSession(DeviceId),
    #[error("stream session for device {0} already exists")]
    AlreadyStarted(DeviceId),
    #[error("viewer cap reached for device {0}")]
    ViewerCapReached(DeviceId),
}
