// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tagged wire payloads for the Worker and Viewer protocols (SPEC_FULL.md §6).

use manager_core::{Capability, DeviceState, Frame, HostInfo, JobError, MinicapInfo, StreamConfig, WorkerType};
use serde::{Deserialize, Serialize};

/// Events a Worker sends to the Manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerEvent {
    #[serde(rename = "evt:register")]
    Register {
        #[serde(rename = "workerId")]
        worker_id: String,
        #[serde(rename = "workerType")]
        worker_type: WorkerType,
        version: String,
        capabilities: Vec<Capability>,
        #[serde(rename = "connectedDevices")]
        connected_devices: Vec<String>,
        #[serde(rename = "maxConcurrentJobs")]
        max_concurrent_jobs: u32,
        host: HostInfo,
        token: Option<String>,
    },

    #[serde(rename = "evt:heartbeat")]
    Heartbeat {
        #[serde(rename = "workerId")]
        worker_id: String,
        timestamp: u64,
        metrics: HeartbeatMetrics,
        devices: Vec<HeartbeatDevice>,
    },

    #[serde(rename = "evt:job_progress")]
    JobProgress {
        #[serde(rename = "jobId")]
        job_id: String,
        progress: u8,
        #[serde(rename = "currentStep")]
        current_step: Option<String>,
        timestamp: u64,
        #[serde(rename = "deviceId")]
        device_id: String,
    },

    #[serde(rename = "evt:job_complete")]
    JobComplete {
        #[serde(rename = "jobId")]
        job_id: String,
        success: bool,
        #[serde(rename = "completedAt")]
        completed_at: u64,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
        result: Option<serde_json::Value>,
        error: Option<JobError>,
    },

    #[serde(rename = "evt:pong")]
    Pong { timestamp: u64, #[serde(rename = "pingTimestamp")] ping_timestamp: u64, #[serde(rename = "correlationId")] correlation_id: Option<String> },

    #[serde(rename = "evt:stream_started")]
    StreamStarted {
        #[serde(rename = "deviceId")]
        device_id: String,
        #[serde(rename = "sessionId")]
        session_id: String,
        config: StreamConfig,
        #[serde(rename = "minicapInfo")]
        minicap_info: Option<MinicapInfo>,
    },

    #[serde(rename = "evt:stream_stopped")]
    StreamStopped {
        #[serde(rename = "deviceId")]
        device_id: String,
        #[serde(rename = "sessionId")]
        session_id: String,
        reason: String,
        #[serde(rename = "totalFrames")]
        total_frames: u64,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },

    #[serde(rename = "evt:stream_error")]
    StreamError {
        #[serde(rename = "deviceId")]
        device_id: String,
        #[serde(rename = "sessionId")]
        session_id: Option<String>,
        code: String,
        message: String,
        recoverable: bool,
    },

    #[serde(rename = "evt:stream_frame")]
    StreamFrame {
        #[serde(rename = "deviceId")]
        device_id: String,
        frame: Frame,
    },

    #[serde(rename = "evt:stream_stats")]
    StreamStats {
        #[serde(rename = "deviceId")]
        device_id: String,
        stats: serde_json::Value,
    },

    #[serde(rename = "evt:quality_change")]
    QualityChange {
        #[serde(rename = "deviceId")]
        device_id: String,
        #[serde(rename = "previousQuality")]
        previous_quality: u8,
        #[serde(rename = "newQuality")]
        new_quality: u8,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatMetrics {
    #[serde(rename = "cpuUsage")]
    pub cpu_usage: f64,
    #[serde(rename = "memoryUsage")]
    pub memory_usage: f64,
    #[serde(rename = "uptimeSeconds")]
    pub uptime_seconds: u64,
    #[serde(rename = "activeJobs")]
    pub active_jobs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatDevice {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub state: DeviceState,
    #[serde(rename = "currentJobId")]
    pub current_job_id: Option<String>,
}

/// Commands the Manager sends to a Worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ManagerCommand {
    #[serde(rename = "cmd:register_ack")]
    RegisterAck {
        success: bool,
        #[serde(rename = "managerId")]
        manager_id: Option<String>,
        #[serde(rename = "serverTime")]
        server_time: Option<u64>,
        error: Option<String>,
    },

    #[serde(rename = "cmd:execute_job")]
    ExecuteJob {
        #[serde(rename = "jobId")]
        job_id: String,
        #[serde(rename = "workflowId")]
        workflow_id: String,
        #[serde(rename = "deviceId")]
        device_id: String,
        params: serde_json::Value,
        priority: Option<i32>,
        #[serde(rename = "timeoutMs")]
        timeout_ms: u64,
        retry: RetrySpec,
    },

    #[serde(rename = "cmd:cancel_job")]
    CancelJob {
        #[serde(rename = "jobId")]
        job_id: String,
        reason: Option<String>,
        force: bool,
    },

    #[serde(rename = "cmd:start_stream")]
    StartStream {
        #[serde(rename = "deviceId")]
        device_id: String,
        config: Option<StreamConfig>,
    },

    #[serde(rename = "cmd:stop_stream")]
    StopStream {
        #[serde(rename = "deviceId")]
        device_id: String,
        #[serde(rename = "sessionId")]
        session_id: String,
    },

    #[serde(rename = "cmd:ping")]
    Ping { timestamp: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySpec {
    #[serde(rename = "maxAttempts")]
    pub max_attempts: u32,
    #[serde(rename = "delayMs")]
    pub delay_ms: u64,
}

/// Inbound frames from a viewer connection — only two kinds are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ViewerMessage {
    #[serde(rename = "viewer:subscribe")]
    Subscribe {
        #[serde(rename = "deviceId")]
        device_id: String,
        token: Option<String>,
    },
    #[serde(rename = "viewer:unsubscribe")]
    Unsubscribe,
}

/// Outbound frames the Manager sends to a viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScreenMessage {
    #[serde(rename = "screen:info")]
    Info {
        #[serde(rename = "deviceId")]
        device_id: String,
        #[serde(rename = "sessionId")]
        session_id: String,
        config: StreamConfig,
        #[serde(rename = "minicapInfo")]
        minicap_info: Option<MinicapInfo>,
    },
    #[serde(rename = "screen:frame")]
    Frame {
        #[serde(rename = "deviceId")]
        device_id: String,
        #[serde(rename = "frameNumber")]
        frame_number: u64,
        timestamp: i64,
        width: u32,
        height: u32,
        format: String,
        data: String,
        size: usize,
    },
    #[serde(rename = "screen:stopped")]
    Stopped {
        #[serde(rename = "deviceId")]
        device_id: String,
        reason: String,
    },
    #[serde(rename = "screen:error")]
    Error {
        #[serde(rename = "deviceId")]
        device_id: String,
        code: String,
        message: String,
    },
    #[serde(rename = "screen:quality_changed")]
    QualityChanged {
        #[serde(rename = "deviceId")]
        device_id: String,
        quality: u8,
        reason: String,
    },
}
