// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream session, viewer, and frame records owned by the StreamProxy.

use crate::ids::{DeviceId, SessionId, ViewerId, WorkerId};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Device-reported metadata about its minicap-style capture surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinicapInfo {
    pub virtual_width: u32,
    pub virtual_height: u32,
    pub orientation: u16,
    pub quirks: u32,
}

/// Stream configuration negotiated at start time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub codec: Option<String>,
    pub quality: Option<u8>,
    pub max_fps: Option<u32>,
}

/// A single frame forwarded from a Worker to viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub frame_number: u64,
    pub timestamp: i64,
    pub width: u32,
    pub height: u32,
    pub format: String,
    #[serde(with = "frame_data")]
    pub data: Vec<u8>,
    pub size: usize,
}

impl Frame {
    /// The wire-encoded form of `data`, for callers building a `screen:frame`
    /// message by hand rather than serializing the whole `Frame`.
    pub fn data_base64(&self) -> String {
        frame_data::encode(&self.data)
    }
}

/// Frame bytes are base64-encoded on the wire (SPEC_FULL.md §6) but kept as
/// raw bytes in memory; this module bridges the two representations.
mod frame_data {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }

    pub fn encode(data: &[u8]) -> String {
        STANDARD.encode(data)
    }
}

/// A connected viewer observing one device's stream.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub viewer_id: ViewerId,
    pub device_id: DeviceId,
    pub joined_at: Instant,
    pub frames_sent: u64,
    pub last_frame_sent: Option<Instant>,
}

impl Viewer {
    pub fn new(viewer_id: ViewerId, device_id: DeviceId, now: Instant) -> Self {
        Self { viewer_id, device_id, joined_at: now, frames_sent: 0, last_frame_sent: None }
    }
}

/// A live stream session for one device.
#[derive(Debug, Clone)]
pub struct StreamSessionInfo {
    pub device_id: DeviceId,
    pub worker_id: WorkerId,
    pub session_id: SessionId,
    pub config: StreamConfig,
    pub minicap_info: Option<MinicapInfo>,
    pub started_at: Instant,
    pub last_frame_at: Option<Instant>,
}

impl StreamSessionInfo {
    pub fn new(
        device_id: DeviceId,
        worker_id: WorkerId,
        session_id: SessionId,
        config: StreamConfig,
        minicap_info: Option<MinicapInfo>,
        now: Instant,
    ) -> Self {
        Self { device_id, worker_id, session_id, config, minicap_info, started_at: now, last_frame_at: None }
    }
}

#[cfg(test)]
mod tests {
    use super::Frame;
    use serde_json;

    #[test]
    fn frame_data_roundtrips_through_base64_json() {
        for data in [&b""[..], b"a", b"ab", b"abc", b"abcd", b"\x00\xff\x10\x20\x30"] {
            let frame = Frame {
                frame_number: 1,
                timestamp: 0,
                width: 1,
                height: 1,
                format: "jpeg".to_string(),
                data: data.to_vec(),
                size: data.len(),
            };
            let json = serde_json::to_value(&frame).expect("serialize");
            let back: Frame = serde_json::from_value(json).expect("deserialize");
            assert_eq!(back.data, data, "roundtrip failed for {:?}", data);
            assert_eq!(frame.data_base64(), back.data_base64());
        }
    }
}
