// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Wire protocol for Manager<->Worker and Manager<->Viewer connections.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.

mod framing;
mod protocol;

pub use framing::{decode, encode, read_json, read_message, write_json, write_message, WireError, MAX_MESSAGE_BYTES};
pub use protocol::{
    HeartbeatDevice, HeartbeatMetrics, ManagerCommand, RetrySpec, ScreenMessage, ViewerMessage,
    WorkerEvent,
};

#[cfg(test)]
mod property_tests;
