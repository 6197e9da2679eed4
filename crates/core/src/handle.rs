// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque socket handle abstraction (SPEC_FULL.md §9, "Sockets as opaque
//! handles"). Components hold a `WorkerHandle`/`ViewerHandle` rather than a
//! concrete transport type, so `manager-registry`/`manager-dispatcher`/
//! `manager-stream` never need to know about TCP or WebSockets.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendError(pub String);

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "send failed: {}", self.0)
    }
}

impl std::error::Error for SendError {}

/// A capability to push one already-encoded wire message to a Worker.
pub trait WorkerHandle: Send + Sync {
    fn send(&self, payload: Vec<u8>) -> Result<(), SendError>;
}

/// A capability to push one already-encoded wire message to a viewer.
pub trait ViewerHandle: Send + Sync {
    fn send(&self, payload: Vec<u8>) -> Result<(), SendError>;
}
