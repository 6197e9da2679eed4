// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifiers. Every id in this system is supplied by a remote peer at
//! registration or dispatch time, never generated locally.

crate::external_id! {
    /// Identifies a Worker connection for the lifetime of its registration.
    WorkerId
}

crate::external_id! {
    /// Identifies a physical or virtual device a Worker manages.
    DeviceId
}

crate::external_id! {
    /// Identifies a dispatched Job.
    JobId
}

crate::external_id! {
    /// Identifies a viewer connection subscribed to a device's stream.
    ViewerId
}

crate::external_id! {
    /// Identifies a Worker-originated stream session for one device.
    SessionId
}
