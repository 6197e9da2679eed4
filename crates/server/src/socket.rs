// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete `WorkerHandle`/`ViewerHandle` backing a live TCP connection.
//!
//! `send` is synchronous and non-blocking (SPEC_FULL.md §9, "Sockets as
//! opaque handles"): it only pushes onto an unbounded channel. A dedicated
//! writer task owns the socket's write half and drains the channel,
//! matching the `mpsc`-fan-out-to-a-single-writer shape the teacher uses
//! for its WebSocket bridge (`oj-adapters::agent::coop::ws::event_bridge`).

use manager_core::{SendError, ViewerHandle, WorkerHandle};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tracing::warn;

pub struct SocketHandle {
    sender: mpsc::UnboundedSender<Vec<u8>>,
}

impl SocketHandle {
    pub fn new(sender: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { sender }
    }
}

impl WorkerHandle for SocketHandle {
    fn send(&self, payload: Vec<u8>) -> Result<(), SendError> {
        self.sender.send(payload).map_err(|_| SendError("connection closed".to_string()))
    }
}

impl ViewerHandle for SocketHandle {
    fn send(&self, payload: Vec<u8>) -> Result<(), SendError> {
        self.sender.send(payload).map_err(|_| SendError("connection closed".to_string()))
    }
}

/// Drains `rx` onto `writer`, one already-framed message at a time, until
/// the channel closes or a write fails.
pub async fn run_writer<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(payload) = rx.recv().await {
        if let Err(e) = manager_wire::write_message(&mut writer, &payload).await {
            warn!(error = %e, "failed to write outbound message, closing connection");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writer_forwards_every_queued_message_in_order() {
        let (mut client, server) = tokio::io::duplex(256);
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(b"one".to_vec()).expect("send");
        tx.send(b"two".to_vec()).expect("send");
        drop(tx);

        run_writer(server, rx).await;

        let first = manager_wire::read_message(&mut client).await.expect("read");
        let second = manager_wire::read_message(&mut client).await.expect("read");
        assert_eq!(first, b"one");
        assert_eq!(second, b"two");
    }

    #[test]
    fn handle_send_fails_once_receiver_is_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = SocketHandle::new(tx);
        assert!(WorkerHandle::send(&handle, vec![1, 2, 3]).is_err());
    }
}
