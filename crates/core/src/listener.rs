// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-component listener list, used instead of a global event bus
//! (SPEC_FULL.md §9, "Global-mutable singletons in source").

use crate::event::Event;
use std::sync::Arc;

/// Something that wants to observe a component's emitted events.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &Event);
}

impl<F: Fn(&Event) + Send + Sync> EventListener for F {
    fn on_event(&self, event: &Event) {
        self(event)
    }
}

/// A small, append-only list of listeners a component notifies synchronously.
///
/// Notification happens outside any lock the emitting component holds
/// (SPEC_FULL.md §5); listeners must not call back into the emitting
/// component's public API on the same thread.
#[derive(Clone, Default)]
pub struct Listeners {
    inner: Arc<parking_lot::Mutex<Vec<Arc<dyn EventListener>>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn EventListener>) {
        self.inner.lock().push(listener);
    }

    pub fn notify(&self, event: &Event) {
        for listener in self.inner.lock().iter() {
            listener.on_event(event);
        }
    }
}
