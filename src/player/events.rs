//! Playback lifecycle events and their handler registry.
//!
//! Handlers run synchronously on the thread that triggers the event (the
//! streaming thread for playback events). A panicking handler is caught and
//! logged; it neither aborts dispatch to the remaining handlers nor unwinds
//! into the caller.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;

/// Kinds of events a handler can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A track finished and playback either moved on or stopped.
    Complete,
    /// Loudness of the chunk just played.
    Level,
    /// Playback position moved (by playing or by seeking).
    PositionChange,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::Complete,
        EventKind::Level,
        EventKind::PositionChange,
    ];

    fn index(self) -> usize {
        match self {
            EventKind::Complete => 0,
            EventKind::Level => 1,
            EventKind::PositionChange => 2,
        }
    }
}

/// An event with its payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerEvent {
    Complete,
    /// Mean absolute sample value of the last chunk.
    Level(f32),
    /// Position in seconds.
    PositionChange(f64),
}

impl PlayerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PlayerEvent::Complete => EventKind::Complete,
            PlayerEvent::Level(_) => EventKind::Level,
            PlayerEvent::PositionChange(_) => EventKind::PositionChange,
        }
    }
}

/// Registered event callback.
pub type EventHandler = Arc<dyn Fn(&PlayerEvent) + Send + Sync + 'static>;

/// A handler that panicked during dispatch.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?} handler #{index} panicked: {message}")]
pub struct HandlerError {
    pub kind: EventKind,
    /// Registration index of the handler within its kind.
    pub index: usize,
    pub message: String,
}

/// Ordered handler lists for every [`EventKind`].
///
/// Every kind has its list from construction; lists only grow.
pub struct EventBus {
    handlers: RwLock<[Vec<EventHandler>; 3]>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new([Vec::new(), Vec::new(), Vec::new()]),
        }
    }

    /// Register `handler` for `kind`. Handlers run in registration order.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&PlayerEvent) + Send + Sync + 'static,
    {
        self.handlers.write()[kind.index()].push(Arc::new(handler));
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.read()[kind.index()].len()
    }

    /// Invoke every handler registered for the event's kind.
    ///
    /// Returns the handlers that panicked; each one has already been logged.
    pub fn trigger(&self, event: PlayerEvent) -> Vec<HandlerError> {
        let kind = event.kind();
        // Snapshot so handlers may register more handlers or call back into the player.
        let handlers: Vec<EventHandler> = self.handlers.read()[kind.index()].clone();

        let mut failures = Vec::new();
        for (index, handler) in handlers.iter().enumerate() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                let failure = HandlerError {
                    kind,
                    index,
                    message: panic_message(payload.as_ref()),
                };
                tracing::error!(error = %failure, "event handler failed");
                failures.push(failure);
            }
        }
        failures
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
