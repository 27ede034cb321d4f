//! Injectable event sinks for observability.
//!
//! Components record structured events through an [`EventSink`] handed to
//! them at construction, so nothing in the library touches process-wide
//! logging state. [`TracingSink`] forwards to `tracing` and [`RecordingSink`]
//! keeps events in memory for assertions.

use std::sync::Mutex;

/// Severity attached to an event when it is forwarded to a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// An event that knows how it should be logged.
pub trait Observable: std::fmt::Debug {
    fn level(&self) -> EventLevel;
    fn message(&self) -> String;
}

/// Destination for structured events.
pub trait EventSink<E>: Send + Sync {
    fn record(&self, event: E);
}

// ---------------------------------------------------------------------------
// TracingSink
// ---------------------------------------------------------------------------

/// Forwards every event to the `tracing` macros at the event's level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl<E: Observable> EventSink<E> for TracingSink {
    fn record(&self, event: E) {
        let message = event.message();
        match event.level() {
            EventLevel::Debug => tracing::debug!(event = ?event, "{message}"),
            EventLevel::Info => tracing::info!(event = ?event, "{message}"),
            EventLevel::Warn => tracing::warn!(event = ?event, "{message}"),
            EventLevel::Error => tracing::error!(event = ?event, "{message}"),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Keeps every recorded event in memory.
pub struct RecordingSink<E> {
    events: Mutex<Vec<E>>,
}

impl<E: Clone> RecordingSink<E> {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the events recorded so far, in order.
    pub fn events(&self) -> Vec<E> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Clone> Default for RecordingSink<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + Send> EventSink<E> for RecordingSink<E> {
    fn record(&self, event: E) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}
