//! Lifecycle events and the bus that delivers them.
//!
//! Handlers run synchronously on the thread that performed the registry
//! operation, in subscription order. Each handler gets its own copy of the
//! container view. A handler that returns an error or panics is recorded as
//! a [`HandlerWarning`]; the remaining handlers still run.
//!
//! Asynchronous consumers can [`watch`](EventBus::watch) the same stream
//! through a broadcast channel instead.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use skiff_common::ContainerId;
use thiserror::Error;
use tokio::sync::broadcast;

use super::container::ContainerView;

/// Kinds of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Container created.
    Created,
    /// Container started.
    Started,
    /// Container stopped.
    Stopped,
    /// Container failed.
    Failed,
    /// Container removed.
    Removed,
}

impl EventKind {
    /// Lowercase event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event as seen by `watch()` receivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerEvent {
    /// What happened.
    pub kind: EventKind,
    /// The container right after it happened.
    pub container: ContainerView,
    /// When the event was published.
    pub timestamp: DateTime<Utc>,
}

/// Error type handlers may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives lifecycle events.
pub trait EventHandler: Send + Sync {
    /// Handle one event.
    fn handle(&self, kind: EventKind, container: &ContainerView) -> Result<(), HandlerError>;
}

impl<F> EventHandler for F
where
    F: Fn(EventKind, &ContainerView) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, kind: EventKind, container: &ContainerView) -> Result<(), HandlerError> {
        self(kind, container)
    }
}

/// Position of a handler in the bus, assigned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerId(pub usize);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A handler failure, reported alongside a successful operation.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
#[error("event handler {handler} failed on {event} for container {container_id}: {message}")]
#[diagnostic(code(skiff::events::handler_failed), severity(Warning))]
pub struct HandlerWarning {
    /// Which handler failed.
    pub handler: HandlerId,
    /// The event being delivered.
    pub event: EventKind,
    /// The container the event was about.
    pub container_id: ContainerId,
    /// Error or panic message.
    pub message: String,
}

/// Event bus for lifecycle events.
#[derive(Clone)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
    sender: broadcast::Sender<ContainerEvent>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .field("watchers", &self.sender.receiver_count())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus {
    /// Create a bus whose watch channel buffers `capacity` events.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
            sender,
        }
    }

    /// Append a handler. Handlers are called in the order they subscribed.
    pub fn subscribe(&self, handler: impl EventHandler + 'static) -> HandlerId {
        let mut handlers = self.handlers.write();
        handlers.push(Arc::new(handler));
        HandlerId(handlers.len() - 1)
    }

    /// Receive every published event asynchronously.
    #[must_use]
    pub fn watch(&self) -> broadcast::Receiver<ContainerEvent> {
        self.sender.subscribe()
    }

    /// Number of subscribed handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Deliver an event to every handler, then to watchers.
    ///
    /// Returns one warning per handler that failed.
    pub fn publish(&self, kind: EventKind, container: &ContainerView) -> Vec<HandlerWarning> {
        // Snapshot the list so handlers may subscribe or call back into the registry.
        let handlers: Vec<_> = self.handlers.read().clone();
        let mut warnings = Vec::new();

        for (index, handler) in handlers.iter().enumerate() {
            let payload = container.clone();
            let result = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(kind, &payload)));

            let message = match result {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(panic) => format!("handler panicked: {}", panic_message(panic.as_ref())),
            };

            tracing::warn!(
                handler = index,
                event = %kind,
                container_id = %container.id,
                error = %message,
                "Event handler failed"
            );

            warnings.push(HandlerWarning {
                handler: HandlerId(index),
                event: kind,
                container_id: container.id.clone(),
                message,
            });
        }

        // Ignore SendError (no watchers)
        let _ = self.sender.send(ContainerEvent {
            kind,
            container: container.clone(),
            timestamp: Utc::now(),
        });

        warnings
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
