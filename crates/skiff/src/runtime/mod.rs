//! Container lifecycle core.
//!
//! This module provides the container entity, its status machine, the event
//! bus and the registry that ties them together.

mod config;
mod container;
pub mod events;
mod registry;
mod state;

pub use config::{
    ContainerConfig, DEFAULT_MEMORY_BYTES, MAX_EVENT_BUFFER, RegistryConfig, RestartPolicy,
};
pub use container::{Container, ContainerView};
pub use events::{
    ContainerEvent, EventBus, EventHandler, EventKind, HandlerError, HandlerId, HandlerWarning,
};
pub use registry::{ContainerRegistry, Outcome, RegistryStats};
pub use state::ContainerStatus;
