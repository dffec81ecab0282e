//! # Skiff
//!
//! Skiff is the lifecycle-and-registry core of a container runtime: a
//! thread-safe registry that creates, starts, stops and removes containers,
//! enforces a capacity limit and a closed status machine, and notifies
//! observers of every change.
//!
//! ## Usage
//!
//! ```
//! use skiff::runtime::{ContainerConfig, ContainerRegistry, ContainerView, EventKind, HandlerError};
//!
//! # fn example() -> skiff::SkiffResult<()> {
//! let registry = ContainerRegistry::with_capacity(2)?;
//!
//! registry.subscribe(|kind: EventKind, c: &ContainerView| -> Result<(), HandlerError> {
//!     println!("{kind}: {}", c.name);
//!     Ok(())
//! });
//!
//! let web = registry.create(ContainerConfig::new("web", "nginx:latest"))?.value;
//! registry.start(&web.id)?;
//! assert_eq!(registry.stats().running_count, 1);
//!
//! registry.stop(&web.id)?;
//! registry.remove(&web.id)?;
//! assert!(registry.is_empty());
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

#![warn(missing_docs)]

pub mod runtime;

pub use runtime::{ContainerConfig, ContainerRegistry, ContainerView};
pub use skiff_common::{ContainerId, SkiffError, SkiffResult};
