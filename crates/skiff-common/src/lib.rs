//! # skiff-common
//!
//! Shared types for the Skiff container registry:
//! - Container ID validation and generation
//! - Resource quantity parsing
//! - Common error types

#![warn(missing_docs)]

pub mod error;
pub mod id;
pub mod resource;

pub use error::{SkiffError, SkiffResult};
pub use id::{ContainerId, IdGenerator};
pub use resource::{parse_cpu, parse_memory};
