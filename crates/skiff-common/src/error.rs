//! Common error types for Skiff.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`SkiffError`].
pub type SkiffResult<T> = Result<T, SkiffError>;

/// Errors returned by registry and container operations.
///
/// Every variant is recoverable: an operation that fails leaves the
/// registry exactly as it found it.
#[derive(Error, Diagnostic, Debug)]
pub enum SkiffError {
    /// Malformed caller input.
    #[error("Invalid argument: {message}")]
    #[diagnostic(code(skiff::invalid_argument))]
    InvalidArgument {
        /// What was wrong with the input.
        message: String,
    },

    /// No container with this ID is tracked.
    #[error("Container not found: {id}")]
    #[diagnostic(code(skiff::container::not_found))]
    NotFound {
        /// The container ID that was not found.
        id: String,
    },

    /// The registry already tracks as many containers as it may.
    #[error("Registry is full: capacity of {capacity} containers reached")]
    #[diagnostic(
        code(skiff::registry::capacity_exceeded),
        help("Remove stopped containers or raise the registry capacity")
    )]
    CapacityExceeded {
        /// The configured capacity.
        capacity: usize,
    },

    /// The requested lifecycle move is not allowed from the current status.
    #[error("Invalid transition from {from} to {to}")]
    #[diagnostic(code(skiff::container::invalid_transition))]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// Invalid container ID format.
    #[error("Invalid container ID: {id}")]
    #[diagnostic(
        code(skiff::container::invalid_id),
        help("Container IDs must be alphanumeric with hyphens and underscores, 1-64 characters")
    )]
    InvalidContainerId {
        /// The invalid container ID.
        id: String,
    },

    /// Invalid resource quantity format.
    #[error("Invalid resource quantity: {value}")]
    #[diagnostic(
        code(skiff::resource::invalid_quantity),
        help("Use '500m' or '0.5' for CPU and '512Mi', '1G' or a byte count for memory")
    )]
    InvalidResourceQuantity {
        /// The invalid value.
        value: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(skiff::io))]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(skiff::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(skiff::internal),
        help("This is a bug in the registry bookkeeping, please report it")
    )]
    Internal {
        /// The error message.
        message: String,
    },
}

impl SkiffError {
    /// Shorthand for [`SkiffError::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Shorthand for [`SkiffError::NotFound`].
    pub fn not_found(id: impl ToString) -> Self {
        Self::NotFound { id: id.to_string() }
    }

    /// Shorthand for [`SkiffError::InvalidTransition`].
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl From<toml::de::Error> for SkiffError {
    fn from(err: toml::de::Error) -> Self {
        SkiffError::Config {
            message: err.to_string(),
        }
    }
}
