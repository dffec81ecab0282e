//! Container ID generation and validation.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{SkiffError, SkiffResult};

/// A validated container ID.
///
/// Container IDs must:
/// - Be 1-64 characters long
/// - Contain only alphanumeric characters, hyphens, and underscores
/// - Start with an alphanumeric character
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Maximum length of a container ID.
    pub const MAX_LENGTH: usize = 64;

    /// Create a container ID from text, validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the ID format is invalid.
    pub fn new(id: impl Into<String>) -> SkiffResult<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Get the container ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short version of the ID (first 12 characters).
    #[must_use]
    pub fn short(&self) -> &str {
        if self.0.len() <= 12 {
            &self.0
        } else {
            &self.0[..12]
        }
    }

    fn validate(id: &str) -> SkiffResult<()> {
        let invalid = || SkiffError::InvalidContainerId { id: id.to_string() };

        if id.is_empty() || id.len() > Self::MAX_LENGTH {
            return Err(invalid());
        }

        let mut chars = id.chars();
        if !chars.next().is_some_and(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid());
        }

        if chars.any(|c| !c.is_ascii_alphanumeric() && c != '-' && c != '_') {
            return Err(invalid());
        }

        Ok(())
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContainerId {
    type Err = SkiffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ContainerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Source of fresh container IDs.
///
/// Each ID is 128 random bits (UUID v4, hex encoded) followed by a
/// monotonically increasing sequence number, so two IDs from the same
/// generator can never collide even if the random part does.
#[derive(Debug, Default)]
pub struct IdGenerator {
    sequence: AtomicU64,
}

impl IdGenerator {
    /// Create a generator starting at sequence zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the next ID.
    pub fn next_id(&self) -> ContainerId {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let random = hex::encode(uuid::Uuid::new_v4().as_bytes());
        ContainerId(format!("{random}-{seq:x}"))
    }

    /// Number of IDs handed out so far.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}
