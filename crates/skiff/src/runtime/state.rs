//! Container status values and the transition table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use skiff_common::{SkiffError, SkiffResult};

/// Container status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// Container has been created but never started.
    Created,
    /// Container start is in progress.
    Starting,
    /// Container is running.
    Running,
    /// Container stop is in progress.
    Stopping,
    /// Container has stopped.
    Stopped,
    /// Container hit an unrecoverable fault.
    Failed,
    /// Container has been removed. Terminal.
    Removed,
}

impl ContainerStatus {
    /// Every status, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Created,
        Self::Starting,
        Self::Running,
        Self::Stopping,
        Self::Stopped,
        Self::Failed,
        Self::Removed,
    ];

    /// Returns true if the lifecycle allows moving from `self` to `to`.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (
                Self::Created | Self::Stopped,
                Self::Starting | Self::Running | Self::Removed
            ) | (Self::Starting, Self::Running)
                | (Self::Running, Self::Stopping | Self::Stopped)
                | (Self::Stopping, Self::Stopped)
                | (Self::Failed, Self::Removed)
                | (
                    Self::Created
                        | Self::Starting
                        | Self::Running
                        | Self::Stopping
                        | Self::Stopped,
                    Self::Failed
                )
        )
    }

    /// Check a move against the transition table.
    pub fn validate_transition(self, to: Self) -> SkiffResult<()> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(SkiffError::invalid_transition(self, to))
        }
    }

    /// Returns true if the container is in a running state.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Lowercase name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerStatus {
    type Err = SkiffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| SkiffError::invalid_argument(format!("unknown container status '{s}'")))
    }
}
