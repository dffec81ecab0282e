//! Container entity and its read-only view.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skiff_common::{ContainerId, SkiffError, SkiffResult};

use super::config::{ContainerConfig, RestartPolicy};
use super::state::ContainerStatus;

/// A container tracked by the registry.
///
/// Containers are only ever constructed and mutated by
/// [`ContainerRegistry`](super::ContainerRegistry); callers see
/// [`ContainerView`] copies.
#[derive(Debug, Clone)]
pub struct Container {
    id: ContainerId,
    name: String,
    image: String,
    status: ContainerStatus,
    is_running: bool,
    created_at: DateTime<Utc>,
    start_time: Option<DateTime<Utc>>,
    cpu: f64,
    memory: u64,
    environment: HashMap<String, String>,
    port: Option<u16>,
    labels: HashMap<String, String>,
    restart_policy: RestartPolicy,
}

/// Immutable snapshot of a container's observable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerView {
    /// Container ID.
    pub id: ContainerId,
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Lifecycle status.
    pub status: ContainerStatus,
    /// Whether the container is running.
    pub is_running: bool,
    /// When the registry created the container.
    pub created_at: DateTime<Utc>,
    /// When the container last entered `running`.
    pub start_time: Option<DateTime<Utc>>,
    /// CPU cores.
    pub cpu: f64,
    /// Memory in bytes.
    pub memory: u64,
    /// Environment variables.
    pub environment: HashMap<String, String>,
    /// Assigned port, if any.
    pub port: Option<u16>,
    /// Labels from the creation config.
    pub labels: HashMap<String, String>,
    /// Restart policy from the creation config.
    pub restart_policy: RestartPolicy,
}

impl Container {
    /// Build a container in `created` state from a validated config.
    pub(crate) fn new(id: ContainerId, config: ContainerConfig) -> Self {
        Self {
            id,
            name: config.name,
            image: config.image,
            status: ContainerStatus::Created,
            is_running: false,
            created_at: Utc::now(),
            start_time: None,
            cpu: config.cpu,
            memory: config.memory,
            environment: config.environment,
            port: config.ports.first().copied().filter(|&port| port != 0),
            labels: config.labels,
            restart_policy: config.restart_policy,
        }
    }

    /// ID accessor.
    #[must_use]
    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    /// Get the container status.
    #[must_use]
    pub fn status(&self) -> ContainerStatus {
        self.status
    }

    /// Whether the container is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.is_running
    }

    /// Move to `to`, keeping `is_running` and `start_time` in step.
    pub fn transition_to(&mut self, to: ContainerStatus) -> SkiffResult<()> {
        self.status.validate_transition(to)?;

        self.status = to;
        self.is_running = to.is_running();
        if to == ContainerStatus::Running {
            self.start_time = Some(Utc::now());
        }

        Ok(())
    }

    /// Move to the status named by `name`, e.g. `"running"`.
    ///
    /// Empty or unknown names are reported as invalid transitions.
    pub fn transition_to_named(&mut self, name: &str) -> SkiffResult<()> {
        let to = name
            .parse::<ContainerStatus>()
            .map_err(|_| SkiffError::invalid_transition(self.status, name))?;
        self.transition_to(to)
    }

    /// Insert or overwrite an environment variable.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) -> SkiffResult<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(SkiffError::invalid_argument(
                "environment variable name must not be empty",
            ));
        }
        self.environment.insert(key, value.into());
        Ok(())
    }

    /// Multiply the CPU and memory shape in place.
    ///
    /// Memory is rounded to whole bytes and never drops below one byte. A
    /// memory multiplier of exactly `1.0` leaves the byte count untouched.
    /// Nothing changes if either result does not fit.
    pub fn rescale(&mut self, cpu_multiplier: f64, memory_multiplier: f64) -> SkiffResult<()> {
        for (what, multiplier) in [("cpu", cpu_multiplier), ("memory", memory_multiplier)] {
            if !multiplier.is_finite() || multiplier <= 0.0 {
                return Err(SkiffError::invalid_argument(format!(
                    "{what} multiplier must be a positive number, got {multiplier}"
                )));
            }
        }

        let cpu = self.cpu * cpu_multiplier;
        if !cpu.is_finite() || cpu <= 0.0 {
            return Err(SkiffError::invalid_argument(format!(
                "rescaling {} cores by {cpu_multiplier} leaves no usable cpu",
                self.cpu
            )));
        }

        #[allow(clippy::float_cmp)]
        let memory = if memory_multiplier == 1.0 {
            self.memory
        } else {
            let scaled = (self.memory as f64 * memory_multiplier).round();
            // u64::MAX rounds up to 2^64 as f64, the first value that does not fit.
            if scaled >= u64::MAX as f64 {
                return Err(SkiffError::invalid_argument(format!(
                    "rescaling {} bytes by {memory_multiplier} overflows memory",
                    self.memory
                )));
            }
            scaled.max(1.0) as u64
        };

        self.cpu = cpu;
        self.memory = memory;
        Ok(())
    }

    /// Snapshot the observable fields.
    #[must_use]
    pub fn view(&self) -> ContainerView {
        ContainerView {
            id: self.id.clone(),
            name: self.name.clone(),
            image: self.image.clone(),
            status: self.status,
            is_running: self.is_running,
            created_at: self.created_at,
            start_time: self.start_time,
            cpu: self.cpu,
            memory: self.memory,
            environment: self.environment.clone(),
            port: self.port,
            labels: self.labels.clone(),
            restart_policy: self.restart_policy,
        }
    }
}
