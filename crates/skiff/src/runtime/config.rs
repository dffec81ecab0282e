//! Container creation parameters and registry settings.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use skiff_common::resource::{deserialize_cpu, deserialize_memory};
use skiff_common::{SkiffError, SkiffResult};

/// Memory given to containers whose config does not set any (256 MiB).
pub const DEFAULT_MEMORY_BYTES: u64 = 256 * 1024 * 1024;

/// Largest accepted `event-buffer`. The watch channel allocates every slot up front.
pub const MAX_EVENT_BUFFER: usize = 1 << 16;

/// Restart policy carried through to whoever supervises the container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Never restart.
    #[default]
    No,
    /// Always restart.
    Always,
    /// Restart only after a failure.
    OnFailure,
    /// Restart unless explicitly stopped.
    UnlessStopped,
}

/// Parameters for creating a container.
///
/// Only `name`, `image`, `cpu`, `memory`, `environment`, the first port,
/// `labels` and `restart_policy` end up on the container. Volumes and
/// networks are accepted for collaborators outside the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ContainerConfig {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// CPU cores (fractional).
    #[serde(deserialize_with = "deserialize_cpu")]
    pub cpu: f64,
    /// Memory in bytes.
    #[serde(deserialize_with = "deserialize_memory")]
    pub memory: u64,
    /// Environment variables.
    pub environment: HashMap<String, String>,
    /// Requested ports.
    pub ports: Vec<u16>,
    /// Volume specifications.
    pub volumes: Vec<String>,
    /// Networks to join.
    pub networks: Vec<String>,
    /// Free-form labels.
    pub labels: HashMap<String, String>,
    /// Restart policy.
    pub restart_policy: RestartPolicy,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            image: String::new(),
            cpu: 1.0,
            memory: DEFAULT_MEMORY_BYTES,
            environment: HashMap::new(),
            ports: Vec::new(),
            volumes: Vec::new(),
            networks: Vec::new(),
            labels: HashMap::new(),
            restart_policy: RestartPolicy::No,
        }
    }
}

impl ContainerConfig {
    /// Create a config with default resources.
    #[must_use]
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Self::default()
        }
    }

    /// Parse a config from TOML.
    pub fn from_toml_str(s: &str) -> SkiffResult<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Set the CPU cores.
    #[must_use]
    pub fn with_cpu(mut self, cpu: f64) -> Self {
        self.cpu = cpu;
        self
    }

    /// Set the memory in bytes.
    #[must_use]
    pub fn with_memory(mut self, memory: u64) -> Self {
        self.memory = memory;
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Add a port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.ports.push(port);
        self
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Set the restart policy.
    #[must_use]
    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    /// Check the fields the registry relies on.
    pub fn validate(&self) -> SkiffResult<()> {
        if self.name.trim().is_empty() {
            return Err(SkiffError::invalid_argument("container name must not be empty"));
        }
        if !self.cpu.is_finite() || self.cpu <= 0.0 {
            return Err(SkiffError::invalid_argument(format!(
                "cpu must be greater than zero, got {}",
                self.cpu
            )));
        }
        if self.memory == 0 {
            return Err(SkiffError::invalid_argument(
                "memory must be greater than zero",
            ));
        }
        if self.environment.keys().any(String::is_empty) {
            return Err(SkiffError::invalid_argument(
                "environment variable names must not be empty",
            ));
        }
        Ok(())
    }
}

/// Registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RegistryConfig {
    /// Maximum number of containers tracked at once.
    pub capacity: usize,
    /// Buffer size of the broadcast channel behind `watch()`.
    pub event_buffer: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            event_buffer: 1024,
        }
    }
}

impl RegistryConfig {
    /// Set the capacity.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the event buffer size.
    #[must_use]
    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer;
        self
    }

    /// Parse settings from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> SkiffResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load settings from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> SkiffResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        tracing::debug!(path = %path.display(), "Loaded registry config");

        Self::from_toml_str(&contents)
    }

    /// Reject settings the registry cannot work with.
    pub fn validate(&self) -> SkiffResult<()> {
        if self.capacity == 0 {
            return Err(SkiffError::Config {
                message: "capacity must be at least 1".to_string(),
            });
        }
        if self.event_buffer == 0 || self.event_buffer > MAX_EVENT_BUFFER {
            return Err(SkiffError::Config {
                message: format!(
                    "event-buffer must be between 1 and {MAX_EVENT_BUFFER}, got {}",
                    self.event_buffer
                ),
            });
        }
        Ok(())
    }
}
