//! The container registry.
//!
//! All bookkeeping lives behind a single [`RwLock`]. Mutations validate,
//! apply, update counters and count the event inside one write-locked
//! section, then release the lock before handlers run, so a handler may call
//! back into the registry.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use skiff_common::{ContainerId, IdGenerator, SkiffError, SkiffResult};
use tokio::sync::broadcast;

use super::config::{ContainerConfig, RegistryConfig};
use super::container::{Container, ContainerView};
use super::events::{ContainerEvent, EventBus, EventHandler, EventKind, HandlerId, HandlerWarning};
use super::state::ContainerStatus;

/// Result of a successful operation plus any handler failures it caused.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    /// The operation's result.
    pub value: T,
    /// Handlers that failed while the event was delivered.
    pub warnings: Vec<HandlerWarning>,
}

impl<T> Outcome<T> {
    /// Returns true if every handler succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Drop the warnings and keep the value.
    pub fn into_value(self) -> T {
        self.value
    }
}

/// Aggregate registry counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Containers created over the registry's lifetime.
    pub total_created: u64,
    /// Containers currently running.
    pub running_count: usize,
    /// Containers currently tracked.
    pub tracked: usize,
    /// Maximum containers tracked at once.
    pub capacity: usize,
    /// Events emitted, per kind.
    pub event_counts: BTreeMap<EventKind, u64>,
}

impl RegistryStats {
    /// Number of events of `kind` emitted so far.
    #[must_use]
    pub fn events(&self, kind: EventKind) -> u64 {
        self.event_counts.get(&kind).copied().unwrap_or(0)
    }
}

#[derive(Debug)]
struct RegistryState {
    containers: BTreeMap<ContainerId, Container>,
    total_created: u64,
    running_count: usize,
    event_counts: BTreeMap<EventKind, u64>,
    last_mutation_at: DateTime<Utc>,
}

impl RegistryState {
    fn touch(&mut self) {
        self.last_mutation_at = Utc::now();
    }

    fn record(&mut self, kind: EventKind) {
        *self.event_counts.entry(kind).or_insert(0) += 1;
        self.touch();
    }

    fn adjust_running(&mut self, was_running: bool, is_running: bool) {
        match (was_running, is_running) {
            (false, true) => self.running_count += 1,
            (true, false) => self.running_count -= 1,
            _ => {}
        }
    }
}

/// Owns every container and serializes changes to them.
#[derive(Debug)]
pub struct ContainerRegistry {
    config: RegistryConfig,
    state: RwLock<RegistryState>,
    ids: IdGenerator,
    events: EventBus,
    created_at: DateTime<Utc>,
}

impl ContainerRegistry {
    /// Create an empty registry.
    pub fn new(config: RegistryConfig) -> SkiffResult<Self> {
        config.validate()?;

        let now = Utc::now();
        tracing::debug!(capacity = config.capacity, "Creating container registry");

        Ok(Self {
            events: EventBus::new(config.event_buffer),
            config,
            state: RwLock::new(RegistryState {
                containers: BTreeMap::new(),
                total_created: 0,
                running_count: 0,
                event_counts: BTreeMap::new(),
                last_mutation_at: now,
            }),
            ids: IdGenerator::new(),
            created_at: now,
        })
    }

    /// Create an empty registry with default settings and the given capacity.
    pub fn with_capacity(capacity: usize) -> SkiffResult<Self> {
        Self::new(RegistryConfig::default().with_capacity(capacity))
    }

    /// Register a handler for lifecycle events.
    pub fn subscribe(&self, handler: impl EventHandler + 'static) -> HandlerId {
        self.events.subscribe(handler)
    }

    /// Receive lifecycle events through a broadcast channel.
    #[must_use]
    pub fn watch(&self) -> broadcast::Receiver<ContainerEvent> {
        self.events.watch()
    }

    /// Create a container in `created` state.
    pub fn create(&self, config: ContainerConfig) -> SkiffResult<Outcome<ContainerView>> {
        config.validate()?;

        let view = {
            let mut state = self.state.write();

            if state.containers.len() >= self.config.capacity {
                tracing::warn!(
                    capacity = self.config.capacity,
                    name = %config.name,
                    "Registry full, refusing to create container"
                );
                return Err(SkiffError::CapacityExceeded {
                    capacity: self.config.capacity,
                });
            }

            let id = self.ids.next_id();
            let container = Container::new(id.clone(), config);
            let view = container.view();

            state.containers.insert(id, container);
            state.total_created += 1;
            state.record(EventKind::Created);
            view
        };

        tracing::info!(
            container_id = %view.id.short(),
            name = %view.name,
            image = %view.image,
            "Created container"
        );

        Ok(self.publish(EventKind::Created, view))
    }

    /// Start a created or stopped container.
    pub fn start(&self, id: &ContainerId) -> SkiffResult<Outcome<ContainerView>> {
        self.transition(id, ContainerStatus::Running, EventKind::Started)
    }

    /// Stop a running container.
    pub fn stop(&self, id: &ContainerId) -> SkiffResult<Outcome<ContainerView>> {
        self.transition(id, ContainerStatus::Stopped, EventKind::Stopped)
    }

    /// Mark a container as failed after an unrecoverable fault.
    pub fn fail(&self, id: &ContainerId) -> SkiffResult<Outcome<ContainerView>> {
        self.transition(id, ContainerStatus::Failed, EventKind::Failed)
    }

    /// Delete a container that is not running.
    ///
    /// The returned view is the container's final state, with status `removed`.
    pub fn remove(&self, id: &ContainerId) -> SkiffResult<Outcome<ContainerView>> {
        let view = {
            let mut state = self.state.write();

            let Entry::Occupied(mut entry) = state.containers.entry(id.clone()) else {
                return Err(SkiffError::not_found(id));
            };
            entry.get_mut().transition_to(ContainerStatus::Removed)?;
            let view = entry.remove().view();

            state.record(EventKind::Removed);
            view
        };

        tracing::info!(container_id = %id.short(), "Removed container");

        Ok(self.publish(EventKind::Removed, view))
    }

    /// Multiply a container's CPU and memory shape.
    pub fn rescale(
        &self,
        id: &ContainerId,
        cpu_multiplier: f64,
        memory_multiplier: f64,
    ) -> SkiffResult<ContainerView> {
        let view = self.update(id, |c| c.rescale(cpu_multiplier, memory_multiplier))?;

        tracing::info!(
            container_id = %id.short(),
            cpu = view.cpu,
            memory = view.memory,
            "Rescaled container"
        );

        Ok(view)
    }

    /// Insert or overwrite one environment variable on a container.
    pub fn set_env(
        &self,
        id: &ContainerId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> SkiffResult<ContainerView> {
        let key = key.into();
        let view = self.update(id, |c| c.set_env(key.as_str(), value))?;

        tracing::debug!(
            container_id = %id.short(),
            key = %key,
            "Set container environment variable"
        );

        Ok(view)
    }

    /// Look up a container.
    pub fn get(&self, id: &ContainerId) -> SkiffResult<ContainerView> {
        self.state
            .read()
            .containers
            .get(id)
            .map(Container::view)
            .ok_or_else(|| SkiffError::not_found(id))
    }

    /// Look up a container by textual ID.
    pub fn get_str(&self, id: &str) -> SkiffResult<ContainerView> {
        self.get(&id.parse()?)
    }

    /// Every tracked container, in ID order.
    #[must_use]
    pub fn list(&self) -> Vec<ContainerView> {
        self.state.read().containers.values().map(Container::view).collect()
    }

    /// Every running container, in ID order.
    #[must_use]
    pub fn list_running(&self) -> Vec<ContainerView> {
        self.state
            .read()
            .containers
            .values()
            .filter(|c| c.is_running())
            .map(Container::view)
            .collect()
    }

    /// Copy of the aggregate counters.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        RegistryStats {
            total_created: state.total_created,
            running_count: state.running_count,
            tracked: state.containers.len(),
            capacity: self.config.capacity,
            event_counts: state.event_counts.clone(),
        }
    }

    /// Check that the counters agree with the tracked containers.
    pub fn verify_counts(&self) -> SkiffResult<()> {
        let state = self.state.read();

        let running = state.containers.values().filter(|c| c.is_running()).count();
        if running != state.running_count {
            return Err(SkiffError::Internal {
                message: format!(
                    "running count is {} but {running} containers are running",
                    state.running_count
                ),
            });
        }

        if state.containers.len() > self.config.capacity {
            return Err(SkiffError::Internal {
                message: format!(
                    "{} containers tracked with capacity {}",
                    state.containers.len(),
                    self.config.capacity
                ),
            });
        }

        if self.ids.issued() != state.total_created {
            return Err(SkiffError::Internal {
                message: format!(
                    "{} IDs issued but {} containers created",
                    self.ids.issued(),
                    state.total_created
                ),
            });
        }

        if let Some(c) = state
            .containers
            .values()
            .find(|c| c.is_running() != c.status().is_running())
        {
            return Err(SkiffError::Internal {
                message: format!(
                    "container {} has status {} but running flag {}",
                    c.id(),
                    c.status(),
                    c.is_running()
                ),
            });
        }

        Ok(())
    }

    /// Number of tracked containers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().containers.len()
    }

    /// Returns true if no containers are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum containers tracked at once.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// When the registry was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When a container was last created, changed or removed.
    #[must_use]
    pub fn last_mutation_at(&self) -> DateTime<Utc> {
        self.state.read().last_mutation_at
    }

    fn transition(
        &self,
        id: &ContainerId,
        to: ContainerStatus,
        event: EventKind,
    ) -> SkiffResult<Outcome<ContainerView>> {
        let (from, view) = {
            let mut guard = self.state.write();
            let state = &mut *guard;

            let container = state
                .containers
                .get_mut(id)
                .ok_or_else(|| SkiffError::not_found(id))?;

            let from = container.status();
            let was_running = container.is_running();
            container.transition_to(to)?;
            let view = container.view();

            state.adjust_running(was_running, view.is_running);
            state.record(event);
            (from, view)
        };

        tracing::info!(
            container_id = %id.short(),
            from = %from,
            to = %view.status,
            "Container status changed"
        );

        Ok(self.publish(event, view))
    }

    fn update(
        &self,
        id: &ContainerId,
        change: impl FnOnce(&mut Container) -> SkiffResult<()>,
    ) -> SkiffResult<ContainerView> {
        let mut state = self.state.write();

        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| SkiffError::not_found(id))?;
        change(container)?;
        let view = container.view();

        state.touch();
        Ok(view)
    }

    fn publish(&self, kind: EventKind, view: ContainerView) -> Outcome<ContainerView> {
        let warnings = self.events.publish(kind, &view);
        Outcome {
            value: view,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::events::HandlerError;

    fn registry(capacity: usize) -> ContainerRegistry {
        ContainerRegistry::with_capacity(capacity).unwrap()
    }

    fn create(registry: &ContainerRegistry, name: &str) -> ContainerId {
        registry
            .create(ContainerConfig::new(name, "alpine:3.19"))
            .unwrap()
            .into_value()
            .id
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = ContainerRegistry::with_capacity(0).unwrap_err();
        assert!(matches!(err, SkiffError::Config { .. }));
    }

    #[test]
    fn oversized_event_buffer_is_rejected() {
        let config = RegistryConfig::default().with_event_buffer(usize::MAX);
        let err = ContainerRegistry::new(config).unwrap_err();
        assert!(matches!(err, SkiffError::Config { .. }));
    }

    #[test]
    fn rescale_keeps_large_memory_exact_and_rejects_overflow() {
        let registry = registry(2);
        let huge = (1u64 << 60) + 1;
        let id = registry
            .create(ContainerConfig::new("big", "alpine").with_memory(huge))
            .unwrap()
            .into_value()
            .id;

        assert_eq!(registry.rescale(&id, 1.0, 1.0).unwrap().memory, huge);

        let stats = registry.stats();
        let last = registry.last_mutation_at();
        let err = registry.rescale(&id, 2.0, 32.0).unwrap_err();
        assert!(matches!(err, SkiffError::InvalidArgument { .. }));

        let view = registry.get(&id).unwrap();
        assert_eq!(view.memory, huge);
        assert_eq!(view.cpu, 1.0);
        assert_eq!(registry.stats(), stats);
        assert_eq!(registry.last_mutation_at(), last);
    }

    #[test]
    fn create_tracks_container() {
        let registry = registry(4);
        let before = registry.last_mutation_at();

        let outcome = registry
            .create(ContainerConfig::new("web", "nginx").with_env("PORT", "80"))
            .unwrap();
        assert!(outcome.is_clean());

        let view = outcome.value;
        assert_eq!(view.status, ContainerStatus::Created);
        assert!(!view.is_running);
        assert_eq!(view.environment["PORT"], "80");
        assert_eq!(registry.get(&view.id).unwrap(), view);
        assert_eq!(registry.len(), 1);
        assert!(registry.last_mutation_at() >= before);
        assert!(registry.created_at() <= registry.last_mutation_at());

        let stats = registry.stats();
        assert_eq!(stats.total_created, 1);
        assert_eq!(stats.events(EventKind::Created), 1);
    }

    #[test]
    fn create_rejects_bad_config() {
        let registry = registry(4);
        for config in [
            ContainerConfig::new("", "nginx"),
            ContainerConfig::new("web", "nginx").with_cpu(0.0),
            ContainerConfig::new("web", "nginx").with_memory(0),
        ] {
            let err = registry.create(config).unwrap_err();
            assert!(matches!(err, SkiffError::InvalidArgument { .. }));
        }
        assert!(registry.is_empty());
        assert_eq!(registry.stats().total_created, 0);
    }

    #[test]
    fn stop_decrements_running_count() {
        let registry = registry(2);
        let id = create(&registry, "web");

        registry.start(&id).unwrap();
        assert_eq!(registry.stats().running_count, 1);

        let stopped = registry.stop(&id).unwrap().into_value();
        assert_eq!(stopped.status, ContainerStatus::Stopped);
        assert!(!stopped.is_running);

        let stats = registry.stats();
        assert_eq!(stats.running_count, 0);
        assert_eq!(stats.events(EventKind::Started), 1);
        assert_eq!(stats.events(EventKind::Stopped), 1);
        registry.verify_counts().unwrap();
    }

    #[test]
    fn fail_running_container() {
        let registry = registry(2);
        let id = create(&registry, "web");
        registry.start(&id).unwrap();

        let failed = registry.fail(&id).unwrap().into_value();
        assert_eq!(failed.status, ContainerStatus::Failed);
        assert_eq!(registry.stats().running_count, 0);

        assert!(matches!(
            registry.fail(&id).unwrap_err(),
            SkiffError::InvalidTransition { .. }
        ));
        assert!(matches!(
            registry.start(&id).unwrap_err(),
            SkiffError::InvalidTransition { .. }
        ));

        registry.remove(&id).unwrap();
        assert!(registry.is_empty());
        registry.verify_counts().unwrap();
    }

    #[test]
    fn remove_reports_final_view() {
        let registry = registry(2);
        let id = create(&registry, "web");

        let removed = registry.remove(&id).unwrap().into_value();
        assert_eq!(removed.status, ContainerStatus::Removed);
        assert!(matches!(
            registry.get(&id).unwrap_err(),
            SkiffError::NotFound { .. }
        ));
        assert!(matches!(
            registry.remove(&id).unwrap_err(),
            SkiffError::NotFound { .. }
        ));
        assert_eq!(registry.stats().total_created, 1);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let registry = registry(1);
        let id: ContainerId = "missing".parse().unwrap();
        assert!(matches!(registry.start(&id), Err(SkiffError::NotFound { .. })));
        assert!(matches!(registry.stop(&id), Err(SkiffError::NotFound { .. })));
        assert!(matches!(registry.rescale(&id, 2.0, 2.0), Err(SkiffError::NotFound { .. })));
        assert!(matches!(registry.set_env(&id, "A", "1"), Err(SkiffError::NotFound { .. })));
        assert!(matches!(registry.get_str("missing"), Err(SkiffError::NotFound { .. })));
        assert!(matches!(registry.get_str("not valid!"), Err(SkiffError::InvalidContainerId { .. })));
    }

    #[test]
    fn rescale_and_set_env_go_through_registry() {
        let registry = registry(1);
        let id = registry
            .create(ContainerConfig::new("db", "postgres").with_cpu(1.0).with_memory(1000))
            .unwrap()
            .into_value()
            .id;

        let view = registry.rescale(&id, 2.0, 0.5).unwrap();
        assert_eq!(view.cpu, 2.0);
        assert_eq!(view.memory, 500);

        assert!(registry.rescale(&id, -1.0, 1.0).is_err());
        assert_eq!(registry.get(&id).unwrap().cpu, 2.0);

        registry.set_env(&id, "MODE", "replica").unwrap();
        registry.set_env(&id, "MODE", "primary").unwrap();
        assert_eq!(registry.get(&id).unwrap().environment["MODE"], "primary");
        assert!(registry.set_env(&id, "", "x").is_err());
    }

    #[test]
    fn views_are_detached_copies() {
        let registry = registry(1);
        let id = create(&registry, "web");

        let mut view = registry.get(&id).unwrap();
        view.environment.insert("INJECTED".into(), "1".into());
        view.status = ContainerStatus::Running;

        let fresh = registry.get(&id).unwrap();
        assert!(fresh.environment.is_empty());
        assert_eq!(fresh.status, ContainerStatus::Created);
    }

    #[test]
    fn stats_is_a_copy() {
        let registry = registry(2);
        let stats = registry.stats();
        create(&registry, "web");
        assert_eq!(stats.total_created, 0);
        assert_eq!(registry.stats().total_created, 1);
    }

    #[test]
    fn list_is_in_id_order() {
        let registry = registry(8);
        for name in ["a", "b", "c", "d"] {
            create(&registry, name);
        }
        let ids: Vec<_> = registry.list().into_iter().map(|c| c.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(registry.list(), registry.list());
    }

    #[test]
    fn handler_warnings_do_not_fail_operations() {
        let registry = registry(2);
        registry.subscribe(|_: EventKind, _: &ContainerView| -> Result<(), HandlerError> {
            Err("observer offline".into())
        });

        let outcome = registry.create(ContainerConfig::new("web", "nginx")).unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].event, EventKind::Created);
        assert_eq!(outcome.warnings[0].container_id, outcome.value.id);
        assert_eq!(registry.len(), 1);
        registry.verify_counts().unwrap();
    }
}
