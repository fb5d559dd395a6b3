//! Task registries: active, completed, failed.

use std::collections::HashMap;

use serde::Serialize;

use crate::domain::{Task, TaskId};

/// Which registry a task lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Registry {
    Active,
    Completed,
    Failed,
}

/// The three lifecycle registries.
///
/// Each map owns its `Task` values; moving a task is a `remove` followed by
/// an `insert`, so a task value can only ever be in one place. The engine
/// performs each move inside one critical section of its lock.
#[derive(Debug, Default)]
pub struct Registries {
    active: HashMap<TaskId, Task>,
    completed: HashMap<TaskId, Task>,
    failed: HashMap<TaskId, Task>,
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, registry: Registry) -> &HashMap<TaskId, Task> {
        match registry {
            Registry::Active => &self.active,
            Registry::Completed => &self.completed,
            Registry::Failed => &self.failed,
        }
    }

    fn map_mut(&mut self, registry: Registry) -> &mut HashMap<TaskId, Task> {
        match registry {
            Registry::Active => &mut self.active,
            Registry::Completed => &mut self.completed,
            Registry::Failed => &mut self.failed,
        }
    }

    /// Insert into `registry`. Returns the previous value if the id was
    /// already there, which the caller treats as an invariant violation.
    pub fn insert(&mut self, registry: Registry, task: Task) -> Option<Task> {
        self.map_mut(registry).insert(task.id(), task)
    }

    pub fn remove(&mut self, registry: Registry, id: &TaskId) -> Option<Task> {
        self.map_mut(registry).remove(id)
    }

    pub fn get(&self, id: &TaskId) -> Option<(Registry, &Task)> {
        [Registry::Active, Registry::Completed, Registry::Failed]
            .into_iter()
            .find_map(|registry| self.map(registry).get(id).map(|task| (registry, task)))
    }

    pub fn locate(&self, id: &TaskId) -> Option<Registry> {
        self.get(id).map(|(registry, _)| registry)
    }

    pub fn len(&self, registry: Registry) -> usize {
        self.map(registry).len()
    }

    pub fn ids(&self, registry: Registry) -> Vec<TaskId> {
        self.map(registry).keys().copied().collect()
    }

    pub fn snapshot(&self, registry: Registry) -> Vec<Task> {
        self.map(registry).values().cloned().collect()
    }

    pub fn iter(&self, registry: Registry) -> impl Iterator<Item = &Task> {
        self.map(registry).values()
    }
}
