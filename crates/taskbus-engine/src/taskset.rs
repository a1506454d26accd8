//! The fixed set of tasks compiled into a device image.

use std::sync::Arc;

use crate::error::RegistryError;
use crate::registry::CommandRegistry;
use crate::task::{TaskMode, TaskRecord};

/// All task records known to the orchestrator, fixed at startup.
///
/// Lookup is by task id; an id with no record here is a disabled task and
/// every controller command naming it is refused.
pub struct TaskSet {
    tasks: Vec<Arc<TaskRecord>>,
}

impl TaskSet {
    pub fn new(tasks: Vec<Arc<TaskRecord>>) -> Self {
        Self { tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: u8) -> Option<&Arc<TaskRecord>> {
        self.tasks.iter().find(|t| t.id() == id)
    }

    /// Whether a task with this id exists at all.
    pub fn is_enabled(&self, id: u8) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TaskRecord>> {
        self.tasks.iter()
    }

    /// Register every continuous task in the registry at boot.
    ///
    /// Continuous tasks never wait for a start command, so the controller
    /// would otherwise never see them in a status response.
    pub fn seed_continuous(&self, registry: &CommandRegistry) -> Result<(), RegistryError> {
        for task in &self.tasks {
            if task.mode() == TaskMode::Continuous {
                registry.append(task.id())?;
            }
        }
        Ok(())
    }
}
