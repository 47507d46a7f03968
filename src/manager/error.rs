use thiserror::Error;

use crate::domain::{GraphError, TaskId};
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Parent task not found: {0}")]
    ParentNotFound(TaskId),

    #[error("Dependency rejected, it would create a cycle: {task} -> {depends_on}")]
    CycleRejected { task: TaskId, depends_on: TaskId },

    #[error("Cannot move {task} under {parent}: a task cannot become its own descendant")]
    HierarchyCycle { task: TaskId, parent: TaskId },

    /// The mutation is applied in memory; durability is unknown
    #[error("Change to {id} applied but not persisted: {source}")]
    Unpersisted {
        id: TaskId,
        #[source]
        source: StoreError,
    },

    #[error("Failed to persist tasks: {0}")]
    Store(#[source] StoreError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl ManagerError {
    /// Returns true if the operation itself succeeded but could not be stored
    pub fn is_unpersisted(&self) -> bool {
        matches!(self, ManagerError::Unpersisted { .. } | ManagerError::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, ManagerError>;
