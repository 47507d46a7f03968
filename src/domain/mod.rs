//! Domain models for taskgraph
//!
//! Contains the task entity and the dependency graph, without any I/O concerns.

mod id;
mod task;
mod graph;

pub use id::{IdError, TaskId};
pub use task::{
    parse_due_date, parse_scheduled_date, FieldError, NewTask, Task, TaskPatch, TaskPriority,
    TaskStatus, DEFAULT_CATEGORY,
};
pub use graph::{DependencyGraph, GraphError};
