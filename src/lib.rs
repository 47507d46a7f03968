//! taskgraph - hierarchical, interdependent tasks stored locally
//!
//! Tasks form a forest (parent/child) and carry dependency edges that must
//! stay acyclic. [`TaskManager`] keeps both relations consistent, cascades
//! completion and deletion, and persists every change through a key-value
//! store.

pub mod domain;
pub mod storage;
pub mod manager;
pub mod cli;

pub use domain::{NewTask, Task, TaskId, TaskPatch, TaskPriority, TaskStatus};
pub use manager::{ManagerError, TaskManager};
