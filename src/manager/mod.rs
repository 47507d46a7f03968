//! # Task Graph Manager
//!
//! [`TaskManager`] owns every task, keeps the hierarchy and the dependency
//! edges consistent, and answers the derived queries.
//!
//! ## Relations
//!
//! | Relation | Stored on | Maintained by |
//! |----------|-----------|---------------|
//! | parent/child | `parent_id`, `child_ids`, `level` | [`TaskManager::create_task`], [`TaskManager::move_task`], [`TaskManager::delete_task`] |
//! | dependency | `dependencies`, `dependents` (both sides) | [`TaskManager::add_dependency`], [`TaskManager::remove_dependency`] |
//!
//! ## Persistence
//!
//! Every successful mutation writes the full task list through the
//! [`TaskPersistence`] port before returning. A failed write is reported as
//! [`ManagerError::Unpersisted`]; the change stays applied in memory and
//! [`TaskManager::persist`] may be retried.

mod error;
mod hierarchy;
mod queries;

pub use error::{ManagerError, Result};
pub use hierarchy::{HierarchyEntry, HierarchyNode};
pub use queries::TaskStatistics;

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use tracing::{debug, warn};

use crate::domain::{DependencyGraph, GraphError, NewTask, Task, TaskId, TaskPatch};
use crate::storage::{
    ImportError, KeyValueStore, LocalStorage, Settings, SettingsPatch, StorageInfo, StoreError,
    TaskPersistence,
};

/// In-memory task graph backed by a persistence port
pub struct TaskManager<P: TaskPersistence> {
    store: P,
    tasks: BTreeMap<TaskId, Task>,
    graph: DependencyGraph,
}

impl<P: TaskPersistence> TaskManager<P> {
    /// Creates a manager and loads every stored task
    pub fn new(store: P) -> Self {
        let mut manager = Self {
            store,
            tasks: BTreeMap::new(),
            graph: DependencyGraph::new(),
        };
        manager.load();
        manager
    }

    /// Replaces the in-memory state with what the store holds
    ///
    /// Discards any unpersisted change. Returns the number of tasks loaded.
    pub fn load(&mut self) -> usize {
        let loaded = self.store.load_tasks();
        let total = loaded.len();

        self.tasks = loaded
            .into_iter()
            .map(|task| (task.id.clone(), task))
            .collect();
        if self.tasks.len() != total {
            warn!(
                duplicates = total - self.tasks.len(),
                "Stored data contains duplicate task ids, keeping the last"
            );
        }

        self.graph = DependencyGraph::from_tasks(self.tasks.values());
        debug!(count = self.tasks.len(), "Loaded tasks");
        self.tasks.len()
    }

    /// Writes every task to the store
    pub fn persist(&mut self) -> Result<()> {
        let tasks = self.tasks.values().cloned().collect();
        self.store.save_tasks(tasks).map_err(ManagerError::Store)
    }

    /// Persists after a mutation of `id`
    fn commit(&mut self, id: &TaskId) -> Result<()> {
        let tasks = self.tasks.values().cloned().collect();
        self.store
            .save_tasks(tasks)
            .map_err(|source| ManagerError::Unpersisted {
                id: id.clone(),
                source,
            })
    }

    fn snapshot(&self, id: &TaskId) -> Result<Task> {
        self.tasks
            .get(id)
            .cloned()
            .ok_or_else(|| ManagerError::NotFound(id.clone()))
    }

    fn ensure_exists(&self, id: &TaskId) -> Result<()> {
        if self.tasks.contains_key(id) {
            Ok(())
        } else {
            Err(ManagerError::NotFound(id.clone()))
        }
    }

    /// Returns the persistence port
    pub fn store(&self) -> &P {
        &self.store
    }

    /// Returns the persistence port mutably
    ///
    /// Writes made directly through the port are not seen until [`Self::load`].
    pub fn store_mut(&mut self) -> &mut P {
        &mut self.store
    }

    /// Creates a task
    ///
    /// If `fields.parent_id` names an existing task the new task is appended
    /// to its children one level below it; otherwise the task becomes a root.
    pub fn create_task(&mut self, fields: NewTask) -> Result<Task> {
        let parent_id = fields.parent_id.clone();
        let mut task = Task::create(fields);
        while self.tasks.contains_key(&task.id) {
            task.id = TaskId::generate(&task.title, Utc::now());
        }

        match parent_id.as_ref().and_then(|pid| self.tasks.get_mut(pid)) {
            Some(parent) => {
                parent.add_child(task.id.clone());
                task.set_parent(Some(parent.id.clone()), parent.level + 1);
            }
            None => {
                if let Some(pid) = &parent_id {
                    warn!(parent = %pid, "Parent not found, creating a root task");
                }
                task.set_parent(None, 0);
            }
        }

        let id = task.id.clone();
        self.graph.add_task(id.clone());
        self.tasks.insert(id.clone(), task.clone());
        debug!(task = %id, level = task.level, "Created task");

        self.commit(&id)?;
        Ok(task)
    }

    /// Merges `patch` into a task
    pub fn update_task(&mut self, id: &TaskId, patch: TaskPatch) -> Result<Task> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| ManagerError::NotFound(id.clone()))?;
        task.update(patch);
        let updated = task.clone();
        debug!(task = %id, "Updated task");

        self.commit(id)?;
        Ok(updated)
    }

    /// Ids of `id` and all its descendants, in pre-order
    fn subtree_ids(&self, id: &TaskId) -> Vec<TaskId> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![id.clone()];

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(task) = self.tasks.get(&current) {
                stack.extend(task.child_ids.iter().rev().cloned());
                order.push(current);
            }
        }

        order
    }

    /// Sets parent and level of `id`, then recomputes levels below it
    fn relevel_subtree(&mut self, id: &TaskId, parent_id: Option<TaskId>, level: u32) {
        let mut visited = HashSet::new();
        let mut stack = vec![(id.clone(), parent_id, level)];

        while let Some((current, parent, level)) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(task) = self.tasks.get_mut(&current) else {
                continue;
            };
            task.set_parent(parent, level);
            for child in &task.child_ids {
                stack.push((child.clone(), Some(current.clone()), level + 1));
            }
        }
    }

    /// Deletes a task together with all its descendants
    ///
    /// Every reference to a deleted task is removed from the survivors.
    /// Returns the deleted ids in pre-order, starting with `id`.
    pub fn delete_task(&mut self, id: &TaskId) -> Result<Vec<TaskId>> {
        let parent_id = self
            .tasks
            .get(id)
            .ok_or_else(|| ManagerError::NotFound(id.clone()))?
            .parent_id
            .clone();

        let deleted = self.subtree_ids(id);
        let gone: HashSet<TaskId> = deleted.iter().cloned().collect();
        for removed in &deleted {
            self.tasks.remove(removed);
        }
        self.graph.remove_tasks(&gone);

        if let Some(parent) = parent_id.as_ref().and_then(|pid| self.tasks.get_mut(pid)) {
            parent.remove_child(id);
        }

        let mut orphans = Vec::new();
        for task in self.tasks.values_mut() {
            task.forget(&gone);
            if task.parent_id.as_ref().is_some_and(|pid| gone.contains(pid)) {
                orphans.push(task.id.clone());
            }
        }
        for orphan in &orphans {
            warn!(task = %orphan, "Parent was deleted, task becomes a root");
            self.relevel_subtree(orphan, None, 0);
        }

        debug!(task = %id, count = deleted.len(), "Deleted task subtree");
        self.commit(id)?;
        Ok(deleted)
    }

    /// Marks ancestors completed while all of their children are
    fn complete_ancestors(&mut self, id: &TaskId) {
        let mut visited = HashSet::from([id.clone()]);
        let mut next = self.tasks.get(id).and_then(|task| task.parent_id.clone());

        while let Some(parent_id) = next {
            if !visited.insert(parent_id.clone()) {
                break;
            }
            let Some(parent) = self.tasks.get(&parent_id) else {
                break;
            };
            let all_done = !parent.child_ids.is_empty()
                && parent
                    .child_ids
                    .iter()
                    .all(|child| self.tasks.get(child).is_some_and(Task::is_complete));
            if !all_done {
                break;
            }
            next = parent.parent_id.clone();

            if let Some(parent) = self.tasks.get_mut(&parent_id) {
                if parent.complete() {
                    debug!(task = %parent_id, "Completed parent, all children are done");
                }
            }
        }
    }

    /// Toggles completion of a task
    ///
    /// Completing a task also completes each ancestor whose children are now
    /// all completed. Reopening a task never touches its ancestors.
    pub fn toggle_task_complete(&mut self, id: &TaskId) -> Result<Task> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| ManagerError::NotFound(id.clone()))?;
        task.toggle_complete();
        let toggled = task.clone();
        debug!(task = %id, status = %toggled.status, "Toggled task");

        if toggled.is_complete() {
            self.complete_ancestors(id);
        }

        self.commit(id)?;
        Ok(toggled)
    }

    /// Records that `task_id` depends on `depends_on`
    ///
    /// Rejected when `task_id` is already reachable from `depends_on` along
    /// dependency edges, so the graph stays acyclic. Adding an existing edge
    /// succeeds without writing.
    pub fn add_dependency(&mut self, task_id: &TaskId, depends_on: &TaskId) -> Result<Task> {
        self.ensure_exists(task_id)?;
        self.ensure_exists(depends_on)?;

        self.graph
            .add_dependency(task_id, depends_on)
            .map_err(|err| match err {
                GraphError::CycleDetected(task, depends_on) => {
                    warn!(task = %task, depends_on = %depends_on, "Rejected cyclic dependency");
                    ManagerError::CycleRejected { task, depends_on }
                }
                GraphError::TaskNotFound(id) => ManagerError::NotFound(id),
                other => other.into(),
            })?;

        let mut changed = false;
        if let Some(task) = self.tasks.get_mut(task_id) {
            changed |= task.add_dependency(depends_on.clone());
        }
        if let Some(target) = self.tasks.get_mut(depends_on) {
            changed |= target.add_dependent(task_id.clone());
        }

        if changed {
            debug!(task = %task_id, depends_on = %depends_on, "Added dependency");
            self.commit(task_id)?;
        }
        self.snapshot(task_id)
    }

    /// Removes the edge `task_id -> depends_on`; returns whether one existed
    pub fn remove_dependency(&mut self, task_id: &TaskId, depends_on: &TaskId) -> Result<bool> {
        self.ensure_exists(task_id)?;
        self.ensure_exists(depends_on)?;

        self.graph.remove_dependency(task_id, depends_on);

        let mut removed = false;
        if let Some(task) = self.tasks.get_mut(task_id) {
            removed |= task.remove_dependency(depends_on);
        }
        if let Some(target) = self.tasks.get_mut(depends_on) {
            removed |= target.remove_dependent(task_id);
        }

        if removed {
            debug!(task = %task_id, depends_on = %depends_on, "Removed dependency");
            self.commit(task_id)?;
        }
        Ok(removed)
    }

    /// Moves a task (with its subtree) under `new_parent`, or to the top level
    pub fn move_task(&mut self, id: &TaskId, new_parent: Option<&TaskId>) -> Result<Task> {
        let old_parent = self
            .tasks
            .get(id)
            .ok_or_else(|| ManagerError::NotFound(id.clone()))?
            .parent_id
            .clone();

        let level = match new_parent {
            Some(pid) => {
                let parent = self
                    .tasks
                    .get(pid)
                    .ok_or_else(|| ManagerError::ParentNotFound(pid.clone()))?;
                if self.subtree_ids(id).contains(pid) {
                    warn!(task = %id, parent = %pid, "Rejected move into own subtree");
                    return Err(ManagerError::HierarchyCycle {
                        task: id.clone(),
                        parent: pid.clone(),
                    });
                }
                parent.level + 1
            }
            None => 0,
        };

        if old_parent.as_ref() != new_parent {
            if let Some(old) = old_parent.as_ref().and_then(|pid| self.tasks.get_mut(pid)) {
                old.remove_child(id);
            }
            if let Some(parent) = new_parent.and_then(|pid| self.tasks.get_mut(pid)) {
                parent.add_child(id.clone());
            }
        }
        self.relevel_subtree(id, new_parent.cloned(), level);

        debug!(task = %id, level, "Moved task");
        self.commit(id)?;
        self.snapshot(id)
    }
}

impl<S: KeyValueStore> TaskManager<LocalStorage<S>> {
    /// Serializes the stored document for backup
    pub fn export_data(&self) -> std::result::Result<String, StoreError> {
        self.store.export_data()
    }

    /// Replaces the stored tasks with an export and reloads
    pub fn import_data(&mut self, text: &str) -> std::result::Result<usize, ImportError> {
        let imported = self.store.import_data(text)?;
        self.load();
        Ok(imported)
    }

    /// Removes the stored document and empties the manager
    pub fn clear_all_data(&mut self) -> Result<()> {
        self.store.clear_all_data().map_err(ManagerError::Store)?;
        self.load();
        Ok(())
    }

    pub fn settings(&self) -> Settings {
        self.store.get_settings()
    }

    pub fn update_settings(&mut self, patch: &SettingsPatch) -> Result<Settings> {
        self.store.save_settings(patch).map_err(ManagerError::Store)
    }

    pub fn storage_info(&self) -> std::result::Result<StorageInfo, StoreError> {
        self.store.storage_info()
    }
}
