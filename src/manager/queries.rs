//! Read-only queries over the task set
//!
//! Results come back in id order. Time-dependent queries have an `_at` /
//! `_on` variant taking the reference time explicitly.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;

use super::{Result, TaskManager};
use crate::domain::{Task, TaskId, TaskStatus};
use crate::storage::TaskPersistence;

/// Counts over the whole task set
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatistics {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub overdue: usize,
    /// Percentage of completed tasks, 0 when there are none
    pub completion_rate: f64,
}

impl<P: TaskPersistence> TaskManager<P> {
    pub fn all_tasks(&self) -> Vec<&Task> {
        self.tasks.values().collect()
    }

    pub fn get_task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Top-level tasks
    pub fn parent_tasks(&self) -> Vec<&Task> {
        self.tasks.values().filter(|task| task.is_root()).collect()
    }

    /// Tasks whose parent is `parent_id`
    pub fn child_tasks(&self, parent_id: &TaskId) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|task| task.parent_id.as_ref() == Some(parent_id))
            .collect()
    }

    /// Returns true if every dependency exists and is completed
    fn dependencies_met(&self, task: &Task) -> bool {
        task.dependencies
            .iter()
            .all(|dep| self.tasks.get(dep).is_some_and(Task::is_complete))
    }

    /// Unfinished tasks whose dependencies are all completed
    pub fn executable_tasks(&self) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|task| !task.is_complete() && self.dependencies_met(task))
            .collect()
    }

    /// Unfinished tasks waiting on at least one dependency
    pub fn blocked_tasks(&self) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|task| !task.is_complete() && !self.dependencies_met(task))
            .collect()
    }

    pub fn overdue_tasks(&self) -> Vec<&Task> {
        self.overdue_tasks_at(Utc::now())
    }

    /// Unfinished tasks due strictly before `now`
    pub fn overdue_tasks_at(&self, now: DateTime<Utc>) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|task| task.is_overdue_at(now))
            .collect()
    }

    /// Tasks scheduled for the current local date
    pub fn today_tasks(&self) -> Vec<&Task> {
        self.today_tasks_on(Local::now().date_naive())
    }

    pub fn today_tasks_on(&self, date: NaiveDate) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|task| task.scheduled_date == Some(date))
            .collect()
    }

    /// Case-insensitive substring search over title, description and tags
    pub fn search_tasks(&self, query: &str) -> Vec<&Task> {
        let needle = query.to_lowercase();
        self.tasks
            .values()
            .filter(|task| task.matches(&needle))
            .collect()
    }

    pub fn statistics(&self) -> TaskStatistics {
        self.statistics_at(Utc::now())
    }

    pub fn statistics_at(&self, now: DateTime<Utc>) -> TaskStatistics {
        let count = |status: TaskStatus| {
            self.tasks
                .values()
                .filter(|task| task.status == status)
                .count()
        };

        let total = self.tasks.len();
        let completed = count(TaskStatus::Completed);
        let completion_rate = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };

        TaskStatistics {
            total,
            completed,
            pending: count(TaskStatus::Pending),
            in_progress: count(TaskStatus::InProgress),
            overdue: self.overdue_tasks_at(now).len(),
            completion_rate,
        }
    }

    /// Every task id, dependencies before the tasks that need them
    pub fn execution_order(&self) -> Result<Vec<TaskId>> {
        Ok(self.graph.topological_order()?)
    }
}
