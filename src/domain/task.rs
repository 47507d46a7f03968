//! Task domain model
//!
//! A task is one unit of work. It carries navigation pointers into the
//! hierarchy (`parent_id`, `child_ids`) and both sides of its dependency
//! edges (`dependencies`, `dependents`). Methods here only mutate the task
//! itself; keeping the relations consistent across tasks is the job of
//! [`crate::manager::TaskManager`].

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::id::TaskId;

pub const DEFAULT_CATEGORY: &str = "default";

#[derive(Debug, Error, PartialEq)]
pub enum FieldError {
    #[error("Invalid status '{0}' (expected pending, in_progress or completed)")]
    InvalidStatus(String),

    #[error("Invalid priority '{0}' (expected low, medium or high)")]
    InvalidPriority(String),

    #[error("Invalid date '{0}' (expected YYYY-MM-DD or RFC 3339)")]
    InvalidDate(String),
}

/// Status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    /// Returns true if this status represents completion
    pub fn is_complete(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pending" | "todo" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" | "done" => Ok(TaskStatus::Completed),
            _ => Err(FieldError::InvalidStatus(s.to_string())),
        }
    }
}

/// Priority of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            _ => Err(FieldError::InvalidPriority(s.to_string())),
        }
    }
}

/// Formats accepted for a due date without an offset, read as local time
const LOCAL_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parses a due date
///
/// Accepts RFC 3339, a date and time without offset (local time, as a
/// `datetime-local` input produces), or a bare `YYYY-MM-DD` meaning
/// midnight UTC.
pub fn parse_due_date(s: &str) -> Result<DateTime<Utc>, FieldError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in LOCAL_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            if let Some(local) = Local.from_local_datetime(&naive).earliest() {
                return Ok(local.with_timezone(&Utc));
            }
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| FieldError::InvalidDate(s.to_string()))
}

/// Parses a scheduled date, truncating any time-of-day part
pub fn parse_scheduled_date(s: &str) -> Result<NaiveDate, FieldError> {
    let s = s.trim();
    let date_part = s.split(['T', ' ']).next().unwrap_or(s);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|_| FieldError::InvalidDate(s.to_string()))
}

/// Field readers for stored tasks
///
/// A stored value that does not fit its field is logged and replaced by
/// the field's default, so one odd value never makes a task unreadable.
/// `null` reads as the default without a warning.
mod stored {
    use std::fmt::Display;
    use std::str::FromStr;

    use chrono::{DateTime, NaiveDate, Utc};
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use tracing::warn;

    use crate::domain::TaskId;

    fn ignored<T: Default>(value: &Value, reason: impl Display) -> T {
        warn!(value = %value, reason = %reason, "Ignoring malformed stored field");
        T::default()
    }

    /// Any serde type, falling back to its default
    pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(T::default());
        }
        Ok(serde_json::from_value(value.clone()).unwrap_or_else(|e| ignored(&value, e)))
    }

    /// A string parsed with `FromStr`, so aliases like `done` are accepted
    pub fn parsed<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr + Default,
        T::Err: Display,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match &value {
            Value::Null => T::default(),
            Value::String(s) => s.parse().unwrap_or_else(|e| ignored(&value, e)),
            _ => ignored(&value, "expected a string"),
        })
    }

    fn optional<'de, D, T, E>(
        deserializer: D,
        parse: impl Fn(&str) -> Result<T, E>,
    ) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        E: Display,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match &value {
            Value::String(s) if !s.is_empty() => match parse(s.as_str()) {
                Ok(parsed) => Some(parsed),
                Err(e) => ignored(&value, e),
            },
            Value::Null | Value::String(_) => None,
            _ => ignored(&value, "expected a string"),
        })
    }

    pub fn datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        optional(deserializer, super::parse_due_date)
    }

    /// A required timestamp; unreadable values become the current time
    pub fn timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(datetime(deserializer)?.unwrap_or_else(Utc::now))
    }

    pub fn date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        optional(deserializer, super::parse_scheduled_date)
    }

    /// Stored data may carry `""` where no parent exists
    pub fn task_id<'de, D>(deserializer: D) -> Result<Option<TaskId>, D::Error>
    where
        D: Deserializer<'de>,
    {
        optional(deserializer, str::parse::<TaskId>)
    }

    /// A list of strings; other entries are dropped
    pub fn strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Null => Vec::new(),
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    other => ignored::<Option<String>>(&other, "expected a string"),
                })
                .collect(),
            other => ignored(&other, "expected an array"),
        })
    }

    /// A list of task ids; empty or non-string entries are dropped
    pub fn task_ids<'de, D>(deserializer: D) -> Result<Vec<TaskId>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(strings(deserializer)?
            .into_iter()
            .filter_map(|s| s.parse().ok())
            .collect())
    }

    pub fn category<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) => s,
            Value::Null => super::default_category(),
            other => {
                ignored::<()>(&other, "expected a string");
                super::default_category()
            }
        })
    }
}

mod due_date_format {
    use chrono::{DateTime, Utc};
    use serde::Serializer;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }
}

mod scheduled_date_format {
    use chrono::NaiveDate;
    use serde::Serializer;

    pub fn serialize<S>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(date) => serializer.serialize_str(&date.format("%Y-%m-%d").to_string()),
            None => serializer.serialize_none(),
        }
    }
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

/// Fields supplied when creating a task; everything else takes its default
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<DateTime<Utc>>,
    pub scheduled_date: Option<NaiveDate>,
    pub parent_id: Option<TaskId>,
    pub tags: Vec<String>,
    pub category: Option<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent_id: TaskId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_due_date(mut self, due: DateTime<Utc>) -> Self {
        self.due_date = Some(due);
        self
    }

    pub fn with_scheduled_date(mut self, date: NaiveDate) -> Self {
        self.scheduled_date = Some(date);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Partial update of a task's content fields
///
/// Relation fields (`parent_id`, `child_ids`, `dependencies`, `dependents`,
/// `level`) are absent: they change only through the manager's
/// hierarchy and dependency operations. `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub scheduled_date: Option<Option<NaiveDate>>,
    pub tags: Option<Vec<String>>,
    pub category: Option<String>,
}

impl TaskPatch {
    /// Returns true if the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.scheduled_date.is_none()
            && self.tags.is_none()
            && self.category.is_none()
    }
}

/// A unit of work
///
/// Only `id` is required when reading stored data; every other field falls
/// back to its default when it is missing or malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    #[serde(default, deserialize_with = "stored::or_default")]
    pub title: String,

    #[serde(default, deserialize_with = "stored::or_default")]
    pub description: String,

    #[serde(default, deserialize_with = "stored::parsed")]
    pub status: TaskStatus,

    #[serde(default, deserialize_with = "stored::parsed")]
    pub priority: TaskPriority,

    #[serde(default = "Utc::now", deserialize_with = "stored::timestamp")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now", deserialize_with = "stored::timestamp")]
    pub updated_at: DateTime<Utc>,

    #[serde(
        default,
        serialize_with = "due_date_format::serialize",
        deserialize_with = "stored::datetime"
    )]
    pub due_date: Option<DateTime<Utc>>,

    #[serde(
        default,
        serialize_with = "scheduled_date_format::serialize",
        deserialize_with = "stored::date"
    )]
    pub scheduled_date: Option<NaiveDate>,

    /// Set exactly when the task is completed
    #[serde(default, deserialize_with = "stored::datetime")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Weak back-reference to the owning task
    #[serde(default, deserialize_with = "stored::task_id")]
    pub parent_id: Option<TaskId>,

    /// Depth in the hierarchy (0 = root)
    #[serde(default, deserialize_with = "stored::or_default")]
    pub level: u32,

    #[serde(default, deserialize_with = "stored::task_ids")]
    pub child_ids: Vec<TaskId>,

    /// Tasks that must be completed before this one can run
    #[serde(default, deserialize_with = "stored::task_ids")]
    pub dependencies: Vec<TaskId>,

    /// Tasks that depend on this one (inverse of `dependencies`)
    #[serde(default, deserialize_with = "stored::task_ids")]
    pub dependents: Vec<TaskId>,

    #[serde(default, deserialize_with = "stored::strings")]
    pub tags: Vec<String>,

    #[serde(default = "default_category", deserialize_with = "stored::category")]
    pub category: String,
}

fn insert_unique(list: &mut Vec<TaskId>, id: TaskId) -> bool {
    if list.contains(&id) {
        false
    } else {
        list.push(id);
        true
    }
}

fn remove_all(list: &mut Vec<TaskId>, id: &TaskId) -> bool {
    let len_before = list.len();
    list.retain(|existing| existing != id);
    list.len() != len_before
}

impl Task {
    /// Creates a task with a freshly generated ID
    pub fn create(fields: NewTask) -> Self {
        let id = TaskId::generate(&fields.title, Utc::now());
        Self::new(id, fields)
    }

    /// Creates a task with the given ID, overlaying `fields` on the defaults
    pub fn new(id: TaskId, fields: NewTask) -> Self {
        let now = Utc::now();
        let status = fields.status.unwrap_or_default();
        Self {
            id,
            title: fields.title,
            description: fields.description,
            status,
            priority: fields.priority.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            due_date: fields.due_date,
            scheduled_date: fields.scheduled_date,
            completed_at: status.is_complete().then_some(now),
            parent_id: fields.parent_id,
            level: 0,
            child_ids: Vec::new(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
            tags: fields.tags,
            category: fields.category.unwrap_or_else(default_category),
        }
    }

    /// Refreshes `updated_at`, never moving it backwards
    fn touch(&mut self) {
        self.updated_at = self.updated_at.max(Utc::now());
    }

    /// Returns true if this task has no parent
    pub fn is_root(&self) -> bool {
        self.level == 0
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }

    /// Flips between pending and completed
    ///
    /// An in-progress task completes; a completed task goes back to pending.
    pub fn toggle_complete(&mut self) {
        if self.status.is_complete() {
            self.status = TaskStatus::Pending;
            self.completed_at = None;
        } else {
            self.status = TaskStatus::Completed;
            self.completed_at = Some(Utc::now());
        }
        self.touch();
    }

    /// Marks the task completed; returns false if it already was
    pub fn complete(&mut self) -> bool {
        if self.status.is_complete() {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.touch();
        true
    }

    fn set_status(&mut self, status: TaskStatus) {
        if status.is_complete() {
            if !self.status.is_complete() || self.completed_at.is_none() {
                self.completed_at = Some(Utc::now());
            }
        } else {
            self.completed_at = None;
        }
        self.status = status;
    }

    /// Merges the supplied fields into the task
    pub fn update(&mut self, patch: TaskPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(status) = patch.status {
            self.set_status(status);
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(scheduled_date) = patch.scheduled_date {
            self.scheduled_date = scheduled_date;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        self.touch();
    }

    /// Appends a child ID (ignored if present or if it is this task's own ID)
    pub fn add_child(&mut self, child_id: TaskId) -> bool {
        if child_id == self.id {
            return false;
        }
        let changed = insert_unique(&mut self.child_ids, child_id);
        if changed {
            self.touch();
        }
        changed
    }

    pub fn remove_child(&mut self, child_id: &TaskId) -> bool {
        let changed = remove_all(&mut self.child_ids, child_id);
        if changed {
            self.touch();
        }
        changed
    }

    /// Records that this task depends on `task_id` (one side of the edge only)
    pub fn add_dependency(&mut self, task_id: TaskId) -> bool {
        let changed = insert_unique(&mut self.dependencies, task_id);
        if changed {
            self.touch();
        }
        changed
    }

    pub fn remove_dependency(&mut self, task_id: &TaskId) -> bool {
        let changed = remove_all(&mut self.dependencies, task_id);
        if changed {
            self.touch();
        }
        changed
    }

    /// Records that `task_id` depends on this task (inverse side of the edge)
    pub fn add_dependent(&mut self, task_id: TaskId) -> bool {
        let changed = insert_unique(&mut self.dependents, task_id);
        if changed {
            self.touch();
        }
        changed
    }

    pub fn remove_dependent(&mut self, task_id: &TaskId) -> bool {
        let changed = remove_all(&mut self.dependents, task_id);
        if changed {
            self.touch();
        }
        changed
    }

    /// Strips every reference to `ids` from the relation lists
    pub(crate) fn forget(&mut self, ids: &HashSet<TaskId>) -> bool {
        let mut changed = false;
        for list in [&mut self.child_ids, &mut self.dependencies, &mut self.dependents] {
            let len_before = list.len();
            list.retain(|id| !ids.contains(id));
            changed |= list.len() != len_before;
        }
        if changed {
            self.touch();
        }
        changed
    }

    /// Re-anchors the task under `parent_id` at the given depth
    pub(crate) fn set_parent(&mut self, parent_id: Option<TaskId>, level: u32) {
        if self.parent_id != parent_id || self.level != level {
            self.parent_id = parent_id;
            self.level = level;
            self.touch();
        }
    }

    /// Returns true if the task is unfinished and its due date has passed
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_complete() && self.due_date.is_some_and(|due| due < now)
    }

    /// Case-insensitive match against title, description and tags
    ///
    /// `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self.tags.iter().any(|tag| tag.to_lowercase().contains(needle))
    }
}
