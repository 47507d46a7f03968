//! Task identifiers
//!
//! ID Format: `task_{unix-millis}_{9-char-hash}` (e.g., `task_1718000000000_7f2b4c1a9`)
//!
//! The hash is derived from title, creation timestamp and a per-process
//! counter, so two tasks created in the same millisecond still differ.
//! Ids read back from storage or an import are treated as opaque: any
//! non-empty string is accepted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Task ID must not be empty")]
    Empty,
}

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generates a 9-character hash from title and timestamp
fn generate_hash(title: &str, timestamp: DateTime<Utc>) -> String {
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let input = format!(
        "{}{}{}",
        title,
        timestamp.timestamp_nanos_opt().unwrap_or(0),
        seq
    );
    let hash = blake3::hash(input.as_bytes());
    let hex = hash.to_hex();
    hex[..9].to_string()
}

/// Unique, immutable identifier of a task
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    pub const PREFIX: &'static str = "task_";

    /// Generates a fresh ID for a task with the given title
    pub fn generate(title: &str, timestamp: DateTime<Utc>) -> Self {
        Self(format!(
            "{}{}_{}",
            Self::PREFIX,
            timestamp.timestamp_millis(),
            generate_hash(title, timestamp)
        ))
    }

    /// Full string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl FromStr for TaskId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for TaskId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
