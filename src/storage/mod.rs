//! # Storage Layer
//!
//! Persistence for taskgraph, layered as:
//!
//! | Layer | Type | Responsibility |
//! |-------|------|----------------|
//! | Key-value | [`KeyValueStore`] ([`FileKvStore`], [`MemoryKvStore`]) | get/set/remove strings |
//! | Document | [`LocalStorage`] | `{tasks, settings, lastUpdated}`, export/import |
//! | Port | [`TaskPersistence`] | what the task manager consumes |
//! | Config | [`Config`] | user configuration (TOML) |
//!
//! ## Data Directory
//!
//! ```text
//! <data_dir>/
//! ├── todo_app_data.json          # The whole document
//! ├── todo_app_data_backup.json   # Stored text kept before a lossy rewrite
//! └── .todo_app_data.lock         # Advisory lock for concurrent processes
//! ```

mod kv;
mod local;
mod config;

pub use kv::{FileKvStore, KeyValueStore, MemoryKvStore, StoreError};
pub use local::{
    AppData, ImportError, LocalStorage, Settings, SettingsPatch, StorageInfo, EXPORT_VERSION,
    MAX_STORAGE_BYTES, STORAGE_KEY,
};
pub use config::{Config, ConfigError, LogConfig, OutputConfig, OutputFormat, StorageConfig};

use crate::domain::Task;

/// The persistence port consumed by [`crate::manager::TaskManager`]
pub trait TaskPersistence {
    /// Reads every stored task; empty when nothing is stored or unreadable
    fn load_tasks(&self) -> Vec<Task>;

    /// Replaces the stored task list
    fn save_tasks(&mut self, tasks: Vec<Task>) -> Result<(), StoreError>;
}
