//! Document storage on top of a key-value backend
//!
//! Everything lives in one JSON document under a single key:
//!
//! ```json
//! { "tasks": [...], "settings": {...}, "lastUpdated": "2024-01-01T00:00:00Z" }
//! ```
//!
//! Reads never fail. Each task is read on its own, so one unreadable task
//! is skipped (and logged) without losing the rest; a missing or unparsable
//! document yields the default document.
//!
//! Writes that rebuild the document from what was read (`save_tasks`,
//! `save_settings`, `import_data`) first copy the stored text to a fresh
//! `{key}_backup[_N]` key whenever it did not read back exactly, and refuse
//! to write at all when the stored text cannot be read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, warn};

use super::kv::{KeyValueStore, StoreError};
use super::TaskPersistence;
use crate::domain::{Task, TaskPriority};

/// Key under which the document is stored
pub const STORAGE_KEY: &str = "todo_app_data";

/// Version stamped into exports
pub const EXPORT_VERSION: &str = "1.0.0";

/// Nominal capacity reported by [`LocalStorage::storage_info`]
pub const MAX_STORAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Import data is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Import data must be a JSON object")]
    NotAnObject,

    #[error("Import field 'tasks' must be an array")]
    TasksNotArray,

    #[error("Imported task #{index} must have a non-empty 'id' and 'title'")]
    InvalidTask { index: usize },

    #[error("Imported task #{index} is malformed: {source}")]
    MalformedTask {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Imported settings are malformed: {0}")]
    InvalidSettings(#[source] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Application settings stored next to the tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub theme: String,
    pub language: String,
    pub default_priority: TaskPriority,
    pub auto_save: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: "light".to_string(),
            language: "ja".to_string(),
            default_priority: TaskPriority::Medium,
            auto_save: true,
        }
    }
}

/// Field-by-field settings update; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub theme: Option<String>,
    pub language: Option<String>,
    pub default_priority: Option<TaskPriority>,
    pub auto_save: Option<bool>,
}

impl Settings {
    /// Returns these settings with every field present in `patch` replaced
    pub fn merged(&self, patch: &SettingsPatch) -> Settings {
        Settings {
            theme: patch.theme.clone().unwrap_or_else(|| self.theme.clone()),
            language: patch
                .language
                .clone()
                .unwrap_or_else(|| self.language.clone()),
            default_priority: patch.default_priority.unwrap_or(self.default_priority),
            auto_save: patch.auto_save.unwrap_or(self.auto_save),
        }
    }
}

/// The whole stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppData {
    #[serde(default)]
    pub tasks: Vec<Task>,

    #[serde(default)]
    pub settings: Settings,

    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl Default for AppData {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            settings: Settings::default(),
            last_updated: Utc::now(),
        }
    }
}

/// Export wrapper: the document plus provenance metadata
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportDocument<'a> {
    #[serde(flatten)]
    data: &'a AppData,
    exported_at: DateTime<Utc>,
    version: &'static str,
}

/// Space used by the stored document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub used_space: usize,
    pub max_space: usize,
    pub usage_percentage: f64,
    pub task_count: usize,
}

/// Document store over any [`KeyValueStore`]
pub struct LocalStorage<S> {
    backend: S,
    key: String,
}

impl<S: KeyValueStore> LocalStorage<S> {
    /// Creates a document store using the default key
    pub fn new(backend: S) -> Self {
        Self::with_key(backend, STORAGE_KEY)
    }

    /// Creates a document store using a custom key
    pub fn with_key(backend: S, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut S {
        &mut self.backend
    }

    /// Reads the whole document, falling back to the default document
    pub fn get_data(&self) -> AppData {
        match self.read() {
            Ok(stored) => stored.data,
            Err(e) => {
                error!(key = %self.key, error = %e, "Failed to read stored document, using defaults");
                AppData::default()
            }
        }
    }

    fn read(&self) -> Result<StoredDocument, StoreError> {
        Ok(match self.backend.get(&self.key)? {
            Some(raw) => StoredDocument::parse(raw, &self.key),
            None => StoredDocument::default(),
        })
    }

    /// Reads the document ahead of rewriting it
    ///
    /// Fails when the backend cannot be read. Stored text that did not read
    /// back exactly is first copied to an unused backup key.
    fn read_for_update(&mut self) -> Result<AppData, StoreError> {
        let stored = self.read()?;
        if let Some(raw) = stored.lossy {
            let backup = self.unused_backup_key()?;
            self.backend.set(&backup, &raw)?;
            warn!(key = %self.key, backup = %backup, "Stored document was not fully readable, kept a backup");
        }
        Ok(stored.data)
    }

    fn unused_backup_key(&self) -> Result<String, StoreError> {
        let base = format!("{}_backup", self.key);
        let mut candidate = base.clone();
        let mut n = 1;
        while self.backend.get(&candidate)?.is_some() {
            candidate = format!("{}_{}", base, n);
            n += 1;
        }
        Ok(candidate)
    }

    /// Writes the whole document
    pub fn save_data(&mut self, data: &AppData) -> Result<(), StoreError> {
        let raw = serde_json::to_string(data)?;
        let key = &self.key;
        self.backend.set(key, &raw).map_err(|e| {
            error!(key = %key, error = %e, "Failed to write stored document");
            e
        })
    }

    pub fn get_tasks(&self) -> Vec<Task> {
        self.get_data().tasks
    }

    /// Replaces the stored task list, keeping settings
    pub fn save_tasks(&mut self, tasks: Vec<Task>) -> Result<(), StoreError> {
        let mut data = self.read_for_update()?;
        data.tasks = tasks;
        data.last_updated = Utc::now();
        self.save_data(&data)
    }

    pub fn get_settings(&self) -> Settings {
        self.get_data().settings
    }

    /// Merges `patch` into the stored settings and returns the result
    pub fn save_settings(&mut self, patch: &SettingsPatch) -> Result<Settings, StoreError> {
        let mut data = self.read_for_update()?;
        data.settings = data.settings.merged(patch);
        data.last_updated = Utc::now();
        self.save_data(&data)?;
        Ok(data.settings)
    }

    /// Serializes the full document plus `exportedAt` and `version`
    pub fn export_data(&self) -> Result<String, StoreError> {
        let data = self.get_data();
        let export = ExportDocument {
            data: &data,
            exported_at: Utc::now(),
            version: EXPORT_VERSION,
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// Validates and stores an exported document
    ///
    /// Imported tasks replace the current list wholesale; imported settings
    /// are merged onto the current ones. Nothing is written unless the whole
    /// payload validates. Returns the number of imported tasks.
    pub fn import_data(&mut self, text: &str) -> Result<usize, ImportError> {
        let value: Value = serde_json::from_str(text).map_err(ImportError::InvalidJson)?;
        let object = value.as_object().ok_or(ImportError::NotAnObject)?;

        let tasks = match object.get("tasks") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => parse_imported_tasks(items)?,
            Some(_) => return Err(ImportError::TasksNotArray),
        };

        let patch = match object.get("settings") {
            None | Some(Value::Null) => SettingsPatch::default(),
            Some(settings) => serde_json::from_value(settings.clone())
                .map_err(ImportError::InvalidSettings)?,
        };

        let current = self.read_for_update()?;
        let merged = AppData {
            tasks,
            settings: current.settings.merged(&patch),
            last_updated: Utc::now(),
        };
        self.save_data(&merged)?;

        debug!(count = merged.tasks.len(), "Imported tasks");
        Ok(merged.tasks.len())
    }

    /// Removes the stored document entirely
    pub fn clear_all_data(&mut self) -> Result<(), StoreError> {
        self.backend.remove(&self.key)
    }

    /// Reports the size of the stored document
    pub fn storage_info(&self) -> Result<StorageInfo, StoreError> {
        let data = self.get_data();
        let used_space = serde_json::to_string(&data)?.len();

        Ok(StorageInfo {
            used_space,
            max_space: MAX_STORAGE_BYTES,
            usage_percentage: used_space as f64 / MAX_STORAGE_BYTES as f64 * 100.0,
            task_count: data.tasks.len(),
        })
    }
}

/// The document as read, plus the raw text when reading it lost anything
#[derive(Default)]
struct StoredDocument {
    data: AppData,
    lossy: Option<String>,
}

impl StoredDocument {
    fn parse(raw: String, key: &str) -> Self {
        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                error!(key = %key, error = %e, "Stored document is not valid JSON, using defaults");
                return Self {
                    data: AppData::default(),
                    lossy: Some(raw),
                };
            }
        };
        let Some(object) = value.as_object() else {
            error!(key = %key, "Stored document is not a JSON object, using defaults");
            return Self {
                data: AppData::default(),
                lossy: Some(raw),
            };
        };

        let data = AppData {
            tasks: read_tasks(object),
            settings: match object.get("settings") {
                None | Some(Value::Null) => Settings::default(),
                Some(settings) => serde_json::from_value(settings.clone()).unwrap_or_else(|e| {
                    warn!(error = %e, "Stored settings are malformed, using defaults");
                    Settings::default()
                }),
            },
            last_updated: object
                .get("lastUpdated")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_else(Utc::now),
        };

        // Anything that does not serialize back to the stored value was
        // dropped or normalized while reading
        let exact = serde_json::to_value(&data).is_ok_and(|written| written == value);
        Self {
            data,
            lossy: (!exact).then_some(raw),
        }
    }
}

fn read_tasks(object: &Map<String, Value>) -> Vec<Task> {
    let items = match object.get("tasks") {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => {
            warn!("Stored 'tasks' is not an array, ignoring it");
            return Vec::new();
        }
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item.clone()) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!(index, error = %e, "Skipping unreadable stored task");
                None
            }
        })
        .collect()
}

fn non_empty_str(item: &Value, field: &str) -> bool {
    item.get(field)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
}

fn parse_imported_tasks(items: &[Value]) -> Result<Vec<Task>, ImportError> {
    // Validate everything before deserializing anything
    if let Some(index) = items
        .iter()
        .position(|item| !(non_empty_str(item, "id") && non_empty_str(item, "title")))
    {
        return Err(ImportError::InvalidTask { index });
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item.clone())
                .map_err(|source| ImportError::MalformedTask { index, source })
        })
        .collect()
}

impl<S: KeyValueStore> TaskPersistence for LocalStorage<S> {
    fn load_tasks(&self) -> Vec<Task> {
        self.get_tasks()
    }

    fn save_tasks(&mut self, tasks: Vec<Task>) -> Result<(), StoreError> {
        LocalStorage::save_tasks(self, tasks)
    }
}
